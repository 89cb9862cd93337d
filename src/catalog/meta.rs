use crate::codec::{ByteWriter, Decodeable, Encodeable};
use crate::disk::PageId;
use crate::record::Schema;
use std::io::Read;

pub const CATALOG_MAGIC: u32 = 89849;
pub const TABLE_OR_INDEX_MAGIC: u32 = 344528;

/// The catalog meta page: two ordered id-to-page-id maps. Reopening a
/// database means reading this page first, then one metadata page per
/// entry in each map.
#[derive(Debug, Clone, Default)]
pub struct CatalogMeta {
    pub tables: Vec<(u32, PageId)>,
    pub indexes: Vec<(u32, PageId)>,
    pub next_table_id: u32,
    pub next_index_id: u32,
}

impl Encodeable for CatalogMeta {
    fn encode_to(&self, out: &mut Vec<u8>) {
        let mut w = ByteWriter::new();
        w.write(&CATALOG_MAGIC);
        w.write(&(self.tables.len() as u32));
        for (id, page_id) in &self.tables {
            w.write(id);
            w.write(page_id);
        }
        w.write(&(self.indexes.len() as u32));
        for (id, page_id) in &self.indexes {
            w.write(id);
            w.write(page_id);
        }
        w.write(&self.next_table_id);
        w.write(&self.next_index_id);
        out.extend_from_slice(&w.into_bytes());
    }
}

impl Decodeable for CatalogMeta {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        let magic = u32::decode_from(reader);
        assert_eq!(magic, CATALOG_MAGIC, "catalog meta page magic mismatch");
        let table_count = u32::decode_from(reader);
        let tables = (0..table_count)
            .map(|_| (u32::decode_from(reader), PageId::decode_from(reader)))
            .collect();
        let index_count = u32::decode_from(reader);
        let indexes = (0..index_count)
            .map(|_| (u32::decode_from(reader), PageId::decode_from(reader)))
            .collect();
        let next_table_id = u32::decode_from(reader);
        let next_index_id = u32::decode_from(reader);
        Self {
            tables,
            indexes,
            next_table_id,
            next_index_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableMeta {
    pub table_id: u32,
    pub name: String,
    pub first_page_id: PageId,
    pub primary_key_columns: Vec<u32>,
    pub schema: Schema,
}

impl Encodeable for TableMeta {
    fn encode_to(&self, out: &mut Vec<u8>) {
        let mut w = ByteWriter::new();
        w.write(&TABLE_OR_INDEX_MAGIC);
        w.write(&self.table_id);
        w.write(&self.name);
        w.write(&self.first_page_id);
        w.write(&(self.primary_key_columns.len() as u32));
        for col in &self.primary_key_columns {
            w.write(col);
        }
        w.write(&self.schema);
        out.extend_from_slice(&w.into_bytes());
    }
}

impl Decodeable for TableMeta {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        let magic = u32::decode_from(reader);
        assert_eq!(magic, TABLE_OR_INDEX_MAGIC, "table metadata page magic mismatch");
        let table_id = u32::decode_from(reader);
        let name = String::decode_from(reader);
        let first_page_id = PageId::decode_from(reader);
        let pk_count = u32::decode_from(reader);
        let primary_key_columns = (0..pk_count).map(|_| u32::decode_from(reader)).collect();
        let schema = Schema::decode_from(reader);
        Self {
            table_id,
            name,
            first_page_id,
            primary_key_columns,
            schema,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexMeta {
    pub index_id: u32,
    pub name: String,
    pub table_id: u32,
    pub key_map: Vec<u32>,
    pub key_width: u32,
    pub root_page_id: PageId,
}

impl Encodeable for IndexMeta {
    fn encode_to(&self, out: &mut Vec<u8>) {
        let mut w = ByteWriter::new();
        w.write(&TABLE_OR_INDEX_MAGIC);
        w.write(&self.index_id);
        w.write(&self.name);
        w.write(&self.table_id);
        w.write(&(self.key_map.len() as u32));
        for col in &self.key_map {
            w.write(col);
        }
        w.write(&self.key_width);
        w.write(&self.root_page_id);
        out.extend_from_slice(&w.into_bytes());
    }
}

impl Decodeable for IndexMeta {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        let magic = u32::decode_from(reader);
        assert_eq!(magic, TABLE_OR_INDEX_MAGIC, "index metadata page magic mismatch");
        let index_id = u32::decode_from(reader);
        let name = String::decode_from(reader);
        let table_id = u32::decode_from(reader);
        let key_count = u32::decode_from(reader);
        let key_map = (0..key_count).map(|_| u32::decode_from(reader)).collect();
        let key_width = u32::decode_from(reader);
        let root_page_id = PageId::decode_from(reader);
        Self {
            index_id,
            name,
            table_id,
            key_map,
            key_width,
            root_page_id,
        }
    }
}
