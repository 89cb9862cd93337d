use super::column::Column;
use crate::codec::{ByteWriter, Decodeable, Encodeable};
use std::io::Read;

pub const SCHEMA_MAGIC: u32 = 771122;

/// An ordered list of [`Column`]s. Two schemas with the same columns in
/// a different order are not equal — row byte layout depends on order.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Upper bound on a row's serialized size: every field present
    /// (none `NULL`), every `CHAR` filled to its declared width.
    pub fn max_row_size(&self) -> usize {
        let bitmap_bytes = (self.columns.len() + 7) / 8;
        4 + bitmap_bytes + self.columns.iter().map(|c| c.len).sum::<usize>()
    }

    /// Builds the projected schema for a key-map: the column subset an
    /// index packs into its key, in key order.
    pub fn project(&self, key_map: &[usize]) -> Schema {
        Schema::new(key_map.iter().map(|&i| self.columns[i].clone()).collect())
    }
}

impl Encodeable for Schema {
    fn encode_to(&self, out: &mut Vec<u8>) {
        let mut w = ByteWriter::new();
        w.write(&SCHEMA_MAGIC);
        w.write(&(self.columns.len() as u32));
        for column in &self.columns {
            w.write(column);
        }
        out.extend_from_slice(&w.into_bytes());
    }
}

impl Decodeable for Schema {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        let magic = u32::decode_from(reader);
        assert_eq!(magic, SCHEMA_MAGIC, "schema magic mismatch");
        let count = u32::decode_from(reader) as usize;
        let columns = (0..count).map(|_| Column::decode_from(reader)).collect();
        Self { columns }
    }
}
