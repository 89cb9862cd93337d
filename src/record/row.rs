use super::field::Field;
use super::schema::Schema;
use crate::codec::{ByteWriter, Decodeable, Encodeable};
use std::io::Read;

/// Identifies a row's physical slot: the heap page it lives on and its
/// slot index within that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId {
    pub page_id: crate::disk::PageId,
    pub slot: u32,
}

impl RowId {
    pub fn new(page_id: crate::disk::PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }
}

/// An ordered list of [`Field`]s matching a [`Schema`]. Serialized body
/// is a null bitmap (one bit per column, 1 = null) followed by the
/// concatenated payload bytes of every non-null field in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    fields: Vec<Field>,
}

impl Row {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> &Field {
        &self.fields[index]
    }

    pub fn set_field(&mut self, index: usize, value: Field) {
        self.fields[index] = value;
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Projects this row onto a key-map, producing the packed key tuple
    /// an index stores alongside this row's [`RowId`].
    pub fn project(&self, key_map: &[usize]) -> Vec<Field> {
        key_map.iter().map(|&i| self.fields[i].clone()).collect()
    }

    fn null_bitmap_bytes(&self) -> Vec<u8> {
        let mut bitmap = vec![0u8; (self.fields.len() + 7) / 8];
        for (i, field) in self.fields.iter().enumerate() {
            if field.is_null() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        bitmap
    }

    /// Serialized byte length for this row, matching what
    /// [`Row::serialize`] produces: no schema round-trip needed by the
    /// caller since `CHAR` width is embedded via the field itself.
    pub fn serialized_len(&self) -> usize {
        self.serialize().len()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.null_bitmap_bytes();
        for field in &self.fields {
            if !field.is_null() {
                out.extend_from_slice(&field.payload_bytes());
            }
        }
        out
    }

    /// Rebuilds a row from its serialized body. The schema supplies
    /// column count, type, and width — none of that travels with the
    /// row itself.
    pub fn deserialize(bytes: &[u8], schema: &Schema) -> Self {
        let bitmap_len = (schema.len() + 7) / 8;
        let bitmap = &bytes[..bitmap_len];
        let mut offset = bitmap_len;
        let mut fields = Vec::with_capacity(schema.len());
        for (i, column) in schema.columns().iter().enumerate() {
            let is_null = bitmap[i / 8] & (1 << (i % 8)) != 0;
            if is_null {
                fields.push(Field::null(column.type_id));
            } else {
                let width = column.type_id.fixed_len();
                let field = Field::from_payload_bytes(column.type_id, &bytes[offset..offset + width]);
                offset += width;
                fields.push(field);
            }
        }
        Self { fields }
    }
}

/// Wire form used when a row crosses a page boundary in the heap's
/// overflow path: length-prefixed body plus the owning [`RowId`].
impl Encodeable for RowId {
    fn encode_to(&self, out: &mut Vec<u8>) {
        let mut w = ByteWriter::new();
        w.write(&self.page_id);
        w.write(&self.slot);
        out.extend_from_slice(&w.into_bytes());
    }
}

impl Decodeable for RowId {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        let page_id = crate::disk::PageId::decode_from(reader);
        let slot = u32::decode_from(reader);
        Self { page_id, slot }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::column::Column;
    use crate::record::types::TypeId;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", TypeId::Int, 0, false, false),
            Column::new("name", TypeId::Char(8), 1, false, true),
            Column::new("score", TypeId::Float, 2, true, false),
        ])
    }

    #[test]
    fn roundtrip_with_mixed_nulls() {
        let schema = schema();
        let row = Row::new(vec![
            Field::int(7),
            Field::char(8, "alice"),
            Field::null(TypeId::Float),
        ]);
        let bytes = row.serialize();
        let restored = Row::deserialize(&bytes, &schema);
        assert_eq!(row, restored);
        assert!(restored.field(2).is_null());
    }

    #[test]
    fn project_extracts_key_columns_in_order() {
        let row = Row::new(vec![Field::int(3), Field::char(8, "bob"), Field::float(1.0)]);
        let key = row.project(&[0]);
        assert_eq!(key.len(), 1);
        assert_eq!(key[0].as_int(), 3);
    }

    #[test]
    fn row_id_roundtrip() {
        let id = RowId::new(5, 2);
        let bytes = id.encode();
        let restored = RowId::decode_from(&mut std::io::Cursor::new(bytes));
        assert_eq!(id, restored);
    }
}
