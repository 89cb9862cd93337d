use super::types::TypeId;
use crate::codec::{ByteWriter, Decodeable, Encodeable};
use std::io::Read;

/// Authenticates a serialized [`Column`].
pub const COLUMN_MAGIC: u32 = 210928;

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub type_id: TypeId,
    pub len: usize,
    pub col_index: usize,
    pub nullable: bool,
    pub unique: bool,
}

impl Column {
    pub fn new(
        name: impl Into<String>,
        type_id: TypeId,
        col_index: usize,
        nullable: bool,
        unique: bool,
    ) -> Self {
        let len = type_id.fixed_len();
        Self {
            name: name.into(),
            type_id,
            len,
            col_index,
            nullable,
            unique,
        }
    }
}

impl Encodeable for Column {
    fn encode_to(&self, out: &mut Vec<u8>) {
        let mut w = ByteWriter::new();
        w.write(&COLUMN_MAGIC);
        w.write(&self.name);
        w.write(&self.type_id);
        w.write(&(self.len as u32));
        w.write(&(self.col_index as u32));
        w.write(&self.nullable);
        w.write(&self.unique);
        out.extend_from_slice(&w.into_bytes());
    }
}

impl Decodeable for Column {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        let magic = u32::decode_from(reader);
        assert_eq!(magic, COLUMN_MAGIC, "column metadata magic mismatch");
        let name = String::decode_from(reader);
        let type_id = TypeId::decode_from(reader);
        let len = u32::decode_from(reader) as usize;
        let col_index = u32::decode_from(reader) as usize;
        let nullable = bool::decode_from(reader);
        let unique = bool::decode_from(reader);
        Self {
            name,
            type_id,
            len,
            col_index,
            nullable,
            unique,
        }
    }
}
