use crate::codec::{Decodeable, Encodeable};
use std::io::Read;

/// A column's value type: INT (32-bit signed), FLOAT (32-bit IEEE), or
/// a fixed `CHAR(N)`. `TypeTag` is the wire representation; `TypeId`
/// pairs it with the `CHAR` width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum TypeTag {
    Int = 0,
    Float = 1,
    Char = 2,
}

impl TypeTag {
    fn from_u32(v: u32) -> Self {
        match v {
            0 => TypeTag::Int,
            1 => TypeTag::Float,
            2 => TypeTag::Char,
            other => panic!("corrupt page: unknown TypeId tag {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeId {
    Int,
    Float,
    Char(u16),
}

impl TypeId {
    /// On-disk/in-row width in bytes: INT=4, FLOAT=4, CHAR(N)=N.
    pub fn fixed_len(&self) -> usize {
        match self {
            TypeId::Int => 4,
            TypeId::Float => 4,
            TypeId::Char(n) => *n as usize,
        }
    }

    fn tag(&self) -> TypeTag {
        match self {
            TypeId::Int => TypeTag::Int,
            TypeId::Float => TypeTag::Float,
            TypeId::Char(_) => TypeTag::Char,
        }
    }
}

impl Encodeable for TypeId {
    fn encode_to(&self, out: &mut Vec<u8>) {
        (self.tag() as u32).encode_to(out);
        let len = match self {
            TypeId::Char(n) => *n as u32,
            _ => 0,
        };
        len.encode_to(out);
    }
}

impl Decodeable for TypeId {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        let tag = TypeTag::from_u32(u32::decode_from(reader));
        let len = u32::decode_from(reader);
        match tag {
            TypeTag::Int => TypeId::Int,
            TypeTag::Float => TypeId::Float,
            TypeTag::Char => TypeId::Char(len as u16),
        }
    }
}
