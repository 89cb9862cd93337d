use super::types::TypeId;
use std::cmp::Ordering;
use std::convert::TryInto;
use std::fmt;

/// Three-valued logic result: only `True` selects a row in a `WHERE`
/// clause. `NULL` absorbs except for the explicit `IS [NOT] NULL`
/// comparisons, which never return `Tri::Null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tri {
    True,
    False,
    Null,
}

impl Tri {
    pub fn from_bool(b: bool) -> Self {
        if b {
            Tri::True
        } else {
            Tri::False
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Tri::True)
    }

    pub fn and(self, other: Tri) -> Tri {
        match (self, other) {
            (Tri::False, _) | (_, Tri::False) => Tri::False,
            (Tri::Null, _) | (_, Tri::Null) => Tri::Null,
            (Tri::True, Tri::True) => Tri::True,
        }
    }

    pub fn or(self, other: Tri) -> Tri {
        match (self, other) {
            (Tri::True, _) | (_, Tri::True) => Tri::True,
            (Tri::Null, _) | (_, Tri::Null) => Tri::Null,
            (Tri::False, Tri::False) => Tri::False,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Payload {
    Int(i32),
    Float(f32),
    Char(Vec<u8>),
}

/// A single column value: a type, a null flag, and (when not null) the
/// payload. `CHAR(N)` payloads are always exactly `N` bytes,
/// null-padded on the right.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    type_id: TypeId,
    is_null: bool,
    payload: Payload,
}

impl Field {
    pub fn int(v: i32) -> Self {
        Self {
            type_id: TypeId::Int,
            is_null: false,
            payload: Payload::Int(v),
        }
    }

    pub fn float(v: f32) -> Self {
        Self {
            type_id: TypeId::Float,
            is_null: false,
            payload: Payload::Float(v),
        }
    }

    pub fn char(n: u16, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.truncate(n as usize);
        bytes.resize(n as usize, 0);
        Self {
            type_id: TypeId::Char(n),
            is_null: false,
            payload: Payload::Char(bytes),
        }
    }

    pub fn null(type_id: TypeId) -> Self {
        let payload = match type_id {
            TypeId::Int => Payload::Int(0),
            TypeId::Float => Payload::Float(0.0),
            TypeId::Char(n) => Payload::Char(vec![0u8; n as usize]),
        };
        Self {
            type_id,
            is_null: true,
            payload,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn is_null(&self) -> bool {
        self.is_null
    }

    pub fn as_int(&self) -> i32 {
        match self.payload {
            Payload::Int(v) => v,
            _ => panic!("field is not INT"),
        }
    }

    pub fn as_float(&self) -> f32 {
        match self.payload {
            Payload::Float(v) => v,
            _ => panic!("field is not FLOAT"),
        }
    }

    pub fn as_char_bytes(&self) -> &[u8] {
        match &self.payload {
            Payload::Char(b) => b,
            _ => panic!("field is not CHAR"),
        }
    }

    pub fn as_char_str(&self) -> String {
        let bytes = self.as_char_bytes();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }

    /// Raw payload bytes, at the type's fixed width — what gets written
    /// to a row's serialized body or packed into a B+-tree key.
    pub fn payload_bytes(&self) -> Vec<u8> {
        match &self.payload {
            Payload::Int(v) => v.to_le_bytes().to_vec(),
            Payload::Float(v) => v.to_le_bytes().to_vec(),
            Payload::Char(b) => b.clone(),
        }
    }

    pub fn from_payload_bytes(type_id: TypeId, bytes: &[u8]) -> Self {
        let payload = match type_id {
            TypeId::Int => Payload::Int(i32::from_le_bytes(bytes[..4].try_into().unwrap())),
            TypeId::Float => Payload::Float(f32::from_le_bytes(bytes[..4].try_into().unwrap())),
            TypeId::Char(n) => Payload::Char(bytes[..n as usize].to_vec()),
        };
        Self {
            type_id,
            is_null: false,
            payload,
        }
    }

    fn value_cmp(&self, other: &Field) -> Ordering {
        assert_eq!(
            self.type_id, other.type_id,
            "comparing fields of different types is a caller bug"
        );
        match (&self.payload, &other.payload) {
            (Payload::Int(a), Payload::Int(b)) => a.cmp(b),
            (Payload::Float(a), Payload::Float(b)) => {
                a.partial_cmp(b).expect("NaN is not a valid stored FLOAT")
            }
            (Payload::Char(a), Payload::Char(b)) => a.cmp(b),
            _ => unreachable!("TypeId equality implies Payload variant equality"),
        }
    }

    pub fn tri_eq(&self, other: &Field) -> Tri {
        if self.is_null || other.is_null {
            return Tri::Null;
        }
        Tri::from_bool(self.value_cmp(other) == Ordering::Equal)
    }

    pub fn tri_ne(&self, other: &Field) -> Tri {
        if self.is_null || other.is_null {
            return Tri::Null;
        }
        Tri::from_bool(self.value_cmp(other) != Ordering::Equal)
    }

    pub fn tri_lt(&self, other: &Field) -> Tri {
        if self.is_null || other.is_null {
            return Tri::Null;
        }
        Tri::from_bool(self.value_cmp(other) == Ordering::Less)
    }

    pub fn tri_le(&self, other: &Field) -> Tri {
        if self.is_null || other.is_null {
            return Tri::Null;
        }
        Tri::from_bool(self.value_cmp(other) != Ordering::Greater)
    }

    pub fn tri_gt(&self, other: &Field) -> Tri {
        if self.is_null || other.is_null {
            return Tri::Null;
        }
        Tri::from_bool(self.value_cmp(other) == Ordering::Greater)
    }

    pub fn tri_ge(&self, other: &Field) -> Tri {
        if self.is_null || other.is_null {
            return Tri::Null;
        }
        Tri::from_bool(self.value_cmp(other) != Ordering::Less)
    }
}

/// Ordinary (non-three-valued) ordering, used by the B+-tree where a
/// `NULL` key can never occur (key columns come from the primary key
/// or a `UNIQUE` column).
impl PartialOrd for Field {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.is_null || other.is_null {
            return None;
        }
        Some(self.value_cmp(other))
    }
}

impl Eq for Field {}
impl Ord for Field {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .expect("ordering a NULL field is a caller bug")
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_null {
            return write!(f, "NULL");
        }
        match &self.payload {
            Payload::Int(v) => write!(f, "{}", v),
            Payload::Float(v) => write!(f, "{}", v),
            Payload::Char(_) => write!(f, "{}", self.as_char_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_absorbs_in_comparisons() {
        let a = Field::null(TypeId::Int);
        let b = Field::int(5);
        assert_eq!(a.tri_eq(&b), Tri::Null);
        assert_eq!(a.tri_lt(&b), Tri::Null);
    }

    #[test]
    fn char_padding_is_zero_filled_and_comparable() {
        let a = Field::char(10, "ab");
        let b = Field::char(10, "ab");
        assert_eq!(a.tri_eq(&b), Tri::True);
        assert_eq!(a.as_char_bytes().len(), 10);
    }

    #[test]
    fn three_valued_and_or() {
        assert_eq!(Tri::True.and(Tri::Null), Tri::Null);
        assert_eq!(Tri::False.and(Tri::Null), Tri::False);
        assert_eq!(Tri::True.or(Tri::Null), Tri::True);
        assert_eq!(Tri::False.or(Tri::Null), Tri::Null);
    }
}
