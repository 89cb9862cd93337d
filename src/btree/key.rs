use crate::record::{Field, TypeId};
use std::cmp::Ordering;

/// Picks the smallest of the engine's fixed key widths that can hold a
/// serialized key of `needed` bytes.
pub fn smallest_width(needed: usize) -> usize {
    const WIDTHS: [usize; 5] = [4, 8, 16, 32, 64];
    WIDTHS
        .iter()
        .copied()
        .find(|&w| w >= needed)
        .unwrap_or(*WIDTHS.last().unwrap())
}

pub fn max_key_bytes(types: &[TypeId]) -> usize {
    types.iter().map(|t| t.fixed_len()).sum()
}

/// Packs key-column fields into a fixed-width byte array, zero-padded
/// on the right. Fields must already be non-null (key columns come
/// from a primary key or a `UNIQUE` column, which this engine never
/// allows to hold `NULL`).
pub fn pack(fields: &[Field], width: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(width);
    for field in fields {
        out.extend_from_slice(&field.payload_bytes());
    }
    assert!(
        out.len() <= width,
        "packed key ({} bytes) exceeds the index's key width ({})",
        out.len(),
        width
    );
    out.resize(width, 0);
    out
}

/// Column-wise comparison, per the key schema's column order. Byte
/// comparison alone is wrong for signed `INT`/`FLOAT`, so each column
/// is unpacked and compared with its own type's ordering.
pub fn compare(a: &[u8], b: &[u8], key_types: &[TypeId]) -> Ordering {
    let mut offset = 0;
    for type_id in key_types {
        let width = type_id.fixed_len();
        let fa = Field::from_payload_bytes(*type_id, &a[offset..offset + width]);
        let fb = Field::from_payload_bytes(*type_id, &b[offset..offset + width]);
        match fa.cmp(&fb) {
            Ordering::Equal => {}
            other => return other,
        }
        offset += width;
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smallest_width_rounds_up() {
        assert_eq!(smallest_width(4), 4);
        assert_eq!(smallest_width(5), 8);
        assert_eq!(smallest_width(20), 32);
    }

    #[test]
    fn compare_is_numeric_not_byte_lexicographic() {
        let neg = pack(&[Field::int(-1)], 4);
        let pos = pack(&[Field::int(1)], 4);
        assert_eq!(compare(&neg, &pos, &[TypeId::Int]), Ordering::Less);
    }

    #[test]
    fn compare_is_column_major_for_composite_keys() {
        let types = [TypeId::Int, TypeId::Int];
        let a = pack(&[Field::int(1), Field::int(9)], 8);
        let b = pack(&[Field::int(1), Field::int(2)], 8);
        assert_eq!(compare(&a, &b, &types), Ordering::Greater);
    }
}
