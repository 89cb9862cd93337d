//! A disk-backed B+-tree index: fixed key width chosen at creation,
//! column-wise comparison, node splits on overflow and
//! coalesce-or-redistribute on underflow.

pub mod iter;
pub mod key;
pub mod node;
pub mod tree;

pub use iter::BPlusTreeIterator;
pub use tree::BPlusTree;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferPool, ReplacerPolicy};
    use crate::disk::DiskManager;
    use crate::record::{Field, RowId, TypeId};
    use rand::seq::SliceRandom;
    use tempfile::NamedTempFile;

    fn tree() -> BPlusTree {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).ok();
        let disk = DiskManager::open(file.path(), 256).unwrap();
        std::mem::forget(file);
        let pool = BufferPool::new(disk, 64, ReplacerPolicy::Lru);
        BPlusTree::create(pool, vec![TypeId::Int])
    }

    fn key(n: i32) -> Vec<u8> {
        key::pack(&[Field::int(n)], key::smallest_width(4))
    }

    #[test]
    fn insert_then_get_value_roundtrips() {
        let t = tree();
        for n in 0..200 {
            assert!(t.insert(&key(n), RowId::new(n, 0)));
        }
        for n in 0..200 {
            assert_eq!(t.get_value(&key(n)), Some(RowId::new(n, 0)));
        }
        assert_eq!(t.get_value(&key(9999)), None);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let t = tree();
        assert!(t.insert(&key(1), RowId::new(1, 0)));
        assert!(!t.insert(&key(1), RowId::new(2, 0)));
    }

    #[test]
    fn begin_yields_keys_in_ascending_order() {
        let t = tree();
        for n in (0..150).rev() {
            t.insert(&key(n), RowId::new(n, 0));
        }
        let collected: Vec<i32> = t.begin().map(|(k, _)| Field::from_payload_bytes(TypeId::Int, &k[..4]).as_int()).collect();
        let expected: Vec<i32> = (0..150).collect();
        assert_eq!(collected, expected);
    }

    #[test]
    fn shuffled_insert_and_full_delete_leaves_empty_tree() {
        let t = tree();
        let mut order: Vec<i32> = (0..300).collect();
        order.shuffle(&mut rand::thread_rng());

        for &n in &order {
            assert!(t.insert(&key(n), RowId::new(n, 0)));
        }
        for &n in &order {
            assert_eq!(t.get_value(&key(n)), Some(RowId::new(n, 0)));
        }
        for &n in &order {
            t.remove(&key(n));
        }
        assert_eq!(t.root_page_id(), crate::disk::INVALID_PAGE_ID);
    }

    #[test]
    fn shuffled_insert_then_shuffled_half_delete_leaves_correct_survivors() {
        let t = tree();
        let mut insert_order: Vec<i32> = (0..500).collect();
        insert_order.shuffle(&mut rand::thread_rng());
        for &n in &insert_order {
            assert!(t.insert(&key(n), RowId::new(n, 0)));
        }

        let mut doomed: Vec<i32> = (0..250).collect();
        doomed.shuffle(&mut rand::thread_rng());
        for &n in &doomed {
            t.remove(&key(n));
        }

        for n in 0..250 {
            assert_eq!(t.get_value(&key(n)), None);
        }
        for n in 250..500 {
            assert_eq!(t.get_value(&key(n)), Some(RowId::new(n, 0)));
        }

        let survivors: Vec<i32> = t.begin().map(|(k, _)| Field::from_payload_bytes(TypeId::Int, &k[..4]).as_int()).collect();
        let expected: Vec<i32> = (250..500).collect();
        assert_eq!(survivors, expected);
    }

    #[test]
    fn range_from_exclusive_skips_the_bound() {
        let t = tree();
        for n in 0..20 {
            t.insert(&key(n), RowId::new(n, 0));
        }
        let from = t.range_from(&key(10), false);
        let first = from.map(|(k, _)| Field::from_payload_bytes(TypeId::Int, &k[..4]).as_int()).next();
        assert_eq!(first, Some(11));
    }
}
