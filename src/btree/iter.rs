use super::node::decode_node;
use crate::buffer::BufferPool;
use crate::disk::{PageId, INVALID_PAGE_ID};
use crate::record::RowId;

/// A forward-only cursor over a leaf chain. Re-fetches its current leaf
/// from the buffer pool on every step rather than holding a persistent
/// pin across calls — simpler to keep safe under Rust's ownership rules
/// than a long-lived borrow, at the cost of one extra pin/unpin pair
/// per step.
pub struct BPlusTreeIterator {
    pool: Option<BufferPool>,
    key_width: usize,
    leaf_id: PageId,
    index: usize,
}

impl BPlusTreeIterator {
    pub fn exhausted() -> Self {
        Self {
            pool: None,
            key_width: 0,
            leaf_id: INVALID_PAGE_ID,
            index: 0,
        }
    }

    pub fn at(pool: BufferPool, key_width: usize, leaf_id: PageId, index: usize) -> Self {
        Self {
            pool: Some(pool),
            key_width,
            leaf_id,
            index,
        }
    }

    /// Advances past any leaf whose entries are exhausted, following
    /// the next-leaf pointer until a live entry is found or the chain
    /// runs out.
    fn normalize(&mut self) {
        loop {
            let pool = match &self.pool {
                Some(p) => p,
                None => return,
            };
            if self.leaf_id == INVALID_PAGE_ID {
                return;
            }
            let guard = pool
                .fetch_page(self.leaf_id)
                .expect("i/o error reading an index page")
                .expect("index leaf must be fetchable while its tree is reachable");
            let node = decode_node(&guard.bytes(), self.key_width);
            let leaf = node.as_leaf();
            if self.index < leaf.entries.len() {
                return;
            }
            self.leaf_id = leaf.next_leaf_id;
            self.index = 0;
        }
    }

    pub fn peek(&mut self) -> Option<(Vec<u8>, RowId)> {
        self.normalize();
        let pool = self.pool.as_ref()?;
        if self.leaf_id == INVALID_PAGE_ID {
            return None;
        }
        let guard = pool
            .fetch_page(self.leaf_id)
            .expect("i/o error reading an index page")
            .expect("index leaf must be fetchable while its tree is reachable");
        let node = decode_node(&guard.bytes(), self.key_width);
        node.as_leaf().entries.get(self.index).cloned()
    }
}

impl Iterator for BPlusTreeIterator {
    type Item = (Vec<u8>, RowId);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.peek()?;
        self.index += 1;
        Some(item)
    }
}
