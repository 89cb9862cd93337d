use super::iter::BPlusTreeIterator;
use super::key::{compare, max_key_bytes, smallest_width};
use super::node::{decode_node, encode_node, InternalNode, LeafNode, Node};
use crate::buffer::BufferPool;
use crate::disk::{PageId, INVALID_PAGE_ID};
use crate::record::{RowId, TypeId};
use std::cell::Cell;
use std::cmp::Ordering;

/// A B+-tree index over a fixed-width packed key. Key width is chosen
/// once at creation time (the smallest of the engine's fixed widths
/// that covers the key columns) and never changes; reopening an
/// existing index passes the same width back in rather than
/// recomputing it from column metadata that may have evolved since.
pub struct BPlusTree {
    pool: BufferPool,
    key_types: Vec<TypeId>,
    key_width: usize,
    max_size: usize,
    min_size: usize,
    root_page_id: Cell<PageId>,
}

fn node_capacity(page_size: usize, key_width: usize) -> usize {
    let usable = page_size.saturating_sub(48);
    (usable / (key_width + 16)).max(3)
}

impl BPlusTree {
    pub fn create(pool: BufferPool, key_types: Vec<TypeId>) -> Self {
        let key_width = smallest_width(max_key_bytes(&key_types));
        let max_size = node_capacity(pool.page_size(), key_width);
        Self {
            pool,
            key_types,
            key_width,
            max_size,
            min_size: (max_size / 2).max(1),
            root_page_id: Cell::new(INVALID_PAGE_ID),
        }
    }

    pub fn open(
        pool: BufferPool,
        key_types: Vec<TypeId>,
        key_width: usize,
        root_page_id: PageId,
    ) -> Self {
        let max_size = node_capacity(pool.page_size(), key_width);
        Self {
            pool,
            key_types,
            key_width,
            max_size,
            min_size: (max_size / 2).max(1),
            root_page_id: Cell::new(root_page_id),
        }
    }

    pub fn key_width(&self) -> usize {
        self.key_width
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id.get()
    }

    fn cmp(&self, a: &[u8], b: &[u8]) -> Ordering {
        compare(a, b, &self.key_types)
    }

    fn load(&self, page_id: PageId) -> Node {
        let guard = self
            .pool
            .fetch_page(page_id)
            .expect("i/o error reading an index page")
            .expect("index page must be fetchable while its tree is reachable");
        let node = decode_node(&guard.bytes(), self.key_width);
        node
    }

    fn store(&self, page_id: PageId, node: &Node) {
        let mut guard = self
            .pool
            .fetch_page(page_id)
            .expect("i/o error writing an index page")
            .expect("index page must be fetchable while its tree is reachable");
        let bytes = encode_node(node, self.key_width, self.pool.page_size());
        guard.bytes_mut().copy_from_slice(&bytes);
    }

    fn alloc(&self, node: &Node) -> PageId {
        let mut guard = self
            .pool
            .new_page()
            .expect("i/o error allocating an index page")
            .expect("buffer pool must have room to grow an index");
        let bytes = encode_node(node, self.key_width, self.pool.page_size());
        guard.bytes_mut().copy_from_slice(&bytes);
        guard.page_id()
    }

    fn set_parent(&self, page_id: PageId, parent_id: PageId) {
        let mut node = self.load(page_id);
        node.set_parent_id(parent_id);
        self.store(page_id, &node);
    }

    fn find_leaf_page_id(&self, key: &[u8]) -> PageId {
        let mut page_id = self.root_page_id.get();
        loop {
            match self.load(page_id) {
                Node::Leaf(_) => return page_id,
                Node::Internal(internal) => {
                    let mut idx = 0;
                    while idx < internal.keys.len() && self.cmp(key, &internal.keys[idx]) != Ordering::Less {
                        idx += 1;
                    }
                    page_id = internal.children[idx];
                }
            }
        }
    }

    pub fn get_value(&self, key: &[u8]) -> Option<RowId> {
        if self.root_page_id.get() == INVALID_PAGE_ID {
            return None;
        }
        let leaf_id = self.find_leaf_page_id(key);
        let leaf = self.load(leaf_id);
        leaf.as_leaf()
            .entries
            .iter()
            .find(|(k, _)| self.cmp(k, key) == Ordering::Equal)
            .map(|(_, rid)| *rid)
    }

    pub fn insert(&self, key: &[u8], rid: RowId) -> bool {
        if self.root_page_id.get() == INVALID_PAGE_ID {
            let leaf = LeafNode {
                parent_id: INVALID_PAGE_ID,
                next_leaf_id: INVALID_PAGE_ID,
                entries: vec![(key.to_vec(), rid)],
            };
            let page_id = self.alloc(&Node::Leaf(leaf));
            self.root_page_id.set(page_id);
            return true;
        }

        let leaf_id = self.find_leaf_page_id(key);
        let mut leaf = self.load(leaf_id).as_leaf().clone();
        let pos = leaf.entries.partition_point(|(k, _)| self.cmp(k, key) == Ordering::Less);
        if pos < leaf.entries.len() && self.cmp(&leaf.entries[pos].0, key) == Ordering::Equal {
            return false;
        }
        leaf.entries.insert(pos, (key.to_vec(), rid));

        if leaf.entries.len() <= self.max_size {
            self.store(leaf_id, &Node::Leaf(leaf));
            return true;
        }

        let mid = leaf.entries.len() / 2;
        let sibling_entries = leaf.entries.split_off(mid);
        let separator = sibling_entries[0].0.clone();
        let sibling = LeafNode {
            parent_id: leaf.parent_id,
            next_leaf_id: leaf.next_leaf_id,
            entries: sibling_entries,
        };
        let sibling_id = self.alloc(&Node::Leaf(sibling));
        leaf.next_leaf_id = sibling_id;
        let parent_id = leaf.parent_id;
        self.store(leaf_id, &Node::Leaf(leaf));
        self.insert_into_parent(leaf_id, separator, sibling_id, parent_id);
        true
    }

    fn insert_into_parent(&self, left_id: PageId, separator: Vec<u8>, right_id: PageId, parent_id: PageId) {
        if parent_id == INVALID_PAGE_ID {
            let root = InternalNode {
                parent_id: INVALID_PAGE_ID,
                children: vec![left_id, right_id],
                keys: vec![separator],
            };
            let root_id = self.alloc(&Node::Internal(root));
            self.set_parent(left_id, root_id);
            self.set_parent(right_id, root_id);
            self.root_page_id.set(root_id);
            return;
        }

        let mut parent = self.load(parent_id).as_internal().clone();
        let idx = parent.children.iter().position(|&c| c == left_id).unwrap();
        parent.keys.insert(idx, separator);
        parent.children.insert(idx + 1, right_id);
        self.set_parent(right_id, parent_id);

        if parent.keys.len() <= self.max_size {
            self.store(parent_id, &Node::Internal(parent));
            return;
        }

        let mid = parent.keys.len() / 2;
        let promoted = parent.keys[mid].clone();
        let right_keys = parent.keys.split_off(mid + 1);
        parent.keys.pop();
        let right_children = parent.children.split_off(mid + 1);

        let sibling = InternalNode {
            parent_id: parent.parent_id,
            children: right_children,
            keys: right_keys,
        };
        let sibling_id = self.alloc(&Node::Internal(sibling.clone()));
        for &child in &sibling.children {
            self.set_parent(child, sibling_id);
        }
        let grandparent_id = parent.parent_id;
        self.store(parent_id, &Node::Internal(parent));
        self.insert_into_parent(parent_id, promoted, sibling_id, grandparent_id);
    }

    pub fn remove(&self, key: &[u8]) {
        if self.root_page_id.get() == INVALID_PAGE_ID {
            return;
        }
        let leaf_id = self.find_leaf_page_id(key);
        let mut leaf = self.load(leaf_id).as_leaf().clone();
        let pos = match leaf.entries.iter().position(|(k, _)| self.cmp(k, key) == Ordering::Equal) {
            Some(p) => p,
            None => return,
        };
        leaf.entries.remove(pos);

        if leaf_id == self.root_page_id.get() {
            if leaf.entries.is_empty() {
                self.pool.delete_page(leaf_id).ok();
                self.root_page_id.set(INVALID_PAGE_ID);
            } else {
                self.store(leaf_id, &Node::Leaf(leaf));
            }
            return;
        }

        if leaf.entries.len() >= self.min_size {
            self.store(leaf_id, &Node::Leaf(leaf));
            return;
        }
        self.coalesce_or_redistribute_leaf(leaf_id, leaf);
    }

    fn coalesce_or_redistribute_leaf(&self, page_id: PageId, mut node: LeafNode) {
        let parent_id = node.parent_id;
        let mut parent = self.load(parent_id).as_internal().clone();
        let idx = parent.children.iter().position(|&c| c == page_id).unwrap();

        if idx > 0 {
            let left_id = parent.children[idx - 1];
            let mut left = self.load(left_id).as_leaf().clone();
            if left.entries.len() + node.entries.len() <= self.max_size {
                left.entries.extend(node.entries);
                left.next_leaf_id = node.next_leaf_id;
                self.store(left_id, &Node::Leaf(left));
                self.pool.delete_page(page_id).ok();
                self.remove_entry_from_parent(parent_id, idx);
            } else {
                let moved = left.entries.pop().unwrap();
                node.entries.insert(0, moved.clone());
                self.store(left_id, &Node::Leaf(left));
                self.store(page_id, &Node::Leaf(node));
                parent.keys[idx - 1] = moved.0;
                self.store(parent_id, &Node::Internal(parent));
            }
        } else {
            let right_id = parent.children[idx + 1];
            let mut right = self.load(right_id).as_leaf().clone();
            if node.entries.len() + right.entries.len() <= self.max_size {
                node.entries.extend(right.entries);
                node.next_leaf_id = right.next_leaf_id;
                self.store(page_id, &Node::Leaf(node));
                self.pool.delete_page(right_id).ok();
                self.remove_entry_from_parent(parent_id, idx + 1);
            } else {
                let moved = right.entries.remove(0);
                node.entries.push(moved);
                self.store(page_id, &Node::Leaf(node));
                parent.keys[idx] = right.entries[0].0.clone();
                self.store(right_id, &Node::Leaf(right));
                self.store(parent_id, &Node::Internal(parent));
            }
        }
    }

    fn remove_entry_from_parent(&self, parent_id: PageId, child_index: usize) {
        let mut parent = self.load(parent_id).as_internal().clone();
        parent.keys.remove(child_index - 1);
        parent.children.remove(child_index);

        if parent_id == self.root_page_id.get() {
            if parent.children.len() == 1 {
                let only_child = parent.children[0];
                self.set_parent(only_child, INVALID_PAGE_ID);
                self.pool.delete_page(parent_id).ok();
                self.root_page_id.set(only_child);
            } else {
                self.store(parent_id, &Node::Internal(parent));
            }
            return;
        }

        if parent.keys.len() >= self.min_size {
            self.store(parent_id, &Node::Internal(parent));
            return;
        }
        self.coalesce_or_redistribute_internal(parent_id, parent);
    }

    fn coalesce_or_redistribute_internal(&self, page_id: PageId, mut node: InternalNode) {
        let parent_id = node.parent_id;
        let mut parent = self.load(parent_id).as_internal().clone();
        let idx = parent.children.iter().position(|&c| c == page_id).unwrap();

        if idx > 0 {
            let left_id = parent.children[idx - 1];
            let mut left = self.load(left_id).as_internal().clone();
            if left.keys.len() + 1 + node.keys.len() <= self.max_size {
                let separator = parent.keys[idx - 1].clone();
                left.keys.push(separator);
                left.keys.extend(node.keys);
                left.children.extend(node.children.clone());
                for &child in &node.children {
                    self.set_parent(child, left_id);
                }
                self.store(left_id, &Node::Internal(left));
                self.pool.delete_page(page_id).ok();
                self.remove_entry_from_parent(parent_id, idx);
            } else {
                let moved_child = left.children.pop().unwrap();
                let moved_key = left.keys.pop().unwrap();
                let old_separator = parent.keys[idx - 1].clone();
                node.keys.insert(0, old_separator);
                node.children.insert(0, moved_child);
                self.set_parent(moved_child, page_id);
                parent.keys[idx - 1] = moved_key;
                self.store(left_id, &Node::Internal(left));
                self.store(page_id, &Node::Internal(node));
                self.store(parent_id, &Node::Internal(parent));
            }
        } else {
            let right_id = parent.children[idx + 1];
            let mut right = self.load(right_id).as_internal().clone();
            if node.keys.len() + 1 + right.keys.len() <= self.max_size {
                let separator = parent.keys[idx].clone();
                node.keys.push(separator);
                node.keys.extend(right.keys);
                node.children.extend(right.children.clone());
                for &child in &node.children {
                    self.set_parent(child, page_id);
                }
                self.store(page_id, &Node::Internal(node));
                self.pool.delete_page(right_id).ok();
                self.remove_entry_from_parent(parent_id, idx + 1);
            } else {
                let moved_child = right.children.remove(0);
                let moved_key = right.keys.remove(0);
                let old_separator = parent.keys[idx].clone();
                node.keys.push(old_separator);
                node.children.push(moved_child);
                self.set_parent(moved_child, page_id);
                parent.keys[idx] = moved_key;
                self.store(page_id, &Node::Internal(node));
                self.store(right_id, &Node::Internal(right));
                self.store(parent_id, &Node::Internal(parent));
            }
        }
    }

    pub fn begin(&self) -> BPlusTreeIterator {
        if self.root_page_id.get() == INVALID_PAGE_ID {
            return BPlusTreeIterator::exhausted();
        }
        let mut page_id = self.root_page_id.get();
        loop {
            match self.load(page_id) {
                Node::Leaf(_) => return BPlusTreeIterator::at(self.pool.clone(), self.key_width, page_id, 0),
                Node::Internal(internal) => page_id = internal.children[0],
            }
        }
    }

    pub fn begin_at(&self, key: &[u8]) -> BPlusTreeIterator {
        if self.root_page_id.get() == INVALID_PAGE_ID {
            return BPlusTreeIterator::exhausted();
        }
        let leaf_id = self.find_leaf_page_id(key);
        let leaf = self.load(leaf_id);
        let idx = leaf
            .as_leaf()
            .entries
            .partition_point(|(k, _)| self.cmp(k, key) == Ordering::Less);
        BPlusTreeIterator::at(self.pool.clone(), self.key_width, leaf_id, idx)
    }

    /// Range scan of every key satisfying `op` against `bound`, used by
    /// the executor's index-acceleration path for inequalities.
    pub fn range_from(&self, bound: &[u8], inclusive: bool) -> BPlusTreeIterator {
        let mut it = self.begin_at(bound);
        if !inclusive {
            if let Some((k, _)) = it.peek() {
                if self.cmp(&k, bound) == Ordering::Equal {
                    it.next();
                }
            }
        }
        it
    }

    /// Walks every page reachable from the root and frees it. Called
    /// when the owning index is dropped.
    pub fn free_all(&self) {
        if self.root_page_id.get() == INVALID_PAGE_ID {
            return;
        }
        let mut frontier = vec![self.root_page_id.get()];
        while let Some(page_id) = frontier.pop() {
            if let Node::Internal(internal) = self.load(page_id) {
                frontier.extend(internal.children);
            }
            self.pool.delete_page(page_id).ok();
        }
    }
}
