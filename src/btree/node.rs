//! In-memory node representation for a B+-tree page. A node is loaded
//! whole from its page, mutated as plain `Vec`s, and written back whole
//! — simpler to get right than splicing a packed byte layout in place,
//! at the cost of a full-node rewrite per touch.

use crate::codec::{ByteWriter, Decodeable, Encodeable};
use crate::disk::{PageId, INVALID_PAGE_ID};
use crate::record::RowId;
use std::io::{Cursor, Read};

#[derive(Debug, Clone)]
pub struct LeafNode {
    pub parent_id: PageId,
    pub next_leaf_id: PageId,
    pub entries: Vec<(Vec<u8>, RowId)>,
}

#[derive(Debug, Clone)]
pub struct InternalNode {
    pub parent_id: PageId,
    /// `children.len() == keys.len() + 1`.
    pub children: Vec<PageId>,
    pub keys: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl Node {
    pub fn parent_id(&self) -> PageId {
        match self {
            Node::Leaf(l) => l.parent_id,
            Node::Internal(i) => i.parent_id,
        }
    }

    pub fn set_parent_id(&mut self, id: PageId) {
        match self {
            Node::Leaf(l) => l.parent_id = id,
            Node::Internal(i) => i.parent_id = id,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Node::Leaf(l) => l.entries.len(),
            Node::Internal(i) => i.keys.len(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub fn new_leaf(parent_id: PageId) -> Self {
        Node::Leaf(LeafNode {
            parent_id,
            next_leaf_id: INVALID_PAGE_ID,
            entries: Vec::new(),
        })
    }

    pub fn new_internal(parent_id: PageId) -> Self {
        Node::Internal(InternalNode {
            parent_id,
            children: Vec::new(),
            keys: Vec::new(),
        })
    }

    pub fn as_leaf(&self) -> &LeafNode {
        match self {
            Node::Leaf(l) => l,
            Node::Internal(_) => panic!("expected a leaf node"),
        }
    }

    pub fn as_leaf_mut(&mut self) -> &mut LeafNode {
        match self {
            Node::Leaf(l) => l,
            Node::Internal(_) => panic!("expected a leaf node"),
        }
    }

    pub fn as_internal(&self) -> &InternalNode {
        match self {
            Node::Internal(i) => i,
            Node::Leaf(_) => panic!("expected an internal node"),
        }
    }

    pub fn as_internal_mut(&mut self) -> &mut InternalNode {
        match self {
            Node::Internal(i) => i,
            Node::Leaf(_) => panic!("expected an internal node"),
        }
    }
}

const TAG_LEAF: u8 = 1;
const TAG_INTERNAL: u8 = 2;

/// Encodes/decodes a node given the tree's key width — the width is
/// index metadata, never duplicated per-page.
pub fn encode_node(node: &Node, key_width: usize, page_size: usize) -> Vec<u8> {
    let mut w = ByteWriter::new();
    match node {
        Node::Leaf(leaf) => {
            w.write(&TAG_LEAF);
            w.write(&leaf.parent_id);
            w.write(&leaf.next_leaf_id);
            w.write(&(leaf.entries.len() as u32));
            for (key, rid) in &leaf.entries {
                debug_assert_eq!(key.len(), key_width);
                w.write(key.as_slice());
                w.write(rid);
            }
        }
        Node::Internal(internal) => {
            w.write(&TAG_INTERNAL);
            w.write(&internal.parent_id);
            w.write(&INVALID_PAGE_ID);
            w.write(&(internal.keys.len() as u32));
            for child in &internal.children {
                w.write(child);
            }
            for key in &internal.keys {
                debug_assert_eq!(key.len(), key_width);
                w.write(key.as_slice());
            }
        }
    }
    w.into_padded(page_size)
}

pub fn decode_node(bytes: &[u8], key_width: usize) -> Node {
    let mut cursor = Cursor::new(bytes);
    let tag = u8::decode_from(&mut cursor);
    let parent_id = PageId::decode_from(&mut cursor);
    let next_or_unused = PageId::decode_from(&mut cursor);
    let count = u32::decode_from(&mut cursor) as usize;
    match tag {
        TAG_LEAF => {
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                let key = read_key(&mut cursor, key_width);
                let rid = RowId::decode_from(&mut cursor);
                entries.push((key, rid));
            }
            Node::Leaf(LeafNode {
                parent_id,
                next_leaf_id: next_or_unused,
                entries,
            })
        }
        TAG_INTERNAL => {
            let mut children = Vec::with_capacity(count + 1);
            for _ in 0..count + 1 {
                children.push(PageId::decode_from(&mut cursor));
            }
            let mut keys = Vec::with_capacity(count);
            for _ in 0..count {
                keys.push(read_key(&mut cursor, key_width));
            }
            Node::Internal(InternalNode {
                parent_id,
                children,
                keys,
            })
        }
        other => panic!("corrupt index page: unknown node tag {}", other),
    }
}

fn read_key<R: Read>(reader: &mut R, key_width: usize) -> Vec<u8> {
    let mut buf = vec![0u8; key_width];
    reader.read_exact(&mut buf).expect("corrupt index page: truncated key");
    buf
}
