use super::page::HeapPage;
use crate::buffer::BufferPool;
use crate::disk::{PageId, INVALID_PAGE_ID};
use crate::record::{Row, RowId, Schema};

/// Forward-only, single-pass iterator over a table's rows in (page
/// order, slot order). Holds a pin on the current page, released as it
/// advances; exhausted once the chain runs out.
pub struct TableIterator {
    pool: BufferPool,
    schema: Schema,
    page_id: PageId,
    slot: u32,
}

impl TableIterator {
    pub(super) fn new(pool: BufferPool, schema: Schema, first_page_id: PageId) -> Self {
        Self {
            pool,
            schema,
            page_id: first_page_id,
            slot: 0,
        }
    }
}

impl Iterator for TableIterator {
    type Item = (RowId, Row);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.page_id == INVALID_PAGE_ID {
                return None;
            }
            let guard = self
                .pool
                .fetch_page(self.page_id)
                .expect("i/o error while scanning table heap")
                .expect("heap page must be fetchable while its chain is reachable");
            let bytes = guard.bytes();
            let tuple_count = HeapPage::tuple_count(&bytes);

            if self.slot >= tuple_count {
                let next_page_id = HeapPage::next_page_id(&bytes);
                drop(bytes);
                drop(guard);
                self.page_id = next_page_id;
                self.slot = 0;
                continue;
            }

            if let Some(data) = HeapPage::get_tuple(&bytes, self.slot) {
                let rid = RowId::new(self.page_id, self.slot);
                let row = Row::deserialize(&data, &self.schema);
                self.slot += 1;
                return Some((rid, row));
            }
            self.slot += 1;
        }
    }
}
