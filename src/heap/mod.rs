//! Variable-length rows on a linked list of slotted pages: insert walks
//! the chain looking for a page with room, appending a fresh tail page
//! when none has one; update tries in place and falls back to
//! delete-plus-reinsert; scans are a forward-only iterator over the
//! chain.

pub mod iter;
pub mod page;

use crate::buffer::BufferPool;
use crate::disk::{PageId, INVALID_PAGE_ID};
use crate::error::DbResult;
use crate::record::{Row, RowId, Schema};
use iter::TableIterator;
use page::HeapPage;

pub use page::UpdateResult;

pub struct TableHeap {
    pool: BufferPool,
    first_page_id: PageId,
}

impl TableHeap {
    /// Allocates the first page of a brand-new heap.
    pub fn create(pool: BufferPool) -> DbResult<Self> {
        let mut guard = pool
            .new_page()?
            .expect("buffer pool must have room to create a new heap");
        HeapPage::init(&mut guard.bytes_mut(), INVALID_PAGE_ID, INVALID_PAGE_ID);
        let first_page_id = guard.page_id();
        drop(guard);
        Ok(Self { pool, first_page_id })
    }

    /// Reopens a heap whose first page was already persisted.
    pub fn open(pool: BufferPool, first_page_id: PageId) -> Self {
        Self { pool, first_page_id }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    pub fn insert_tuple(&self, row: &Row) -> DbResult<Option<RowId>> {
        let data = row.serialize();
        let page_size = self.pool.page_size();
        if !HeapPage::can_hold(page_size, data.len()) {
            return Ok(None);
        }

        let mut page_id = self.first_page_id;
        loop {
            let mut guard = self
                .pool
                .fetch_page(page_id)?
                .expect("heap page must be fetchable while its chain is reachable");
            if let Some(slot) = HeapPage::insert_tuple(&mut guard.bytes_mut(), &data) {
                return Ok(Some(RowId::new(page_id, slot)));
            }
            let next_page_id = HeapPage::next_page_id(&guard.bytes());
            if next_page_id != INVALID_PAGE_ID {
                page_id = next_page_id;
                continue;
            }

            let mut new_guard = self
                .pool
                .new_page()?
                .expect("buffer pool must have room to extend a heap");
            let new_page_id = new_guard.page_id();
            HeapPage::init(&mut new_guard.bytes_mut(), page_id, INVALID_PAGE_ID);
            HeapPage::set_next_page_id(&mut guard.bytes_mut(), new_page_id);
            let slot = HeapPage::insert_tuple(&mut new_guard.bytes_mut(), &data)
                .expect("an empty page must fit a tuple already checked against page capacity");
            return Ok(Some(RowId::new(new_page_id, slot)));
        }
    }

    pub fn mark_delete(&self, rid: RowId) -> DbResult<bool> {
        let mut guard = match self.pool.fetch_page(rid.page_id)? {
            Some(g) => g,
            None => return Ok(false),
        };
        let result = HeapPage::mark_delete(&mut guard.bytes_mut(), rid.slot);
        Ok(result)
    }

    pub fn apply_delete(&self, rid: RowId) -> DbResult<()> {
        if let Some(mut guard) = self.pool.fetch_page(rid.page_id)? {
            HeapPage::apply_delete(&mut guard.bytes_mut(), rid.slot);
        }
        Ok(())
    }

    pub fn get_tuple(&self, rid: RowId, schema: &Schema) -> DbResult<Option<Row>> {
        let guard = match self.pool.fetch_page(rid.page_id)? {
            Some(g) => g,
            None => return Ok(None),
        };
        let result = HeapPage::get_tuple(&guard.bytes(), rid.slot).map(|bytes| Row::deserialize(&bytes, schema));
        Ok(result)
    }

    /// In-place when it fits; callers fall back to
    /// `mark_delete`+`apply_delete`+`insert_tuple` on `NoSpace`.
    pub fn update_tuple(&self, row: &Row, rid: RowId) -> DbResult<UpdateResult> {
        let mut guard = match self.pool.fetch_page(rid.page_id)? {
            Some(g) => g,
            None => return Ok(UpdateResult::SlotInvalid),
        };
        let data = row.serialize();
        let result = HeapPage::update_tuple(&mut guard.bytes_mut(), rid.slot, &data);
        Ok(result)
    }

    pub fn iter(&self, schema: Schema) -> TableIterator {
        TableIterator::new(self.pool.clone(), schema, self.first_page_id)
    }

    /// Frees every page in the chain. Called when a table is dropped.
    pub fn free_heap(&self) -> DbResult<()> {
        let mut page_id = self.first_page_id;
        while page_id != INVALID_PAGE_ID {
            let next_page_id = {
                let guard = self
                    .pool
                    .fetch_page(page_id)?
                    .expect("heap page must be fetchable while freeing its chain");
                let next_page_id = HeapPage::next_page_id(&guard.bytes());
                next_page_id
            };
            self.pool.delete_page(page_id)?;
            page_id = next_page_id;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ReplacerPolicy;
    use crate::disk::DiskManager;
    use crate::record::{Column, Field, TypeId};
    use tempfile::NamedTempFile;

    fn heap() -> (TableHeap, Schema) {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).ok();
        let disk = DiskManager::open(file.path(), 512).unwrap();
        std::mem::forget(file);
        let pool = BufferPool::new(disk, 8, ReplacerPolicy::Lru);
        let schema = Schema::new(vec![
            Column::new("id", TypeId::Int, 0, false, false),
            Column::new("name", TypeId::Char(16), 1, false, false),
        ]);
        (TableHeap::create(pool).unwrap(), schema)
    }

    fn row(id: i32, name: &str) -> Row {
        Row::new(vec![Field::int(id), Field::char(16, name)])
    }

    #[test]
    fn insert_then_scan_yields_all_rows_in_order() {
        let (heap, schema) = heap();
        for i in 0..20 {
            heap.insert_tuple(&row(i, "x")).unwrap().unwrap();
        }
        let collected: Vec<i32> = heap
            .iter(schema)
            .map(|(_, row)| row.field(0).as_int())
            .collect();
        assert_eq!(collected, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn delete_removes_row_from_scan() {
        let (heap, schema) = heap();
        let rid0 = heap.insert_tuple(&row(1, "a")).unwrap().unwrap();
        heap.insert_tuple(&row(2, "b")).unwrap().unwrap();
        assert!(heap.mark_delete(rid0).unwrap());
        heap.apply_delete(rid0).unwrap();
        let remaining: Vec<i32> = heap
            .iter(schema)
            .map(|(_, row)| row.field(0).as_int())
            .collect();
        assert_eq!(remaining, vec![2]);
    }

    #[test]
    fn insert_spills_to_a_new_page_once_the_first_is_full() {
        let (heap, schema) = heap();
        let mut rids = Vec::new();
        for i in 0..50 {
            rids.push(heap.insert_tuple(&row(i, "abcdefghijklmno")).unwrap().unwrap());
        }
        let pages: std::collections::HashSet<_> = rids.iter().map(|r| r.page_id).collect();
        assert!(pages.len() > 1, "expected the heap to span multiple pages");
        assert_eq!(heap.iter(schema).count(), 50);
    }
}
