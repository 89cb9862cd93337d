//! The buffer pool: a fixed-size cache of page frames sitting between
//! every other storage component and the [`DiskManager`]. Its pin/unpin
//! discipline is the one shared-mutable-state invariant the whole
//! engine depends on.

pub mod replacer;

use crate::disk::{DiskManager, PageId, INVALID_PAGE_ID};
use crate::error::DbResult;
use replacer::{ClockReplacer, LruReplacer, Replacer};

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

pub type FrameId = usize;

struct Frame {
    page_id: PageId,
    pin_count: u32,
    dirty: bool,
    data: Vec<u8>,
}

impl Frame {
    fn new(page_size: usize) -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            dirty: false,
            data: vec![0u8; page_size],
        }
    }
}

/// Which victim-selection policy a pool is built with. LRU and Clock
/// are interchangeable; callers pick one at construction time.
pub enum ReplacerPolicy {
    Lru,
    Clock,
}

struct Inner {
    disk: DiskManager,
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    free_list: Vec<FrameId>,
    replacer: Box<dyn Replacer>,
    page_size: usize,
}

impl Inner {
    /// Free-list first, replacer second. Flushes the victim if dirty.
    /// `None` means every frame is pinned.
    fn acquire_frame(&mut self) -> DbResult<Option<FrameId>> {
        if let Some(fid) = self.free_list.pop() {
            return Ok(Some(fid));
        }
        let fid = match self.replacer.victim() {
            Some(fid) => fid,
            None => return Ok(None),
        };
        let frame = &self.frames[fid];
        log::debug!("evicting frame {} (page {}, dirty={})", fid, frame.page_id, frame.dirty);
        if frame.dirty {
            self.disk.write_page(frame.page_id, &frame.data)?;
        }
        self.page_table.remove(&frame.page_id);
        Ok(Some(fid))
    }

    fn unpin_frame(&mut self, frame_id: FrameId, dirty: bool) {
        let frame = &mut self.frames[frame_id];
        assert!(
            frame.pin_count > 0,
            "unpin on frame {} with pin count already zero is a protocol violation",
            frame_id
        );
        frame.pin_count -= 1;
        if dirty {
            frame.dirty = true;
        }
        if frame.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }
    }
}

/// A cheaply-cloneable handle to the pool. Cooperative single-threaded
/// scheduling means `Rc<RefCell<_>>` is sufficient; there is never more
/// than one statement executing at a time.
#[derive(Clone)]
pub struct BufferPool {
    inner: Rc<RefCell<Inner>>,
}

impl BufferPool {
    pub fn new(disk: DiskManager, pool_size: usize, policy: ReplacerPolicy) -> Self {
        let page_size = disk.page_size();
        let frames = (0..pool_size).map(|_| Frame::new(page_size)).collect();
        let replacer: Box<dyn Replacer> = match policy {
            ReplacerPolicy::Lru => Box::new(LruReplacer::new()),
            ReplacerPolicy::Clock => Box::new(ClockReplacer::new()),
        };
        Self {
            inner: Rc::new(RefCell::new(Inner {
                disk,
                frames,
                page_table: HashMap::new(),
                free_list: (0..pool_size).collect(),
                replacer,
                page_size,
            })),
        }
    }

    pub fn page_size(&self) -> usize {
        self.inner.borrow().page_size
    }

    pub fn pool_size(&self) -> usize {
        self.inner.borrow().frames.len()
    }

    /// Allocates a fresh page on disk and pins it at count 1, zeroed.
    /// `None` when every frame is pinned.
    pub fn new_page(&self) -> DbResult<Option<PageGuard>> {
        let mut inner = self.inner.borrow_mut();
        let frame_id = match inner.acquire_frame()? {
            Some(fid) => fid,
            None => return Ok(None),
        };
        let page_id = inner.disk.allocate_page()?;
        let page_size = inner.page_size;
        let frame = &mut inner.frames[frame_id];
        frame.page_id = page_id;
        frame.pin_count = 1;
        frame.dirty = false;
        frame.data.iter_mut().for_each(|b| *b = 0);
        debug_assert_eq!(frame.data.len(), page_size);
        inner.page_table.insert(page_id, frame_id);
        drop(inner);
        Ok(Some(PageGuard::new(self.clone(), page_id, frame_id)))
    }

    /// Returns the resident frame for `id`, fetching it from disk and
    /// evicting a victim if necessary. `None` when every frame is
    /// pinned and `id` is not already resident.
    pub fn fetch_page(&self, id: PageId) -> DbResult<Option<PageGuard>> {
        let mut inner = self.inner.borrow_mut();
        if let Some(&frame_id) = inner.page_table.get(&id) {
            inner.frames[frame_id].pin_count += 1;
            inner.replacer.pin(frame_id);
            drop(inner);
            return Ok(Some(PageGuard::new(self.clone(), id, frame_id)));
        }

        let frame_id = match inner.acquire_frame()? {
            Some(fid) => fid,
            None => return Ok(None),
        };
        let Inner { disk, frames, .. } = &mut *inner;
        disk.read_page(id, &mut frames[frame_id].data)?;
        let frame = &mut inner.frames[frame_id];
        frame.page_id = id;
        frame.pin_count = 1;
        frame.dirty = false;
        inner.page_table.insert(id, frame_id);
        drop(inner);
        Ok(Some(PageGuard::new(self.clone(), id, frame_id)))
    }

    pub fn flush_page(&self, id: PageId) -> DbResult<()> {
        let mut inner = self.inner.borrow_mut();
        if let Some(&frame_id) = inner.page_table.get(&id) {
            let (page_id, bytes) = {
                let frame = &inner.frames[frame_id];
                (frame.page_id, frame.data.clone())
            };
            inner.disk.write_page(page_id, &bytes)?;
            inner.frames[frame_id].dirty = false;
        }
        Ok(())
    }

    pub fn flush_all(&self) -> DbResult<()> {
        let ids: Vec<PageId> = self.inner.borrow().page_table.keys().copied().collect();
        for id in ids {
            self.flush_page(id)?;
        }
        Ok(())
    }

    /// If pinned, returns `false`. Otherwise drops the cached frame and
    /// deallocates the backing page via the disk manager.
    pub fn delete_page(&self, id: PageId) -> DbResult<bool> {
        let mut inner = self.inner.borrow_mut();
        if let Some(&frame_id) = inner.page_table.get(&id) {
            if inner.frames[frame_id].pin_count > 0 {
                return Ok(false);
            }
            inner.replacer.pin(frame_id);
            inner.page_table.remove(&id);
            inner.free_list.push(frame_id);
        }
        inner.disk.deallocate_page(id)?;
        Ok(true)
    }

    pub fn is_pinned(&self, id: PageId) -> bool {
        let inner = self.inner.borrow();
        inner
            .page_table
            .get(&id)
            .map(|&fid| inner.frames[fid].pin_count > 0)
            .unwrap_or(false)
    }

    fn unpin(&self, frame_id: FrameId, dirty: bool) {
        self.inner.borrow_mut().unpin_frame(frame_id, dirty);
    }

    fn bytes(&self, frame_id: FrameId) -> Ref<[u8]> {
        Ref::map(self.inner.borrow(), |inner| inner.frames[frame_id].data.as_slice())
    }

    fn bytes_mut(&self, frame_id: FrameId) -> RefMut<[u8]> {
        RefMut::map(self.inner.borrow_mut(), |inner| {
            inner.frames[frame_id].data.as_mut_slice()
        })
    }
}

/// A pinned frame, borrowed for the scope of this guard. Dropping it is
/// the only way to unpin — a forgotten unpin would otherwise silently
/// disable eviction, so this is enforced structurally rather than left
/// to caller discipline.
pub struct PageGuard {
    pool: BufferPool,
    page_id: PageId,
    frame_id: FrameId,
    dirty: bool,
}

impl PageGuard {
    fn new(pool: BufferPool, page_id: PageId, frame_id: FrameId) -> Self {
        Self {
            pool,
            page_id,
            frame_id,
            dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn bytes(&self) -> Ref<[u8]> {
        self.pool.bytes(self.frame_id)
    }

    pub fn bytes_mut(&mut self) -> RefMut<[u8]> {
        self.dirty = true;
        self.pool.bytes_mut(self.frame_id)
    }

    /// Marks the frame dirty without requiring a `bytes_mut` borrow —
    /// useful when bytes were mutated through a separately-held
    /// `RefMut` obtained earlier in the same scope.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.pool.unpin(self.frame_id, self.dirty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskManager;
    use tempfile::NamedTempFile;

    fn pool(size: usize) -> BufferPool {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).ok();
        let disk = DiskManager::open(file.path(), 4096).unwrap();
        std::mem::forget(file);
        BufferPool::new(disk, size, ReplacerPolicy::Lru)
    }

    #[test]
    fn fetch_after_unpin_evicts_lru() {
        let bp = pool(2);
        let g1 = bp.new_page().unwrap().unwrap();
        let id1 = g1.page_id();
        let g2 = bp.new_page().unwrap().unwrap();
        let id2 = g2.page_id();
        drop(g1);
        drop(g2);

        // pool is full (2 frames, both now unpinned); fetching a third
        // page must evict id1 (least recently unpinned).
        let g3 = bp.new_page().unwrap().unwrap();
        assert!(!bp.is_pinned(id1));
        drop(g3);
        assert_eq!(bp.pool_size(), 2);
        let _ = id2;
    }

    #[test]
    fn pinned_pages_are_never_evicted() {
        let bp = pool(1);
        let g = bp.new_page().unwrap().unwrap();
        assert!(bp.new_page().unwrap().is_none());
        drop(g);
        assert!(bp.new_page().unwrap().is_some());
    }

    #[test]
    fn writes_survive_eviction_and_refetch() {
        let bp = pool(1);
        let mut g = bp.new_page().unwrap().unwrap();
        let id = g.page_id();
        g.bytes_mut()[0] = 42;
        drop(g);

        // force eviction by allocating another page in a 1-frame pool
        let g2 = bp.new_page().unwrap().unwrap();
        drop(g2);

        let g3 = bp.fetch_page(id).unwrap().unwrap();
        assert_eq!(g3.bytes()[0], 42);
    }

    #[test]
    #[should_panic]
    fn double_unpin_panics() {
        let bp = pool(1);
        let g = bp.new_page().unwrap().unwrap();
        let id = g.page_id();
        drop(g);
        bp.unpin(bp.inner.borrow().page_table[&id], false);
    }
}
