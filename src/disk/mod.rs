//! The disk manager: the only component allowed to translate a logical
//! [`PageId`] into a byte offset in the backing file. Everything above
//! it — the buffer pool, heap pages, B+-tree nodes — addresses pages
//! exclusively by `PageId`; nobody else ever seeks.

mod bitmap;

pub use bitmap::BitmapPage;

use crate::codec::{ByteWriter, Decodeable, Encodeable};
use crate::error::{DbError, DbResult};
use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Logical page number. `-1` (`INVALID_PAGE_ID`) is the sentinel for
/// "no page".
pub type PageId = i32;

pub const INVALID_PAGE_ID: PageId = -1;

/// One bitmap page indexes at most `page_size * 8` data pages.
fn bitmap_capacity(page_size: usize) -> usize {
    page_size * 8
}

struct DiskMeta {
    num_extents: u32,
    num_allocated_pages: u32,
    extent_used_pages: Vec<u32>,
}

impl DiskMeta {
    fn new_empty() -> Self {
        Self {
            num_extents: 0,
            num_allocated_pages: 0,
            extent_used_pages: Vec::new(),
        }
    }

    fn encode(&self, page_size: usize) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write(&self.num_extents);
        w.write(&self.num_allocated_pages);
        w.write(&(self.extent_used_pages.len() as u32));
        for used in &self.extent_used_pages {
            w.write(used);
        }
        w.into_padded(page_size)
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut cursor = Cursor::new(bytes);
        let num_extents = u32::decode_from(&mut cursor);
        let num_allocated_pages = u32::decode_from(&mut cursor);
        let count = u32::decode_from(&mut cursor) as usize;
        let mut extent_used_pages = Vec::with_capacity(count);
        for _ in 0..count {
            extent_used_pages.push(u32::decode_from(&mut cursor));
        }
        Self {
            num_extents,
            num_allocated_pages,
            extent_used_pages,
        }
    }
}

/// Maps `PageId -> physical offset`, allocates/frees pages, and owns
/// the single backing file.
pub struct DiskManager {
    file: File,
    page_size: usize,
    meta: DiskMeta,
}

impl DiskManager {
    pub fn open(path: impl AsRef<Path>, page_size: usize) -> DbResult<Self> {
        let path = path.as_ref();
        let is_new = !path.exists();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let meta = if is_new {
            DiskMeta::new_empty()
        } else {
            let mut buf = vec![0u8; page_size];
            file.seek(SeekFrom::Start(0))?;
            match file.read_exact(&mut buf) {
                Ok(()) => DiskMeta::decode(&buf),
                Err(_) => DiskMeta::new_empty(),
            }
        };

        let mut manager = Self {
            file,
            page_size,
            meta,
        };
        if is_new {
            manager.flush_meta()?;
        }
        Ok(manager)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Physical page number for a logical page id:
    /// `(extent_index * (BITMAP_SIZE+1)) + 1 + intra_extent_offset + 1`.
    fn physical_page_number(&self, id: PageId) -> u64 {
        let capacity = bitmap_capacity(self.page_size) as i64;
        let id = id as i64;
        let extent_index = id / capacity;
        let intra = id % capacity;
        (extent_index * (capacity + 1) + 1 + intra + 1) as u64
    }

    fn bitmap_physical_page(&self, extent_index: u32) -> u64 {
        let capacity = bitmap_capacity(self.page_size) as u64;
        extent_index as u64 * (capacity + 1) + 1
    }

    fn read_physical(&mut self, physical_page: u64) -> DbResult<Vec<u8>> {
        let offset = physical_page * self.page_size as u64;
        let file_len = self.file.metadata()?.len();
        let mut buf = vec![0u8; self.page_size];
        if offset >= file_len {
            return Ok(buf);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        let to_read = ((file_len - offset) as usize).min(self.page_size);
        self.file.read_exact(&mut buf[..to_read])?;
        Ok(buf)
    }

    fn write_physical(&mut self, physical_page: u64, bytes: &[u8]) -> DbResult<()> {
        assert_eq!(bytes.len(), self.page_size, "page-sized transfer required");
        let offset = physical_page * self.page_size as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    pub fn read_page(&mut self, id: PageId, buf: &mut [u8]) -> DbResult<()> {
        assert!(id >= 0, "invalid page id {}", id);
        let physical = self.physical_page_number(id);
        let bytes = self.read_physical(physical)?;
        buf.copy_from_slice(&bytes);
        log::debug!("read page {}: {}...", id, hex::encode(&buf[..buf.len().min(16)]));
        Ok(())
    }

    pub fn write_page(&mut self, id: PageId, buf: &[u8]) -> DbResult<()> {
        assert!(id >= 0, "invalid page id {}", id);
        let physical = self.physical_page_number(id);
        log::debug!("write page {}: {}...", id, hex::encode(&buf[..buf.len().min(16)]));
        self.write_physical(physical, buf)
    }

    fn load_bitmap(&mut self, extent_index: u32) -> DbResult<BitmapPage> {
        let physical = self.bitmap_physical_page(extent_index);
        let bytes = self.read_physical(physical)?;
        Ok(BitmapPage::from_bytes(&bytes, bitmap_capacity(self.page_size)))
    }

    fn store_bitmap(&mut self, extent_index: u32, bitmap: &BitmapPage) -> DbResult<()> {
        let physical = self.bitmap_physical_page(extent_index);
        self.write_physical(physical, &bitmap.to_page_bytes(self.page_size))
    }

    /// Scans extents in order; within the first extent with free
    /// capacity, finds the lowest-order zero bit and claims it. Opens a
    /// fresh extent if every existing one is full.
    pub fn allocate_page(&mut self) -> DbResult<PageId> {
        let capacity = bitmap_capacity(self.page_size) as u32;

        for extent_index in 0..self.meta.num_extents {
            if self.meta.extent_used_pages[extent_index as usize] < capacity {
                let mut bitmap = self.load_bitmap(extent_index)?;
                let offset = bitmap
                    .allocate_first_free()
                    .expect("extent_used_pages counter desynced from bitmap");
                self.store_bitmap(extent_index, &bitmap)?;
                self.meta.extent_used_pages[extent_index as usize] += 1;
                self.meta.num_allocated_pages += 1;
                self.flush_meta()?;
                let id = extent_index as i64 * capacity as i64 + offset as i64;
                log::debug!("allocated page {} from extent {}", id, extent_index);
                return Ok(id as PageId);
            }
        }

        let extent_index = self.meta.num_extents;
        let mut bitmap = BitmapPage::new_empty(capacity as usize);
        let offset = bitmap.allocate_first_free().unwrap();
        self.store_bitmap(extent_index, &bitmap)?;
        self.meta.extent_used_pages.push(1);
        self.meta.num_extents += 1;
        self.meta.num_allocated_pages += 1;
        self.flush_meta()?;
        let id = extent_index as i64 * capacity as i64 + offset as i64;
        log::debug!("allocated page {} from new extent {}", id, extent_index);
        Ok(id as PageId)
    }

    /// Clears the corresponding bit. Double-free is undefined behaviour,
    /// not a checked error, and will panic via [`BitmapPage::free`].
    pub fn deallocate_page(&mut self, id: PageId) -> DbResult<()> {
        assert!(id >= 0, "invalid page id {}", id);
        let capacity = bitmap_capacity(self.page_size) as i64;
        let extent_index = (id as i64 / capacity) as u32;
        let offset = (id as i64 % capacity) as usize;

        let mut bitmap = self.load_bitmap(extent_index)?;
        bitmap.free(offset);
        self.store_bitmap(extent_index, &bitmap)?;
        self.meta.extent_used_pages[extent_index as usize] -= 1;
        self.meta.num_allocated_pages -= 1;
        log::debug!("deallocated page {}", id);
        self.flush_meta()
    }

    pub fn is_page_free(&mut self, id: PageId) -> DbResult<bool> {
        assert!(id >= 0, "invalid page id {}", id);
        let capacity = bitmap_capacity(self.page_size) as i64;
        let extent_index = (id as i64 / capacity) as u32;
        let offset = (id as i64 % capacity) as usize;
        if extent_index >= self.meta.num_extents {
            return Ok(true);
        }
        let bitmap = self.load_bitmap(extent_index)?;
        Ok(bitmap.is_free(offset))
    }

    pub fn num_allocated_pages(&self) -> u32 {
        self.meta.num_allocated_pages
    }

    fn flush_meta(&mut self) -> DbResult<()> {
        let bytes = self.meta.encode(self.page_size);
        self.write_physical(0, &bytes)
    }

    pub fn sync(&mut self) -> DbResult<()> {
        self.flush_meta()?;
        self.file.flush()?;
        self.file.sync_all().map_err(DbError::from)
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn temp_manager() -> (NamedTempFile, DiskManager) {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).ok();
        let dm = DiskManager::open(file.path(), 4096).unwrap();
        (file, dm)
    }

    #[test]
    fn allocate_reuses_freed_slot() {
        let (_f, mut dm) = temp_manager();
        let mut ids = Vec::new();
        for _ in 0..10 {
            ids.push(dm.allocate_page().unwrap());
        }
        dm.deallocate_page(ids[3]).unwrap();
        assert!(dm.is_page_free(ids[3]).unwrap());
        let reused = dm.allocate_page().unwrap();
        assert_eq!(reused, ids[3]);
        assert!(!dm.is_page_free(reused).unwrap());
    }

    #[test]
    fn read_write_roundtrip() {
        let (_f, mut dm) = temp_manager();
        let id = dm.allocate_page().unwrap();
        let mut buf = vec![7u8; 4096];
        dm.write_page(id, &buf).unwrap();
        let mut read_back = vec![0u8; 4096];
        dm.read_page(id, &mut read_back).unwrap();
        assert_eq!(buf, read_back);
        buf[0] = 9;
        assert_ne!(buf, read_back);
    }

    #[test]
    fn crosses_extent_boundary() {
        let (_f, mut dm) = temp_manager();
        let capacity = bitmap_capacity(4096);
        let mut last = INVALID_PAGE_ID;
        for _ in 0..(capacity + 5) {
            last = dm.allocate_page().unwrap();
        }
        assert!(last >= capacity as PageId);
        let mut buf = vec![5u8; 4096];
        dm.write_page(last, &buf).unwrap();
        let mut back = vec![0u8; 4096];
        dm.read_page(last, &mut back).unwrap();
        assert_eq!(buf, back);
    }
}
