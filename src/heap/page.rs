//! Slotted page layout for heap pages: a fixed header, a slot directory
//! that grows forward from the header, and tuple bodies packed against
//! the page's tail, shrinking toward the slot directory as they fill
//! in. Every method here operates on a raw page buffer rather than
//! owning one, so callers stay in charge of pinning.

use crate::disk::{PageId, INVALID_PAGE_ID};
use std::convert::TryInto;

const HEADER_SIZE: usize = 16;
const SLOT_SIZE: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    Ok,
    SlotInvalid,
    AlreadyDeleted,
    NoSpace,
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn write_i32(bytes: &mut [u8], offset: usize, value: i32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Stateless view over a heap page's bytes. All methods take the raw
/// page buffer explicitly; there is no owned handle to keep in sync.
pub struct HeapPage;

impl HeapPage {
    pub fn init(bytes: &mut [u8], prev_page_id: PageId, next_page_id: PageId) {
        write_i32(bytes, 0, prev_page_id);
        write_i32(bytes, 4, next_page_id);
        write_u32(bytes, 8, bytes.len() as u32);
        write_u32(bytes, 12, 0);
    }

    pub fn prev_page_id(bytes: &[u8]) -> PageId {
        read_i32(bytes, 0)
    }

    pub fn set_prev_page_id(bytes: &mut [u8], id: PageId) {
        write_i32(bytes, 0, id);
    }

    pub fn next_page_id(bytes: &[u8]) -> PageId {
        read_i32(bytes, 4)
    }

    pub fn set_next_page_id(bytes: &mut [u8], id: PageId) {
        write_i32(bytes, 4, id);
    }

    fn free_space_ptr(bytes: &[u8]) -> u32 {
        read_u32(bytes, 8)
    }

    fn set_free_space_ptr(bytes: &mut [u8], value: u32) {
        write_u32(bytes, 8, value);
    }

    pub fn tuple_count(bytes: &[u8]) -> u32 {
        read_u32(bytes, 12)
    }

    fn set_tuple_count(bytes: &mut [u8], value: u32) {
        write_u32(bytes, 12, value);
    }

    fn slot_offset(slot: u32) -> usize {
        HEADER_SIZE + slot as usize * SLOT_SIZE
    }

    fn read_slot(bytes: &[u8], slot: u32) -> (u32, u32, bool) {
        let base = Self::slot_offset(slot);
        let offset = read_u32(bytes, base);
        let size = read_u32(bytes, base + 4);
        let deleted = bytes[base + 8] != 0;
        (offset, size, deleted)
    }

    fn write_slot(bytes: &mut [u8], slot: u32, offset: u32, size: u32, deleted: bool) {
        let base = Self::slot_offset(slot);
        write_u32(bytes, base, offset);
        write_u32(bytes, base + 4, size);
        bytes[base + 8] = deleted as u8;
    }

    fn used_by_directory(tuple_count: u32) -> u32 {
        (HEADER_SIZE + tuple_count as usize * SLOT_SIZE) as u32
    }

    /// Free space available for a *new* slot plus its tuple body.
    fn free_space(bytes: &[u8]) -> u32 {
        let tuple_count = Self::tuple_count(bytes);
        Self::free_space_ptr(bytes) - Self::used_by_directory(tuple_count)
    }

    pub fn can_hold(page_size: usize, data_len: usize) -> bool {
        data_len + SLOT_SIZE + HEADER_SIZE <= page_size
    }

    /// Appends a new slot and writes `data` against the frontier.
    /// Returns the new slot index, or `None` if there isn't room.
    pub fn insert_tuple(bytes: &mut [u8], data: &[u8]) -> Option<u32> {
        let required = (data.len() + SLOT_SIZE) as u32;
        if Self::free_space(bytes) < required {
            return None;
        }
        let tuple_count = Self::tuple_count(bytes);
        let new_ptr = Self::free_space_ptr(bytes) - data.len() as u32;
        bytes[new_ptr as usize..new_ptr as usize + data.len()].copy_from_slice(data);
        Self::write_slot(bytes, tuple_count, new_ptr, data.len() as u32, false);
        Self::set_free_space_ptr(bytes, new_ptr);
        Self::set_tuple_count(bytes, tuple_count + 1);
        Some(tuple_count)
    }

    pub fn is_deleted(bytes: &[u8], slot: u32) -> bool {
        if slot >= Self::tuple_count(bytes) {
            return true;
        }
        let (_, size, deleted) = Self::read_slot(bytes, slot);
        deleted || size == 0
    }

    /// Sets the tombstone bit without reclaiming space yet.
    pub fn mark_delete(bytes: &mut [u8], slot: u32) -> bool {
        if slot >= Self::tuple_count(bytes) {
            return false;
        }
        let (offset, size, deleted) = Self::read_slot(bytes, slot);
        if deleted || size == 0 {
            return false;
        }
        Self::write_slot(bytes, slot, offset, size, true);
        true
    }

    /// Shifts every tuple body allocated after the freed one toward the
    /// frontier, reclaiming its bytes. Idempotent: a slot already
    /// reclaimed (`size == 0`) is left untouched.
    pub fn apply_delete(bytes: &mut [u8], slot: u32) {
        if slot >= Self::tuple_count(bytes) {
            return;
        }
        let (offset, size, _) = Self::read_slot(bytes, slot);
        if size == 0 {
            return;
        }
        let frontier = Self::free_space_ptr(bytes);
        bytes.copy_within(frontier as usize..offset as usize, frontier as usize + size as usize);

        let tuple_count = Self::tuple_count(bytes);
        for other in 0..tuple_count {
            if other == slot {
                continue;
            }
            let (other_offset, other_size, other_deleted) = Self::read_slot(bytes, other);
            if other_size > 0 && other_offset < offset {
                Self::write_slot(bytes, other, other_offset + size, other_size, other_deleted);
            }
        }
        Self::write_slot(bytes, slot, 0, 0, true);
        Self::set_free_space_ptr(bytes, frontier + size);
    }

    pub fn get_tuple(bytes: &[u8], slot: u32) -> Option<Vec<u8>> {
        if slot >= Self::tuple_count(bytes) {
            return None;
        }
        let (offset, size, deleted) = Self::read_slot(bytes, slot);
        if deleted || size == 0 {
            return None;
        }
        Some(bytes[offset as usize..offset as usize + size as usize].to_vec())
    }

    /// In-place when the new body fits in the space this tuple would
    /// free up; the caller is expected to delete-and-reinsert elsewhere
    /// on `NoSpace`.
    pub fn update_tuple(bytes: &mut [u8], slot: u32, data: &[u8]) -> UpdateResult {
        if slot >= Self::tuple_count(bytes) {
            return UpdateResult::SlotInvalid;
        }
        let (_, old_size, deleted) = Self::read_slot(bytes, slot);
        if deleted || old_size == 0 {
            return UpdateResult::AlreadyDeleted;
        }
        let available = Self::free_space(bytes);
        let extra_needed = data.len() as i64 - old_size as i64;
        if extra_needed > available as i64 {
            return UpdateResult::NoSpace;
        }
        Self::apply_delete(bytes, slot);
        let frontier = Self::free_space_ptr(bytes);
        let new_ptr = frontier - data.len() as u32;
        bytes[new_ptr as usize..new_ptr as usize + data.len()].copy_from_slice(data);
        Self::write_slot(bytes, slot, new_ptr, data.len() as u32, false);
        Self::set_free_space_ptr(bytes, new_ptr);
        UpdateResult::Ok
    }
}

pub const NO_PAGE: PageId = INVALID_PAGE_ID;
