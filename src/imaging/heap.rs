//! Linear memory for the native module.
//!
//! A single growable byte array addressed by [`Ptr`] offsets, with a
//! first-fit allocator on top. Freed blocks are coalesced with their
//! neighbours and a free block at the end of the heap shrinks it, so a
//! balanced sequence of `malloc`/`free` returns the heap to its base size.

use super::backend::{MemoryStats, ModuleError, Ptr};
use std::collections::BTreeMap;

const ALIGN: usize = 8;
/// Offset of the first allocation; keeps offset zero free to act as null.
const BASE: usize = ALIGN;

pub struct LinearMemory {
    bytes: Vec<u8>,
    limit: usize,
    live: BTreeMap<u32, usize>,
    /// Sorted by offset, never adjacent.
    free: Vec<(u32, usize)>,
}

impl LinearMemory {
    /// Create an empty heap that never grows beyond `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            bytes: vec![0; BASE],
            limit: limit.min(u32::MAX as usize),
            live: BTreeMap::new(),
            free: Vec::new(),
        }
    }

    pub fn malloc(&mut self, len: usize) -> Ptr {
        let Some(size) = len.max(1).checked_next_multiple_of(ALIGN) else {
            return Ptr::NULL;
        };

        if let Some(i) = self.free.iter().position(|&(_, block)| block >= size) {
            let (offset, block) = self.free[i];
            if block == size {
                self.free.remove(i);
            } else {
                self.free[i] = (offset + size as u32, block - size);
            }
            self.bytes[offset as usize..offset as usize + size].fill(0);
            self.live.insert(offset, size);
            return Ptr(offset);
        }

        let offset = self.bytes.len();
        let end = match offset.checked_add(size) {
            Some(end) if end <= self.limit => end,
            _ => return Ptr::NULL,
        };
        self.bytes.resize(end, 0);
        self.live.insert(offset as u32, size);
        Ptr(offset as u32)
    }

    pub fn free(&mut self, ptr: Ptr) -> Result<(), ModuleError> {
        if ptr.is_null() {
            return Ok(());
        }
        let size = self
            .live
            .remove(&ptr.0)
            .ok_or(ModuleError::InvalidPointer(ptr))?;
        self.release(ptr.0, size);
        Ok(())
    }

    fn release(&mut self, offset: u32, size: usize) {
        let i = self.free.partition_point(|&(o, _)| o < offset);
        self.free.insert(i, (offset, size));

        // merge with the following block
        if i + 1 < self.free.len() {
            let (next_offset, next_size) = self.free[i + 1];
            if offset as usize + size == next_offset as usize {
                self.free[i].1 += next_size;
                self.free.remove(i + 1);
            }
        }
        // merge with the preceding block
        if i > 0 {
            let (prev_offset, prev_size) = self.free[i - 1];
            if prev_offset as usize + prev_size == offset as usize {
                self.free[i - 1].1 += self.free[i].1;
                self.free.remove(i);
            }
        }

        if let Some(&(last_offset, last_size)) = self.free.last() {
            if last_offset as usize + last_size == self.bytes.len() {
                self.free.pop();
                self.bytes.truncate(last_offset as usize);
            }
        }
    }

    /// Bounds of a live allocation, checked against an access of `len` bytes.
    fn span(&self, ptr: Ptr, len: usize) -> Result<std::ops::Range<usize>, ModuleError> {
        let size = *self
            .live
            .get(&ptr.0)
            .ok_or(ModuleError::InvalidPointer(ptr))?;
        if len > size {
            return Err(ModuleError::OutOfBounds { ptr, len });
        }
        Ok(ptr.offset()..ptr.offset() + len)
    }

    pub fn slice(&self, ptr: Ptr, len: usize) -> Result<&[u8], ModuleError> {
        let span = self.span(ptr, len)?;
        Ok(&self.bytes[span])
    }

    pub fn slice_mut(&mut self, ptr: Ptr, len: usize) -> Result<&mut [u8], ModuleError> {
        let span = self.span(ptr, len)?;
        Ok(&mut self.bytes[span])
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            live_allocations: self.live.len(),
            bytes_in_use: self.live.values().sum(),
            heap_size: self.bytes.len(),
        }
    }
}
