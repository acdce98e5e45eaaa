//! The kernel heap: variable-size allocations over mapped pages.
//!
//! A single singly-linked list of blocks in ascending address order covers
//! the heap window. Each block is a [`BlockHeader`] followed by its
//! payload; allocation is first-fit with 16-byte payload alignment,
//! freeing coalesces adjacent free neighbors, growth maps fresh pages at
//! the current break.
//!
//! ## Invariants
//! - Headers never overlap; blocks partition the grown region.
//! - After any `free`, no two *physically contiguous* neighbors are both
//!   free (one coalesce pass per free maintains this).
//! - Payload addresses are 16-byte aligned (the header is 16-byte sized
//!   and aligned, and block sizes are multiples of 16).
//! - `used + free == total − (number of blocks × header size)`, where
//!   `total` only grows with heap expansion.

use core::ptr::{self, NonNull, null_mut};
use kernel_memory_addresses::align_up;

/// Page granularity of heap growth.
const PAGE: usize = 4096;

/// Payload alignment.
const BLOCK_ALIGN: usize = 16;

/// Fewest pages a single growth maps.
const MIN_GROW_PAGES: usize = 4;

/// Why the heap could not grow.
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum HeapError {
    /// The backing could not provide a page (physical memory exhausted or
    /// mapping failed).
    #[error("heap backing failed to provide a page")]
    Exhausted,
    /// Growth would push the break past the heap window's ceiling.
    #[error("heap region is full")]
    RegionFull,
}

/// Supplies usable memory for heap growth, one page at a time.
///
/// The kernel's implementation allocates a physical frame and maps it
/// writable at `addr`, returning the frame on mapping failure; the test
/// implementation bounds-checks against a host arena.
pub trait HeapBacking {
    /// Make `[addr, addr + 4096)` readable and writable.
    fn provide_page(&mut self, addr: usize) -> Result<(), HeapError>;
}

/// Header preceding every block's payload.
///
/// `size` is the payload byte count; `next` points at the next block in
/// address order (free or not). The 16-byte alignment keeps payloads
/// aligned on both the 32-bit target and 64-bit test hosts.
#[repr(C, align(16))]
struct BlockHeader {
    size: usize,
    free: bool,
    next: *mut BlockHeader,
}

const HEADER_SIZE: usize = size_of::<BlockHeader>();

/// Snapshot of one block, for diagnostics and invariant checks.
#[derive(Copy, Clone, Debug)]
pub struct BlockInfo {
    /// Address of the header.
    pub start: usize,
    /// Payload bytes.
    pub size: usize,
    pub free: bool,
}

/// First-fit heap over `[start, limit)`.
pub struct KernelHeap {
    start: usize,
    /// Current break: end of the grown region.
    end: usize,
    /// Exclusive ceiling the break may never pass.
    limit: usize,
    first: *mut BlockHeader,
    total: usize,
    used: usize,
    free: usize,
}

// Safety: raw block pointers are only dereferenced under the owner's lock.
unsafe impl Send for KernelHeap {}

impl KernelHeap {
    /// An empty heap over the window `[start, limit)`. No memory is mapped
    /// until the first growth.
    #[must_use]
    pub const fn new(start: usize, limit: usize) -> Self {
        Self {
            start,
            end: start,
            limit,
            first: null_mut(),
            total: 0,
            used: 0,
            free: 0,
        }
    }

    /// Map `increment` more bytes (rounded up to pages) at the break and
    /// append them as one free block.
    ///
    /// The new block is *not* merged with a contiguous predecessor; the
    /// coalesce pass on the next free unifies them.
    pub fn expand<B: HeapBacking>(
        &mut self,
        backing: &mut B,
        increment: usize,
    ) -> Result<(), HeapError> {
        let increment = align_up(increment as u32, PAGE as u32) as usize;
        if self.end + increment > self.limit {
            return Err(HeapError::RegionFull);
        }

        let mut addr = self.end;
        while addr < self.end + increment {
            backing.provide_page(addr)?;
            addr += PAGE;
        }

        let block = self.end as *mut BlockHeader;
        // Safety: the pages for `[end, end + increment)` were just
        // provided; `end` is 16-byte aligned (page-aligned, in fact).
        unsafe {
            block.write(BlockHeader {
                size: increment - HEADER_SIZE,
                free: true,
                next: null_mut(),
            });
        }

        if self.first.is_null() {
            self.first = block;
        } else {
            // Append: the break only moves up, so the last block is the
            // highest-addressed one.
            let mut current = self.first;
            // Safety: list nodes are valid headers by the invariants.
            unsafe {
                while !(*current).next.is_null() {
                    current = (*current).next;
                }
                (*current).next = block;
            }
        }

        self.end += increment;
        self.total += increment;
        self.free += increment - HEADER_SIZE;
        Ok(())
    }

    /// Allocate `size` bytes, growing the heap when no block fits.
    ///
    /// Zero-size requests return `None` without touching any state; `None`
    /// on a real request means memory is exhausted.
    #[must_use]
    pub fn alloc<B: HeapBacking>(&mut self, size: usize, backing: &mut B) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let size = align_up(size as u32, BLOCK_ALIGN as u32) as usize;

        if let Some(payload) = self.take_first_fit(size) {
            return Some(payload);
        }

        // Nothing fits: grow by enough for this request, at least four
        // pages, and retry once.
        let grow = align_up((size + HEADER_SIZE) as u32, PAGE as u32) as usize;
        let grow = grow.max(MIN_GROW_PAGES * PAGE);
        self.expand(backing, grow).ok()?;
        self.take_first_fit(size)
    }

    /// First-fit scan; splits the chosen block when the surplus can carry
    /// a header plus a minimal payload.
    fn take_first_fit(&mut self, size: usize) -> Option<NonNull<u8>> {
        let mut current = self.first;
        while !current.is_null() {
            // Safety: list nodes are valid headers by the invariants.
            unsafe {
                if (*current).free && (*current).size >= size {
                    if (*current).size >= size + HEADER_SIZE + BLOCK_ALIGN {
                        // Split: carve a new free block out of the tail.
                        let remainder =
                            (current as usize + HEADER_SIZE + size) as *mut BlockHeader;
                        remainder.write(BlockHeader {
                            size: (*current).size - size - HEADER_SIZE,
                            free: true,
                            next: (*current).next,
                        });
                        (*current).size = size;
                        (*current).next = remainder;
                        // The remainder's header comes out of free bytes.
                        self.free -= size + HEADER_SIZE;
                    } else {
                        self.free -= (*current).size;
                    }

                    (*current).free = false;
                    self.used += (*current).size;
                    let payload = (current as usize + HEADER_SIZE) as *mut u8;
                    return NonNull::new(payload);
                }
                current = (*current).next;
            }
        }
        None
    }

    /// Free a payload pointer obtained from [`alloc`](Self::alloc).
    /// Freeing null is a no-op.
    pub fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let block = (ptr as usize - HEADER_SIZE) as *mut BlockHeader;
        // Safety: `ptr` came from alloc, so a valid header precedes it.
        unsafe {
            (*block).free = true;
            self.used -= (*block).size;
            self.free += (*block).size;
        }
        self.coalesce();
    }

    /// One pass of adjacent-pair merging: neighbors merge iff both are
    /// free and physically contiguous (end of first == start of second).
    fn coalesce(&mut self) {
        let mut current = self.first;
        // Safety: list nodes are valid headers by the invariants.
        unsafe {
            while !current.is_null() && !(*current).next.is_null() {
                let next = (*current).next;
                let current_end = current as usize + HEADER_SIZE + (*current).size;
                if (*current).free && (*next).free && current_end == next as usize {
                    (*current).size += HEADER_SIZE + (*next).size;
                    (*current).next = (*next).next;
                    // The swallowed header becomes free payload.
                    self.free += HEADER_SIZE;
                    // Re-check the same block against its new neighbor.
                    continue;
                }
                current = next;
            }
        }
    }

    /// Reallocate: null source behaves like `alloc`, zero size like
    /// `free`. A block that already fits is returned unchanged; otherwise
    /// the contents move to a fresh allocation.
    #[must_use]
    pub fn realloc<B: HeapBacking>(
        &mut self,
        ptr: *mut u8,
        size: usize,
        backing: &mut B,
    ) -> Option<NonNull<u8>> {
        if ptr.is_null() {
            return self.alloc(size, backing);
        }
        if size == 0 {
            self.free(ptr);
            return None;
        }

        let block = (ptr as usize - HEADER_SIZE) as *mut BlockHeader;
        // Safety: `ptr` came from alloc, so a valid header precedes it.
        let old_size = unsafe { (*block).size };
        if old_size >= size {
            return NonNull::new(ptr);
        }

        let new = self.alloc(size, backing)?;
        // Safety: both payloads are live and at least `min(old, new)` long.
        unsafe {
            ptr::copy_nonoverlapping(ptr, new.as_ptr(), old_size.min(size));
        }
        self.free(ptr);
        Some(new)
    }

    /// `(total, used, free)` byte counts. `total` is the raw grown size;
    /// `used + free` is `total` minus all header bytes.
    #[must_use]
    pub fn stats(&self) -> (usize, usize, usize) {
        (self.total, self.used, self.free)
    }

    /// Walk the block list in address order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        let mut current = self.first;
        core::iter::from_fn(move || {
            if current.is_null() {
                return None;
            }
            // Safety: list nodes are valid headers by the invariants.
            let info = unsafe {
                BlockInfo {
                    start: current as usize,
                    size: (*current).size,
                    free: (*current).free,
                }
            };
            current = unsafe { (*current).next };
            Some(info)
        })
    }
}
