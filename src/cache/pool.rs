//! # Page Buffer Pool
//!
//! Pool of page-sized buffers with shared ownership, backing every page the
//! cache hands out.
//!
//! ## Shared Ownership and Pinning
//!
//! A buffer is wrapped in an `Arc` so the cache and any number of handles
//! can hold it simultaneously. The cache keeps exactly one reference per
//! cached page; a strong count above one therefore means an external handle
//! exists and the page is *pinned*. Eviction uses exactly this signal and
//! nothing else.
//!
//! ## Recycling
//!
//! Eviction returns buffers to the pool explicitly once the cache dropped
//! its reference, so steady-state operation allocates nothing. Buffer
//! contents are unspecified at allocation; callers must initialize before
//! use.
//!
//! ## Interior Mutability
//!
//! Page data lives in an `UnsafeCell` because a buffer must be writable
//! through a shared `Arc`: the engine serves one logical writer per
//! transaction and trusts read handles not to mutate (the cache reclassifies
//! pages through `make_page_writable` instead of copying). The unsafe
//! accessors document that contract at each use site.

use std::cell::UnsafeCell;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::PAGE_SIZE;

/// A single shared page buffer.
pub struct PageBuf {
    bytes: UnsafeCell<[u8; PAGE_SIZE]>,
}

// SAFETY: PageBuf is shared between the cache and page handles of one
// logical transaction. All mutation goes through data_mut(), whose contract
// forbids concurrent access; the lock protocol keeps writers exclusive
// across transactions.
unsafe impl Send for PageBuf {}
unsafe impl Sync for PageBuf {}

impl PageBuf {
    fn new() -> Self {
        Self {
            bytes: UnsafeCell::new([0u8; PAGE_SIZE]),
        }
    }

    pub fn data(&self) -> &[u8] {
        // SAFETY: the single-writer contract (see type docs) guarantees no
        // mutable access is live while this shared view is used.
        unsafe { &*self.bytes.get() }
    }

    /// # Safety
    ///
    /// The caller must be the transaction's single logical writer and must
    /// not let any other view of this buffer observe the mutation
    /// concurrently.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn data_mut(&self) -> &mut [u8] {
        &mut *self.bytes.get()
    }
}

pub type SharedPageBuf = Arc<PageBuf>;

/// Pool of reusable page buffers.
pub struct PageAllocator {
    free: Mutex<Vec<SharedPageBuf>>,
}

impl PageAllocator {
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Pops a recycled buffer or creates a fresh one. Contents are
    /// unspecified either way.
    pub fn allocate(&self) -> SharedPageBuf {
        self.free
            .lock()
            .pop()
            .unwrap_or_else(|| Arc::new(PageBuf::new()))
    }

    /// Returns an evicted buffer to the pool. Buffers still referenced
    /// elsewhere are dropped instead; their memory is reclaimed when the
    /// last handle goes away.
    pub(crate) fn recycle(&self, buf: SharedPageBuf) {
        if Arc::strong_count(&buf) == 1 {
            self.free.lock().push(buf);
        }
    }

    /// Number of buffers currently parked in the pool.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }
}

impl Default for PageAllocator {
    fn default() -> Self {
        Self::new()
    }
}
