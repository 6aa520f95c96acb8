//! # In-Memory Raw File
//!
//! A heap-backed [`RawFile`] used by tests and ephemeral stores. It has the
//! exact growth and bounds behavior of the disk backends: pages exist only
//! after `new_interval` allocated them, and out-of-bounds access is an
//! error, not silent growth.

use std::sync::Arc;

use eyre::{ensure, Result};
use parking_lot::RwLock;

use super::{Interval, LockProtocol, PageIndex, RawFile, PAGE_SIZE};

pub struct MemFile {
    pages: RwLock<Vec<u8>>,
    locks: Arc<LockProtocol>,
}

impl MemFile {
    pub fn new() -> Self {
        Self {
            pages: RwLock::new(Vec::new()),
            locks: LockProtocol::new(),
        }
    }
}

impl Default for MemFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RawFile for MemFile {
    fn new_interval(&self, max_pages: usize) -> Result<Interval> {
        let mut pages = self.pages.write();
        let begin = (pages.len() / PAGE_SIZE) as PageIndex;
        let new_len = pages.len() + max_pages * PAGE_SIZE;
        pages.resize(new_len, 0);
        Ok(Interval::new(begin, begin + max_pages as PageIndex))
    }

    fn write_page(&self, id: PageIndex, offset: usize, bytes: &[u8]) -> Result<()> {
        let mut pages = self.pages.write();
        let page_count = pages.len() / PAGE_SIZE;
        ensure!(
            (id as usize) < page_count,
            "page {} out of bounds (page_count={})",
            id,
            page_count
        );
        ensure!(
            offset + bytes.len() <= PAGE_SIZE,
            "write of {} bytes at offset {} exceeds page size",
            bytes.len(),
            offset
        );

        let start = id as usize * PAGE_SIZE + offset;
        pages[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_page(&self, id: PageIndex, offset: usize, buf: &mut [u8]) -> Result<()> {
        let pages = self.pages.read();
        let page_count = pages.len() / PAGE_SIZE;
        ensure!(
            (id as usize) < page_count,
            "page {} out of bounds (page_count={})",
            id,
            page_count
        );
        ensure!(
            offset + buf.len() <= PAGE_SIZE,
            "read of {} bytes at offset {} exceeds page size",
            buf.len(),
            offset
        );

        let start = id as usize * PAGE_SIZE + offset;
        buf.copy_from_slice(&pages[start..start + buf.len()]);
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.pages.read().len() / PAGE_SIZE
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn truncate(&self, pages: usize) -> Result<()> {
        let mut data = self.pages.write();
        let page_count = data.len() / PAGE_SIZE;
        ensure!(
            pages <= page_count,
            "cannot truncate to {} pages, file has {}",
            pages,
            page_count
        );
        data.truncate(pages * PAGE_SIZE);
        Ok(())
    }

    fn lock_protocol(&self) -> &Arc<LockProtocol> {
        &self.locks
    }
}
