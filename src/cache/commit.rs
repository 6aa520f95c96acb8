//! # Commit Handler
//!
//! Owns a snapshot of the cache state and orders the file writes so that a
//! crash at any point leaves the store recoverable.
//!
//! ## Commit Ordering
//!
//! ```text
//! 1. collect dirty page ids        (diversion keys ∪ cached Dirty pages)
//! 2. copy originals to fresh pages ── flush ──  copies durable first
//! 3. write log pages               ── flush ──  logs durable before any
//!                                               original is overwritten
//! 4. overwrite originals           (cache buffer, else diverted copy)
//! 5. write remaining cached pages  (class New; Read pages drop)
//! 6. flush, then cut the copy/log tail off the file
//! ```
//!
//! The three flush points are protocol, not optimization: they define the
//! crash semantics. Before step 3 completes no recognizable log exists and
//! recovery sees the previous committed state untouched. Between step 3's
//! flush and step 6, log pages are visible: the copies hold the
//! *committed* content of the dirty pages, so recovery rolls the store
//! back to the last committed state by replaying every `copy → original`.
//! Once step 6 and the trailing truncation are through, no log survives
//! and the commit is indistinguishable from a clean one.
//!
//! Copies and logs are the newest tail allocations of the file, so the
//! final truncation cuts exactly them. Diverted pages sit below that mark
//! and stay: the free store is handed their indexes for reuse instead, and
//! the file may still grow across transactions.

use std::sync::Arc;

use eyre::{ensure, Result};
use hashbrown::HashMap;
use log::{debug, info};

use super::log_page::build_log_page;
use super::manager::{CachedPage, PageClass};
use crate::config::PAGE_SIZE;
use crate::storage::{PageIndex, RawFile};

pub struct CommitHandler {
    file: Arc<dyn RawFile>,
    cache: HashMap<PageIndex, CachedPage>,
    diverted: HashMap<PageIndex, PageIndex>,
}

impl CommitHandler {
    pub(crate) fn new(
        file: Arc<dyn RawFile>,
        cache: HashMap<PageIndex, CachedPage>,
        diverted: HashMap<PageIndex, PageIndex>,
    ) -> Self {
        Self {
            file,
            cache,
            diverted,
        }
    }

    /// Runs the full commit ordering. Consumes the handler; afterwards the
    /// file encodes exactly the state the transaction produced.
    pub fn commit(mut self) -> Result<()> {
        let dirty_ids = self.dirty_page_ids();
        if dirty_ids.is_empty() {
            // Nothing existed before this transaction that we could damage;
            // writing the class-New pages is always safe.
            self.write_cached_pages()?;
            self.file.flush()?;
            return Ok(());
        }

        debug!("commit: {} dirty pages", dirty_ids.len());
        let committed_size = self.file.page_count();

        {
            // order the file writes: the copies must be durable before the
            // logs that reference them
            let pairs = self.copy_dirty_pages(&dirty_ids)?;
            self.file.flush()?;

            // and the logs before any original content is overwritten
            self.write_logs(&pairs)?;
            self.file.flush()?;
        }

        self.update_dirty_pages(&dirty_ids)?;
        self.write_cached_pages()?;
        self.file.flush()?;

        // the copies and logs were appended after committed_size; cutting
        // them leaves the file without a recognizable log
        self.file.truncate(committed_size)?;

        info!("commit complete, file at {} pages", self.file.page_count());
        Ok(())
    }

    /// Original ids of all pages under the dirty-page protocol: some still
    /// live in the cache, the rest were pushed out by eviction and sit at
    /// their diverted index.
    pub fn dirty_page_ids(&self) -> Vec<PageIndex> {
        let mut ids: Vec<PageIndex> = self.diverted.keys().copied().collect();
        ids.extend(
            self.cache
                .iter()
                .filter(|(_, entry)| entry.class == PageClass::Dirty)
                .map(|(&id, _)| id),
        );
        ids
    }

    /// Diverted page indexes, reclaimable by the free store after commit.
    pub fn diverted_page_ids(&self) -> Vec<PageIndex> {
        self.diverted.values().copied().collect()
    }

    /// Copies the *committed* content of every dirty page to a fresh
    /// interval, returning the `(original, copy)` pairs.
    fn copy_dirty_pages(
        &self,
        dirty_ids: &[PageIndex],
    ) -> Result<Vec<(PageIndex, PageIndex)>> {
        let interval = self.file.new_interval(dirty_ids.len())?;
        ensure!(
            interval.length() == dirty_ids.len(),
            "file extension returned a short interval: {} < {}",
            interval.length(),
            dirty_ids.len()
        );

        let mut pairs = Vec::with_capacity(dirty_ids.len());
        let mut copy_id = interval.begin();
        for &orig_id in dirty_ids {
            copy_page(&self.file, orig_id, copy_id)?;
            pairs.push((orig_id, copy_id));
            copy_id += 1;
        }

        Ok(pairs)
    }

    /// Packs the pairs into log pages on freshly allocated pages.
    pub fn write_logs(&self, pairs: &[(PageIndex, PageIndex)]) -> Result<()> {
        let mut remaining = pairs;
        while !remaining.is_empty() {
            let page_index = self.file.new_interval(1)?.begin();
            let (page, consumed) = build_log_page(page_index, remaining);
            self.file.write_page(page_index, 0, &page)?;
            remaining = &remaining[consumed..];
        }
        Ok(())
    }

    /// Overwrites every original dirty page, from the cache when the page
    /// is still there, else from its diverted location on disk.
    fn update_dirty_pages(&mut self, dirty_ids: &[PageIndex]) -> Result<()> {
        for &orig_id in dirty_ids {
            let id = self.divert(orig_id);
            match self.cache.remove(&id) {
                Some(entry) => {
                    // the cached buffer is the live content; losing it here
                    // would lose the transaction's updates
                    self.file.write_page(orig_id, 0, entry.buf.data())?;
                }
                None => {
                    // Dirty pages are either cached or diverted
                    debug_assert!(id != orig_id, "dirty page neither cached nor diverted");
                    copy_page(&self.file, id, orig_id)?;
                }
            }
        }
        Ok(())
    }

    /// Writes the pages still cached: class-New pages go to their own
    /// index, Read pages simply drop. Clears the cache.
    fn write_cached_pages(&mut self) -> Result<()> {
        for (id, entry) in self.cache.drain() {
            if entry.class != PageClass::Read {
                self.file.write_page(id, 0, entry.buf.data())?;
            }
        }
        Ok(())
    }

    fn divert(&self, id: PageIndex) -> PageIndex {
        self.diverted.get(&id).copied().unwrap_or(id)
    }
}

/// Raw page-to-page copy through a scratch buffer.
pub(crate) fn copy_page(file: &Arc<dyn RawFile>, from: PageIndex, to: PageIndex) -> Result<()> {
    let mut buf = [0u8; PAGE_SIZE];
    file.read_page(from, 0, &mut buf)?;
    file.write_page(to, 0, &buf)
}

/// Rolls an interrupted commit back to the last committed state: replays
/// every `copy → original` pair recorded in the file's log pages, flushes,
/// then blanks the logs so the replay can never run against a later
/// transaction. Returns the number of pages replayed; zero means the store
/// was already consistent.
///
/// Replaying is idempotent: a crash during recovery leaves the logs in
/// place and the next recovery repeats the same copies.
pub fn recover(file: &Arc<dyn RawFile>) -> Result<usize> {
    let mut log_pages: Vec<PageIndex> = Vec::new();
    let mut pairs: Vec<(PageIndex, PageIndex)> = Vec::new();
    {
        let mut buf = [0u8; PAGE_SIZE];
        for id in 0..file.page_count() as PageIndex {
            file.read_page(id, 0, &mut buf)?;
            if let Some(entries) = super::log_page::parse_log_page(&buf, id) {
                log_pages.push(id);
                pairs.extend(entries);
            }
        }
    }
    if pairs.is_empty() {
        return Ok(0);
    }

    info!("recovery: replaying {} page copies", pairs.len());
    for &(orig_id, copy_id) in &pairs {
        copy_page(file, copy_id, orig_id)?;
    }
    file.flush()?;

    // the replay is durable; now retire the logs
    for id in log_pages {
        file.write_page(id, 0, &[0u8; PAGE_SIZE])?;
    }
    file.flush()?;

    Ok(pairs.len())
}
