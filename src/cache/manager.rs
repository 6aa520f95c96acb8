//! # Cache Manager
//!
//! Single owner of all live pages and the only component that touches the
//! raw file during normal operation.
//!
//! ## Page Classes
//!
//! Every cached page carries a class that decides what eviction and commit
//! must do with it:
//!
//! - **Read**: loaded from disk and unmodified; evictable without a write
//! - **New**: allocated inside the current transaction; may be written to
//!   its own index at any time
//! - **Dirty**: existed in the last committed state and was modified; its
//!   committed content must stay readable until the commit completes
//!
//! ## Dirty-Page Diversion
//!
//! Evicting a Dirty page must not overwrite its committed content, so the
//! modified buffer is written to a freshly allocated page instead and the
//! mapping `original → diverted` is recorded. Subsequent loads and stores
//! of the original index transparently redirect. The diverted index joins
//! the new-page set: from then on the page behaves like any page of the
//! current transaction and may be rewritten in place.
//!
//! ```text
//!                     load_page(7)
//!                          │ divert
//!                          ▼
//!   cache ──miss──> read page 12 (diversion of 7) ──> handle with index 7
//! ```
//!
//! ## Eviction
//!
//! `trim(target)` reduces the cache to at most `target` unpinned pages.
//! A page is pinned while any handle besides the cache's own reference is
//! alive; pinned pages are never evicted. Among the candidates the pages
//! with the lowest (class, usage) priority go first: Read pages are free to
//! drop, New pages cost one write, Dirty pages cost a write plus a
//! diversion.
//!
//! ## Free-Page Sourcing
//!
//! An installed interval allocator is consulted before extending the file;
//! it returns recycled page intervals from the free store. An interval
//! beginning with `PAGE_IDX_INVALID` means the store is exhausted; the
//! allocator is dropped and allocation falls back to file extension. The
//! callback must not reenter the cache manager.
//!
//! ## Concurrency
//!
//! All methods take `&self`; internal state sits behind a mutex. The
//! engine's model remains one logical writer per transaction; the mutex
//! makes the manager safe to share with cursors and readers of the same
//! transaction, not a license for concurrent writers.

use std::sync::Arc;

use eyre::{ensure, Result};
use hashbrown::{HashMap, HashSet};
use log::debug;
use parking_lot::Mutex;

use super::commit::CommitHandler;
use super::log_page::parse_log_page;
use super::pool::{PageAllocator, SharedPageBuf};
use crate::config::{DEFAULT_MAX_CACHED_PAGES, PAGE_SIZE};
use crate::storage::{Interval, PageIndex, RawFile, PAGE_IDX_INVALID};

/// What eviction and commit must do with a cached page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageClass {
    Read,
    New,
    Dirty,
}

impl PageClass {
    fn weight(self) -> u8 {
        match self {
            PageClass::Read => 0,
            PageClass::New => 1,
            PageClass::Dirty => 2,
        }
    }
}

pub(crate) struct CachedPage {
    pub(crate) buf: SharedPageBuf,
    pub(crate) class: PageClass,
    usage: u32,
}

impl CachedPage {
    fn new(buf: SharedPageBuf, class: PageClass) -> Self {
        Self {
            buf,
            class,
            usage: 0,
        }
    }
}

/// Read-only view of a cached page, bearing the index the caller knows the
/// page by (diversions are invisible to callers). Holding it pins the page.
#[derive(Clone)]
pub struct ReadHandle {
    buf: SharedPageBuf,
    index: PageIndex,
}

impl ReadHandle {
    pub fn index(&self) -> PageIndex {
        self.index
    }

    pub fn data(&self) -> &[u8] {
        self.buf.data()
    }
}

impl PartialEq for ReadHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buf, &other.buf) && self.index == other.index
    }
}

impl std::fmt::Debug for ReadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadHandle").field("index", &self.index).finish()
    }
}

/// Writable view of a cached page. Holding it pins the page.
#[derive(Clone)]
pub struct PageHandle {
    buf: SharedPageBuf,
    index: PageIndex,
}

impl PageHandle {
    pub fn index(&self) -> PageIndex {
        self.index
    }

    pub fn data(&self) -> &[u8] {
        self.buf.data()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        // SAFETY: a PageHandle is only produced by new_page, repurpose or
        // make_page_writable, all of which register the page with the
        // transaction's single logical writer; `&mut self` keeps this view
        // exclusive among clones held by that writer.
        unsafe { self.buf.data_mut() }
    }

    pub fn as_read(&self) -> ReadHandle {
        ReadHandle {
            buf: Arc::clone(&self.buf),
            index: self.index,
        }
    }
}

impl PartialEq for PageHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buf, &other.buf) && self.index == other.index
    }
}

impl std::fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageHandle").field("index", &self.index).finish()
    }
}

type IntervalAllocator = Box<dyn FnMut(usize) -> Interval + Send>;

#[derive(Default)]
pub(crate) struct CacheState {
    pub(crate) cache: HashMap<PageIndex, CachedPage>,
    pub(crate) diverted: HashMap<PageIndex, PageIndex>,
    pub(crate) new_pages: HashSet<PageIndex>,
    interval_allocator: Option<IntervalAllocator>,
}

impl CacheState {
    /// The page we moved the original to, or identity.
    fn divert(&self, id: PageIndex) -> PageIndex {
        self.diverted.get(&id).copied().unwrap_or(id)
    }
}

struct PrioritizedPage {
    id: PageIndex,
    class: PageClass,
    usage: u32,
}

impl PrioritizedPage {
    /// Higher keeps longer; at equal class a higher usage count survives a
    /// lower one.
    fn keep_priority(&self) -> (u8, u32) {
        (self.class.weight(), self.usage)
    }
}

pub struct CacheManager {
    file: Arc<dyn RawFile>,
    pool: PageAllocator,
    state: Mutex<CacheState>,
    max_pages: usize,
}

impl CacheManager {
    pub fn new(file: Arc<dyn RawFile>) -> Self {
        Self::with_capacity(file, DEFAULT_MAX_CACHED_PAGES)
    }

    pub fn with_capacity(file: Arc<dyn RawFile>, max_pages: usize) -> Self {
        Self {
            file,
            pool: PageAllocator::new(),
            state: Mutex::new(CacheState::default()),
            max_pages,
        }
    }

    pub fn file(&self) -> &Arc<dyn RawFile> {
        &self.file
    }

    /// Delivers a fresh writable page, allocated from the free store if an
    /// interval allocator is installed, else by extending the file.
    pub fn new_page(&self) -> Result<PageHandle> {
        let mut state = self.state.lock();

        let buf = self.pool.allocate();
        let id = Self::new_page_index(&self.file, &mut state)?;
        state
            .cache
            .insert(id, CachedPage::new(Arc::clone(&buf), PageClass::New));
        state.new_pages.insert(id);
        self.trim_check(&mut state)?;

        Ok(PageHandle { buf, index: id })
    }

    /// Loads a page written by a previous transaction. The handle can be
    /// promoted with [`Self::make_page_writable`], which subjects the page
    /// to the dirty-page protocol.
    pub fn load_page(&self, orig_id: PageIndex) -> Result<ReadHandle> {
        let mut state = self.state.lock();
        let id = state.divert(orig_id);

        if let Some(entry) = state.cache.get_mut(&id) {
            entry.usage += 1;
            return Ok(ReadHandle {
                buf: Arc::clone(&entry.buf),
                index: orig_id,
            });
        }

        let buf = self.pool.allocate();
        // SAFETY: the buffer was just allocated; no other view exists yet.
        self.file.read_page(id, 0, unsafe { buf.data_mut() })?;
        state
            .cache
            .insert(id, CachedPage::new(Arc::clone(&buf), PageClass::Read));
        self.trim_check(&mut state)?;

        Ok(ReadHandle {
            buf,
            index: orig_id,
        })
    }

    /// Reuses a page the caller will overwrite entirely: `load_page`
    /// without the physical read, followed by the dirty reclassification.
    /// Never feed pages whose prior contents matter to the committed image
    /// through this API.
    pub fn repurpose(&self, orig_id: PageIndex) -> Result<PageHandle> {
        let mut state = self.state.lock();
        let id = state.divert(orig_id);
        let class = if state.new_pages.contains(&id) {
            PageClass::New
        } else {
            PageClass::Dirty
        };

        if let Some(entry) = state.cache.get_mut(&id) {
            entry.usage += 1;
            entry.class = class;
            return Ok(PageHandle {
                buf: Arc::clone(&entry.buf),
                index: orig_id,
            });
        }

        let buf = self.pool.allocate();
        state
            .cache
            .insert(id, CachedPage::new(Arc::clone(&buf), class));
        self.trim_check(&mut state)?;

        Ok(PageHandle {
            buf,
            index: orig_id,
        })
    }

    /// Promotes a read handle to a writable one. The page joins the
    /// dirty-page protocol unless it already belongs to this transaction.
    pub fn make_page_writable(&self, handle: &ReadHandle) -> PageHandle {
        self.set_page_dirty(handle.index);
        PageHandle {
            buf: Arc::clone(&handle.buf),
            index: handle.index,
        }
    }

    /// Marks a loaded page as changed. Required after any in-place
    /// mutation; forgetting it silently loses the change on eviction.
    pub fn set_page_dirty(&self, id: PageIndex) {
        let mut state = self.state.lock();
        let id = state.divert(id);
        let class = if state.new_pages.contains(&id) {
            PageClass::New
        } else {
            PageClass::Dirty
        };

        let entry = state
            .cache
            .get_mut(&id)
            .expect("set_page_dirty on a page missing from the cache");
        entry.class = class;
    }

    /// Reduces the cache to at most `target` unpinned pages. Pinned pages
    /// are always retained and counted in the result.
    pub fn trim(&self, target: usize) -> Result<usize> {
        let mut state = self.state.lock();
        self.trim_locked(&mut state, target)
    }

    fn trim_check(&self, state: &mut CacheState) -> Result<()> {
        if state.cache.len() > self.max_pages {
            self.trim_locked(state, self.max_pages / 4 * 3)?;
        }
        Ok(())
    }

    fn trim_locked(&self, state: &mut CacheState, target: usize) -> Result<usize> {
        let mut candidates = Self::unpinned_pages(state);
        let keep = target.min(candidates.len());

        if keep < candidates.len() {
            if keep > 0 {
                candidates.select_nth_unstable_by(keep, |a, b| {
                    b.keep_priority().cmp(&a.keep_priority())
                });
            }

            let evict = candidates.split_off(keep);
            let diverted = evict
                .iter()
                .filter(|p| p.class == PageClass::Dirty)
                .count();
            debug!(
                "trim: evicting {} pages ({} diverted), {} kept",
                evict.len(),
                diverted,
                state.cache.len() - evict.len()
            );

            for page in &evict {
                self.evict_page(state, page)?;
            }
            for page in &evict {
                if let Some(entry) = state.cache.remove(&page.id) {
                    self.pool.recycle(entry.buf);
                }
            }
        }

        Ok(state.cache.len())
    }

    fn evict_page(&self, state: &mut CacheState, page: &PrioritizedPage) -> Result<()> {
        match page.class {
            PageClass::Read => Ok(()),
            PageClass::New => {
                let buf = Self::cached_buf(state, page.id);
                self.file.write_page(page.id, 0, buf.data())
            }
            PageClass::Dirty => {
                let buf = Self::cached_buf(state, page.id);
                let fresh = Self::new_page_index(&self.file, state)?;
                self.file.write_page(fresh, 0, buf.data())?;
                let previous = state.diverted.insert(page.id, fresh);
                debug_assert!(previous.is_none(), "page diverted twice");
                state.new_pages.insert(fresh);
                Ok(())
            }
        }
    }

    fn cached_buf(state: &CacheState, id: PageIndex) -> SharedPageBuf {
        let entry = state
            .cache
            .get(&id)
            .expect("eviction candidate missing from the cache");
        Arc::clone(&entry.buf)
    }

    /// All cache entries only the cache itself still references.
    fn unpinned_pages(state: &CacheState) -> Vec<PrioritizedPage> {
        state
            .cache
            .iter()
            .filter(|(_, entry)| Arc::strong_count(&entry.buf) == 1)
            .map(|(&id, entry)| PrioritizedPage {
                id,
                class: entry.class,
                usage: entry.usage,
            })
            .collect()
    }

    fn new_page_index(file: &Arc<dyn RawFile>, state: &mut CacheState) -> Result<PageIndex> {
        let interval = Self::allocate_page_interval(file, state, 1)?;
        ensure!(!interval.is_empty(), "page allocation yielded no pages");
        Ok(interval.begin())
    }

    /// Uses the installed interval allocator or extends the raw file.
    fn allocate_page_interval(
        file: &Arc<dyn RawFile>,
        state: &mut CacheState,
        max_pages: usize,
    ) -> Result<Interval> {
        if let Some(allocator) = state.interval_allocator.as_mut() {
            let interval = allocator(max_pages);
            if interval.begin() != PAGE_IDX_INVALID {
                return Ok(interval);
            }
            // exhausted: fall back to file extension for good
            state.interval_allocator = None;
        }
        file.new_interval(max_pages)
    }

    /// Installs the free-store interval source queried before extending the
    /// file. The callback must not reenter this cache manager.
    pub fn set_page_interval_allocator<F>(&self, allocator: F)
    where
        F: FnMut(usize) -> Interval + Send + 'static,
    {
        self.state.lock().interval_allocator = Some(Box::new(allocator));
    }

    /// Moves the cache state into a [`CommitHandler`], leaving this manager
    /// empty. Free-store allocation stops here; commit-phase pages always
    /// come from file extension.
    pub fn build_commit_handler(&self) -> CommitHandler {
        let mut state = self.state.lock();
        state.interval_allocator = None;

        let cache = std::mem::take(&mut state.cache);
        let diverted = std::mem::take(&mut state.diverted);
        state.new_pages.clear();

        CommitHandler::new(Arc::clone(&self.file), cache, diverted)
    }

    /// Scans the file for log pages and returns all their pairs. Pair order
    /// within a page is stable; across pages it is unspecified.
    pub fn read_logs(&self) -> Result<Vec<(PageIndex, PageIndex)>> {
        read_logs(&self.file)
    }
}

/// Free-standing log scan, shared with the recovery path.
pub(crate) fn read_logs(file: &Arc<dyn RawFile>) -> Result<Vec<(PageIndex, PageIndex)>> {
    let mut pairs = Vec::new();
    let mut buf = [0u8; PAGE_SIZE];

    for id in 0..file.page_count() as PageIndex {
        file.read_page(id, 0, &mut buf)?;
        if let Some(entries) = parse_log_page(&buf, id) {
            pairs.extend(entries);
        }
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemFile;

    fn manager() -> CacheManager {
        CacheManager::new(Arc::new(MemFile::new()))
    }

    #[test]
    fn new_page_is_cached_and_pinned() {
        let cm = manager();

        let mut page = cm.new_page().unwrap();
        page.data_mut()[0] = 0xAA;

        let reloaded = cm.load_page(page.index()).unwrap();
        assert_eq!(reloaded.data()[0], 0xAA);
        assert_eq!(page.as_read(), reloaded);
    }

    #[test]
    fn load_page_hits_return_the_same_buffer() {
        let cm = manager();
        let id = {
            let mut page = cm.new_page().unwrap();
            page.data_mut()[0] = 7;
            page.index()
        };

        let a = cm.load_page(id).unwrap();
        let b = cm.load_page(id).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn trim_counts_pinned_pages() {
        let cm = manager();

        let _pinned = cm.new_page().unwrap();
        for _ in 0..4 {
            cm.new_page().unwrap();
        }

        assert_eq!(cm.trim(0).unwrap(), 1);
    }

    #[test]
    fn interval_allocator_feeds_new_pages() {
        let cm = manager();
        cm.file().new_interval(8).unwrap();

        let mut next = 5u32;
        cm.set_page_interval_allocator(move |_| {
            let iv = Interval::single(next);
            next += 1;
            iv
        });

        assert_eq!(cm.new_page().unwrap().index(), 5);
        assert_eq!(cm.new_page().unwrap().index(), 6);
    }

    #[test]
    fn exhausted_interval_allocator_falls_back_to_the_file() {
        let cm = manager();
        cm.set_page_interval_allocator(|_| Interval::exhausted());

        // falls back within the same call and never asks again
        assert_eq!(cm.new_page().unwrap().index(), 0);
        assert_eq!(cm.new_page().unwrap().index(), 1);
    }

    #[test]
    fn usage_count_orders_eviction() {
        let cm = manager();

        let first = cm.new_page().unwrap().index();
        let second = cm.new_page().unwrap().index();

        // bump the first page's usage so the second one is evicted first
        drop(cm.load_page(first).unwrap());
        drop(cm.load_page(first).unwrap());

        assert_eq!(cm.trim(1).unwrap(), 1);
        let state = cm.state.lock();
        assert!(state.cache.contains_key(&first));
        assert!(!state.cache.contains_key(&second));
    }
}
