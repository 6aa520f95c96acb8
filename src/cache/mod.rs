//! # Cache Module
//!
//! The paged cache mediating all access to the backing file, and the commit
//! machinery built on top of it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │            CacheManager             │
//! │  new_page / load_page / repurpose   │
//! │  make_page_writable / trim          │
//! ├───────────────┬─────────────────────┤
//! │ PageAllocator │   diversion map     │
//! │ (buffer pool) │   new-page set      │
//! ├───────────────┴─────────────────────┤
//! │            CommitHandler            │
//! │  copy dirty → logs → overwrite      │
//! ├─────────────────────────────────────┤
//! │              RawFile                │
//! └─────────────────────────────────────┘
//! ```
//!
//! The cache owns every live page buffer. Callers receive shared handles
//! that pin their page; the dirty-page diversion protocol lets uncommitted
//! changes spill to disk without ever overwriting committed content. At
//! commit time the entire cache state moves into a [`CommitHandler`], which
//! runs the ordered write sequence that makes the transaction durable.
//!
//! Recovery after a crash is a single call to [`recover`], which replays
//! the page copies recorded in the log pages.

mod commit;
mod log_page;
mod manager;
mod pool;

pub use commit::{recover, CommitHandler};
pub use log_page::{build_log_page, parse_log_page, LOG_MAGIC, LOG_MAX_PAIRS};
pub use manager::{CacheManager, PageClass, PageHandle, ReadHandle};
pub use pool::{PageAllocator, PageBuf, SharedPageBuf};
