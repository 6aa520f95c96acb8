//! # CompoundFs - Transactional Single-File Page Store
//!
//! CompoundFs stores a tree of named entries (folders, files and typed
//! attributes) inside a single file, supports concurrent readers alongside
//! one writer, and commits atomically with crash recovery through a redo
//! log of dirty-page copies.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   DirectoryStructure (namespace)    │
//! ├─────────────────────────────────────┤
//! │     BTree (copy-on-write index)     │
//! ├─────────────────────────────────────┤
//! │  CacheManager (dirty-page divert)   │
//! │          + CommitHandler            │
//! ├─────────────────────────────────────┤
//! │  RawFile (MemFile / MmapFile)       │
//! │          + LockProtocol             │
//! └─────────────────────────────────────┘
//! ```
//!
//! The load-bearing piece is the cache manager's *dirty-page diversion*
//! protocol: pages modified by the current transaction can be evicted to
//! disk at any time without disturbing the committed image, because their
//! content is diverted to freshly allocated pages. At commit, a redo log
//! of dirty-page copies makes the overwrite of the originals recoverable
//! at every crash point.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use compoundfs::{BTree, CacheManager, MemFile};
//!
//! let cache = Arc::new(CacheManager::new(Arc::new(MemFile::new())));
//! let mut bt = BTree::create(Arc::clone(&cache))?;
//!
//! bt.insert(b"answer", b"42")?;
//! assert_eq!(bt.find(b"answer")?.unwrap().value(), b"42");
//!
//! cache.build_commit_handler().commit()?;
//! ```
//!
//! ## Transactions
//!
//! One writer per transaction, any number of concurrent readers, each
//! reader over its own cache manager. There is no rollback operation:
//! discarding a cache manager before commit leaves the previous committed
//! state untouched, because the commit ordering is the only thing that
//! ever overwrites committed pages.
//!
//! ## Module Overview
//!
//! - [`storage`]: the raw-file trait, both backends, the lock protocol
//! - [`cache`]: page cache, dirty-page diversion, commit and recovery
//! - [`tree`]: the copy-on-write B-tree
//! - [`directory`]: the hierarchical namespace on top
//! - [`free_store`]: the page-recycling contract

#[macro_use]
mod macros;

pub mod cache;
pub mod config;
pub mod directory;
pub mod free_store;
pub mod storage;
pub mod tree;

pub use cache::{recover, CacheManager, CommitHandler, PageClass, PageHandle, ReadHandle};
pub use directory::{DirCursor, DirectoryKey, DirectoryStructure, Folder, TreeValue, ValueType};
pub use free_store::{FileDescriptor, FreeStore, MemFreeStore};
pub use storage::{
    Interval, LockProtocol, MemFile, MmapFile, OpenMode, PageIndex, RawFile, PAGE_IDX_INVALID,
};
pub use tree::{BTree, Cursor, InsertResult};
