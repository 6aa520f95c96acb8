//! # Configuration Constants
//!
//! This module centralizes the configuration constants of the engine,
//! grouping interdependent values together and documenting their
//! relationships. Constants that depend on each other are co-located to
//! prevent mismatch bugs.
//!
//! ## Dependency Graph
//!
//! ```text
//! PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> PAGE_HEADER_SIZE (16 bytes, fixed)
//!       │
//!       ├─> PAGE_USABLE_SIZE (derived: PAGE_SIZE - PAGE_HEADER_SIZE)
//!       │
//!       └─> MAX_ENTRY_SIZE
//!             Chosen so a leaf node always holds at least two entries;
//!             entries above this size are rejected at the tree API.
//!
//! DEFAULT_MAX_CACHED_PAGES (256)
//!       │
//!       └─> The cache trims itself to 3/4 of this value whenever an
//!           acquisition pushes it past the limit. Transactions that pin
//!           many pages at once need headroom below the limit.
//! ```
//!
//! ## Critical Invariants
//!
//! Enforced by compile-time assertions:
//!
//! 1. `PAGE_USABLE_SIZE == PAGE_SIZE - PAGE_HEADER_SIZE`
//! 2. Two maximum-size entries (plus their slots) fit in one leaf node

// ============================================================================
// PAGE LAYOUT CONSTANTS
// These define the fundamental page structure used throughout the engine
// ============================================================================

/// Size of each page in bytes (4KB).
/// This is the fundamental unit of I/O, caching and crash recovery.
/// Not configurable at runtime.
pub const PAGE_SIZE: usize = 4096;

/// Size of the page header in bytes.
/// Every B-tree node page begins with this header.
pub const PAGE_HEADER_SIZE: usize = 16;

/// Usable space in a node page after the header.
pub const PAGE_USABLE_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

const _: () = assert!(
    PAGE_USABLE_SIZE == PAGE_SIZE - PAGE_HEADER_SIZE,
    "PAGE_USABLE_SIZE derivation mismatch"
);

// ============================================================================
// TREE ENTRY LIMITS
// ============================================================================

/// Size of a leaf slot in bytes (offset + key length).
pub const LEAF_SLOT_SIZE: usize = 4;

/// Size of the value length prefix stored in front of each value.
pub const VALUE_LEN_SIZE: usize = 2;

/// Maximum combined key + value size accepted by the tree API.
/// Sized so that a leaf always holds at least two entries.
pub const MAX_ENTRY_SIZE: usize = 2032;

const _: () = assert!(
    2 * (LEAF_SLOT_SIZE + VALUE_LEN_SIZE + MAX_ENTRY_SIZE) <= PAGE_USABLE_SIZE,
    "a leaf node must hold at least two maximum-size entries"
);

// ============================================================================
// CACHE CONFIGURATION
// ============================================================================

/// Default number of pages the cache holds before trimming itself.
/// At 4KB pages this bounds the cache at 1MB plus pinned pages.
pub const DEFAULT_MAX_CACHED_PAGES: usize = 256;
