//! # Log Pages
//!
//! A log page marks an in-progress commit for recovery. It carries the
//! `(original, copy)` page pairs written during the commit's copy phase so
//! that recovery can finish overwriting the originals after a crash.
//!
//! ## Layout
//!
//! ```text
//! Offset  Size   Field        Description
//! ------  ----   -----------  ----------------------------------------
//! 0       8      magic        LOG_MAGIC, cannot collide with node headers
//! 8       4      self_index   Page index this log page was written to
//! 12      4      pair_count   Number of entries that follow
//! 16      8*N    entries      (original, copy) little-endian u32 pairs
//! ...            padding      Zero to the end of the page
//! ```
//!
//! The recovery scan recognizes log pages by the magic alone; `self_index`
//! additionally ties a page to its position so stale log content copied
//! elsewhere (for example by a dirty-page diversion) is never mistaken for
//! a live log.

use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::PAGE_SIZE;
use crate::storage::PageIndex;

/// Distinguishes log pages from every node page; the first byte is outside
/// the `PageType` discriminant range.
pub const LOG_MAGIC: [u8; 8] = [0xC7, 0x3A, b'C', b'F', b'L', b'O', b'G', 0x01];

pub const LOG_HEADER_SIZE: usize = 16;

/// Pairs one log page can carry.
pub const LOG_MAX_PAIRS: usize = (PAGE_SIZE - LOG_HEADER_SIZE) / size_of::<LogEntry>();

const _: () = assert!(LOG_MAGIC[0] != 0x01 && LOG_MAGIC[0] != 0x02);

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct LogHeader {
    magic: [u8; 8],
    self_index: U32,
    pair_count: U32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct LogEntry {
    original: U32,
    copy: U32,
}

/// Builds one log page at `page_index` from the front of `pairs`.
///
/// Returns the page image and how many pairs were consumed; callers loop
/// until the pair list is drained.
pub fn build_log_page(
    page_index: PageIndex,
    pairs: &[(PageIndex, PageIndex)],
) -> ([u8; PAGE_SIZE], usize) {
    let consumed = pairs.len().min(LOG_MAX_PAIRS);

    let mut page = [0u8; PAGE_SIZE];
    let header = LogHeader {
        magic: LOG_MAGIC,
        self_index: U32::new(page_index),
        pair_count: U32::new(consumed as u32),
    };
    page[..LOG_HEADER_SIZE].copy_from_slice(header.as_bytes());

    let mut offset = LOG_HEADER_SIZE;
    for &(original, copy) in &pairs[..consumed] {
        let entry = LogEntry {
            original: U32::new(original),
            copy: U32::new(copy),
        };
        page[offset..offset + size_of::<LogEntry>()].copy_from_slice(entry.as_bytes());
        offset += size_of::<LogEntry>();
    }

    (page, consumed)
}

/// Decodes the pairs of a log page, or `None` if `data` is not a log page
/// written to `page_index`. Pair order within a page is stable.
pub fn parse_log_page(data: &[u8], page_index: PageIndex) -> Option<Vec<(PageIndex, PageIndex)>> {
    if data.len() != PAGE_SIZE {
        return None;
    }

    let header = LogHeader::ref_from_bytes(&data[..LOG_HEADER_SIZE]).ok()?;
    if header.magic != LOG_MAGIC || header.self_index.get() != page_index {
        return None;
    }

    let count = header.pair_count.get() as usize;
    if count > LOG_MAX_PAIRS {
        return None;
    }

    let mut pairs = Vec::with_capacity(count);
    let mut offset = LOG_HEADER_SIZE;
    for _ in 0..count {
        let entry = LogEntry::ref_from_bytes(&data[offset..offset + size_of::<LogEntry>()]).ok()?;
        pairs.push((entry.original.get(), entry.copy.get()));
        offset += size_of::<LogEntry>();
    }

    Some(pairs)
}
