//! # B-Tree Node Layout
//!
//! Leaf and inner node views over 4KB pages. Nodes are slot-array pages:
//! a compact slot array after the header grows downward, cell content grows
//! upward from the page end, and the space in between is contiguous free
//! space.
//!
//! ## Leaf Page Layout
//!
//! ```text
//! +----------------------+
//! | PageHeader (16B)     |  page_type = Leaf, next = next-leaf pointer
//! +----------------------+
//! | LeafSlot[0] (4B)     |  offset (2B) + key_len (2B)
//! | LeafSlot[1] ...      |
//! +----------------------+
//! | Free space           |
//! +----------------------+
//! | Cell content         |  key | value_len (2B) | value
//! +----------------------+
//! ```
//!
//! ## Inner Page Layout
//!
//! ```text
//! +----------------------+
//! | PageHeader (16B)     |  page_type = Inner, next = rightmost child
//! +----------------------+
//! | InnerSlot[0] (8B)    |  child (4B) + offset (2B) + key_len (2B)
//! | InnerSlot[1] ...     |
//! +----------------------+
//! | Free space           |
//! +----------------------+
//! | Cell content         |  separator key bytes
//! +----------------------+
//! ```
//!
//! ## Navigation Semantics
//!
//! For a separator at slot `i`, `slot[i].child` holds all keys strictly
//! below `separator[i]`; keys at or above the last separator live under the
//! header's rightmost child. A separator is always the smallest key of the
//! subtree to its right, so equal keys navigate right.
//!
//! ## Fragmentation
//!
//! Deleting a cell leaves its content bytes in place and adds their size to
//! the header's fragment counter. Inserts that fit the total free space but
//! not the contiguous window compact the page first; deletes compact when
//! fragments exceed a quarter of the page.

use eyre::{ensure, Result};
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{LEAF_SLOT_SIZE, PAGE_HEADER_SIZE, PAGE_SIZE, PAGE_USABLE_SIZE, VALUE_LEN_SIZE};
use crate::storage::{PageHeader, PageIndex, PageType};

pub const INNER_SLOT_SIZE: usize = 8;

const FRAG_COMPACT_THRESHOLD: usize = PAGE_USABLE_SIZE / 4;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, PartialEq, Eq)]
pub struct LeafSlot {
    offset: U16,
    key_len: U16,
}

impl LeafSlot {
    fn new(offset: u16, key_len: u16) -> Self {
        Self {
            offset: U16::new(offset),
            key_len: U16::new(key_len),
        }
    }

    zerocopy_accessors! {
        offset: u16,
        key_len: u16,
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, PartialEq, Eq)]
pub struct InnerSlot {
    child: U32,
    offset: U16,
    key_len: U16,
}

impl InnerSlot {
    fn new(child: u32, offset: u16, key_len: u16) -> Self {
        Self {
            child: U32::new(child),
            offset: U16::new(offset),
            key_len: U16::new(key_len),
        }
    }

    zerocopy_accessors! {
        child: u32,
        offset: u16,
        key_len: u16,
    }
}

const _: () = assert!(size_of::<LeafSlot>() == LEAF_SLOT_SIZE);
const _: () = assert!(size_of::<InnerSlot>() == INNER_SLOT_SIZE);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    Found(usize),
    NotFound(usize),
}

fn header(data: &[u8]) -> &PageHeader {
    PageHeader::from_bytes(data).expect("node page shorter than its header")
}

fn header_mut(data: &mut [u8]) -> &mut PageHeader {
    PageHeader::from_bytes_mut(data).expect("node page shorter than its header")
}

// ---------------------------------------------------------------------------
// Leaf nodes
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct LeafNode<'a> {
    data: &'a [u8],
}

pub struct LeafNodeMut<'a> {
    data: &'a mut [u8],
}

impl<'a> LeafNode<'a> {
    pub fn from_page(data: &'a [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        ensure!(
            header(data).page_type() == PageType::Leaf,
            "expected Leaf page, got {:?}",
            header(data).page_type()
        );
        Ok(Self { data })
    }

    pub fn cell_count(&self) -> usize {
        header(self.data).cell_count() as usize
    }

    pub fn next_leaf(&self) -> PageIndex {
        header(self.data).next()
    }

    fn slot_at(&self, index: usize) -> Result<&LeafSlot> {
        leaf_slot_at(self.data, index)
    }

    pub fn key_at(&self, index: usize) -> Result<&'a [u8]> {
        let slot = self.slot_at(index)?;
        leaf_key(self.data, slot)
    }

    pub fn value_at(&self, index: usize) -> Result<&'a [u8]> {
        let slot = self.slot_at(index)?;
        leaf_value(self.data, slot)
    }

    pub fn find_key(&self, key: &[u8]) -> Result<SearchResult> {
        leaf_find_key(self.data, key)
    }

    /// Bytes this node's entries would occupy in a freshly packed page.
    pub fn live_bytes(&self) -> usize {
        let h = header(self.data);
        PAGE_USABLE_SIZE - h.free_space() as usize - h.frag_bytes() as usize
    }
}

impl<'a> LeafNodeMut<'a> {
    pub fn from_page(data: &'a mut [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        ensure!(
            header(data).page_type() == PageType::Leaf,
            "expected Leaf page, got {:?}",
            header(data).page_type()
        );
        Ok(Self { data })
    }

    /// Formats `data` as an empty leaf.
    pub fn init(data: &'a mut [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        PageHeader::new(PageType::Leaf).write_to(data)?;
        Ok(Self { data })
    }

    pub fn as_ref(&self) -> LeafNode<'_> {
        LeafNode { data: self.data }
    }

    pub fn cell_count(&self) -> usize {
        header(self.data).cell_count() as usize
    }

    pub fn next_leaf(&self) -> PageIndex {
        header(self.data).next()
    }

    pub fn set_next_leaf(&mut self, id: PageIndex) {
        header_mut(self.data).set_next(id);
    }

    pub fn key_at(&self, index: usize) -> Result<&[u8]> {
        let slot = leaf_slot_at(self.data, index)?;
        leaf_key(self.data, slot)
    }

    pub fn value_at(&self, index: usize) -> Result<&[u8]> {
        let slot = leaf_slot_at(self.data, index)?;
        leaf_value(self.data, slot)
    }

    pub fn find_key(&self, key: &[u8]) -> Result<SearchResult> {
        leaf_find_key(self.data, key)
    }

    /// Whether an entry of this size fits, counting fragmented space.
    pub fn has_room(&self, key_len: usize, value_len: usize) -> bool {
        let h = header(self.data);
        let need = LEAF_SLOT_SIZE + key_len + VALUE_LEN_SIZE + value_len;
        (h.free_space() as usize + h.frag_bytes() as usize) >= need
    }

    /// Inserts a cell at its sorted position. The key must be absent.
    pub fn insert_cell(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let cell_size = key.len() + VALUE_LEN_SIZE + value.len();
        let need = LEAF_SLOT_SIZE + cell_size;

        {
            let h = header(self.data);
            ensure!(
                h.free_space() as usize + h.frag_bytes() as usize >= need,
                "not enough free space: need {}, have {}",
                need,
                h.free_space() as usize + h.frag_bytes() as usize
            );
            if (h.free_space() as usize) < need {
                self.compact()?;
            }
        }

        let insert_pos = match self.find_key(key)? {
            SearchResult::Found(_) => eyre::bail!("key already present"),
            SearchResult::NotFound(pos) => pos,
        };

        let cell_count = self.cell_count();
        let new_free_end = header(self.data).free_end() as usize - cell_size;

        let mut offset = new_free_end;
        self.data[offset..offset + key.len()].copy_from_slice(key);
        offset += key.len();
        self.data[offset..offset + VALUE_LEN_SIZE]
            .copy_from_slice(&(value.len() as u16).to_le_bytes());
        offset += VALUE_LEN_SIZE;
        self.data[offset..offset + value.len()].copy_from_slice(value);

        for i in (insert_pos..cell_count).rev() {
            let src = leaf_slot_offset(i);
            let dst = leaf_slot_offset(i + 1);
            self.data.copy_within(src..src + LEAF_SLOT_SIZE, dst);
        }

        let slot = LeafSlot::new(new_free_end as u16, key.len() as u16);
        let slot_offset = leaf_slot_offset(insert_pos);
        self.data[slot_offset..slot_offset + LEAF_SLOT_SIZE].copy_from_slice(slot.as_bytes());

        let h = header_mut(self.data);
        h.set_cell_count(cell_count as u16 + 1);
        h.set_free_start(h.free_start() + LEAF_SLOT_SIZE as u16);
        h.set_free_end(new_free_end as u16);

        Ok(())
    }

    /// Removes the cell at `index`, leaving its content bytes as fragments.
    pub fn delete_cell(&mut self, index: usize) -> Result<()> {
        let cell_count = self.cell_count();
        ensure!(
            index < cell_count,
            "delete index {} out of bounds (cell_count={})",
            index,
            cell_count
        );

        let slot = leaf_slot_at(self.data, index)?;
        let cell_size =
            slot.key_len() as usize + VALUE_LEN_SIZE + leaf_value(self.data, slot)?.len();

        for i in index..cell_count - 1 {
            let src = leaf_slot_offset(i + 1);
            let dst = leaf_slot_offset(i);
            self.data.copy_within(src..src + LEAF_SLOT_SIZE, dst);
        }

        let h = header_mut(self.data);
        h.set_cell_count(cell_count as u16 - 1);
        h.set_free_start(h.free_start() - LEAF_SLOT_SIZE as u16);
        h.set_frag_bytes(h.frag_bytes() + cell_size as u16);

        if header(self.data).frag_bytes() as usize > FRAG_COMPACT_THRESHOLD {
            self.compact()?;
        }

        Ok(())
    }

    /// Overwrites the value at `index`. The new value must have the same
    /// serialized length as the old one.
    pub fn write_value_in_place(&mut self, index: usize, value: &[u8]) -> Result<()> {
        let slot = leaf_slot_at(self.data, index)?;
        let value_start = slot.offset() as usize + slot.key_len() as usize;
        let old_len = leaf_value_len(self.data, slot)?;
        ensure!(
            old_len == value.len(),
            "in-place write requires equal lengths: {} != {}",
            old_len,
            value.len()
        );

        let start = value_start + VALUE_LEN_SIZE;
        self.data[start..start + value.len()].copy_from_slice(value);
        Ok(())
    }

    fn compact(&mut self) -> Result<()> {
        let cell_count = self.cell_count();
        let mut cells: Vec<(Vec<u8>, u16)> = Vec::with_capacity(cell_count);

        for i in 0..cell_count {
            let slot = leaf_slot_at(self.data, i)?;
            let start = slot.offset() as usize;
            let size = slot.key_len() as usize + VALUE_LEN_SIZE + leaf_value_len(self.data, slot)?;
            cells.push((self.data[start..start + size].to_vec(), slot.key_len()));
        }

        let mut free_end = PAGE_SIZE;
        for (i, (cell, key_len)) in cells.into_iter().enumerate() {
            free_end -= cell.len();
            self.data[free_end..free_end + cell.len()].copy_from_slice(&cell);

            let slot = LeafSlot::new(free_end as u16, key_len);
            let slot_offset = leaf_slot_offset(i);
            self.data[slot_offset..slot_offset + LEAF_SLOT_SIZE].copy_from_slice(slot.as_bytes());
        }

        let h = header_mut(self.data);
        h.set_free_end(free_end as u16);
        h.set_frag_bytes(0);
        Ok(())
    }
}

fn leaf_slot_offset(index: usize) -> usize {
    PAGE_HEADER_SIZE + index * LEAF_SLOT_SIZE
}

fn leaf_slot_at(data: &[u8], index: usize) -> Result<&LeafSlot> {
    let count = header(data).cell_count() as usize;
    ensure!(
        index < count,
        "slot index {} out of bounds (cell_count={})",
        index,
        count
    );
    let offset = leaf_slot_offset(index);
    LeafSlot::ref_from_bytes(&data[offset..offset + LEAF_SLOT_SIZE])
        .map_err(|e| eyre::eyre!("failed to read leaf slot {}: {:?}", index, e))
}

fn leaf_key<'a>(data: &'a [u8], slot: &LeafSlot) -> Result<&'a [u8]> {
    let start = slot.offset() as usize;
    let len = slot.key_len() as usize;
    ensure!(start + len <= PAGE_SIZE, "key extends beyond page boundary");
    Ok(&data[start..start + len])
}

fn leaf_value_len(data: &[u8], slot: &LeafSlot) -> Result<usize> {
    let start = slot.offset() as usize + slot.key_len() as usize;
    ensure!(
        start + VALUE_LEN_SIZE <= PAGE_SIZE,
        "value length extends beyond page boundary"
    );
    Ok(u16::from_le_bytes([data[start], data[start + 1]]) as usize)
}

fn leaf_value<'a>(data: &'a [u8], slot: &LeafSlot) -> Result<&'a [u8]> {
    let len = leaf_value_len(data, slot)?;
    let start = slot.offset() as usize + slot.key_len() as usize + VALUE_LEN_SIZE;
    ensure!(start + len <= PAGE_SIZE, "value extends beyond page boundary");
    Ok(&data[start..start + len])
}

fn leaf_find_key(data: &[u8], key: &[u8]) -> Result<SearchResult> {
    let count = header(data).cell_count() as usize;
    let mut lo = 0usize;
    let mut hi = count;

    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let slot = leaf_slot_at(data, mid)?;
        match leaf_key(data, slot)?.cmp(key) {
            std::cmp::Ordering::Equal => return Ok(SearchResult::Found(mid)),
            std::cmp::Ordering::Less => lo = mid + 1,
            std::cmp::Ordering::Greater => hi = mid,
        }
    }

    Ok(SearchResult::NotFound(lo))
}

// ---------------------------------------------------------------------------
// Inner nodes
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct InnerNode<'a> {
    data: &'a [u8],
}

pub struct InnerNodeMut<'a> {
    data: &'a mut [u8],
}

impl<'a> InnerNode<'a> {
    pub fn from_page(data: &'a [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        ensure!(
            header(data).page_type() == PageType::Inner,
            "expected Inner page, got {:?}",
            header(data).page_type()
        );
        Ok(Self { data })
    }

    pub fn cell_count(&self) -> usize {
        header(self.data).cell_count() as usize
    }

    pub fn right_child(&self) -> PageIndex {
        header(self.data).next()
    }

    pub fn key_at(&self, index: usize) -> Result<&'a [u8]> {
        let slot = inner_slot_at(self.data, index)?;
        inner_key(self.data, slot)
    }

    /// Child at `pos`; `pos == cell_count()` addresses the rightmost child.
    pub fn child_at(&self, pos: usize) -> Result<PageIndex> {
        if pos == self.cell_count() {
            return Ok(self.right_child());
        }
        Ok(inner_slot_at(self.data, pos)?.child())
    }

    /// Returns the child covering `key` and its position.
    pub fn find_child(&self, key: &[u8]) -> Result<(PageIndex, usize)> {
        let count = self.cell_count();
        let mut lo = 0usize;
        let mut hi = count;

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let slot = inner_slot_at(self.data, mid)?;
            if key < inner_key(self.data, slot)? {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }

        Ok((self.child_at(lo)?, lo))
    }

    pub fn live_bytes(&self) -> usize {
        let h = header(self.data);
        PAGE_USABLE_SIZE - h.free_space() as usize - h.frag_bytes() as usize
    }
}

impl<'a> InnerNodeMut<'a> {
    pub fn from_page(data: &'a mut [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        ensure!(
            header(data).page_type() == PageType::Inner,
            "expected Inner page, got {:?}",
            header(data).page_type()
        );
        Ok(Self { data })
    }

    /// Formats `data` as an inner node with no separators and the given
    /// rightmost child.
    pub fn init(data: &'a mut [u8], right_child: PageIndex) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        let mut h = PageHeader::new(PageType::Inner);
        h.set_next(right_child);
        h.write_to(data)?;
        Ok(Self { data })
    }

    pub fn as_ref(&self) -> InnerNode<'_> {
        InnerNode { data: self.data }
    }

    pub fn cell_count(&self) -> usize {
        header(self.data).cell_count() as usize
    }

    pub fn right_child(&self) -> PageIndex {
        header(self.data).next()
    }

    pub fn set_right_child(&mut self, id: PageIndex) {
        header_mut(self.data).set_next(id);
    }

    pub fn key_at(&self, index: usize) -> Result<&[u8]> {
        let slot = inner_slot_at(self.data, index)?;
        inner_key(self.data, slot)
    }

    pub fn child_at(&self, pos: usize) -> Result<PageIndex> {
        if pos == self.cell_count() {
            return Ok(self.right_child());
        }
        Ok(inner_slot_at(self.data, pos)?.child())
    }

    pub fn set_child(&mut self, pos: usize, id: PageIndex) -> Result<()> {
        if pos == self.cell_count() {
            self.set_right_child(id);
            return Ok(());
        }
        let slot = inner_slot_at_mut(self.data, pos)?;
        slot.set_child(id);
        Ok(())
    }

    pub fn has_room(&self, key_len: usize) -> bool {
        let h = header(self.data);
        let need = INNER_SLOT_SIZE + key_len;
        (h.free_space() as usize + h.frag_bytes() as usize) >= need
    }

    /// Splices the separator produced by a child split in at `pos`: keys
    /// below `key` stay with `left_id`, keys at or above move to
    /// `right_id`.
    pub fn insert_separator(
        &mut self,
        pos: usize,
        key: &[u8],
        left_id: PageIndex,
        right_id: PageIndex,
    ) -> Result<()> {
        let cell_count = self.cell_count();
        ensure!(pos <= cell_count, "separator position out of bounds");

        self.insert_slot(pos, key, left_id)?;

        if pos + 1 < self.cell_count() {
            self.set_child(pos + 1, right_id)?;
        } else {
            self.set_right_child(right_id);
        }
        Ok(())
    }

    /// Appends a separator; keys must arrive in ascending order. Used when
    /// rebuilding nodes during splits and merges.
    pub fn push_separator(&mut self, key: &[u8], child: PageIndex) -> Result<()> {
        let pos = self.cell_count();
        self.insert_slot(pos, key, child)
    }

    /// Removes the separator at `pos`, handing its key range to the left
    /// neighbor: the child that owned keys below the separator takes over
    /// the combined range.
    pub fn merge_children(&mut self, pos: usize) -> Result<()> {
        let cell_count = self.cell_count();
        ensure!(pos < cell_count, "separator position out of bounds");

        let left_id = inner_slot_at(self.data, pos)?.child();
        self.remove_slot(pos)?;

        if pos < self.cell_count() {
            self.set_child(pos, left_id)?;
        } else {
            self.set_right_child(left_id);
        }
        Ok(())
    }

    fn insert_slot(&mut self, pos: usize, key: &[u8], child: PageIndex) -> Result<()> {
        let need = INNER_SLOT_SIZE + key.len();
        {
            let h = header(self.data);
            ensure!(
                h.free_space() as usize + h.frag_bytes() as usize >= need,
                "not enough free space: need {}, have {}",
                need,
                h.free_space() as usize + h.frag_bytes() as usize
            );
            if (h.free_space() as usize) < need {
                self.compact()?;
            }
        }

        let cell_count = self.cell_count();
        let new_free_end = header(self.data).free_end() as usize - key.len();
        self.data[new_free_end..new_free_end + key.len()].copy_from_slice(key);

        for i in (pos..cell_count).rev() {
            let src = inner_slot_offset(i);
            let dst = inner_slot_offset(i + 1);
            self.data.copy_within(src..src + INNER_SLOT_SIZE, dst);
        }

        let slot = InnerSlot::new(child, new_free_end as u16, key.len() as u16);
        let slot_offset = inner_slot_offset(pos);
        self.data[slot_offset..slot_offset + INNER_SLOT_SIZE].copy_from_slice(slot.as_bytes());

        let h = header_mut(self.data);
        h.set_cell_count(cell_count as u16 + 1);
        h.set_free_start(h.free_start() + INNER_SLOT_SIZE as u16);
        h.set_free_end(new_free_end as u16);
        Ok(())
    }

    fn remove_slot(&mut self, pos: usize) -> Result<()> {
        let cell_count = self.cell_count();
        ensure!(pos < cell_count, "slot index out of bounds");

        let key_len = inner_slot_at(self.data, pos)?.key_len();

        for i in pos..cell_count - 1 {
            let src = inner_slot_offset(i + 1);
            let dst = inner_slot_offset(i);
            self.data.copy_within(src..src + INNER_SLOT_SIZE, dst);
        }

        let h = header_mut(self.data);
        h.set_cell_count(cell_count as u16 - 1);
        h.set_free_start(h.free_start() - INNER_SLOT_SIZE as u16);
        h.set_frag_bytes(h.frag_bytes() + key_len);

        if header(self.data).frag_bytes() as usize > FRAG_COMPACT_THRESHOLD {
            self.compact()?;
        }
        Ok(())
    }

    fn compact(&mut self) -> Result<()> {
        let cell_count = self.cell_count();
        let mut cells: Vec<(Vec<u8>, PageIndex)> = Vec::with_capacity(cell_count);

        for i in 0..cell_count {
            let slot = inner_slot_at(self.data, i)?;
            cells.push((inner_key(self.data, slot)?.to_vec(), slot.child()));
        }

        let mut free_end = PAGE_SIZE;
        for (i, (key, child)) in cells.into_iter().enumerate() {
            free_end -= key.len();
            self.data[free_end..free_end + key.len()].copy_from_slice(&key);

            let slot = InnerSlot::new(child, free_end as u16, key.len() as u16);
            let slot_offset = inner_slot_offset(i);
            self.data[slot_offset..slot_offset + INNER_SLOT_SIZE].copy_from_slice(slot.as_bytes());
        }

        let h = header_mut(self.data);
        h.set_free_end(free_end as u16);
        h.set_frag_bytes(0);
        Ok(())
    }
}

fn inner_slot_offset(index: usize) -> usize {
    PAGE_HEADER_SIZE + index * INNER_SLOT_SIZE
}

fn inner_slot_at(data: &[u8], index: usize) -> Result<&InnerSlot> {
    let count = header(data).cell_count() as usize;
    ensure!(
        index < count,
        "slot index {} out of bounds (cell_count={})",
        index,
        count
    );
    let offset = inner_slot_offset(index);
    InnerSlot::ref_from_bytes(&data[offset..offset + INNER_SLOT_SIZE])
        .map_err(|e| eyre::eyre!("failed to read inner slot {}: {:?}", index, e))
}

fn inner_slot_at_mut(data: &mut [u8], index: usize) -> Result<&mut InnerSlot> {
    let count = header(data).cell_count() as usize;
    ensure!(
        index < count,
        "slot index {} out of bounds (cell_count={})",
        index,
        count
    );
    let offset = inner_slot_offset(index);
    InnerSlot::mut_from_bytes(&mut data[offset..offset + INNER_SLOT_SIZE])
        .map_err(|e| eyre::eyre!("failed to read inner slot {}: {:?}", index, e))
}

fn inner_key<'a>(data: &'a [u8], slot: &InnerSlot) -> Result<&'a [u8]> {
    let start = slot.offset() as usize;
    let len = slot.key_len() as usize;
    ensure!(start + len <= PAGE_SIZE, "key extends beyond page boundary");
    Ok(&data[start..start + len])
}
