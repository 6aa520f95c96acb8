//! # Copy-on-Write B-Tree
//!
//! Ordered map of variable-length byte-string keys to variable-length
//! values, built on cache-managed pages.
//!
//! ## Copy-on-Write Discipline
//!
//! The tree never mutates committed disk state in place. Every node
//! modification goes through `make_page_writable` or `repurpose`, which
//! hands the page to the cache's dirty-page protocol; the diversion
//! machinery keeps the committed image intact until commit finishes.
//!
//! ## Insert Algorithm
//!
//! ```text
//! 1. Descend from the root, recording (parent page, child position)
//! 2. At the leaf: existing key?
//!    - absent                   → plain insert        → Inserted
//!    - present, policy rejects  → nothing             → Unchanged
//!    - present, same length     → overwrite in place  → Replaced
//!    - present, length differs  → delete + reinsert   → Replaced
//! 3. Full leaf: split, propagate the separator along the recorded path
//! 4. A splitting root keeps its page index: both halves move to fresh
//!    pages and the root page is repurposed as an inner node
//! ```
//!
//! ## Delete Algorithm
//!
//! After removing an entry the leaf may underflow (empty or below a
//! quarter fill). Underflow merges the node with a sibling when the
//! combined content fits one page, preferring the left sibling; the freed
//! page index lands in the free-page ledger for the commit logic to hand
//! to the free store. Merges cascade: a parent that loses its last
//! separator collapses into the root when the root is down to one child.
//!
//! ## Cursors
//!
//! A cursor holds a read handle on its leaf, which pins the page in the
//! cache; `trim` can never evict a page a live cursor points into.
//! Cursors stay valid across modifications of *other* leaves within the
//! same transaction.

use std::sync::Arc;

use eyre::{bail, ensure, Result};
use smallvec::SmallVec;

use super::node::{InnerNode, InnerNodeMut, LeafNode, LeafNodeMut, SearchResult, INNER_SLOT_SIZE};
use crate::cache::{CacheManager, PageHandle, ReadHandle};
use crate::config::{MAX_ENTRY_SIZE, PAGE_USABLE_SIZE};
use crate::storage::{PageHeader, PageIndex, PageType, PAGE_IDX_INVALID};

/// Nodes below a quarter fill try to merge with a sibling.
const MIN_NODE_FILL: usize = PAGE_USABLE_SIZE / 4;

/// Descent trace: (parent page, child position within the parent).
type DescentPath = SmallVec<[(PageIndex, usize); 8]>;

/// Outcome of an insert under a replacement policy.
#[derive(Debug)]
pub enum InsertResult {
    /// The key was absent; the entry is now present.
    Inserted,
    /// The key was present and the policy accepted the replacement.
    Replaced { before: Vec<u8> },
    /// The key was present and the policy rejected the replacement.
    Unchanged { current: Cursor },
}

/// Points at one entry of a leaf, pinning the leaf in the cache.
#[derive(Debug, Clone)]
pub struct Cursor {
    leaf: ReadHandle,
    index: usize,
}

impl Cursor {
    pub fn key(&self) -> &[u8] {
        LeafNode::from_page(self.leaf.data())
            .and_then(|node| node.key_at(self.index))
            .expect("cursor points at a valid leaf entry")
    }

    pub fn value(&self) -> &[u8] {
        LeafNode::from_page(self.leaf.data())
            .and_then(|node| node.value_at(self.index))
            .expect("cursor points at a valid leaf entry")
    }
}

impl PartialEq for Cursor {
    fn eq(&self, other: &Self) -> bool {
        self.leaf == other.leaf && self.index == other.index
    }
}

pub struct BTree {
    cache: Arc<CacheManager>,
    root: PageIndex,
    free_pages: Vec<PageIndex>,
}

impl BTree {
    /// Creates an empty tree on a fresh root page.
    pub fn create(cache: Arc<CacheManager>) -> Result<Self> {
        let mut root = cache.new_page()?;
        LeafNodeMut::init(root.data_mut())?;
        let root = root.index();
        Ok(Self {
            cache,
            root,
            free_pages: Vec::new(),
        })
    }

    /// Attaches to a tree whose root was persisted earlier.
    pub fn open(cache: Arc<CacheManager>, root: PageIndex) -> Self {
        Self {
            cache,
            root,
            free_pages: Vec::new(),
        }
    }

    /// The root page index; stable for the lifetime of the tree.
    pub fn root(&self) -> PageIndex {
        self.root
    }

    /// Page indexes released by merges and removals. Drained by
    /// [`Self::take_free_pages`].
    pub fn free_pages(&self) -> &[PageIndex] {
        &self.free_pages
    }

    /// Drains the free-page ledger; the commit logic feeds these to the
    /// free store.
    pub fn take_free_pages(&mut self) -> Vec<PageIndex> {
        std::mem::take(&mut self.free_pages)
    }

    /// Returns a cursor at the exact key, or `None`.
    pub fn find(&self, key: &[u8]) -> Result<Option<Cursor>> {
        let (leaf, _) = self.descend(key)?;
        let found = LeafNode::from_page(leaf.data())?.find_key(key)?;
        match found {
            SearchResult::Found(index) => Ok(Some(Cursor { leaf, index })),
            SearchResult::NotFound(_) => Ok(None),
        }
    }

    /// Returns a cursor at the smallest key at or above `key`, or `None`.
    pub fn begin(&self, key: &[u8]) -> Result<Option<Cursor>> {
        let (leaf, _) = self.descend(key)?;
        let (count, next, found) = {
            let node = LeafNode::from_page(leaf.data())?;
            (node.cell_count(), node.next_leaf(), node.find_key(key)?)
        };

        let index = match found {
            SearchResult::Found(index) => index,
            SearchResult::NotFound(index) => index,
        };
        if index < count {
            return Ok(Some(Cursor { leaf, index }));
        }
        self.first_entry_from(next)
    }

    /// Advances the cursor; `None` at the end of the tree.
    pub fn next(&self, cursor: Cursor) -> Result<Option<Cursor>> {
        let (count, next) = {
            let node = LeafNode::from_page(cursor.leaf.data())?;
            (node.cell_count(), node.next_leaf())
        };

        if cursor.index + 1 < count {
            return Ok(Some(Cursor {
                leaf: cursor.leaf,
                index: cursor.index + 1,
            }));
        }
        self.first_entry_from(next)
    }

    /// Upserts unconditionally.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<InsertResult> {
        self.insert_with(key, value, |_| true)
    }

    /// Inserts under a replacement policy: when the key exists, the policy
    /// sees the current value and decides whether to replace it.
    /// Replacement happens in place exactly when the serialized lengths
    /// match.
    pub fn insert_with<P>(&mut self, key: &[u8], value: &[u8], policy: P) -> Result<InsertResult>
    where
        P: FnOnce(&[u8]) -> bool,
    {
        ensure!(
            key.len() + value.len() <= MAX_ENTRY_SIZE,
            "entry of {} bytes exceeds the {} byte limit",
            key.len() + value.len(),
            MAX_ENTRY_SIZE
        );

        let (leaf, path) = self.descend(key)?;
        let found = LeafNode::from_page(leaf.data())?.find_key(key)?;

        match found {
            SearchResult::Found(index) => {
                let (same_len, before) = {
                    let node = LeafNode::from_page(leaf.data())?;
                    let current = node.value_at(index)?;
                    if !policy(current) {
                        return Ok(InsertResult::Unchanged {
                            current: Cursor { leaf, index },
                        });
                    }
                    (current.len() == value.len(), current.to_vec())
                };

                let mut writable = self.cache.make_page_writable(&leaf);
                if same_len {
                    LeafNodeMut::from_page(writable.data_mut())?
                        .write_value_in_place(index, value)?;
                } else {
                    LeafNodeMut::from_page(writable.data_mut())?.delete_cell(index)?;
                    self.insert_absent(writable, path, key, value)?;
                }
                Ok(InsertResult::Replaced { before })
            }
            SearchResult::NotFound(_) => {
                let writable = self.cache.make_page_writable(&leaf);
                self.insert_absent(writable, path, key, value)?;
                Ok(InsertResult::Inserted)
            }
        }
    }

    /// Removes the entry and returns its value, or `None` if absent.
    pub fn remove(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let (leaf, mut path) = self.descend(key)?;
        let found = LeafNode::from_page(leaf.data())?.find_key(key)?;
        let index = match found {
            SearchResult::Found(index) => index,
            SearchResult::NotFound(_) => return Ok(None),
        };

        let before = LeafNode::from_page(leaf.data())?.value_at(index)?.to_vec();

        let mut writable = self.cache.make_page_writable(&leaf);
        LeafNodeMut::from_page(writable.data_mut())?.delete_cell(index)?;

        let leaf_id = leaf.index();
        drop(writable);
        drop(leaf);
        self.rebalance(&mut path, leaf_id)?;

        Ok(Some(before))
    }

    // -- descent ---------------------------------------------------------

    fn descend(&self, key: &[u8]) -> Result<(ReadHandle, DescentPath)> {
        let mut path = DescentPath::new();
        let mut current = self.root;

        loop {
            let handle = self.cache.load_page(current)?;
            let page_type = PageHeader::from_bytes(handle.data())?.page_type();

            match page_type {
                PageType::Leaf => return Ok((handle, path)),
                PageType::Inner => {
                    let (child, pos) = InnerNode::from_page(handle.data())?.find_child(key)?;
                    path.push((current, pos));
                    current = child;
                }
                PageType::Unknown => {
                    bail!("unexpected page type during descent at page {}", current)
                }
            }
        }
    }

    fn first_entry_from(&self, mut next: PageIndex) -> Result<Option<Cursor>> {
        while next != PAGE_IDX_INVALID {
            let leaf = self.cache.load_page(next)?;
            let (count, further) = {
                let node = LeafNode::from_page(leaf.data())?;
                (node.cell_count(), node.next_leaf())
            };
            if count > 0 {
                return Ok(Some(Cursor { leaf, index: 0 }));
            }
            next = further;
        }
        Ok(None)
    }

    // -- insert and splits -----------------------------------------------

    fn insert_absent(
        &mut self,
        mut leaf: PageHandle,
        path: DescentPath,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        {
            let mut node = LeafNodeMut::from_page(leaf.data_mut())?;
            if node.has_room(key.len(), value.len()) {
                return node.insert_cell(key, value);
            }
        }
        self.split_leaf(leaf, path, key, value)
    }

    fn split_leaf(
        &mut self,
        mut leaf: PageHandle,
        path: DescentPath,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        let next_leaf;
        {
            let node = LeafNode::from_page(leaf.data())?;
            for i in 0..node.cell_count() {
                entries.push((node.key_at(i)?.to_vec(), node.value_at(i)?.to_vec()));
            }
            next_leaf = node.next_leaf();
        }

        let pos = entries
            .iter()
            .position(|(k, _)| k.as_slice() > key)
            .unwrap_or(entries.len());
        entries.insert(pos, (key.to_vec(), value.to_vec()));

        let mid = entries.len() / 2;
        let separator = entries[mid].0.clone();

        if leaf.index() == self.root {
            // the root keeps its index: both halves move to fresh pages and
            // the root page becomes an inner node
            let mut left = self.cache.new_page()?;
            let mut right = self.cache.new_page()?;
            fill_leaf(&mut right, &entries[mid..], next_leaf)?;
            fill_leaf(&mut left, &entries[..mid], right.index())?;

            let mut root = self.cache.repurpose(self.root)?;
            let mut inner = InnerNodeMut::init(root.data_mut(), right.index())?;
            inner.push_separator(&separator, left.index())?;
            return Ok(());
        }

        let mut new_leaf = self.cache.new_page()?;
        fill_leaf(&mut new_leaf, &entries[mid..], next_leaf)?;
        fill_leaf(&mut leaf, &entries[..mid], new_leaf.index())?;

        self.propagate_split(path, separator, leaf.index(), new_leaf.index())
    }

    fn propagate_split(
        &mut self,
        mut path: DescentPath,
        mut separator: Vec<u8>,
        mut left: PageIndex,
        mut right: PageIndex,
    ) -> Result<()> {
        while let Some((parent_id, pos)) = path.pop() {
            let handle = self.cache.load_page(parent_id)?;
            let mut writable = self.cache.make_page_writable(&handle);
            let mut node = InnerNodeMut::from_page(writable.data_mut())?;

            if node.has_room(separator.len()) {
                return node.insert_separator(pos, &separator, left, right);
            }

            (separator, left, right) = self.split_inner(writable, pos, &separator, right)?;
            if left == PAGE_IDX_INVALID {
                return Ok(()); // the root absorbed the split
            }
        }

        unreachable!("split propagation escaped the root");
    }

    /// Splits a full inner node around a new separator. Returns the
    /// promoted separator and the two halves; a root split is absorbed in
    /// place and signalled by an invalid left index.
    fn split_inner(
        &mut self,
        mut node_handle: PageHandle,
        pos: usize,
        new_separator: &[u8],
        new_right_child: PageIndex,
    ) -> Result<(Vec<u8>, PageIndex, PageIndex)> {
        let mut separators: Vec<Vec<u8>> = Vec::new();
        let mut children: Vec<PageIndex> = Vec::new();
        {
            let node = InnerNode::from_page(node_handle.data())?;
            for i in 0..node.cell_count() {
                separators.push(node.key_at(i)?.to_vec());
                children.push(node.child_at(i)?);
            }
            children.push(node.right_child());
        }

        separators.insert(pos, new_separator.to_vec());
        children.insert(pos + 1, new_right_child);

        let mid = separators.len() / 2;
        let promoted = separators[mid].clone();

        if node_handle.index() == self.root {
            let mut left = self.cache.new_page()?;
            let mut right = self.cache.new_page()?;
            fill_inner(&mut left, &separators[..mid], &children[..=mid])?;
            fill_inner(&mut right, &separators[mid + 1..], &children[mid + 1..])?;

            let mut root = self.cache.repurpose(self.root)?;
            let mut inner = InnerNodeMut::init(root.data_mut(), right.index())?;
            inner.push_separator(&promoted, left.index())?;
            return Ok((promoted, PAGE_IDX_INVALID, PAGE_IDX_INVALID));
        }

        let mut new_node = self.cache.new_page()?;
        fill_inner(&mut new_node, &separators[mid + 1..], &children[mid + 1..])?;
        fill_inner(&mut node_handle, &separators[..mid], &children[..=mid])?;

        Ok((promoted, node_handle.index(), new_node.index()))
    }

    // -- removal and merges ----------------------------------------------

    /// Walks the recorded path upward, merging underfull nodes into their
    /// siblings until a level needs no work.
    fn rebalance(&mut self, path: &mut DescentPath, mut node_id: PageIndex) -> Result<()> {
        loop {
            match path.pop() {
                None => return self.collapse_root(),
                Some((parent_id, pos)) => {
                    if !self.try_merge(parent_id, pos, node_id)? {
                        return Ok(());
                    }
                    node_id = parent_id;
                }
            }
        }
    }

    /// Merges the child at `pos` of `parent_id` with a sibling when it is
    /// underfull and the combined content fits one page. The left sibling
    /// wins when both are eligible. Returns whether a merge happened (the
    /// parent then lost a separator).
    fn try_merge(&mut self, parent_id: PageIndex, pos: usize, node_id: PageIndex) -> Result<bool> {
        let node = self.cache.load_page(node_id)?;
        let page_type = PageHeader::from_bytes(node.data())?.page_type();

        match page_type {
            PageType::Leaf => self.try_merge_leaf(parent_id, pos, node),
            PageType::Inner => self.try_merge_inner(parent_id, pos, node),
            PageType::Unknown => bail!("unexpected page type during merge at page {}", node_id),
        }
    }

    fn try_merge_leaf(
        &mut self,
        parent_id: PageIndex,
        pos: usize,
        leaf: ReadHandle,
    ) -> Result<bool> {
        let (live, count) = {
            let node = LeafNode::from_page(leaf.data())?;
            (node.live_bytes(), node.cell_count())
        };
        if count > 0 && live >= MIN_NODE_FILL {
            return Ok(false);
        }

        let parent = self.cache.load_page(parent_id)?;
        let parent_count = InnerNode::from_page(parent.data())?.cell_count();

        // prefer the left sibling
        if pos > 0 {
            let left_id = InnerNode::from_page(parent.data())?.child_at(pos - 1)?;
            let left = self.cache.load_page(left_id)?;
            if LeafNode::from_page(left.data())?.live_bytes() + live <= PAGE_USABLE_SIZE {
                self.merge_leaves(&left, &leaf)?;
                let mut parent_writable = self.cache.make_page_writable(&parent);
                InnerNodeMut::from_page(parent_writable.data_mut())?.merge_children(pos - 1)?;
                self.free_pages.push(leaf.index());
                return Ok(true);
            }
        }

        if pos < parent_count {
            let right_id = InnerNode::from_page(parent.data())?.child_at(pos + 1)?;
            let right = self.cache.load_page(right_id)?;
            if LeafNode::from_page(right.data())?.live_bytes() + live <= PAGE_USABLE_SIZE {
                self.merge_leaves(&leaf, &right)?;
                let mut parent_writable = self.cache.make_page_writable(&parent);
                InnerNodeMut::from_page(parent_writable.data_mut())?.merge_children(pos)?;
                self.free_pages.push(right.index());
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Moves every entry of `right` into `left` and unlinks `right` from
    /// the leaf chain.
    fn merge_leaves(&self, left: &ReadHandle, right: &ReadHandle) -> Result<()> {
        let mut writable = self.cache.make_page_writable(left);
        let mut node = LeafNodeMut::from_page(writable.data_mut())?;

        let source = LeafNode::from_page(right.data())?;
        for i in 0..source.cell_count() {
            node.insert_cell(source.key_at(i)?, source.value_at(i)?)?;
        }
        node.set_next_leaf(source.next_leaf());
        Ok(())
    }

    fn try_merge_inner(
        &mut self,
        parent_id: PageIndex,
        pos: usize,
        node: ReadHandle,
    ) -> Result<bool> {
        let (live, count) = {
            let inner = InnerNode::from_page(node.data())?;
            (inner.live_bytes(), inner.cell_count())
        };
        if count > 0 && live >= MIN_NODE_FILL {
            return Ok(false);
        }

        let parent = self.cache.load_page(parent_id)?;
        let parent_count = InnerNode::from_page(parent.data())?.cell_count();

        if pos > 0 {
            let separator = InnerNode::from_page(parent.data())?.key_at(pos - 1)?.to_vec();
            let left_id = InnerNode::from_page(parent.data())?.child_at(pos - 1)?;
            let left = self.cache.load_page(left_id)?;
            let left_live = InnerNode::from_page(left.data())?.live_bytes();
            if left_live + live + separator.len() + INNER_SLOT_SIZE <= PAGE_USABLE_SIZE {
                self.merge_inners(&left, &node, &separator)?;
                let mut parent_writable = self.cache.make_page_writable(&parent);
                InnerNodeMut::from_page(parent_writable.data_mut())?.merge_children(pos - 1)?;
                self.free_pages.push(node.index());
                return Ok(true);
            }
        }

        if pos < parent_count {
            let separator = InnerNode::from_page(parent.data())?.key_at(pos)?.to_vec();
            let right_id = InnerNode::from_page(parent.data())?.child_at(pos + 1)?;
            let right = self.cache.load_page(right_id)?;
            let right_live = InnerNode::from_page(right.data())?.live_bytes();
            if live + right_live + separator.len() + INNER_SLOT_SIZE <= PAGE_USABLE_SIZE {
                self.merge_inners(&node, &right, &separator)?;
                let mut parent_writable = self.cache.make_page_writable(&parent);
                InnerNodeMut::from_page(parent_writable.data_mut())?.merge_children(pos)?;
                self.free_pages.push(right.index());
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Appends the parent separator and all of `right`'s entries to
    /// `left`; `right`'s children stay reachable through the merged node.
    fn merge_inners(&self, left: &ReadHandle, right: &ReadHandle, separator: &[u8]) -> Result<()> {
        let mut writable = self.cache.make_page_writable(left);
        let mut node = InnerNodeMut::from_page(writable.data_mut())?;

        let old_right_child = node.right_child();
        node.push_separator(separator, old_right_child)?;

        let source = InnerNode::from_page(right.data())?;
        for i in 0..source.cell_count() {
            node.push_separator(source.key_at(i)?, source.child_at(i)?)?;
        }
        node.set_right_child(source.right_child());
        Ok(())
    }

    /// A root inner node that lost its last separator has a single child;
    /// that child's content moves into the root page and the child is
    /// freed, keeping the root index stable.
    fn collapse_root(&mut self) -> Result<()> {
        let root = self.cache.load_page(self.root)?;
        let collapse = {
            let header = PageHeader::from_bytes(root.data())?;
            header.page_type() == PageType::Inner && header.cell_count() == 0
        };
        if !collapse {
            return Ok(());
        }

        let child_id = InnerNode::from_page(root.data())?.right_child();
        let child = self.cache.load_page(child_id)?;
        drop(root);

        let mut writable = self.cache.repurpose(self.root)?;
        writable.data_mut().copy_from_slice(child.data());
        self.free_pages.push(child_id);
        Ok(())
    }
}

fn fill_leaf(
    handle: &mut PageHandle,
    entries: &[(Vec<u8>, Vec<u8>)],
    next: PageIndex,
) -> Result<()> {
    let mut node = LeafNodeMut::init(handle.data_mut())?;
    for (key, value) in entries {
        node.insert_cell(key, value)?;
    }
    node.set_next_leaf(next);
    Ok(())
}

fn fill_inner(
    handle: &mut PageHandle,
    separators: &[Vec<u8>],
    children: &[PageIndex],
) -> Result<()> {
    debug_assert_eq!(children.len(), separators.len() + 1);

    let right_child = *children.last().expect("inner node needs a rightmost child");
    let mut node = InnerNodeMut::init(handle.data_mut(), right_child)?;
    for (separator, &child) in separators.iter().zip(children) {
        node.push_separator(separator, child)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemFile;

    fn tree() -> BTree {
        let cache = Arc::new(CacheManager::new(Arc::new(MemFile::new())));
        BTree::create(cache).unwrap()
    }

    #[test]
    fn empty_tree_finds_nothing() {
        let bt = tree();
        assert!(bt.find(b"test").unwrap().is_none());
        assert!(bt.begin(b"").unwrap().is_none());
    }

    #[test]
    fn insert_and_find_single_entry() {
        let mut bt = tree();

        let res = bt.insert(b"hello", b"world").unwrap();
        assert!(matches!(res, InsertResult::Inserted));

        let cursor = bt.find(b"hello").unwrap().unwrap();
        assert_eq!(cursor.key(), b"hello");
        assert_eq!(cursor.value(), b"world");
    }

    #[test]
    fn root_split_keeps_root_index() {
        let mut bt = tree();
        let root = bt.root();

        for i in 0..500 {
            let key = format!("key{:05}", i);
            bt.insert(key.as_bytes(), b"some test value").unwrap();
        }

        assert_eq!(bt.root(), root);
        for i in 0..500 {
            let key = format!("key{:05}", i);
            assert!(bt.find(key.as_bytes()).unwrap().is_some(), "lost {}", key);
        }
    }

    #[test]
    fn cursor_iterates_in_order_across_splits() {
        let mut bt = tree();

        for i in (0..300).rev() {
            let key = format!("key{:05}", i);
            bt.insert(key.as_bytes(), key.as_bytes()).unwrap();
        }

        let mut cursor = bt.begin(b"").unwrap();
        for i in 0..300 {
            let expected = format!("key{:05}", i);
            let cur = cursor.expect("cursor ended early");
            assert_eq!(cur.key(), expected.as_bytes());
            cursor = bt.next(cur).unwrap();
        }
        assert!(cursor.is_none());
    }

    #[test]
    fn oversized_entries_are_rejected() {
        let mut bt = tree();
        let value = vec![0u8; MAX_ENTRY_SIZE];
        assert!(bt.insert(b"key", &value).is_err());
    }

    #[test]
    fn policy_rejection_leaves_value_untouched() {
        let mut bt = tree();
        bt.insert(b"key", b"original").unwrap();

        let res = bt.insert_with(b"key", b"ignored!", |_| false).unwrap();
        match res {
            InsertResult::Unchanged { current } => assert_eq!(current.value(), b"original"),
            other => panic!("expected Unchanged, got {:?}", other),
        }

        assert_eq!(bt.find(b"key").unwrap().unwrap().value(), b"original");
    }

    #[test]
    fn same_size_replacement_is_in_place() {
        let mut bt = tree();
        bt.insert(b"key", b"value one").unwrap();

        let res = bt.insert(b"key", b"value two").unwrap();
        match res {
            InsertResult::Replaced { before } => assert_eq!(before, b"value one"),
            other => panic!("expected Replaced, got {:?}", other),
        }
        assert!(bt.free_pages().is_empty());
        assert_eq!(bt.find(b"key").unwrap().unwrap().value(), b"value two");
    }

    #[test]
    fn remove_returns_the_value() {
        let mut bt = tree();
        bt.insert(b"a", b"1").unwrap();
        bt.insert(b"b", b"2").unwrap();

        assert_eq!(bt.remove(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(bt.remove(b"a").unwrap(), None);
        assert!(bt.find(b"a").unwrap().is_none());
        assert!(bt.find(b"b").unwrap().is_some());
    }

    #[test]
    fn remove_all_collapses_to_the_root() {
        let mut bt = tree();

        for i in 0..2000 {
            let key = format!("key{:05}", i);
            bt.insert(key.as_bytes(), b"payload payload").unwrap();
        }
        let allocated = bt.cache.file().page_count();
        assert!(allocated > 1);

        for i in 0..2000 {
            let key = format!("key{:05}", i);
            assert!(bt.remove(key.as_bytes()).unwrap().is_some(), "lost {}", key);
        }

        assert!(bt.begin(b"").unwrap().is_none());
        assert_eq!(bt.free_pages().len(), allocated - 1);
    }
}
