//! # Directory Structure
//!
//! A hierarchical namespace over the B-tree: named entries grouped into
//! folders, where an entry is a sub-folder reference, a file descriptor
//! slot, or a typed attribute.
//!
//! ## Keys
//!
//! An entry is addressed by `(folder, name)`. Keys encode the folder id
//! big-endian before the raw name bytes, so all entries of one folder are
//! lexicographically adjacent and folder listings are plain prefix scans.
//! Folder 0 is the root; fresh sub-folder ids come from a per-structure
//! counter.
//!
//! ## Value Rules
//!
//! The replacement policies encode the namespace rules:
//!
//! - a sub-folder insert never replaces anything (an existing folder is
//!   simply returned, any other occupant rejects the operation)
//! - attributes replace attributes, never folders or files
//! - file operations only replace files
//!
//! ## Removal
//!
//! Removing a folder entry removes the entire subtree behind it; removing
//! a file entry releases its page chain to the free store. The return
//! value counts removed entries.
//!
//! ## Commit
//!
//! `commit()` wires the storage pieces together: tree-freed pages and the
//! commit handler's diverted pages go to the free store, then the ordered
//! commit runs.

mod value;

pub use value::{Folder, TreeValue, ValueType};

use std::sync::Arc;

use eyre::Result;
use log::debug;

use crate::cache::CacheManager;
use crate::free_store::{FileDescriptor, FreeStore};
use crate::storage::PageIndex;
use crate::tree::{BTree, Cursor, InsertResult};

/// Key of a directory entry: folder id plus entry name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryKey {
    bytes: Vec<u8>,
}

impl DirectoryKey {
    /// An entry of the root folder.
    pub fn root(name: &str) -> Self {
        Self::new(Folder::ROOT, name)
    }

    pub fn new(folder: Folder, name: &str) -> Self {
        let mut bytes = Vec::with_capacity(4 + name.len());
        bytes.extend_from_slice(&folder.0.to_be_bytes());
        bytes.extend_from_slice(name.as_bytes());
        Self { bytes }
    }

    /// The prefix shared by every entry of `folder`.
    pub fn folder_prefix(folder: Folder) -> Self {
        Self {
            bytes: folder.0.to_be_bytes().to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Cursor over directory entries, decoding keys and values.
#[derive(Debug, Clone, PartialEq)]
pub struct DirCursor {
    inner: Cursor,
}

impl DirCursor {
    pub fn key(&self) -> (Folder, &str) {
        let raw = self.inner.key();
        let folder = Folder(u32::from_be_bytes(
            raw[..4].try_into().expect("directory key shorter than a folder id"),
        ));
        let name = std::str::from_utf8(&raw[4..]).expect("directory names are UTF-8");
        (folder, name)
    }

    pub fn value(&self) -> Result<TreeValue> {
        TreeValue::decode(self.inner.value())
    }

    pub fn value_type(&self) -> Result<ValueType> {
        TreeValue::type_of(self.inner.value())
    }
}

pub struct DirectoryStructure {
    cache: Arc<CacheManager>,
    btree: BTree,
    max_folder_id: u32,
    free_store: Box<dyn FreeStore>,
}

impl DirectoryStructure {
    /// Creates an empty directory on a fresh tree.
    pub fn create(cache: Arc<CacheManager>, free_store: Box<dyn FreeStore>) -> Result<Self> {
        let btree = BTree::create(Arc::clone(&cache))?;
        Ok(Self {
            cache,
            btree,
            max_folder_id: 1,
            free_store,
        })
    }

    /// Attaches to a persisted directory.
    pub fn open(
        cache: Arc<CacheManager>,
        free_store: Box<dyn FreeStore>,
        root: PageIndex,
        max_folder_id: u32,
    ) -> Self {
        let btree = BTree::open(Arc::clone(&cache), root);
        Self {
            cache,
            btree,
            max_folder_id,
            free_store,
        }
    }

    /// The tree root, needed to reopen the directory later.
    pub fn root(&self) -> PageIndex {
        self.btree.root()
    }

    /// The folder-id watermark, needed to reopen the directory later.
    pub fn max_folder_id(&self) -> u32 {
        self.max_folder_id
    }

    /// Creates a sub-folder, or returns the existing one. `None` when the
    /// name is taken by something that is not a folder.
    pub fn make_sub_folder(&mut self, key: &DirectoryKey) -> Result<Option<Folder>> {
        let fresh = Folder(self.max_folder_id);
        let value = TreeValue::Folder(fresh).encode();

        match self.btree.insert_with(key.as_bytes(), &value, |_| false)? {
            InsertResult::Inserted => {
                self.max_folder_id += 1;
                Ok(Some(fresh))
            }
            InsertResult::Unchanged { current } => {
                match TreeValue::decode(current.value())? {
                    TreeValue::Folder(existing) => Ok(Some(existing)),
                    _ => Ok(None),
                }
            }
            InsertResult::Replaced { .. } => unreachable!("folder insert never replaces"),
        }
    }

    /// Looks up a sub-folder id.
    pub fn sub_folder(&self, key: &DirectoryKey) -> Result<Option<Folder>> {
        match self.btree.find(key.as_bytes())? {
            Some(cursor) => match TreeValue::decode(cursor.value())? {
                TreeValue::Folder(folder) => Ok(Some(folder)),
                _ => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Stores an attribute. Returns false when the name is occupied by a
    /// folder or a file.
    pub fn add_attribute(&mut self, key: &DirectoryKey, attribute: TreeValue) -> Result<bool> {
        let value = attribute.encode();
        let result = self.btree.insert_with(key.as_bytes(), &value, |current| {
            TreeValue::type_of(current).map(ValueType::is_attribute).unwrap_or(false)
        })?;
        Ok(!matches!(result, InsertResult::Unchanged { .. }))
    }

    /// Reads an attribute; folders and files are not attributes.
    pub fn get_attribute(&self, key: &DirectoryKey) -> Result<Option<TreeValue>> {
        match self.btree.find(key.as_bytes())? {
            Some(cursor) => {
                let value = TreeValue::decode(cursor.value())?;
                if value.value_type().is_attribute() {
                    Ok(Some(value))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    /// Returns the descriptor stored for a file entry.
    pub fn open_file(&self, key: &DirectoryKey) -> Result<Option<FileDescriptor>> {
        match self.btree.find(key.as_bytes())? {
            Some(cursor) => match TreeValue::decode(cursor.value())? {
                TreeValue::File(desc) => Ok(Some(desc)),
                _ => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Creates or truncates a file entry. An existing file's page chain
    /// goes to the free store. False when the name is occupied by a
    /// non-file.
    pub fn create_file(&mut self, key: &DirectoryKey) -> Result<bool> {
        let value = TreeValue::File(FileDescriptor::empty()).encode();
        let result = self.btree.insert_with(key.as_bytes(), &value, |current| {
            matches!(TreeValue::type_of(current), Ok(ValueType::File))
        })?;

        match result {
            InsertResult::Inserted => Ok(true),
            InsertResult::Replaced { before } => {
                if let TreeValue::File(desc) = TreeValue::decode(&before)? {
                    self.free_store.deallocate_file(desc);
                }
                Ok(true)
            }
            InsertResult::Unchanged { .. } => Ok(false),
        }
    }

    /// Returns the descriptor to append to, creating the entry if absent.
    /// `None` when the name is occupied by a non-file.
    pub fn append_file(&mut self, key: &DirectoryKey) -> Result<Option<FileDescriptor>> {
        let value = TreeValue::File(FileDescriptor::empty()).encode();
        let result = self.btree.insert_with(key.as_bytes(), &value, |_| false)?;

        match result {
            InsertResult::Inserted => Ok(Some(FileDescriptor::empty())),
            InsertResult::Unchanged { current } => match TreeValue::decode(current.value())? {
                TreeValue::File(desc) => Ok(Some(desc)),
                _ => Ok(None),
            },
            InsertResult::Replaced { .. } => unreachable!("append insert never replaces"),
        }
    }

    /// Replaces the descriptor of an existing file entry. False when the
    /// entry is missing or not a file.
    pub fn update_file(&mut self, key: &DirectoryKey, desc: FileDescriptor) -> Result<bool> {
        let value = TreeValue::File(desc).encode();
        let result = self.btree.insert_with(key.as_bytes(), &value, |current| {
            matches!(TreeValue::type_of(current), Ok(ValueType::File))
        })?;

        match result {
            InsertResult::Replaced { .. } => Ok(true),
            InsertResult::Unchanged { .. } => Ok(false),
            InsertResult::Inserted => {
                // there was nothing to update; undo the insert
                self.btree.remove(key.as_bytes())?;
                Ok(false)
            }
        }
    }

    /// Removes an entry; folders take their whole subtree with them.
    /// Returns the number of removed entries.
    pub fn remove(&mut self, key: &DirectoryKey) -> Result<usize> {
        self.remove_raw(key.as_bytes())
    }

    fn remove_raw(&mut self, key: &[u8]) -> Result<usize> {
        let Some(removed) = self.btree.remove(key)? else {
            return Ok(0);
        };

        match TreeValue::decode(&removed)? {
            TreeValue::Folder(folder) => Ok(self.remove_folder(folder)? + 1),
            TreeValue::File(desc) => {
                self.free_store.deallocate_file(desc);
                Ok(1)
            }
            _ => Ok(1),
        }
    }

    /// Removes every entry of a folder, recursing into sub-folders.
    pub fn remove_folder(&mut self, folder: Folder) -> Result<usize> {
        let prefix = DirectoryKey::folder_prefix(folder);

        let mut keys = Vec::new();
        let mut cursor = self.btree.begin(prefix.as_bytes())?;
        while let Some(current) = cursor {
            if !current.key().starts_with(prefix.as_bytes()) {
                break;
            }
            keys.push(current.key().to_vec());
            cursor = self.btree.next(current)?;
        }

        let mut removed = 0;
        for key in keys {
            removed += self.remove_raw(&key)?;
        }
        Ok(removed)
    }

    /// Returns a cursor at the exact entry, or `None`.
    pub fn find(&self, key: &DirectoryKey) -> Result<Option<DirCursor>> {
        Ok(self.btree.find(key.as_bytes())?.map(|inner| DirCursor { inner }))
    }

    /// Returns a cursor at the first entry at or after `key`.
    pub fn begin(&self, key: &DirectoryKey) -> Result<Option<DirCursor>> {
        Ok(self.btree.begin(key.as_bytes())?.map(|inner| DirCursor { inner }))
    }

    pub fn next(&self, cursor: DirCursor) -> Result<Option<DirCursor>> {
        Ok(self.btree.next(cursor.inner)?.map(|inner| DirCursor { inner }))
    }

    /// Commits the transaction: freed tree pages and the commit's diverted
    /// pages go to the free store, then the ordered commit runs.
    pub fn commit(&mut self) -> Result<()> {
        for page in self.btree.take_free_pages() {
            self.free_store.deallocate(page);
        }

        let handler = self.cache.build_commit_handler();
        let diverted = handler.diverted_page_ids();
        debug!("directory commit: {} diverted pages to the free store", diverted.len());
        for page in diverted {
            self.free_store.deallocate(page);
        }

        handler.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::free_store::MemFreeStore;
    use crate::storage::MemFile;

    fn directory() -> DirectoryStructure {
        let cache = Arc::new(CacheManager::new(Arc::new(MemFile::new())));
        DirectoryStructure::create(cache, Box::new(MemFreeStore::new())).unwrap()
    }

    #[test]
    fn make_sub_folder_returns_fresh_then_existing_id() {
        let mut dir = directory();
        let key = DirectoryKey::root("docs");

        let first = dir.make_sub_folder(&key).unwrap();
        assert_eq!(first, Some(Folder(1)));
        assert_eq!(dir.make_sub_folder(&key).unwrap(), first);
        assert_eq!(dir.sub_folder(&key).unwrap(), first);
    }

    #[test]
    fn folder_occupied_by_attribute_is_rejected() {
        let mut dir = directory();
        let key = DirectoryKey::root("name");

        dir.add_attribute(&key, TreeValue::Int(1)).unwrap();
        assert_eq!(dir.make_sub_folder(&key).unwrap(), None);
    }

    #[test]
    fn attributes_replace_attributes_but_not_folders() {
        let mut dir = directory();
        let folder_key = DirectoryKey::root("folder");
        let attr_key = DirectoryKey::root("attr");

        dir.make_sub_folder(&folder_key).unwrap();
        assert!(!dir.add_attribute(&folder_key, TreeValue::Int(1)).unwrap());

        assert!(dir.add_attribute(&attr_key, "first".into()).unwrap());
        assert!(dir.add_attribute(&attr_key, 2u64.into()).unwrap());
        assert_eq!(dir.get_attribute(&attr_key).unwrap(), Some(TreeValue::Int(2)));

        // folders are not attributes
        assert_eq!(dir.get_attribute(&folder_key).unwrap(), None);
    }

    #[test]
    fn nested_folders_and_recursive_remove() {
        let mut dir = directory();

        let docs = dir.make_sub_folder(&DirectoryKey::root("docs")).unwrap().unwrap();
        let img = dir.make_sub_folder(&DirectoryKey::new(docs, "img")).unwrap().unwrap();
        dir.add_attribute(&DirectoryKey::new(docs, "count"), 2u64.into()).unwrap();
        dir.add_attribute(&DirectoryKey::new(img, "dpi"), 300u64.into()).unwrap();

        // removes docs, docs/img, docs/count and img/dpi
        assert_eq!(dir.remove(&DirectoryKey::root("docs")).unwrap(), 4);
        assert_eq!(dir.sub_folder(&DirectoryKey::root("docs")).unwrap(), None);
        assert_eq!(dir.get_attribute(&DirectoryKey::new(docs, "count")).unwrap(), None);
    }

    #[test]
    fn file_lifecycle() {
        let mut dir = directory();
        let key = DirectoryKey::root("data.bin");

        assert!(dir.create_file(&key).unwrap());
        assert_eq!(dir.open_file(&key).unwrap(), Some(FileDescriptor::empty()));

        let desc = FileDescriptor { first: 4, last: 9, size: 20_000 };
        assert!(dir.update_file(&key, desc).unwrap());
        assert_eq!(dir.open_file(&key).unwrap(), Some(desc));
        assert_eq!(dir.append_file(&key).unwrap(), Some(desc));

        // create over an existing file releases the old chain
        assert!(dir.create_file(&key).unwrap());
        assert_eq!(dir.open_file(&key).unwrap(), Some(FileDescriptor::empty()));

        assert_eq!(dir.remove(&key).unwrap(), 1);
        assert_eq!(dir.open_file(&key).unwrap(), None);
    }

    #[test]
    fn update_file_without_entry_is_a_no_op() {
        let mut dir = directory();
        let key = DirectoryKey::root("missing");

        let desc = FileDescriptor { first: 1, last: 2, size: 3 };
        assert!(!dir.update_file(&key, desc).unwrap());
        assert!(dir.find(&key).unwrap().is_none());
    }

    #[test]
    fn update_file_does_not_touch_folders() {
        let mut dir = directory();
        let key = DirectoryKey::root("folder");
        dir.make_sub_folder(&key).unwrap();

        let desc = FileDescriptor { first: 1, last: 2, size: 3 };
        assert!(!dir.update_file(&key, desc).unwrap());
        assert!(dir.sub_folder(&key).unwrap().is_some());
    }

    #[test]
    fn cursor_walks_a_folder_in_name_order() {
        let mut dir = directory();

        dir.add_attribute(&DirectoryKey::root("b"), 2u64.into()).unwrap();
        dir.add_attribute(&DirectoryKey::root("a"), 1u64.into()).unwrap();
        dir.add_attribute(&DirectoryKey::root("c"), 3u64.into()).unwrap();

        let mut names = Vec::new();
        let mut cursor = dir.begin(&DirectoryKey::folder_prefix(Folder::ROOT)).unwrap();
        while let Some(current) = cursor {
            let (folder, name) = current.key();
            assert_eq!(folder, Folder::ROOT);
            names.push(name.to_string());
            cursor = dir.next(current).unwrap();
        }

        assert_eq!(names, ["a", "b", "c"]);
    }
}
