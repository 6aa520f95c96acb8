//! Directory layer end to end: namespace rules over a real cache manager,
//! commit wiring into the free store, and reopening a persisted directory.

use std::sync::Arc;

use compoundfs::{
    CacheManager, DirectoryKey, DirectoryStructure, FileDescriptor, FreeStore, MemFile,
    MemFreeStore, PageIndex, RawFile, TreeValue,
};

fn directory_over(file: &Arc<dyn RawFile>) -> DirectoryStructure {
    let cache = Arc::new(CacheManager::new(Arc::clone(file)));
    DirectoryStructure::create(cache, Box::new(MemFreeStore::new())).unwrap()
}

#[test]
fn folders_attributes_and_files_coexist() {
    let file: Arc<dyn RawFile> = Arc::new(MemFile::new());
    let mut dir = directory_over(&file);

    let docs = dir.make_sub_folder(&DirectoryKey::root("docs")).unwrap().unwrap();
    assert!(dir.create_file(&DirectoryKey::new(docs, "a.txt")).unwrap());
    assert!(dir
        .add_attribute(&DirectoryKey::new(docs, "owner"), "alice".into())
        .unwrap());
    assert!(dir
        .add_attribute(&DirectoryKey::new(docs, "revision"), 7u64.into())
        .unwrap());

    assert_eq!(
        dir.get_attribute(&DirectoryKey::new(docs, "owner")).unwrap(),
        Some(TreeValue::Str("alice".to_string()))
    );
    assert_eq!(
        dir.open_file(&DirectoryKey::new(docs, "a.txt")).unwrap(),
        Some(FileDescriptor::empty())
    );

    // names are per folder: the root has its own namespace
    assert!(dir.open_file(&DirectoryKey::root("a.txt")).unwrap().is_none());
}

#[test]
fn removing_a_folder_releases_contained_files() {
    let file: Arc<dyn RawFile> = Arc::new(MemFile::new());
    let mut dir = directory_over(&file);

    let data = dir.make_sub_folder(&DirectoryKey::root("data")).unwrap().unwrap();
    dir.create_file(&DirectoryKey::new(data, "one")).unwrap();
    dir.create_file(&DirectoryKey::new(data, "two")).unwrap();
    dir.update_file(
        &DirectoryKey::new(data, "one"),
        FileDescriptor { first: 5, last: 9, size: 12_000 },
    )
    .unwrap();
    dir.update_file(
        &DirectoryKey::new(data, "two"),
        FileDescriptor { first: 10, last: 11, size: 300 },
    )
    .unwrap();

    // folder entry + two file entries
    assert_eq!(dir.remove(&DirectoryKey::root("data")).unwrap(), 3);
}

#[test]
fn directory_survives_commit_and_reopen() {
    let file: Arc<dyn RawFile> = Arc::new(MemFile::new());

    let (root, max_folder_id, docs) = {
        let mut dir = directory_over(&file);
        let docs = dir.make_sub_folder(&DirectoryKey::root("docs")).unwrap().unwrap();
        dir.add_attribute(&DirectoryKey::new(docs, "pages"), 42u64.into()).unwrap();
        for i in 0..2000 {
            dir.add_attribute(&DirectoryKey::new(docs, &format!("attr{:04}", i)), (i as u64).into())
                .unwrap();
        }
        dir.commit().unwrap();
        (dir.root(), dir.max_folder_id(), docs)
    };

    let cache = Arc::new(CacheManager::new(Arc::clone(&file)));
    let dir = DirectoryStructure::open(cache, Box::new(MemFreeStore::new()), root, max_folder_id);

    assert_eq!(dir.sub_folder(&DirectoryKey::root("docs")).unwrap(), Some(docs));
    assert_eq!(
        dir.get_attribute(&DirectoryKey::new(docs, "pages")).unwrap(),
        Some(TreeValue::Int(42))
    );
    for i in (0..2000).step_by(97) {
        assert_eq!(
            dir.get_attribute(&DirectoryKey::new(docs, &format!("attr{:04}", i))).unwrap(),
            Some(TreeValue::Int(i as u64))
        );
    }
}

#[test]
fn second_transaction_changes_become_visible_after_commit() {
    let file: Arc<dyn RawFile> = Arc::new(MemFile::new());

    let (root, max_id) = {
        let mut dir = directory_over(&file);
        for i in 0..500 {
            dir.add_attribute(&DirectoryKey::root(&format!("key{:03}", i)), (i as u64).into())
                .unwrap();
        }
        dir.commit().unwrap();
        (dir.root(), dir.max_folder_id())
    };

    {
        let cache = Arc::new(CacheManager::new(Arc::clone(&file)));
        let mut dir =
            DirectoryStructure::open(cache, Box::new(MemFreeStore::new()), root, max_id);
        for i in 0..250 {
            assert_eq!(dir.remove(&DirectoryKey::root(&format!("key{:03}", i))).unwrap(), 1);
        }
        dir.add_attribute(&DirectoryKey::root("extra"), "late".into()).unwrap();
        dir.commit().unwrap();
    }

    let cache = Arc::new(CacheManager::new(Arc::clone(&file)));
    let dir = DirectoryStructure::open(cache, Box::new(MemFreeStore::new()), root, max_id);

    for i in 0..250 {
        assert!(dir
            .get_attribute(&DirectoryKey::root(&format!("key{:03}", i)))
            .unwrap()
            .is_none());
    }
    for i in 250..500 {
        assert_eq!(
            dir.get_attribute(&DirectoryKey::root(&format!("key{:03}", i))).unwrap(),
            Some(TreeValue::Int(i as u64))
        );
    }
    assert_eq!(
        dir.get_attribute(&DirectoryKey::root("extra")).unwrap(),
        Some(TreeValue::Str("late".to_string()))
    );
}

#[test]
fn commit_feeds_freed_and_diverted_pages_to_the_free_store() {
    let file: Arc<dyn RawFile> = Arc::new(MemFile::new());

    // shared counter so the store can be inspected after the move
    use std::sync::atomic::{AtomicUsize, Ordering};
    static FREED: AtomicUsize = AtomicUsize::new(0);

    struct SharedStore;
    impl FreeStore for SharedStore {
        fn deallocate(&mut self, _page: PageIndex) {
            FREED.fetch_add(1, Ordering::Relaxed);
        }
        fn deallocate_file(&mut self, _file: FileDescriptor) {}
    }

    let (root, max_id) = {
        let cache = Arc::new(CacheManager::new(Arc::clone(&file)));
        let mut dir = DirectoryStructure::create(cache, Box::new(SharedStore)).unwrap();
        for i in 0..2000 {
            dir.add_attribute(&DirectoryKey::root(&format!("key{:04}", i)), (i as u64).into())
                .unwrap();
        }
        dir.commit().unwrap();
        (dir.root(), dir.max_folder_id())
    };
    FREED.store(0, Ordering::Relaxed);

    // removing most entries merges nodes; commit hands the freed pages
    // and the eviction-diverted pages to the store
    let cache = Arc::new(CacheManager::with_capacity(Arc::clone(&file), 16));
    let mut dir = DirectoryStructure::open(cache, Box::new(SharedStore), root, max_id);
    for i in 0..1900 {
        dir.remove(&DirectoryKey::root(&format!("key{:04}", i))).unwrap();
    }
    dir.commit().unwrap();

    assert!(FREED.load(Ordering::Relaxed) > 0);
}
