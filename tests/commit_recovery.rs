//! Commit ordering and crash recovery: committed state visibility across
//! cache managers, log replay after simulated crashes, and the interaction
//! of eviction-time diversion with the commit protocol.

use std::sync::Arc;

use compoundfs::{
    recover, BTree, CacheManager, InsertResult, MemFile, MmapFile, OpenMode, PageIndex, RawFile,
};

fn read_byte(file: &Arc<dyn RawFile>, idx: PageIndex) -> u8 {
    let mut buf = [0u8; 1];
    file.read_page(idx, 0, &mut buf).unwrap();
    buf[0]
}

fn copy_raw_page(file: &Arc<dyn RawFile>, from: PageIndex, to: PageIndex) {
    let mut buf = [0u8; 4096];
    file.read_page(from, 0, &mut buf).unwrap();
    file.write_page(to, 0, &buf).unwrap();
}

/// Writes pages 0..10 with byte values 1..=10 and commits them.
fn committed_baseline(file: &Arc<dyn RawFile>) {
    let cm = CacheManager::new(Arc::clone(file));
    for i in 0..10u8 {
        let mut p = cm.new_page().unwrap();
        p.data_mut()[0] = i + 1;
    }
    cm.build_commit_handler().commit().unwrap();
}

#[test]
fn evicted_dirty_pages_reach_their_originals_through_commit() {
    let file: Arc<dyn RawFile> = Arc::new(MemFile::new());
    committed_baseline(&file);

    // modify every page, force the modifications out through eviction
    let cm = CacheManager::new(Arc::clone(&file));
    for i in 0..10u8 {
        let handle = cm.load_page(i as PageIndex).unwrap();
        let mut p = cm.make_page_writable(&handle);
        p.data_mut()[0] = i + 11;
    }
    cm.trim(0).unwrap();

    // before commit the originals still carry the committed values and the
    // new content lives at the diverted indexes
    for i in 0..10u8 {
        assert_eq!(read_byte(&file, i as PageIndex), i + 1);
    }

    cm.build_commit_handler().commit().unwrap();

    // a fresh cache manager over the file observes the new values
    let cm2 = CacheManager::new(Arc::clone(&file));
    for i in 0..10u8 {
        let p = cm2.load_page(i as PageIndex).unwrap();
        assert_eq!(p.data()[0], i + 11);
    }
    assert!(cm2.read_logs().unwrap().is_empty());
}

#[test]
fn cached_dirty_pages_reach_their_originals_through_commit() {
    let file: Arc<dyn RawFile> = Arc::new(MemFile::new());
    committed_baseline(&file);

    // modify without any eviction: the dirty pages stay cached
    let cm = CacheManager::new(Arc::clone(&file));
    for i in 0..10u8 {
        let handle = cm.load_page(i as PageIndex).unwrap();
        let mut p = cm.make_page_writable(&handle);
        p.data_mut()[0] = i + 21;
    }
    cm.build_commit_handler().commit().unwrap();

    let cm2 = CacheManager::new(Arc::clone(&file));
    for i in 0..10u8 {
        assert_eq!(cm2.load_page(i as PageIndex).unwrap().data()[0], i + 21);
    }
}

#[test]
fn discarding_the_cache_before_commit_keeps_the_committed_state() {
    let file: Arc<dyn RawFile> = Arc::new(MemFile::new());
    committed_baseline(&file);

    {
        let cm = CacheManager::new(Arc::clone(&file));
        for i in 0..10u8 {
            let handle = cm.load_page(i as PageIndex).unwrap();
            let mut p = cm.make_page_writable(&handle);
            p.data_mut()[0] = 0xEE;
        }
        cm.trim(0).unwrap();
        // no commit: the transaction is abandoned
    }

    let cm = CacheManager::new(Arc::clone(&file));
    for i in 0..10u8 {
        assert_eq!(cm.load_page(i as PageIndex).unwrap().data()[0], i + 1);
    }
}

#[test]
fn commit_truncates_the_copy_and_log_tail() {
    let file: Arc<dyn RawFile> = Arc::new(MemFile::new());
    committed_baseline(&file);
    assert_eq!(file.page_count(), 10);

    let cm = CacheManager::new(Arc::clone(&file));
    for i in 0..10u8 {
        let handle = cm.load_page(i as PageIndex).unwrap();
        let mut p = cm.make_page_writable(&handle);
        p.data_mut()[0] = i + 11;
    }
    cm.trim(0).unwrap();
    assert_eq!(file.page_count(), 20); // ten diverted pages appended

    cm.build_commit_handler().commit().unwrap();

    // the copies and logs are gone again; the diverted pages remain for
    // the free store to recycle
    assert_eq!(file.page_count(), 20);
    let cm2 = CacheManager::new(Arc::clone(&file));
    assert!(cm2.read_logs().unwrap().is_empty());
}

#[test]
fn two_commits_in_a_row_are_valid() {
    let file: Arc<dyn RawFile> = Arc::new(MemFile::new());
    committed_baseline(&file);

    let cm = CacheManager::new(Arc::clone(&file));
    cm.build_commit_handler().commit().unwrap();

    let cm2 = CacheManager::new(Arc::clone(&file));
    for i in 0..10u8 {
        assert_eq!(cm2.load_page(i as PageIndex).unwrap().data()[0], i + 1);
    }
}

#[test]
fn recovery_rolls_an_interrupted_commit_back() {
    let file: Arc<dyn RawFile> = Arc::new(MemFile::new());
    committed_baseline(&file);

    // a transaction modifies everything; eviction diverts the new content
    let cm = CacheManager::new(Arc::clone(&file));
    for i in 0..10u8 {
        let handle = cm.load_page(i as PageIndex).unwrap();
        let mut p = cm.make_page_writable(&handle);
        p.data_mut()[0] = i + 101;
    }
    cm.trim(0).unwrap();
    let handler = cm.build_commit_handler();

    // replay the first half of the commit ordering by hand: durable
    // copies of the committed content, then durable logs
    let copies = file.new_interval(10).unwrap();
    let mut pairs = Vec::new();
    for i in 0..10u32 {
        copy_raw_page(&file, i, copies.begin() + i);
        pairs.push((i, copies.begin() + i));
    }
    file.flush().unwrap();
    handler.write_logs(&pairs).unwrap();
    file.flush().unwrap();

    // crash while overwriting the originals: half of them already carry
    // the new content
    for i in 0..5u32 {
        copy_raw_page(&file, 10 + i, i);
    }
    drop(handler);

    assert_eq!(read_byte(&file, 0), 101);
    assert_eq!(read_byte(&file, 9), 10);

    let replayed = recover(&file).unwrap();
    assert_eq!(replayed, 10);

    // the last committed state is back, the logs are gone
    for i in 0..10u8 {
        assert_eq!(read_byte(&file, i as PageIndex), i + 1);
    }
    let cm2 = CacheManager::new(Arc::clone(&file));
    assert!(cm2.read_logs().unwrap().is_empty());

    // running recovery again is a no-op
    assert_eq!(recover(&file).unwrap(), 0);
}

#[test]
fn recovery_without_logs_is_a_no_op() {
    let file: Arc<dyn RawFile> = Arc::new(MemFile::new());
    committed_baseline(&file);

    assert_eq!(recover(&file).unwrap(), 0);
    for i in 0..10u8 {
        assert_eq!(read_byte(&file, i as PageIndex), i + 1);
    }
}

#[test]
fn btree_state_survives_commit_and_reopen() {
    let file: Arc<dyn RawFile> = Arc::new(MemFile::new());

    let root;
    {
        let cache = Arc::new(CacheManager::with_capacity(Arc::clone(&file), 32));
        let mut bt = BTree::create(Arc::clone(&cache)).unwrap();
        root = bt.root();

        // enough entries to force evictions through the small cache
        for i in 0..5000 {
            let key = format!("key{:05}", i);
            bt.insert(key.as_bytes(), format!("value{:05}", i).as_bytes()).unwrap();
        }
        cache.build_commit_handler().commit().unwrap();
    }

    // second transaction: replace some values, remove others
    {
        let cache = Arc::new(CacheManager::with_capacity(Arc::clone(&file), 32));
        let mut bt = BTree::open(Arc::clone(&cache), root);

        for i in 0..1000 {
            let key = format!("key{:05}", i);
            let res = bt.insert(key.as_bytes(), format!("fresh{:05}", i).as_bytes()).unwrap();
            assert!(matches!(res, InsertResult::Replaced { .. }), "missing {}", key);
        }
        for i in 4000..5000 {
            let key = format!("key{:05}", i);
            assert!(bt.remove(key.as_bytes()).unwrap().is_some(), "missing {}", key);
        }
        cache.build_commit_handler().commit().unwrap();
    }

    // a reader over the committed file sees exactly the final state
    let cache = Arc::new(CacheManager::with_capacity(Arc::clone(&file), 32));
    let bt = BTree::open(Arc::clone(&cache), root);

    for i in 0..5000 {
        let key = format!("key{:05}", i);
        let found = bt.find(key.as_bytes()).unwrap();
        if i < 1000 {
            assert_eq!(found.unwrap().value(), format!("fresh{:05}", i).as_bytes());
        } else if i < 4000 {
            assert_eq!(found.unwrap().value(), format!("value{:05}", i).as_bytes());
        } else {
            assert!(found.is_none(), "{} should be gone", key);
        }
    }
}

#[test]
fn btree_commit_round_trip_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.cfs");

    let root;
    {
        let file: Arc<dyn RawFile> =
            Arc::new(MmapFile::open(&path, OpenMode::Create).unwrap());
        let cache = Arc::new(CacheManager::new(Arc::clone(&file)));
        let mut bt = BTree::create(Arc::clone(&cache)).unwrap();
        root = bt.root();

        for i in 0..2000 {
            let key = format!("key{:05}", i);
            bt.insert(key.as_bytes(), key.as_bytes()).unwrap();
        }
        cache.build_commit_handler().commit().unwrap();
    }

    let file: Arc<dyn RawFile> = Arc::new(MmapFile::open(&path, OpenMode::Open).unwrap());
    assert_eq!(recover(&file).unwrap(), 0);

    let cache = Arc::new(CacheManager::new(Arc::clone(&file)));
    let bt = BTree::open(Arc::clone(&cache), root);
    for i in 0..2000 {
        let key = format!("key{:05}", i);
        assert!(bt.find(key.as_bytes()).unwrap().is_some(), "lost {}", key);
    }
}
