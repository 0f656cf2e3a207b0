//! Integration tests for the buffer pool manager.
//!
//! These tests verify cross-component behavior that unit tests don't cover.

use pagepool::buffer::BufferPoolManager;
use pagepool::common::config::BufferPoolConfig;
use pagepool::common::PageId;
use pagepool::storage::DiskManager;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

#[static_init::constructor(0)]
extern "C" fn _log_init() {
    log_init::init();
}

fn create_bpm(pool_size: usize) -> (BufferPoolManager, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let dm = DiskManager::create(&path).unwrap();
    (BufferPoolManager::new(pool_size, dm), dir)
}

/// Test data persistence across multiple eviction cycles.
#[test]
fn test_data_persistence_across_evictions() {
    let (bpm, _dir) = create_bpm(2);

    // Create 5 pages with unique data (forces evictions)
    let mut page_ids = vec![];
    for i in 0u8..5 {
        let mut guard = bpm.new_page_write().unwrap();
        guard.as_mut_slice()[0] = i;
        guard.as_mut_slice()[1] = i.wrapping_mul(3);
        page_ids.push(guard.page_id());
    }
    assert!(bpm.stats().snapshot().dirty_evictions >= 3);

    // Read all back - verifies evicted pages were written back
    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(guard.as_slice()[0], i as u8);
        assert_eq!(guard.as_slice()[1], (i as u8).wrapping_mul(3));
    }
}

/// Test flush and reload across BPM instances.
#[test]
fn test_flush_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let data = b"persistent!";

    let pid;

    // First session: create and write
    {
        let dm = DiskManager::create(&path).unwrap();
        let bpm = BufferPoolManager::new(10, dm);

        let mut guard = bpm.new_page_write().unwrap();
        pid = guard.page_id();
        guard.as_mut_slice()[..data.len()].copy_from_slice(data);
        drop(guard);

        bpm.flush_all_pages().unwrap();
    }

    // Second session: verify data
    {
        let dm = DiskManager::open(&path).unwrap();
        assert!(dm.contains(pid));
        let bpm = BufferPoolManager::new(10, dm);

        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(&guard.as_slice()[..data.len()], data);
    }
}

/// Pages that were only ever evicted, never explicitly flushed, survive a
/// reopen because the directory is persisted with every write.
#[test]
fn test_directory_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let config = BufferPoolConfig {
        pool_size: 3,
        ..Default::default()
    };

    let mut page_ids = vec![];
    {
        let bpm = BufferPoolManager::open(&path, config).unwrap();
        for i in 0u8..20 {
            let pid = bpm.new_page(&[i; 16]).unwrap();
            bpm.unpin_page(pid, false).unwrap();
            page_ids.push(pid);
        }
        bpm.close().unwrap();
    }

    let bpm = BufferPoolManager::open(&path, config).unwrap();
    assert_eq!(bpm.disk_manager().page_count(), 20);

    for (i, &pid) in page_ids.iter().enumerate() {
        let page = bpm.fetch_page(pid).unwrap();
        assert_eq!(&page.data.as_slice()[..16], &[i as u8; 16]);
        assert!(!page.is_dirty);
        bpm.unpin_page(pid, false).unwrap();
    }

    // Fresh ids continue past everything already on disk
    assert_eq!(bpm.new_page(b"").unwrap(), PageId::new(20));
}

/// A deleted page can still be fetched from its last flushed image.
#[test]
fn test_delete_keeps_flushed_image() {
    let (bpm, _dir) = create_bpm(4);

    let pid = bpm.new_page(b"version 1").unwrap();
    bpm.flush_page(pid).unwrap();

    {
        let mut guard = bpm.fetch_page_write(pid).unwrap();
        guard.as_mut_slice()[..9].copy_from_slice(b"version 2");
    }
    bpm.unpin_page(pid, false).unwrap();
    bpm.delete_page(pid).unwrap();

    let page = bpm.fetch_page(pid).unwrap();
    assert_eq!(&page.data.as_slice()[..9], b"version 1");
}

/// Test concurrent writers to different pages.
#[test]
fn test_concurrent_writers() {
    let (bpm, _dir) = create_bpm(10);
    let bpm = Arc::new(bpm);

    let page_ids: Vec<PageId> = (0..5)
        .map(|_| bpm.new_page_write().unwrap().page_id())
        .collect();

    let mut handles = vec![];

    for (i, pid) in page_ids.iter().enumerate() {
        let bpm_clone = Arc::clone(&bpm);
        let pid = *pid;

        handles.push(thread::spawn(move || {
            for j in 0..50 {
                let mut guard = bpm_clone.fetch_page_write(pid).unwrap();
                guard.as_mut_slice()[0] = ((i * 50 + j) % 256) as u8;
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    // Verify each page has last written value
    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(guard.as_slice()[0], ((i * 50 + 49) % 256) as u8);
    }
}

/// Threads churn through more pages than frames with several disk workers.
#[test]
fn test_concurrent_churn_with_disk_workers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let config = BufferPoolConfig {
        pool_size: 8,
        replacer_k: 2,
        disk_workers: 4,
    };
    let bpm = Arc::new(BufferPoolManager::open(&path, config).unwrap());

    let page_ids: Vec<PageId> = (0u8..32)
        .map(|i| {
            let pid = bpm.new_page(&[i]).unwrap();
            bpm.unpin_page(pid, false).unwrap();
            pid
        })
        .collect();
    let page_ids = Arc::new(page_ids);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let bpm = Arc::clone(&bpm);
            let page_ids = Arc::clone(&page_ids);
            thread::spawn(move || {
                for round in 0..50 {
                    let idx = (t * 7 + round * 3) % page_ids.len();
                    let pid = page_ids[idx];
                    // Pool is big enough that four pinned pages never exhaust it
                    let guard = bpm.fetch_page_read(pid).unwrap();
                    assert_eq!(guard.as_slice()[0], idx as u8);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let stats = bpm.stats().snapshot();
    assert!(stats.evictions > 0);
    assert_eq!(bpm.evictable_count(), bpm.page_count());
}

/// Test stats accuracy under load.
#[test]
fn test_stats_accuracy() {
    let (bpm, _dir) = create_bpm(2);

    let pid = bpm.new_page_write().unwrap().page_id();

    // Multiple fetches = cache hits
    for _ in 0..5 {
        let _ = bpm.fetch_page_read(pid).unwrap();
    }

    let stats = bpm.stats().snapshot();
    assert_eq!(stats.cache_hits, 5);
    assert_eq!(stats.cache_misses, 0);

    // Force eviction
    let _ = bpm.new_page_write().unwrap();
    let _ = bpm.new_page_write().unwrap();

    let stats = bpm.stats().snapshot();
    assert!(stats.evictions >= 1);
    assert!(stats.pages_written >= 1);

    bpm.stats().reset();
    assert_eq!(bpm.stats().snapshot().evictions, 0);
}
