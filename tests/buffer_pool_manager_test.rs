//! Buffer Pool Manager Tests
//!
//! Scenario tests in the style of BusTub's buffer_pool_manager_test.cpp,
//! adapted to the pin/unpin API.

use pagepool::buffer::BufferPoolManager;
use pagepool::common::{Error, PageId};
use pagepool::storage::DiskManager;
use tempfile::tempdir;

const FRAMES: usize = 10;

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

/// Helper to write a string to page data.
fn copy_string(data: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    data[..bytes.len()].copy_from_slice(bytes);
    data[bytes.len()] = 0;
}

/// Helper to read a null-terminated string from page data.
fn read_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}

// ============================================================================
// BusTub: VeryBasicTest
// ============================================================================

#[test]
fn test_very_basic() {
    let (bpm, _dir) = create_bpm(FRAMES);
    let str_data = "Hello, world!";

    let pid = bpm.new_page(&[]).unwrap();
    bpm.unpin_page(pid, false).unwrap();

    {
        let mut guard = bpm.fetch_page_write(pid).unwrap();
        copy_string(guard.as_mut_slice(), str_data);
        assert_eq!(read_string(guard.as_slice()), str_data);
    }

    {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(read_string(guard.as_slice()), str_data);
    }

    let page = bpm.fetch_page(pid).unwrap();
    assert_eq!(read_string(page.data.as_slice()), str_data);
    bpm.unpin_page(pid, false).unwrap();

    assert!(bpm.delete_page(pid).is_ok());
}

// ============================================================================
// BusTub: PagePinEasyTest
// ============================================================================

#[test]
fn test_page_pin_easy() {
    let (bpm, _dir) = create_bpm(2);

    let pageid0 = bpm.new_page(b"page0").unwrap();
    let pageid1 = bpm.new_page(b"page1").unwrap();

    assert_eq!(bpm.get_pin_count(pageid0), Some(1));
    assert_eq!(bpm.get_pin_count(pageid1), Some(1));

    // All frames pinned - no room for a third page
    assert!(matches!(bpm.new_page(b"temp"), Err(Error::PoolExhausted)));

    bpm.unpin_page(pageid0, true).unwrap();
    assert_eq!(bpm.get_pin_count(pageid0), Some(0));
    bpm.unpin_page(pageid1, true).unwrap();
    assert_eq!(bpm.get_pin_count(pageid1), Some(0));

    // Two new pages push both originals out
    let temp1 = bpm.new_page(b"temp1").unwrap();
    let temp2 = bpm.new_page(b"temp2").unwrap();
    assert!(bpm.get_pin_count(pageid0).is_none());
    assert!(bpm.get_pin_count(pageid1).is_none());
    bpm.unpin_page(temp1, false).unwrap();
    bpm.unpin_page(temp2, false).unwrap();

    // Originals come back from disk and can be updated
    {
        let mut page0 = bpm.fetch_page_write(pageid0).unwrap();
        assert_eq!(read_string(page0.as_slice()), "page0");
        copy_string(page0.as_mut_slice(), "page0updated");

        let mut page1 = bpm.fetch_page_write(pageid1).unwrap();
        assert_eq!(read_string(page1.as_slice()), "page1");
        copy_string(page1.as_mut_slice(), "page1updated");

        assert_eq!(bpm.get_pin_count(pageid0), Some(1));
        assert_eq!(bpm.get_pin_count(pageid1), Some(1));
    }

    assert_eq!(bpm.get_pin_count(pageid0), Some(0));
    assert_eq!(bpm.get_pin_count(pageid1), Some(0));

    {
        let page0 = bpm.fetch_page_read(pageid0).unwrap();
        assert_eq!(read_string(page0.as_slice()), "page0updated");

        let page1 = bpm.fetch_page_read(pageid1).unwrap();
        assert_eq!(read_string(page1.as_slice()), "page1updated");
    }
}

// ============================================================================
// BusTub: PagePinMediumTest
// ============================================================================

#[test]
fn test_page_pin_medium() {
    let (bpm, _dir) = create_bpm(FRAMES);

    let hello = "Hello";
    let pid0 = {
        let mut page0 = bpm.new_page_write().unwrap();
        copy_string(page0.as_mut_slice(), hello);
        assert_eq!(read_string(page0.as_slice()), hello);
        page0.page_id()
    };

    // Fill the pool with pinned pages
    let mut pinned = Vec::new();
    for _ in 0..FRAMES {
        pinned.push(bpm.new_page(&[]).unwrap());
    }
    for &pid in &pinned {
        assert_eq!(bpm.get_pin_count(pid), Some(1));
    }

    // A full pool of pinned pages refuses new pages
    for _ in 0..FRAMES {
        assert!(matches!(bpm.new_page(&[]), Err(Error::PoolExhausted)));
    }

    // Unpin the first half
    for pid in pinned.drain(..FRAMES / 2) {
        bpm.unpin_page(pid, false).unwrap();
        assert_eq!(bpm.get_pin_count(pid), Some(0));
    }
    for &pid in &pinned {
        assert_eq!(bpm.get_pin_count(pid), Some(1));
    }

    // Reuse all but one of the freed frames
    for _ in 0..((FRAMES / 2) - 1) {
        pinned.push(bpm.new_page(&[]).unwrap());
    }

    // One frame left: page 0 can still be read back
    {
        let original = bpm.fetch_page_read(pid0).unwrap();
        assert_eq!(read_string(original.as_slice()), hello);
    }

    // Take the last frame; page 0 is now out of reach
    pinned.push(bpm.new_page(&[]).unwrap());
    assert!(matches!(bpm.fetch_page(pid0), Err(Error::PoolExhausted)));
}

// ============================================================================
// Eviction scenarios
// ============================================================================

/// Pool of two: A and B resident, A unpinned, C fetched from disk.
#[test]
fn test_fetch_miss_evicts_unpinned_page() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");

    let dm = DiskManager::create(&path).unwrap();
    let c = PageId::new(0);
    dm.write_page(c, b"page c").unwrap();
    let bpm = BufferPoolManager::new(2, dm);

    let a = bpm.new_page(b"page a").unwrap();
    let b = bpm.new_page(b"page b").unwrap();
    assert_ne!(a, c);
    assert_eq!(bpm.free_frame_count(), 0);

    bpm.unpin_page(a, false).unwrap();

    let page = bpm.fetch_page(c).unwrap();
    assert_eq!(read_string(page.data.as_slice()), "page c");
    assert_eq!(bpm.get_pin_count(a), None);
    assert_eq!(bpm.get_pin_count(b), Some(1));

    // A comes back through a disk read into a reused frame
    bpm.unpin_page(c, false).unwrap();
    let reads = bpm.stats().snapshot().pages_read;
    let page = bpm.fetch_page(a).unwrap();
    assert_eq!(read_string(page.data.as_slice()), "page a");
    assert_eq!(bpm.stats().snapshot().pages_read, reads + 1);
    assert_eq!(bpm.get_pin_count(c), None);
    assert_eq!(bpm.page_count(), 2);
}

/// Every frame pinned: fetching anything else fails and changes nothing.
#[test]
fn test_pinned_pool_is_exhausted() {
    let (bpm, _dir) = create_bpm(3);

    let pids: Vec<PageId> = (0u8..3).map(|i| bpm.new_page(&[i]).unwrap()).collect();
    let stranger = pids[0];
    bpm.unpin_page(stranger, false).unwrap();
    bpm.flush_page(stranger).unwrap();
    bpm.fetch_page(stranger).unwrap();

    let outsider = PageId::new(500);
    bpm.disk_manager().write_page(outsider, b"outside").unwrap();

    let before = bpm.stats().snapshot().evictions;
    assert!(matches!(bpm.fetch_page(outsider), Err(Error::PoolExhausted)));

    assert_eq!(bpm.stats().snapshot().evictions, before);
    assert_eq!(bpm.page_count(), 3);
    assert_eq!(bpm.free_frame_count(), 0);
    for pid in pids {
        assert_eq!(bpm.get_pin_count(pid), Some(1));
    }
}

#[test]
fn test_delete_then_reuse_frame() {
    let (bpm, _dir) = create_bpm(1);

    let pid = bpm.new_page(b"first").unwrap();
    assert!(matches!(bpm.delete_page(pid), Err(Error::PagePinned(_))));
    bpm.unpin_page(pid, false).unwrap();
    bpm.delete_page(pid).unwrap();
    assert_eq!(bpm.free_frame_count(), 1);

    // The freed frame serves the next page without an eviction
    let next = bpm.new_page(b"second").unwrap();
    assert_ne!(next, pid);
    assert_eq!(bpm.stats().snapshot().evictions, 0);
}
