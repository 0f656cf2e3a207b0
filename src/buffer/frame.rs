//! Frame - a slot in the buffer pool.
//!
//! A [`Frame`] holds a [`Page`] plus the metadata the pool tracks for it:
//! which page is loaded, how many callers pin it, and whether it is dirty.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;
use crate::storage::page::Page;

/// A frame in the buffer pool.
///
/// # Thread Safety
/// - `page`: `RwLock`, so flushes and readers always see whole pages
/// - `page_id`: `Mutex`
/// - `pin_count`, `is_dirty`: atomics
///
/// The buffer pool only changes `page_id` and `pin_count` while holding its
/// own latch; the atomics just let readers peek without taking it.
pub struct Frame {
    page: RwLock<Page>,
    page_id: Mutex<Option<PageId>>,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
}

/// Copy of a resident page and its frame metadata at fetch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    pub page_id: PageId,
    pub data: Page,
    pub is_dirty: bool,
    pub pin_count: u32,
}

impl Frame {
    /// Create a new empty frame.
    pub fn new() -> Self {
        Self {
            page: RwLock::new(Page::new()),
            page_id: Mutex::new(None),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    // ========================================================================
    // Page access (RwLock)
    // ========================================================================

    #[inline]
    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    #[inline]
    pub fn page_mut(&self) -> RwLockWriteGuard<'_, Page> {
        self.page.write()
    }

    // ========================================================================
    // Page ID management
    // ========================================================================

    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        *self.page_id.lock()
    }

    #[inline]
    pub fn set_page_id(&self, page_id: Option<PageId>) {
        *self.page_id.lock() = page_id;
    }

    // ========================================================================
    // Pin count operations
    // ========================================================================

    /// Increment the pin count. Returns the new pin count.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrement the pin count. Returns the new pin count, or `None` (leaving
    /// the count at zero) if the frame was not pinned.
    #[inline]
    pub fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| count.checked_sub(1))
            .ok()
            .map(|old| old - 1)
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    // ========================================================================
    // Dirty flag operations
    // ========================================================================

    #[inline]
    pub fn mark_dirty(&self) {
        self.is_dirty.store(true, Ordering::Release);
    }

    #[inline]
    pub fn clear_dirty(&self) {
        self.is_dirty.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    // ========================================================================
    // Frame state queries
    // ========================================================================

    /// Check if the frame is empty (no page loaded).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.page_id().is_none()
    }

    /// A frame can be evicted when it holds a page nobody has pinned.
    #[inline]
    pub fn is_evictable(&self) -> bool {
        self.page_id().is_some() && !self.is_pinned()
    }

    /// Copy the page and its metadata, or `None` for an empty frame.
    pub fn snapshot(&self) -> Option<PageSnapshot> {
        let page_id = self.page_id()?;
        let data = self.page().clone();
        Some(PageSnapshot {
            page_id,
            data,
            is_dirty: self.is_dirty(),
            pin_count: self.pin_count(),
        })
    }

    /// Reset the frame to empty state.
    pub fn reset(&self) {
        self.page_mut().reset();
        self.set_page_id(None);
        self.pin_count.store(0, Ordering::Relaxed);
        self.clear_dirty();
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}
