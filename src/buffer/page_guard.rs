//! Pinned, locked access to a resident page.
//!
//! A guard owns two things: one pin on the frame and the frame's page lock.
//! Dropping it gives them back in a fixed order:
//!
//! 1. a [`PageWriteGuard`] marks the frame dirty, still under the lock
//! 2. the page lock is released
//! 3. the pin is released, which takes the pool latch
//!
//! Step 1 pairs with the pool's write-back, which clears the dirty flag
//! under the read lock: a concurrent flush either copies the new bytes or
//! finds the page dirty again. Step 2 comes before step 3 because an
//! unpinned frame can be picked as a victim at once, and the evicting
//! thread reads the page while holding the latch.

use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId};
use crate::storage::page::Page;

use super::buffer_pool_manager::BufferPoolManager;
use super::Frame;

/// The pin half of a guard.
struct Pin<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
}

impl<'a> Pin<'a> {
    fn frame(&self) -> &'a Frame {
        self.bpm.frame(self.frame_id)
    }

    fn release(&self) {
        if let Err(e) = self.bpm.unpin_page_internal(self.frame_id) {
            log::error!("guard for {} failed to unpin: {e}", self.page_id);
        }
    }
}

/// Shared access to a pinned page.
///
/// Any number of read guards may coexist on one page.
pub struct PageReadGuard<'a> {
    lock: ManuallyDrop<RwLockReadGuard<'a, Page>>,
    pin: Pin<'a>,
}

impl<'a> PageReadGuard<'a> {
    /// Lock the page of a frame the caller has already pinned.
    pub(crate) fn new(bpm: &'a BufferPoolManager, frame_id: FrameId, page_id: PageId) -> Self {
        let pin = Pin {
            bpm,
            frame_id,
            page_id,
        };
        let lock = ManuallyDrop::new(pin.frame().page());
        Self { lock, pin }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.pin.frame_id
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: `lock` is never touched again after this.
        unsafe { ManuallyDrop::drop(&mut self.lock) };
        self.pin.release();
    }
}

/// Exclusive access to a pinned page.
///
/// The page counts as modified once the guard is dropped, whether or not
/// it was written through.
///
/// # Example
/// ```
/// use pagepool::{BufferPoolManager, DiskManager};
///
/// let dir = tempfile::tempdir()?;
/// let bpm = BufferPoolManager::new(4, DiskManager::create(dir.path().join("doc.db"))?);
///
/// let page_id = {
///     let mut guard = bpm.new_page_write()?;
///     guard.as_mut_slice()[0] = 0xFF;
///     guard.page_id()
/// };
/// assert_eq!(bpm.is_dirty(page_id), Some(true));
/// assert_eq!(bpm.get_pin_count(page_id), Some(0));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct PageWriteGuard<'a> {
    lock: ManuallyDrop<RwLockWriteGuard<'a, Page>>,
    pin: Pin<'a>,
}

impl<'a> PageWriteGuard<'a> {
    /// Lock the page of a frame the caller has already pinned.
    pub(crate) fn new(bpm: &'a BufferPoolManager, frame_id: FrameId, page_id: PageId) -> Self {
        let pin = Pin {
            bpm,
            frame_id,
            page_id,
        };
        let lock = ManuallyDrop::new(pin.frame().page_mut());
        Self { lock, pin }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.pin.frame_id
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        &mut self.lock
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.pin.frame().mark_dirty();
        // SAFETY: `lock` is never touched again after this.
        unsafe { ManuallyDrop::drop(&mut self.lock) };
        self.pin.release();
    }
}
