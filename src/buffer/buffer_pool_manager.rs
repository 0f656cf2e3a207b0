//! Buffer Pool Manager - the core page caching layer.
//!
//! The [`BufferPoolManager`] provides:
//! - Page caching between disk and memory
//! - Pin-based reference counting
//! - LRU-K eviction with write-back of dirty victims
//! - Disk I/O routed through a [`DiskScheduler`]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::buffer::replacer::LruKReplacer;
use crate::buffer::{BufferPoolStats, Frame, PageReadGuard, PageSnapshot, PageWriteGuard};
use crate::common::config::BufferPoolConfig;
use crate::common::{Error, FrameId, PageId, Result};
use crate::storage::page::Page;
use crate::storage::{DiskManager, DiskScheduler};

/// Manages a pool of buffer frames for caching disk pages.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                    BufferPoolManager                        │
/// │  ┌─────────────── latch: Mutex<PoolState> ───────────────┐  │
/// │  │ page_table       free_list          replacer          │  │
/// │  │ PageId → Fid     VecDeque<FrameId>  LruKReplacer      │  │
/// │  └───────────────────────────────────────────────────────┘  │
/// │  ┌───────────────────────────────────┐  ┌───────────────┐   │
/// │  │        frames: Vec<Frame>         │  │ DiskScheduler │   │
/// │  │  [Frame0] [Frame1] [Frame2] ...   │  │ → DiskManager │   │
/// │  └───────────────────────────────────┘  └───────────────┘   │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// Page table, free list, replacer and every pin-count change sit under one
/// latch, so a frame can never be pinned and chosen as a victim at once, and
/// two fetches of the same missing page cannot both load it. Page bytes are
/// only touched through a frame's own `RwLock`, and never while the latch is
/// held on behalf of a pinned frame.
///
/// # Usage
/// ```no_run
/// use pagepool::{BufferPoolManager, DiskManager};
///
/// let dm = DiskManager::open_or_create("test.db")?;
/// let bpm = BufferPoolManager::new(10, dm);
///
/// let page_id = bpm.new_page(b"hello")?;
/// bpm.unpin_page(page_id, false)?;
///
/// let page = bpm.fetch_page(page_id)?;
/// assert_eq!(&page.data.as_slice()[..5], b"hello");
/// bpm.unpin_page(page_id, false)?;
/// # Ok::<(), pagepool::Error>(())
/// ```
pub struct BufferPoolManager {
    /// Fixed pool of frames allocated at startup.
    frames: Vec<Frame>,

    latch: Mutex<PoolState>,

    scheduler: DiskScheduler,

    /// Next id handed out by `new_page`.
    next_page_id: AtomicU64,

    stats: BufferPoolStats,

    pool_size: usize,
}

/// Everything that must change together when frames change hands.
struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page, handed out front to back.
    free_list: VecDeque<FrameId>,
    replacer: LruKReplacer,
}

impl BufferPoolManager {
    /// Create a buffer pool with `pool_size` frames and default settings.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Self {
        Self::with_config(
            BufferPoolConfig {
                pool_size,
                ..Default::default()
            },
            disk_manager,
        )
    }

    /// Create a buffer pool from explicit settings.
    ///
    /// # Panics
    /// Panics if `pool_size`, `replacer_k` or `disk_workers` is 0.
    pub fn with_config(config: BufferPoolConfig, disk_manager: DiskManager) -> Self {
        assert!(config.pool_size > 0, "pool_size must be > 0");

        let next_page_id = disk_manager.next_page_id();
        let frames: Vec<Frame> = (0..config.pool_size).map(|_| Frame::new()).collect();
        let free_list: VecDeque<FrameId> = (0..config.pool_size).map(FrameId::new).collect();

        Self {
            frames,
            latch: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(config.pool_size),
                free_list,
                replacer: LruKReplacer::new(config.pool_size, config.replacer_k),
            }),
            scheduler: DiskScheduler::new(disk_manager, config.disk_workers),
            next_page_id: AtomicU64::new(next_page_id.0),
            stats: BufferPoolStats::new(),
            pool_size: config.pool_size,
        }
    }

    /// Open (or create) the page file at `path` and put a pool in front of it.
    pub fn open<P: AsRef<Path>>(path: P, config: BufferPoolConfig) -> Result<Self> {
        let disk_manager = DiskManager::open_or_create(path)?;
        Ok(Self::with_config(config, disk_manager))
    }

    // ========================================================================
    // Public API: Fetch and unpin
    // ========================================================================

    /// Pin a page and return a copy of it.
    ///
    /// Loads the page from disk on a miss, evicting another page if no frame
    /// is free. Every successful fetch must be matched by
    /// [`unpin_page`](Self::unpin_page).
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page is neither resident nor on disk
    /// - `Error::PoolExhausted` if every frame is pinned
    /// - I/O errors from the read or from writing back a dirty victim
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageSnapshot> {
        let frame_id = self.fetch_frame(page_id)?;

        // Pinned, so the frame still holds this page
        self.frames[frame_id.0]
            .snapshot()
            .ok_or(Error::PageNotFound(page_id))
    }

    /// Fetch a page for reading (shared access).
    ///
    /// The page stays pinned until the guard drops.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame_id = self.fetch_frame(page_id)?;
        Ok(PageReadGuard::new(self, frame_id, page_id))
    }

    /// Fetch a page for writing (exclusive access).
    ///
    /// The page is marked dirty and unpinned when the guard drops.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.fetch_frame(page_id)?;
        Ok(PageWriteGuard::new(self, frame_id, page_id))
    }

    /// Release one pin on a page.
    ///
    /// `is_dirty` is sticky: passing `true` marks the page dirty until it is
    /// written back, and passing `false` never clears it. When the last pin
    /// goes, the page becomes an eviction candidate.
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page is not resident
    /// - `Error::PageNotPinned` if its pin count is already zero
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<()> {
        let mut state = self.latch.lock();
        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(Error::PageNotFound(page_id))?;

        self.unpin_frame(&mut state, frame_id, page_id, is_dirty)
    }

    // ========================================================================
    // Public API: Create and delete pages
    // ========================================================================

    /// Allocate a fresh page id holding `payload`, zero-padded.
    ///
    /// The page is resident, pinned once and dirty; nothing touches disk
    /// until it is flushed or evicted.
    ///
    /// # Errors
    /// - `Error::PayloadTooLarge` if `payload` is longer than a page
    /// - `Error::PoolExhausted` if every frame is pinned
    pub fn new_page(&self, payload: &[u8]) -> Result<PageId> {
        let (page_id, _) = self.new_frame(payload)?;
        Ok(page_id)
    }

    /// Allocate a fresh zeroed page and return a write guard for it.
    pub fn new_page_write(&self) -> Result<PageWriteGuard<'_>> {
        let (page_id, frame_id) = self.new_frame(&[])?;
        Ok(PageWriteGuard::new(self, frame_id, page_id))
    }

    /// Drop a page from the buffer pool and free its frame.
    ///
    /// Unflushed changes are discarded. Whatever was last written to disk
    /// for this id stays there.
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page is not resident
    /// - `Error::PagePinned` if anyone still pins it
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.latch.lock();

        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(Error::PageNotFound(page_id))?;

        let frame = &self.frames[frame_id.0];
        if frame.is_pinned() {
            return Err(Error::PagePinned(page_id));
        }

        state.page_table.remove(&page_id);
        state.replacer.remove(frame_id);
        frame.reset();
        state.free_list.push_back(frame_id);

        Ok(())
    }

    // ========================================================================
    // Public API: Flush pages
    // ========================================================================

    /// Write a resident page to disk if it is dirty, pinned or not.
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page is not resident
    /// - Errors from the disk write (the page stays dirty)
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        // Pin for the duration so the frame cannot be evicted or reused
        let frame_id = {
            let mut state = self.latch.lock();
            let frame_id = *state
                .page_table
                .get(&page_id)
                .ok_or(Error::PageNotFound(page_id))?;
            if self.frames[frame_id.0].pin() == 1 {
                state.replacer.set_evictable(frame_id, false);
            }
            frame_id
        };

        let written = self.write_back(frame_id, page_id);

        let mut state = self.latch.lock();
        self.unpin_frame(&mut state, frame_id, page_id, false)?;
        written.map(|_| ())
    }

    /// Write every dirty resident page to disk.
    ///
    /// Stops at the first failing write.
    pub fn flush_all_pages(&self) -> Result<()> {
        let page_ids: Vec<PageId> = self.latch.lock().page_table.keys().copied().collect();

        for page_id in page_ids {
            match self.flush_page(page_id) {
                // Deleted or evicted (and thus written back) meanwhile
                Ok(()) | Err(Error::PageNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Flush everything, then drain and stop the disk scheduler.
    pub fn close(self) -> Result<()> {
        self.flush_all_pages()?;
        self.scheduler.shutdown();
        Ok(())
    }

    // ========================================================================
    // Public API: Stats and info
    // ========================================================================

    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.latch.lock().free_list.len()
    }

    /// Number of resident pages.
    pub fn page_count(&self) -> usize {
        self.latch.lock().page_table.len()
    }

    /// Number of frames the replacer may currently evict.
    pub fn evictable_count(&self) -> usize {
        self.latch.lock().replacer.size()
    }

    /// Pin count of a resident page, or `None` if it is not resident.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.latch.lock();
        let frame_id = state.page_table.get(&page_id)?;
        Some(self.frames[frame_id.0].pin_count())
    }

    /// Dirty flag of a resident page, or `None` if it is not resident.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let state = self.latch.lock();
        let frame_id = state.page_table.get(&page_id)?;
        Some(self.frames[frame_id.0].is_dirty())
    }

    pub fn disk_manager(&self) -> &DiskManager {
        self.scheduler.disk_manager()
    }

    // ========================================================================
    // Internal: Used by page guards
    // ========================================================================

    #[inline]
    pub(crate) fn frame(&self, frame_id: FrameId) -> &Frame {
        &self.frames[frame_id.0]
    }

    /// Release a guard's pin. Guards set the dirty flag themselves, under
    /// the page lock, before calling this.
    pub(crate) fn unpin_page_internal(&self, frame_id: FrameId) -> Result<()> {
        let mut state = self.latch.lock();
        let page_id = self.frames[frame_id.0].page_id().unwrap_or(PageId::INVALID);

        self.unpin_frame(&mut state, frame_id, page_id, false)
    }

    // ========================================================================
    // Internal: Core fetch logic
    // ========================================================================

    /// Pin a page into some frame, loading it on a miss.
    fn fetch_frame(&self, page_id: PageId) -> Result<FrameId> {
        let mut state = self.latch.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.pin_frame(&mut state, frame_id);
            BufferPoolStats::bump(&self.stats.cache_hits);
            return Ok(frame_id);
        }

        BufferPoolStats::bump(&self.stats.cache_misses);

        // Never evict on behalf of a page that does not exist
        if !self.scheduler.disk_manager().contains(page_id) {
            return Err(Error::PageNotFound(page_id));
        }
        let frame_id = self.acquire_frame(&mut state)?;

        // The latch stays held across the read so no one else loads this page
        let page = match self.scheduler.read_page(page_id) {
            Ok(page) => page,
            Err(e) => {
                state.free_list.push_front(frame_id);
                return Err(e);
            }
        };
        BufferPoolStats::bump(&self.stats.pages_read);

        self.install(&mut state, frame_id, page_id, page);
        Ok(frame_id)
    }

    fn new_frame(&self, payload: &[u8]) -> Result<(PageId, FrameId)> {
        let page = Page::from_bytes(payload)?;

        let mut state = self.latch.lock();
        let frame_id = self.acquire_frame(&mut state)?;
        let page_id = PageId::new(self.next_page_id.fetch_add(1, Ordering::Relaxed));

        self.install(&mut state, frame_id, page_id, page);
        self.frames[frame_id.0].mark_dirty();

        Ok((page_id, frame_id))
    }

    /// Load `page` into an empty frame, map it and pin it once.
    fn install(&self, state: &mut PoolState, frame_id: FrameId, page_id: PageId, page: Page) {
        let frame = &self.frames[frame_id.0];

        *frame.page_mut() = page;
        frame.set_page_id(Some(page_id));
        frame.clear_dirty();

        state.page_table.insert(page_id, frame_id);
        self.pin_frame(state, frame_id);
    }

    fn pin_frame(&self, state: &mut PoolState, frame_id: FrameId) {
        state.replacer.record_access(frame_id);
        if self.frames[frame_id.0].pin() == 1 {
            state.replacer.set_evictable(frame_id, false);
        }
    }

    fn unpin_frame(
        &self,
        state: &mut PoolState,
        frame_id: FrameId,
        page_id: PageId,
        is_dirty: bool,
    ) -> Result<()> {
        let frame = &self.frames[frame_id.0];
        let remaining = frame.unpin().ok_or(Error::PageNotPinned(page_id))?;

        if is_dirty {
            frame.mark_dirty();
        }
        if remaining == 0 {
            state.replacer.set_evictable(frame_id, true);
        }

        Ok(())
    }

    // ========================================================================
    // Internal: Frame allocation and eviction
    // ========================================================================

    /// Take a free frame, or evict a victim and hand back its frame.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        // Only peek: the victim leaves the replacer once its write-back lands
        let frame_id = state.replacer.peek_victim().ok_or(Error::PoolExhausted)?;
        let frame = &self.frames[frame_id.0];

        if let Some(old_page_id) = frame.page_id() {
            match self.write_back(frame_id, old_page_id) {
                Ok(true) => BufferPoolStats::bump(&self.stats.dirty_evictions),
                Ok(false) => {}
                Err(e) => {
                    log::warn!("evicting {old_page_id} from {frame_id} aborted: {e}");
                    return Err(e);
                }
            }
            state.page_table.remove(&old_page_id);
            log::debug!("evicted {old_page_id} from {frame_id}");
        }
        state.replacer.remove(frame_id);

        frame.set_page_id(None);
        frame.clear_dirty();
        BufferPoolStats::bump(&self.stats.evictions);

        Ok(frame_id)
    }

    /// Write a frame's page to disk if dirty. Returns whether it wrote.
    fn write_back(&self, frame_id: FrameId, page_id: PageId) -> Result<bool> {
        let frame = &self.frames[frame_id.0];
        if !frame.is_dirty() {
            return Ok(false);
        }

        // Clear under the read lock: a writer that slips in after the copy
        // re-marks the page when its guard drops.
        let data = {
            let page = frame.page();
            frame.clear_dirty();
            page.clone()
        };

        if let Err(e) = self.scheduler.write_page(page_id, data) {
            frame.mark_dirty();
            return Err(e);
        }

        BufferPoolStats::bump(&self.stats.pages_written);
        Ok(true)
    }
}
