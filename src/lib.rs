//! pagepool - a database buffer pool over a single-file page store.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           pagepool                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │               Buffer Pool (buffer/)                     │   │
//! │  │   BufferPoolManager + Frame + PageGuards + Statistics   │   │
//! │  │              LRU-K replacer (replacer/)                 │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │   DiskScheduler (storage/)  - worker threads, per-page  │   │
//! │  │                              FIFO, oneshot completions  │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │   DiskManager (storage/)  - header → directory page →   │   │
//! │  │                             appended data pages         │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, Error, config)
//! - [`buffer`] - Buffer pool management and the LRU-K replacer
//! - [`storage`] - Disk manager, disk scheduler and page formats
//!
//! # Quick Start
//! ```no_run
//! use pagepool::{BufferPoolManager, DiskManager};
//!
//! let dm = DiskManager::open_or_create("my_database.db")?;
//! let bpm = BufferPoolManager::new(50, dm);
//!
//! let page_id = bpm.new_page(b"first page")?;
//! bpm.unpin_page(page_id, false)?;
//! bpm.close()?;
//! # Ok::<(), pagepool::Error>(())
//! ```

pub mod buffer;
pub mod common;
pub mod storage;

pub use common::config::{BufferPoolConfig, PAGE_SIZE};
pub use common::{Error, FrameId, PageId, Result};

pub use buffer::{BufferPoolManager, BufferPoolStats, Frame, PageSnapshot, StatsSnapshot};
pub use storage::page::{DirectoryPage, Page};
pub use storage::{DiskManager, DiskScheduler};
