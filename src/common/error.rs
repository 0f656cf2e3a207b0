//! Error types for the page pool.

use thiserror::Error;

use super::PageId;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the disk manager, scheduler or buffer pool can report.
///
/// Nothing is retried internally; each variant reaches the caller as-is.
#[derive(Debug, Error)]
pub enum Error {
    /// Read, write, seek or sync failure on the backing file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The page is neither resident nor mapped on disk.
    #[error("{0} not found")]
    PageNotFound(PageId),

    /// The page is pinned and cannot be deleted.
    #[error("{0} is pinned")]
    PagePinned(PageId),

    /// Unpin was called on a page whose pin count is already zero.
    #[error("{0} is not pinned")]
    PageNotPinned(PageId),

    /// No free frame exists and every resident page is pinned.
    #[error("No free frames available in buffer pool")]
    PoolExhausted,

    /// Adding a mapping would overflow the single directory page.
    #[error("Directory page is full ({capacity} entries)")]
    DirectoryFull { capacity: usize },

    /// A payload longer than one page was supplied.
    #[error("Payload of {0} bytes exceeds page size")]
    PayloadTooLarge(usize),

    /// On-disk metadata could not be parsed.
    #[error("Corrupt state: {0}")]
    Corrupt(String),

    /// The disk scheduler has stopped accepting or completing requests.
    #[error("Disk scheduler is shut down")]
    SchedulerClosed,
}
