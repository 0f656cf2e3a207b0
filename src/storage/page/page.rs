//! Page - the fundamental 2KB unit of storage.
//!
//! A [`Page`] is a raw byte array that serves as the unit of I/O between
//! disk and memory. Pages live in [`Frame`](crate::buffer::Frame)s inside
//! the buffer pool and travel through the disk scheduler by value.

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, Result};

/// A page of data (2KB, 2KB-aligned).
///
/// Payloads shorter than a page are always zero-padded, so a page read back
/// from disk compares equal to the page that was written.
///
/// # Example
/// ```
/// use pagepool::Page;
///
/// let page = Page::from_bytes(b"hello").unwrap();
/// assert_eq!(&page.as_slice()[..5], b"hello");
/// assert_eq!(page.as_slice()[5], 0);
/// ```
#[repr(align(2048))]
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    /// Create a new zeroed page.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    /// Build a page from a payload of at most `PAGE_SIZE` bytes.
    ///
    /// # Errors
    /// Returns `Error::PayloadTooLarge` if `payload` is longer than a page.
    pub fn from_bytes(payload: &[u8]) -> Result<Self> {
        let mut page = Page::new();
        page.fill_from(payload)?;
        Ok(page)
    }

    /// Overwrite the page with `payload`, zeroing the remainder.
    pub fn fill_from(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > PAGE_SIZE {
            return Err(Error::PayloadTooLarge(payload.len()));
        }
        self.data[..payload.len()].copy_from_slice(payload);
        self.data[payload.len()..].fill(0);
        Ok(())
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero out the entire page.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self.data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        f.debug_struct("Page").field("used", &used).finish()
    }
}
