//! Configuration constants and runtime settings.

/// Size of a page in bytes (2KB).
///
/// Every on-disk region that holds page data, including the directory
/// page, is exactly this long.
pub const PAGE_SIZE: usize = 2048;

/// Size of the bootstrap header at file offset 0.
///
/// Only the first 8 bytes are used (the directory page offset, big-endian);
/// the rest is reserved and kept zeroed.
pub const HEADER_SIZE: usize = 64;

/// Default number of frames in the buffer pool.
pub const DEFAULT_POOL_SIZE: usize = 50;

/// Default history depth for the LRU-K replacer.
pub const DEFAULT_REPLACER_K: usize = 2;

/// Default number of disk scheduler worker threads.
pub const DEFAULT_DISK_WORKERS: usize = 1;

/// Runtime settings for a [`BufferPoolManager`](crate::buffer::BufferPoolManager).
///
/// # Example
/// ```
/// use pagepool::common::config::BufferPoolConfig;
///
/// let config = BufferPoolConfig {
///     pool_size: 8,
///     ..Default::default()
/// };
/// assert_eq!(config.replacer_k, 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Number of frames allocated up front.
    pub pool_size: usize,
    /// K in LRU-K: how many past accesses each frame remembers.
    pub replacer_k: usize,
    /// Worker threads serving disk requests.
    pub disk_workers: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            replacer_k: DEFAULT_REPLACER_K,
            disk_workers: DEFAULT_DISK_WORKERS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(PAGE_SIZE.is_power_of_two());
        assert_eq!(PAGE_SIZE, 2048);
    }

    #[test]
    fn test_header_holds_an_offset() {
        assert!(HEADER_SIZE >= std::mem::size_of::<u64>());
        assert!(HEADER_SIZE < PAGE_SIZE);
    }

    #[test]
    fn test_default_config() {
        let config = BufferPoolConfig::default();
        assert_eq!(config.pool_size, 50);
        assert_eq!(config.replacer_k, 2);
        assert_eq!(config.disk_workers, 1);
    }
}
