//! Storage layer - disk I/O and page formats.
//!
//! - [`DiskManager`] - Header, directory page and data pages in one file
//! - [`DiskScheduler`] - Worker threads serving queued disk requests
//! - [`page`] - Page and directory page types

mod disk_manager;
mod disk_scheduler;
pub mod page;

pub use disk_manager::DiskManager;
pub use disk_scheduler::{Completion, DiskRequest, DiskScheduler};
