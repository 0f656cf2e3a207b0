//! Page types and layout.
//!
//! - [`Page`] - The raw 2KB data container
//! - [`DirectoryPage`] - The persisted PageId → offset mapping

mod directory;
#[allow(clippy::module_inception)]
mod page;

pub use directory::DirectoryPage;
pub use page::Page;
