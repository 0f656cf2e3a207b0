//! Directory page - the persisted map from page ids to file offsets.

use std::collections::BTreeMap;

use crate::common::config::{HEADER_SIZE, PAGE_SIZE};
use crate::common::{Error, PageId, Result};

use super::Page;

/// Maps every allocated [`PageId`] to the byte offset of its data page.
///
/// The whole directory is stored in a single page, which caps how many
/// pages one file can address at [`DirectoryPage::CAPACITY`].
///
/// # Layout
/// ```text
/// Offset  Size   Field
/// ------  ----   -----
/// 0       4      magic (little-endian)
/// 4       4      entry count n (little-endian)
/// 8       4      CRC32 of the entry bytes (little-endian)
/// 12      16·n   entries: page_id u64, offset u64 (little-endian, sorted by id)
/// ```
/// Bytes past the last entry are zero.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirectoryPage {
    entries: BTreeMap<PageId, u64>,
}

impl DirectoryPage {
    pub const MAGIC: u32 = 0x5044_4952;

    pub const OFFSET_MAGIC: usize = 0;
    pub const OFFSET_COUNT: usize = 4;
    pub const OFFSET_CHECKSUM: usize = 8;
    pub const OFFSET_ENTRIES: usize = 12;

    /// Encoded size of one `(page_id, offset)` pair.
    pub const ENTRY_SIZE: usize = 16;

    /// Most mappings that fit in one page.
    pub const CAPACITY: usize = (PAGE_SIZE - Self::OFFSET_ENTRIES) / Self::ENTRY_SIZE;

    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the offset of a page.
    #[inline]
    pub fn get(&self, page_id: PageId) -> Option<u64> {
        self.entries.get(&page_id).copied()
    }

    #[inline]
    pub fn contains(&self, page_id: PageId) -> bool {
        self.entries.contains_key(&page_id)
    }

    /// Record the offset of a page.
    ///
    /// Replacing an existing mapping always succeeds; adding a new one fails
    /// with `Error::DirectoryFull` (leaving the directory untouched) once the
    /// page is at capacity.
    pub fn insert(&mut self, page_id: PageId, offset: u64) -> Result<()> {
        if !self.entries.contains_key(&page_id) && self.entries.len() >= Self::CAPACITY {
            return Err(Error::DirectoryFull {
                capacity: Self::CAPACITY,
            });
        }
        self.entries.insert(page_id, offset);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Largest mapped page id, if any.
    pub fn max_page_id(&self) -> Option<PageId> {
        self.entries.keys().next_back().copied()
    }

    /// Iterate mappings in page id order.
    pub fn iter(&self) -> impl Iterator<Item = (PageId, u64)> + '_ {
        self.entries.iter().map(|(&pid, &off)| (pid, off))
    }

    /// Serialize into a full page.
    pub fn encode(&self) -> Page {
        let mut page = Page::new();
        let data = page.as_mut_slice();

        let mut pos = Self::OFFSET_ENTRIES;
        for (&page_id, &offset) in &self.entries {
            data[pos..pos + 8].copy_from_slice(&page_id.0.to_le_bytes());
            data[pos + 8..pos + 16].copy_from_slice(&offset.to_le_bytes());
            pos += Self::ENTRY_SIZE;
        }

        let checksum = crc32fast::hash(&data[Self::OFFSET_ENTRIES..pos]);
        data[Self::OFFSET_MAGIC..Self::OFFSET_MAGIC + 4].copy_from_slice(&Self::MAGIC.to_le_bytes());
        data[Self::OFFSET_COUNT..Self::OFFSET_COUNT + 4]
            .copy_from_slice(&(self.entries.len() as u32).to_le_bytes());
        data[Self::OFFSET_CHECKSUM..Self::OFFSET_CHECKSUM + 4].copy_from_slice(&checksum.to_le_bytes());

        page
    }

    /// Parse a directory from page bytes.
    ///
    /// # Errors
    /// Returns `Error::Corrupt` on a bad magic number, an impossible entry
    /// count, a checksum mismatch, a duplicated page id or an entry whose
    /// offset cannot hold a data page.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < PAGE_SIZE {
            return Err(Error::Corrupt(format!(
                "directory page is {} bytes, expected {}",
                data.len(),
                PAGE_SIZE
            )));
        }

        let magic = read_u32(data, Self::OFFSET_MAGIC);
        if magic != Self::MAGIC {
            return Err(Error::Corrupt(format!("bad directory magic {magic:#010x}")));
        }

        let count = read_u32(data, Self::OFFSET_COUNT) as usize;
        if count > Self::CAPACITY {
            return Err(Error::Corrupt(format!(
                "directory claims {count} entries, capacity is {}",
                Self::CAPACITY
            )));
        }

        let end = Self::OFFSET_ENTRIES + count * Self::ENTRY_SIZE;
        let stored = read_u32(data, Self::OFFSET_CHECKSUM);
        if stored != crc32fast::hash(&data[Self::OFFSET_ENTRIES..end]) {
            return Err(Error::Corrupt("directory checksum mismatch".to_string()));
        }

        let mut entries = BTreeMap::new();
        for pos in (Self::OFFSET_ENTRIES..end).step_by(Self::ENTRY_SIZE) {
            let page_id = PageId::new(read_u64(data, pos));
            let offset = read_u64(data, pos + 8);
            if !Self::is_data_offset(offset) {
                return Err(Error::Corrupt(format!(
                    "{page_id} mapped to invalid offset {offset}"
                )));
            }
            if entries.insert(page_id, offset).is_some() {
                return Err(Error::Corrupt(format!("{page_id} mapped twice")));
            }
        }

        Ok(Self { entries })
    }

    /// Data pages are page-aligned, start past the header and directory
    /// page, and must end inside the addressable range.
    fn is_data_offset(offset: u64) -> bool {
        let page = PAGE_SIZE as u64;
        offset >= (HEADER_SIZE + PAGE_SIZE) as u64
            && offset % page == 0
            && offset.checked_add(page).is_some()
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(buf)
}
