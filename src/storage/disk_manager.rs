//! Disk Manager - single-file page store with two-level addressing.
//!
//! The [`DiskManager`] owns the backing file and its directory:
//! - Bootstrapping the header and directory page
//! - Reading and writing data pages by logical id
//! - Appending new data pages at the end of the file

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::common::config::{HEADER_SIZE, PAGE_SIZE};
use crate::common::{Error, PageId, Result};
use crate::storage::page::{DirectoryPage, Page};

/// Manages the page file for one database.
///
/// # File Layout
/// ```text
/// ┌──────────┬────────────────┬─────┬─────────┬─────────┬─────┐
/// │  Header  │ Directory Page │ pad │ Data 0  │ Data 1  │ ... │
/// │  (64B)   │     (2KB)      │     │  (2KB)  │  (2KB)  │     │
/// └──────────┴────────────────┴─────┴─────────┴─────────┴─────┘
/// ```
/// The header holds the directory page's offset as a big-endian `u64`; an
/// all-zero header means the directory has not been created yet. Data pages
/// are appended at `PAGE_SIZE`-aligned offsets in first-write order, so a
/// page's position on disk says nothing about its id.
///
/// # Thread Safety
/// All state sits behind one mutex, so `&DiskManager` can be shared between
/// disk scheduler workers.
///
/// # Durability
/// Every write is followed by `fsync()`. A new mapping is persisted by
/// rewriting the directory page right after the data page it points at.
/// There is no log: a crash between the two leaves the data page orphaned.
pub struct DiskManager {
    state: Mutex<DiskFile>,
}

struct DiskFile {
    file: File,
    directory: DirectoryPage,
    directory_offset: u64,
    /// Where the next newly mapped data page goes.
    next_offset: u64,
}

impl DiskManager {
    /// Create a new database file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        Self::bootstrap(file)
    }

    /// Open an existing database file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist, or `Error::Corrupt` if its
    /// header or directory page cannot be parsed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::bootstrap(file)
    }

    /// Open a database file, creating it if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Self::bootstrap(file)
    }

    /// Load the directory named by the header, creating both if the header
    /// is still zeroed.
    fn bootstrap(mut file: File) -> Result<Self> {
        let mut file_len = file.metadata()?.len();
        if file_len < HEADER_SIZE as u64 {
            write_at(&mut file, 0, &[0u8; HEADER_SIZE])?;
            file.sync_all()?;
            file_len = HEADER_SIZE as u64;
        }

        let mut header = [0u8; HEADER_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header)?;

        let (directory, directory_offset) = if header.iter().all(|&b| b == 0) {
            let directory = DirectoryPage::new();
            let offset = HEADER_SIZE as u64;

            write_at(&mut file, offset, directory.encode().as_slice())?;
            file.sync_all()?;
            write_at(&mut file, 0, &encode_header(offset))?;
            file.sync_all()?;

            file_len = file_len.max(offset + PAGE_SIZE as u64);
            log::debug!("created directory page at offset {offset}");
            (directory, offset)
        } else {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&header[..8]);
            let offset = u64::from_be_bytes(raw);

            let fits = offset
                .checked_add(PAGE_SIZE as u64)
                .is_some_and(|end| offset >= HEADER_SIZE as u64 && end <= file_len);
            if !fits {
                return Err(Error::Corrupt(format!(
                    "header points at directory offset {offset}, file is {file_len} bytes"
                )));
            }

            let mut page = Page::new();
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(page.as_mut_slice())?;
            let directory = DirectoryPage::decode(page.as_slice())?;

            log::debug!(
                "loaded directory page at offset {offset} with {} entries",
                directory.len()
            );
            (directory, offset)
        };

        // Decoding guarantees every mapped page ends below u64::MAX
        let mapped_end = directory
            .iter()
            .map(|(_, off)| off + PAGE_SIZE as u64)
            .max()
            .unwrap_or(0);
        if mapped_end > file_len {
            return Err(Error::Corrupt(format!(
                "directory maps a page ending at {mapped_end}, file is {file_len} bytes"
            )));
        }

        // The directory itself was bounds-checked against file_len above
        let next_offset = align_up(file_len.max(directory_offset + PAGE_SIZE as u64))?;

        Ok(Self {
            state: Mutex::new(DiskFile {
                file,
                directory,
                directory_offset,
                next_offset,
            }),
        })
    }

    /// Read a page from disk.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page was never written.
    pub fn read_page(&self, page_id: PageId) -> Result<Page> {
        let mut state = self.state.lock();
        let offset = state
            .directory
            .get(page_id)
            .ok_or(Error::PageNotFound(page_id))?;

        let mut page = Page::new();
        state.file.seek(SeekFrom::Start(offset))?;
        state.file.read_exact(page.as_mut_slice())?;

        Ok(page)
    }

    /// Write a page to disk, zero-padding `data` to `PAGE_SIZE`.
    ///
    /// The first write of a page id appends a fresh data page and persists
    /// the updated directory; later writes overwrite in place.
    ///
    /// # Errors
    /// - `Error::PayloadTooLarge` if `data` is longer than a page
    /// - `Error::DirectoryFull` if a new mapping no longer fits the directory
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        let page = Page::from_bytes(data)?;
        let mut state = self.state.lock();

        if let Some(offset) = state.directory.get(page_id) {
            write_at(&mut state.file, offset, page.as_slice())?;
            state.file.sync_all()?;
            return Ok(());
        }

        let offset = state.next_offset;
        let mut directory = state.directory.clone();
        directory.insert(page_id, offset)?;

        write_at(&mut state.file, offset, page.as_slice())?;
        state.file.sync_all()?;

        let directory_offset = state.directory_offset;
        write_at(&mut state.file, directory_offset, directory.encode().as_slice())?;
        state.file.sync_all()?;

        state.directory = directory;
        state.next_offset = offset + PAGE_SIZE as u64;
        Ok(())
    }

    /// Number of pages mapped in the directory.
    pub fn page_count(&self) -> usize {
        self.state.lock().directory.len()
    }

    /// Check whether a page has ever been written.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.state.lock().directory.contains(page_id)
    }

    /// File offset of a page's data, if it has one.
    pub fn offset_of(&self, page_id: PageId) -> Option<u64> {
        self.state.lock().directory.get(page_id)
    }

    /// One past the largest mapped page id.
    pub fn next_page_id(&self) -> PageId {
        self.state
            .lock()
            .directory
            .max_page_id()
            .map_or(PageId::new(0), |pid| pid.next())
    }

    /// File offset of the directory page.
    pub fn directory_offset(&self) -> u64 {
        self.state.lock().directory_offset
    }

    /// Current size of the backing file in bytes.
    pub fn file_size(&self) -> Result<u64> {
        Ok(self.state.lock().file.metadata()?.len())
    }
}

fn encode_header(directory_offset: u64) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[..8].copy_from_slice(&directory_offset.to_be_bytes());
    header
}

fn write_at(file: &mut File, offset: u64, bytes: &[u8]) -> Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    Ok(())
}

fn align_up(offset: u64) -> Result<u64> {
    offset
        .checked_next_multiple_of(PAGE_SIZE as u64)
        .ok_or_else(|| Error::Corrupt(format!("no page-aligned offset past {offset}")))
}
