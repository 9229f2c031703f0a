//! In-memory page store for testing.

use crate::error::{StorageError, StorageResult};
use crate::store::{pages_for, validate_page_size, PageId, PageStore};
use parking_lot::RwLock;

/// An in-memory page store.
///
/// This store keeps every page in a single buffer and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral engines that don't need persistence
///
/// # Example
///
/// ```rust
/// use quill_storage::{InMemoryPageStore, PageStore};
///
/// let mut store = InMemoryPageStore::new(512).unwrap();
/// store.write_pages(0, &[7u8; 600]).unwrap();
/// assert_eq!(store.page_count(), 2);
/// ```
#[derive(Debug)]
pub struct InMemoryPageStore {
    page_size: usize,
    data: RwLock<Vec<u8>>,
}

impl InMemoryPageStore {
    /// Creates a new empty store with the given page size.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidPageSize`] for unsupported sizes.
    pub fn new(page_size: usize) -> StorageResult<Self> {
        validate_page_size(page_size)?;
        Ok(Self {
            page_size,
            data: RwLock::new(Vec::new()),
        })
    }

    /// Creates a store over pre-existing page data.
    ///
    /// Useful for testing recovery scenarios.
    ///
    /// # Errors
    ///
    /// Returns an error if the page size is invalid or `data` is not a whole
    /// number of pages.
    pub fn with_data(page_size: usize, data: Vec<u8>) -> StorageResult<Self> {
        validate_page_size(page_size)?;
        if data.len() % page_size != 0 {
            return Err(StorageError::Misaligned {
                len: data.len() as u64,
                page_size,
            });
        }
        Ok(Self {
            page_size,
            data: RwLock::new(data),
        })
    }

    /// Returns a copy of every page in the store.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl PageStore for InMemoryPageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> u64 {
        (self.data.read().len() / self.page_size) as u64
    }

    fn read_pages(&self, start: PageId, count: u64) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let page_count = (data.len() / self.page_size) as u64;
        let end = start.saturating_add(count);
        if end > page_count {
            return Err(StorageError::PageOutOfRange {
                start,
                count,
                page_count,
            });
        }

        let from = start as usize * self.page_size;
        let to = end as usize * self.page_size;
        Ok(data[from..to].to_vec())
    }

    fn write_pages(&mut self, start: PageId, bytes: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        let page_count = (data.len() / self.page_size) as u64;
        if start > page_count {
            return Err(StorageError::NonContiguousWrite { start, page_count });
        }

        let run = pages_for(bytes.len(), self.page_size) as usize * self.page_size;
        let from = start as usize * self.page_size;
        let to = from + run;
        if to > data.len() {
            data.resize(to, 0);
        }
        data[from..from + bytes.len()].copy_from_slice(bytes);
        data[from + bytes.len()..to].fill(0);
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        // Nothing buffered outside the vector
        Ok(())
    }

    fn truncate(&mut self, page_count: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let current = (data.len() / self.page_size) as u64;
        if page_count > current {
            return Err(StorageError::PageOutOfRange {
                start: current,
                count: page_count - current,
                page_count: current,
            });
        }
        data.truncate(page_count as usize * self.page_size);
        Ok(())
    }
}
