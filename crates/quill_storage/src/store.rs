//! Page store trait definition.

use crate::error::{StorageError, StorageResult};

/// Identifier of a page: its position in the store, starting at zero.
pub type PageId = u64;

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Smallest supported page size in bytes.
pub const MIN_PAGE_SIZE: usize = 512;

/// Largest supported page size in bytes.
pub const MAX_PAGE_SIZE: usize = 64 * 1024;

/// A fixed-page storage device for Quill.
///
/// Page stores are **opaque**. The engine decides what a page means; the
/// store only guarantees that a run of pages reads back exactly as written.
///
/// # Invariants
///
/// - Every page is exactly [`PageStore::page_size`] bytes
/// - `write_pages` may start anywhere in `0..=page_count`; writing at
///   `page_count` appends, anything past it is rejected
/// - A partial trailing page in a write is zero-padded
/// - `sync` makes every previous write durable
///
/// # Implementors
///
/// - [`super::InMemoryPageStore`] - For testing
/// - [`super::FilePageStore`] - For persistent storage
pub trait PageStore: Send + Sync {
    /// Returns the fixed page size in bytes.
    fn page_size(&self) -> usize;

    /// Returns the number of pages currently in the store.
    fn page_count(&self) -> u64;

    /// Reads `count` contiguous pages starting at `start`.
    ///
    /// The returned buffer is `count * page_size` bytes long.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::PageOutOfRange`] if the run extends past the
    /// last page, or an I/O error.
    fn read_pages(&self, start: PageId, count: u64) -> StorageResult<Vec<u8>>;

    /// Writes `data` as a run of pages starting at `start`.
    ///
    /// The run covers `pages_for(data.len(), page_size)` pages. The store
    /// grows if the run extends past its current end.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NonContiguousWrite`] if `start` is beyond the
    /// current page count, or an I/O error.
    fn write_pages(&mut self, start: PageId, data: &[u8]) -> StorageResult<()>;

    /// Makes all previous writes durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Shrinks the store to `page_count` pages.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::PageOutOfRange`] if `page_count` is larger than
    /// the current count, or an I/O error.
    fn truncate(&mut self, page_count: u64) -> StorageResult<()>;
}

/// Returns the number of pages needed to hold `len` bytes (at least one).
#[must_use]
pub fn pages_for(len: usize, page_size: usize) -> u64 {
    len.div_ceil(page_size).max(1) as u64
}

/// Checks that `size` is a power of two between [`MIN_PAGE_SIZE`] and [`MAX_PAGE_SIZE`].
///
/// # Errors
///
/// Returns [`StorageError::InvalidPageSize`] otherwise.
pub fn validate_page_size(size: usize) -> StorageResult<()> {
    if size.is_power_of_two() && (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&size) {
        Ok(())
    } else {
        Err(StorageError::InvalidPageSize { size })
    }
}
