//! Error types for page store operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for page store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during page store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read pages beyond the end of the store.
    #[error("pages {start}..{} out of range: store holds {page_count} pages", start + count)]
    PageOutOfRange {
        /// First requested page.
        start: u64,
        /// Number of requested pages.
        count: u64,
        /// Current number of pages in the store.
        page_count: u64,
    },

    /// A write would leave a gap of unwritten pages.
    #[error("write at page {start} would leave a hole: store holds {page_count} pages")]
    NonContiguousWrite {
        /// First page of the write.
        start: u64,
        /// Current number of pages in the store.
        page_count: u64,
    },

    /// The page size is not a power of two within the supported range.
    #[error("invalid page size {size}")]
    InvalidPageSize {
        /// The rejected page size.
        size: usize,
    },

    /// The backing file is not a whole number of pages long.
    #[error("store length {len} is not a multiple of page size {page_size}")]
    Misaligned {
        /// Length of the backing file in bytes.
        len: u64,
        /// Configured page size.
        page_size: usize,
    },

    /// Another process holds the store's exclusive lock.
    #[error("page store locked by another process: {path}")]
    Locked {
        /// Path of the locked file.
        path: PathBuf,
    },
}
