//! # Quill Storage
//!
//! Page store trait and implementations for Quill.
//!
//! This crate provides the lowest-level storage abstraction for Quill.
//! Page stores are **opaque arrays of fixed-size pages** - they do not
//! interpret the bytes they hold.
//!
//! ## Design Principles
//!
//! - Stores address data by page id, never by byte offset
//! - Writes cover whole runs of contiguous pages and may grow the store
//!   by appending, but never leave holes
//! - No knowledge of tables, indexes, or transactions
//! - Must be `Send + Sync` so an engine can share one store between threads
//!
//! ## Available Stores
//!
//! - [`InMemoryPageStore`] - For testing and ephemeral engines
//! - [`FilePageStore`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use quill_storage::{InMemoryPageStore, PageStore};
//!
//! let mut store = InMemoryPageStore::new(4096).unwrap();
//! store.write_pages(0, b"hello pages").unwrap();
//! let page = store.read_pages(0, 1).unwrap();
//! assert_eq!(&page[..11], b"hello pages");
//! assert_eq!(page.len(), 4096);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FilePageStore;
pub use memory::InMemoryPageStore;
pub use store::{
    pages_for, validate_page_size, PageId, PageStore, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
    MIN_PAGE_SIZE,
};
