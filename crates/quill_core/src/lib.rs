//! # Quill Core
//!
//! Transactional storage contract for Quill, plus the engines that
//! implement it.
//!
//! This crate provides:
//! - The backend contract: [`Engine`], [`Transaction`], [`Table`], [`Index`]
//! - Per-call tuning hints ([`TuningContext`], the `fill_percent` hint)
//! - A closed error taxonomy ([`CoreError`], [`ErrorKind`])
//! - [`MemoryEngine`], a volatile engine
//! - [`PagedEngine`], an engine persisting to a [`quill_storage::PageStore`]
//!
//! ## Guarantees
//!
//! - At most one writable transaction per engine; see [`WriterPolicy`] for
//!   what a second writer does.
//! - Readers see the state committed before they began, no matter what
//!   commits afterwards.
//! - Committed and rolled-back transactions reject every further call.
//! - An engine refuses to close while transactions are still active.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod config;
mod cursor;
mod durability;
mod engine;
mod error;
mod stats;
mod traits;
mod transaction;
mod tuning;
mod types;
mod value;

pub use config::{EngineConfig, WriterPolicy};
pub use cursor::{IndexCursor, RecordCursor};
pub use engine::{MemoryEngine, PagedEngine};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use stats::{EngineStats, PageStats};
pub use traits::{Engine, Index, Table, Transaction};
pub use transaction::{IndexRef, MvccTransaction, TableRef, TransactionState};
pub use tuning::{TuningContext, DEFAULT_FILL_PERCENT, FILL_PERCENT};
pub use types::{RecordId, SequenceNumber, TransactionId};
pub use value::{IndexKey, Record, Value};

/// Re-export of the page store crate.
pub use quill_storage as storage;
