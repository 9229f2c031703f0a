//! Commit-time persistence.
//!
//! Every engine keeps its visible state in memory as a `Catalog`. A
//! durability backend is told about each successful writable commit before
//! the new state is published, and may refuse it by returning an error.
//!
//! - `Volatile` keeps nothing; the state dies with the engine.
//! - `PagedDurability` writes changed tables and indexes copy-on-write to a
//!   [`quill_storage::PageStore`], honouring the fill-percent hint.

mod paged;

pub(crate) use paged::PagedDurability;

use crate::catalog::Catalog;
use crate::error::CoreResult;
use crate::stats::PageStats;
use crate::transaction::ChangeSet;
use tracing::trace;

/// Persistence hook invoked by the engine.
pub(crate) trait Durability: Send + Sync {
    /// Makes `catalog` durable. `changes` lists what differs from the last
    /// persisted catalog.
    fn persist(&self, catalog: &Catalog, changes: &ChangeSet) -> CoreResult<()>;

    /// Flushes and releases backend resources. Called once.
    fn close(&self) -> CoreResult<()>;

    /// Page usage, for backends that have pages.
    fn page_stats(&self) -> Option<PageStats>;
}

/// Durability backend that persists nothing.
#[derive(Debug, Default)]
pub(crate) struct Volatile;

impl Durability for Volatile {
    fn persist(&self, catalog: &Catalog, changes: &ChangeSet) -> CoreResult<()> {
        trace!(
            sequence = %catalog.sequence,
            tables = changes.tables.len(),
            indexes = changes.indexes.len(),
            "volatile commit"
        );
        Ok(())
    }

    fn close(&self) -> CoreResult<()> {
        Ok(())
    }

    fn page_stats(&self) -> Option<PageStats> {
        None
    }
}
