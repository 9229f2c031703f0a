//! Point-in-time engine statistics.

use crate::types::SequenceNumber;

/// A snapshot of engine activity and storage use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    /// Sequence of the latest committed state.
    pub sequence: SequenceNumber,
    /// Whether the engine still accepts transactions.
    pub open: bool,
    /// Number of read-only transactions currently active.
    pub active_readers: usize,
    /// Whether a writable transaction is currently active.
    pub writer_active: bool,
    /// Tables in the latest committed state.
    pub tables: usize,
    /// Indexes in the latest committed state.
    pub indexes: usize,
    /// Page usage; `None` for engines without a page store.
    pub pages: Option<PageStats>,
}

/// Page usage of a paged engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStats {
    /// Pages in the store, including the two meta pages.
    pub page_count: u64,
    /// Pages no committed node refers to.
    pub free_pages: u64,
    /// Pages holding table and index leaves.
    pub leaf_pages: u64,
}
