//! Engine implementations.
//!
//! Both engines share the same machinery: a [`TransactionManager`] that
//! arbitrates the writer slot and publishes committed catalogs, and a
//! durability backend that sees every writable commit first. They differ
//! only in the backend.
//!
//! - [`MemoryEngine`] keeps everything in memory.
//! - [`PagedEngine`] writes every commit to a [`PageStore`].

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::durability::{Durability, PagedDurability, Volatile};
use crate::error::CoreResult;
use crate::stats::EngineStats;
use crate::traits::Engine;
use crate::transaction::{MvccTransaction, TransactionManager};
use quill_storage::{FilePageStore, InMemoryPageStore, PageStore};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// State shared by an engine and its transactions.
pub(crate) struct Core {
    pub(crate) manager: TransactionManager,
    pub(crate) durability: Box<dyn Durability>,
}

impl Core {
    fn new(initial: Catalog, durability: Box<dyn Durability>, config: &EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            manager: TransactionManager::new(initial, config),
            durability,
        })
    }

    fn close(&self) -> CoreResult<()> {
        if self.manager.close()? {
            self.durability.close()?;
            info!(sequence = %self.manager.committed_seq(), "engine closed");
        }
        Ok(())
    }

    fn stats(&self) -> EngineStats {
        let committed = self.manager.committed();
        let (open, active_readers, writer_active) = self.manager.activity();
        EngineStats {
            sequence: committed.sequence,
            open,
            active_readers,
            writer_active,
            tables: committed.tables.len(),
            indexes: committed.indexes.len(),
            pages: self.durability.page_stats(),
        }
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

/// An engine whose state lives only in memory.
///
/// Commits are visible to later transactions immediately and vanish when
/// the engine is dropped.
///
/// # Example
///
/// ```rust
/// use quill_core::{Engine, MemoryEngine, Transaction};
///
/// let engine = MemoryEngine::default();
/// let mut tx = engine.begin(true)?;
/// tx.create_table("users")?;
/// tx.commit()?;
/// assert_eq!(engine.stats().tables, 1);
/// # Ok::<(), quill_core::CoreError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    core: Arc<Core>,
}

impl MemoryEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        debug!(policy = ?config.writer_policy, "opened in-memory engine");
        Self {
            core: Core::new(Catalog::default(), Box::new(Volatile), &config),
        }
    }

    /// Returns current activity and catalog counts.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.core.stats()
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine for MemoryEngine {
    type Transaction = MvccTransaction;

    fn begin(&self, writable: bool) -> CoreResult<MvccTransaction> {
        MvccTransaction::begin(Arc::clone(&self.core), writable)
    }

    fn close(&self) -> CoreResult<()> {
        self.core.close()
    }
}

/// An engine that persists every commit to a page store.
///
/// Committed tables and indexes are written copy-on-write, packed according
/// to the `fill_percent` hint of the writes that changed them. Reopening
/// the same store restores the last committed state.
///
/// # Example
///
/// ```rust
/// use quill_core::{Engine, EngineConfig, PagedEngine, Transaction};
///
/// let dir = tempfile::tempdir()?;
/// let path = dir.path().join("quill.db");
///
/// let engine = PagedEngine::open_file(&path, EngineConfig::default())?;
/// let mut tx = engine.begin(true)?;
/// tx.create_table("users")?;
/// tx.commit()?;
/// engine.close()?;
/// drop(engine);
///
/// let engine = PagedEngine::open_file(&path, EngineConfig::default())?;
/// assert!(engine.begin(false)?.table("users").is_ok());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct PagedEngine {
    core: Arc<Core>,
}

impl PagedEngine {
    /// Opens an engine over `store`, formatting it if it is empty.
    ///
    /// # Errors
    ///
    /// `Corrupted` if the store holds something other than a Quill layout
    /// written with the store's page size, or a storage error.
    pub fn open<S: PageStore + 'static>(store: S, config: EngineConfig) -> CoreResult<Self> {
        let (durability, catalog) = PagedDurability::open(Box::new(store), &config)?;
        info!(
            sequence = %catalog.sequence,
            tables = catalog.tables.len(),
            "opened paged engine"
        );
        Ok(Self {
            core: Core::new(catalog, Box::new(durability), &config),
        })
    }

    /// Opens or creates a file-backed engine at `path`.
    ///
    /// The file is locked exclusively until the engine is closed or dropped.
    pub fn open_file(path: &Path, config: EngineConfig) -> CoreResult<Self> {
        let store = FilePageStore::open_with_create_dirs(path, config.page_size)?;
        Self::open(store, config)
    }

    /// Opens a paged engine over a fresh in-memory page store.
    pub fn in_memory(config: EngineConfig) -> CoreResult<Self> {
        let store = InMemoryPageStore::new(config.page_size)?;
        Self::open(store, config)
    }

    /// Returns current activity, catalog counts and page usage.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.core.stats()
    }
}

impl Engine for PagedEngine {
    type Transaction = MvccTransaction;

    fn begin(&self, writable: bool) -> CoreResult<MvccTransaction> {
        MvccTransaction::begin(Arc::clone(&self.core), writable)
    }

    fn close(&self) -> CoreResult<()> {
        self.core.close()
    }
}
