//! Test fixtures and engine helpers.
//!
//! Provides convenience functions for setting up test engines
//! and common test scenarios.

use quill_core::{
    CoreResult, Engine, EngineConfig, MemoryEngine, MvccTransaction, PagedEngine, Transaction,
    WriterPolicy,
};
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Page size used by test engines; small, so modest data spans many pages.
pub const TEST_PAGE_SIZE: usize = 512;

/// Installs a `RUST_LOG`-driven fmt subscriber once per process.
///
/// Safe to call from every test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Configuration for test engines: small pages, no fsync.
pub fn test_config() -> EngineConfig {
    EngineConfig::new()
        .page_size(TEST_PAGE_SIZE)
        .sync_on_commit(false)
}

/// Test configuration whose second writer fails instead of waiting.
pub fn fail_fast_config() -> EngineConfig {
    test_config().writer_policy(WriterPolicy::FailFast)
}

/// Test configuration whose second writer waits at most `timeout`.
pub fn bounded_wait_config(timeout: Duration) -> EngineConfig {
    test_config()
        .writer_policy(WriterPolicy::Block)
        .writer_wait_timeout(timeout)
}

/// Creates an in-memory engine with [`test_config`].
pub fn memory_engine() -> MemoryEngine {
    MemoryEngine::new(test_config())
}

/// Creates a paged engine over an in-memory page store.
pub fn paged_memory_engine() -> PagedEngine {
    PagedEngine::in_memory(test_config()).expect("Failed to open paged engine")
}

/// A file-backed paged engine in a temporary directory.
///
/// The directory is deleted when the fixture is dropped.
pub struct TempPagedEngine {
    /// The engine instance.
    pub engine: PagedEngine,
    config: EngineConfig,
    path: PathBuf,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TempPagedEngine {
    /// Opens a fresh engine with [`test_config`].
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Opens a fresh engine with a custom configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("quill.db");
        let engine =
            PagedEngine::open_file(&path, config.clone()).expect("Failed to open paged engine");
        Self {
            engine,
            config,
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Path of the page file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes the engine and opens the same file again.
    pub fn reopen(self) -> Self {
        let Self {
            engine,
            config,
            path,
            _temp_dir,
        } = self;
        engine.close().expect("Failed to close engine");
        drop(engine);

        let engine =
            PagedEngine::open_file(&path, config.clone()).expect("Failed to reopen paged engine");
        Self {
            engine,
            config,
            path,
            _temp_dir,
        }
    }
}

impl Default for TempPagedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TempPagedEngine {
    type Target = PagedEngine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

impl Engine for TempPagedEngine {
    type Transaction = MvccTransaction;

    fn begin(&self, writable: bool) -> CoreResult<MvccTransaction> {
        self.engine.begin(writable)
    }

    fn close(&self) -> CoreResult<()> {
        self.engine.close()
    }
}

/// Runs `f` in a writable transaction and commits it.
///
/// # Example
///
/// ```rust
/// use quill_core::Transaction;
/// use quill_testkit::{memory_engine, with_writer};
///
/// let engine = memory_engine();
/// with_writer(&engine, |tx| tx.create_table("users"));
/// ```
pub fn with_writer<E, F, R>(engine: &E, f: F) -> R
where
    E: Engine,
    F: FnOnce(&E::Transaction) -> CoreResult<R>,
{
    let mut tx = engine.begin(true).expect("Failed to begin writer");
    let result = f(&tx).expect("Writer body failed");
    tx.commit().expect("Failed to commit writer");
    result
}

/// Runs `f` in a read-only transaction and rolls it back.
pub fn with_reader<E, F, R>(engine: &E, f: F) -> R
where
    E: Engine,
    F: FnOnce(&E::Transaction) -> CoreResult<R>,
{
    let mut tx = engine.begin(false).expect("Failed to begin reader");
    let result = f(&tx).expect("Reader body failed");
    tx.rollback().expect("Failed to end reader");
    result
}
