//! Page stores that fail on demand.
//!
//! [`CrashablePageStore`] wraps an in-memory store and injects a single
//! failure into the write path. Its [`CrashHandle`] stays with the test, so
//! the surviving pages can be reopened after the engine has seen the error.
//!
//! ```rust,ignore
//! let (store, crash) = CrashablePageStore::new(TEST_PAGE_SIZE)?;
//! let engine = PagedEngine::open(store, test_config())?;
//! crash.arm(CrashPoint::TornWrite { below: 2, keep: 20 });
//! // ... commit fails ...
//! let recovered = PagedEngine::open(crash.surviving_store()?, test_config())?;
//! ```

use parking_lot::Mutex;
use quill_storage::{InMemoryPageStore, PageId, PageStore, StorageError, StorageResult};
use std::io;
use std::sync::Arc;

/// Where the next write fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// The next write starting below page `below` lands only its first
    /// `keep` bytes, then fails.
    TornWrite {
        /// Writes starting at a lower page are torn.
        below: PageId,
        /// Bytes of the write that reach the store.
        keep: usize,
    },
    /// The next write fails before touching the store.
    FailedWrite,
    /// Every sync fails until disarmed.
    FailedSync,
}

struct Shared {
    store: InMemoryPageStore,
    armed: Option<CrashPoint>,
    crashes: usize,
}

/// Test-side control over a [`CrashablePageStore`].
#[derive(Clone)]
pub struct CrashHandle {
    shared: Arc<Mutex<Shared>>,
}

impl CrashHandle {
    /// Arms `point`, replacing any earlier one.
    pub fn arm(&self, point: CrashPoint) {
        self.shared.lock().armed = Some(point);
    }

    /// Clears the armed failure.
    pub fn disarm(&self) {
        self.shared.lock().armed = None;
    }

    /// Returns how many writes or syncs have failed so far.
    pub fn crashes(&self) -> usize {
        self.shared.lock().crashes
    }

    /// Returns a fresh store holding the pages as they are now.
    pub fn surviving_store(&self) -> StorageResult<InMemoryPageStore> {
        let shared = self.shared.lock();
        InMemoryPageStore::with_data(shared.store.page_size(), shared.store.data())
    }
}

impl std::fmt::Debug for CrashHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("CrashHandle")
            .field("armed", &shared.armed)
            .field("crashes", &shared.crashes)
            .finish()
    }
}

/// An in-memory page store with an injectable failure.
#[derive(Debug)]
pub struct CrashablePageStore {
    handle: CrashHandle,
    page_size: usize,
}

impl CrashablePageStore {
    /// Creates an empty store and the handle controlling it.
    pub fn new(page_size: usize) -> StorageResult<(Self, CrashHandle)> {
        let store = InMemoryPageStore::new(page_size)?;
        let handle = CrashHandle {
            shared: Arc::new(Mutex::new(Shared {
                store,
                armed: None,
                crashes: 0,
            })),
        };
        let crashable = Self {
            handle: handle.clone(),
            page_size,
        };
        Ok((crashable, handle))
    }
}

fn simulated(what: &str) -> StorageError {
    StorageError::Io(io::Error::other(format!("simulated crash during {what}")))
}

impl PageStore for CrashablePageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> u64 {
        self.handle.shared.lock().store.page_count()
    }

    fn read_pages(&self, start: PageId, count: u64) -> StorageResult<Vec<u8>> {
        self.handle.shared.lock().store.read_pages(start, count)
    }

    fn write_pages(&mut self, start: PageId, data: &[u8]) -> StorageResult<()> {
        let mut shared = self.handle.shared.lock();
        let armed = shared.armed;
        match armed {
            Some(CrashPoint::FailedWrite) => {
                shared.armed = None;
                shared.crashes += 1;
                Err(simulated("write"))
            }
            Some(CrashPoint::TornWrite { below, keep }) if start < below => {
                shared.armed = None;
                shared.crashes += 1;

                let keep = keep.min(data.len());
                let mut page = if start < shared.store.page_count() {
                    shared.store.read_pages(start, 1)?
                } else {
                    vec![0u8; self.page_size]
                };
                page[..keep].copy_from_slice(&data[..keep]);
                shared.store.write_pages(start, &page)?;
                Err(simulated("torn write"))
            }
            _ => shared.store.write_pages(start, data),
        }
    }

    fn sync(&mut self) -> StorageResult<()> {
        let mut shared = self.handle.shared.lock();
        if shared.armed == Some(CrashPoint::FailedSync) {
            shared.crashes += 1;
            return Err(simulated("sync"));
        }
        shared.store.sync()
    }

    fn truncate(&mut self, page_count: u64) -> StorageResult<()> {
        self.handle.shared.lock().store.truncate(page_count)
    }
}
