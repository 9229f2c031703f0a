//! Transaction manager.

use crate::catalog::Catalog;
use crate::config::{EngineConfig, WriterPolicy};
use crate::error::{CoreError, CoreResult};
use crate::types::{SequenceNumber, TransactionId};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Open/closed flag plus the set of live transactions.
#[derive(Debug)]
struct Lifecycle {
    open: bool,
    readers: usize,
    writer: Option<TransactionId>,
}

/// What `begin` hands to a new transaction.
#[derive(Debug)]
pub(crate) struct Ticket {
    pub(crate) id: TransactionId,
    pub(crate) writable: bool,
    pub(crate) snapshot: Arc<Catalog>,
}

/// Arbitrates transactions against one engine.
///
/// The transaction manager provides:
/// - Single-writer concurrency control
/// - Snapshot isolation for readers
/// - The engine's open/closed lifecycle
///
/// ## Single-Writer Guarantee
///
/// At most one writable ticket is outstanding at any time. A second
/// writable `begin` either waits on `writer_released` or fails with
/// `WriterConflict`, depending on the configured [`WriterPolicy`].
///
/// ## Snapshots
///
/// The committed catalog is swapped wholesale on publish. A ticket clones
/// the `Arc` current at `begin`, so later publishes never reach it.
pub(crate) struct TransactionManager {
    /// Latest committed state.
    committed: RwLock<Arc<Catalog>>,
    /// Next transaction ID.
    next_txid: AtomicU64,
    /// Live transactions and the open flag.
    lifecycle: Mutex<Lifecycle>,
    /// Signalled whenever the writer slot frees up or the engine closes.
    writer_released: Condvar,
    policy: WriterPolicy,
    wait_timeout: Option<Duration>,
}

impl TransactionManager {
    /// Creates a manager over an initial committed state.
    pub(crate) fn new(initial: Catalog, config: &EngineConfig) -> Self {
        Self {
            committed: RwLock::new(Arc::new(initial)),
            next_txid: AtomicU64::new(1),
            lifecycle: Mutex::new(Lifecycle {
                open: true,
                readers: 0,
                writer: None,
            }),
            writer_released: Condvar::new(),
            policy: config.writer_policy,
            wait_timeout: config.writer_wait_timeout,
        }
    }

    /// Registers a new transaction and captures its snapshot.
    ///
    /// Writable tickets claim the writer slot; see [`WriterPolicy`] for what
    /// happens when it is taken.
    pub(crate) fn begin(&self, writable: bool) -> CoreResult<Ticket> {
        let deadline = self.wait_timeout.map(|timeout| Instant::now() + timeout);
        let mut state = self.lifecycle.lock();

        loop {
            if !state.open {
                return Err(CoreError::EngineClosed);
            }
            if !writable || state.writer.is_none() {
                break;
            }

            match (self.policy, deadline) {
                (WriterPolicy::FailFast, _) => {
                    debug!(active = ?state.writer, "writer conflict");
                    return Err(CoreError::WriterConflict);
                }
                (WriterPolicy::Block, Some(deadline)) => {
                    trace!(active = ?state.writer, "waiting for writer slot");
                    if self
                        .writer_released
                        .wait_until(&mut state, deadline)
                        .timed_out()
                        && state.writer.is_some()
                    {
                        debug!(active = ?state.writer, "timed out waiting for writer slot");
                        return Err(CoreError::WriterConflict);
                    }
                }
                (WriterPolicy::Block, None) => {
                    trace!(active = ?state.writer, "waiting for writer slot");
                    self.writer_released.wait(&mut state);
                }
            }
        }

        let id = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        if writable {
            state.writer = Some(id);
        } else {
            state.readers += 1;
        }
        let snapshot = Arc::clone(&self.committed.read());
        drop(state);

        trace!(%id, writable, sequence = %snapshot.sequence, "began transaction");
        Ok(Ticket {
            id,
            writable,
            snapshot,
        })
    }

    /// Makes `catalog` the state seen by every later `begin`.
    pub(crate) fn publish(&self, catalog: Catalog) {
        *self.committed.write() = Arc::new(catalog);
    }

    /// Releases a ticket. Called exactly once per ticket.
    pub(crate) fn finish(&self, id: TransactionId, writable: bool) {
        let mut state = self.lifecycle.lock();
        if writable {
            debug_assert_eq!(state.writer, Some(id));
            state.writer = None;
            drop(state);
            self.writer_released.notify_one();
        } else {
            state.readers = state.readers.saturating_sub(1);
        }
    }

    /// Closes the engine.
    ///
    /// Returns `Ok(true)` if this call closed it and `Ok(false)` if it was
    /// already closed.
    pub(crate) fn close(&self) -> CoreResult<bool> {
        let mut state = self.lifecycle.lock();
        if !state.open {
            return Ok(false);
        }

        let open = state.readers + usize::from(state.writer.is_some());
        if open > 0 {
            return Err(CoreError::LeakedTransaction { open });
        }

        state.open = false;
        drop(state);
        self.writer_released.notify_all();
        debug!("engine closed");
        Ok(true)
    }

    /// Returns the latest committed state.
    pub(crate) fn committed(&self) -> Arc<Catalog> {
        Arc::clone(&self.committed.read())
    }

    /// Returns the latest committed sequence.
    pub(crate) fn committed_seq(&self) -> SequenceNumber {
        self.committed.read().sequence
    }

    /// Returns `(open, readers, writer active)`.
    pub(crate) fn activity(&self) -> (bool, usize, bool) {
        let state = self.lifecycle.lock();
        (state.open, state.readers, state.writer.is_some())
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (open, readers, writer) = self.activity();
        f.debug_struct("TransactionManager")
            .field("committed_seq", &self.committed_seq())
            .field("open", &open)
            .field("readers", &readers)
            .field("writer_active", &writer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn manager(config: EngineConfig) -> Arc<TransactionManager> {
        Arc::new(TransactionManager::new(Catalog::default(), &config))
    }

    #[test]
    fn begin_registers_transactions() {
        let tm = manager(EngineConfig::default());
        let reader = tm.begin(false).unwrap();
        let writer = tm.begin(true).unwrap();
        assert!(writer.id > reader.id);
        assert_eq!(tm.activity(), (true, 1, true));

        tm.finish(reader.id, false);
        tm.finish(writer.id, true);
        assert_eq!(tm.activity(), (true, 0, false));
    }

    #[test]
    fn fail_fast_rejects_second_writer() {
        let tm = manager(EngineConfig::new().writer_policy(WriterPolicy::FailFast));
        let first = tm.begin(true).unwrap();
        assert!(matches!(tm.begin(true), Err(CoreError::WriterConflict)));

        // Readers are never blocked by the writer.
        let reader = tm.begin(false).unwrap();
        tm.finish(reader.id, false);

        tm.finish(first.id, true);
        assert!(tm.begin(true).is_ok());
    }

    #[test]
    fn blocked_writer_times_out() {
        let tm = manager(EngineConfig::new().writer_wait_timeout(Duration::from_millis(20)));
        let _first = tm.begin(true).unwrap();
        assert!(matches!(tm.begin(true), Err(CoreError::WriterConflict)));
    }

    #[test]
    fn blocked_writer_proceeds_after_release() {
        let tm = manager(EngineConfig::default());
        let first = tm.begin(true).unwrap();

        let waiter = {
            let tm = Arc::clone(&tm);
            thread::spawn(move || tm.begin(true).map(|ticket| ticket.id))
        };

        thread::sleep(Duration::from_millis(20));
        tm.finish(first.id, true);

        let second = waiter.join().unwrap().unwrap();
        assert!(second > first.id);
    }

    #[test]
    fn snapshot_is_fixed_at_begin() {
        let tm = manager(EngineConfig::default());
        let before = tm.begin(false).unwrap();

        let mut next = Catalog::default();
        next.sequence = SequenceNumber::new(1);
        tm.publish(next);

        let after = tm.begin(false).unwrap();
        assert_eq!(before.snapshot.sequence.as_u64(), 0);
        assert_eq!(after.snapshot.sequence.as_u64(), 1);
        assert_eq!(tm.committed_seq().as_u64(), 1);
    }

    #[test]
    fn close_with_open_transactions_fails() {
        let tm = manager(EngineConfig::default());
        let reader = tm.begin(false).unwrap();
        assert!(matches!(
            tm.close(),
            Err(CoreError::LeakedTransaction { open: 1 })
        ));

        tm.finish(reader.id, false);
        assert!(tm.close().unwrap());
        assert!(!tm.close().unwrap());
        assert!(matches!(tm.begin(false), Err(CoreError::EngineClosed)));
    }
}
