//! The transaction type shared by every Quill engine.

use super::handles::{IndexRef, TableRef};
use super::state::{ChangeSet, TransactionState};
use crate::catalog::Catalog;
use crate::engine::Core;
use crate::error::{CoreError, CoreResult};
use crate::traits::Transaction;
use crate::types::TransactionId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// A transaction against a Quill engine.
///
/// Obtained from [`Engine::begin`](crate::Engine::begin). Dropping an
/// active transaction rolls it back.
pub struct MvccTransaction {
    core: Arc<Core>,
    id: TransactionId,
    writable: bool,
    state: TransactionState,
    /// Snapshot taken at begin; a writer's private copy after its first write.
    view: RefCell<Arc<Catalog>>,
    changes: RefCell<ChangeSet>,
}

impl MvccTransaction {
    pub(crate) fn begin(core: Arc<Core>, writable: bool) -> CoreResult<Self> {
        let ticket = core.manager.begin(writable)?;
        Ok(Self {
            core,
            id: ticket.id,
            writable: ticket.writable,
            state: TransactionState::Active,
            view: RefCell::new(ticket.snapshot),
            changes: RefCell::new(ChangeSet::default()),
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Runs `f` against this transaction's view.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&Catalog) -> CoreResult<R>) -> CoreResult<R> {
        self.state.ensure_active()?;
        f(&self.view.borrow())
    }

    pub(crate) fn ensure_writable(&self) -> CoreResult<()> {
        self.state.ensure_active()?;
        if self.writable {
            Ok(())
        } else {
            Err(CoreError::ReadOnly)
        }
    }

    /// Runs `f` against this transaction's private, writable view.
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Catalog) -> CoreResult<R>) -> CoreResult<R> {
        self.ensure_writable()?;
        let mut view = self.view.borrow_mut();
        f(Arc::make_mut(&mut view))
    }

    pub(crate) fn touch_table(&self, table: &str, hint: Option<f64>) {
        self.changes.borrow_mut().touch_table(table, hint);
    }

    pub(crate) fn touch_index(&self, table: &str, name: &str, hint: Option<f64>) {
        self.changes.borrow_mut().touch_index(table, name, hint);
    }

    fn finish(&mut self, state: TransactionState) {
        self.state = state;
        self.core.manager.finish(self.id, self.writable);
    }
}

impl Transaction for MvccTransaction {
    type Table<'a> = TableRef<'a>;
    type Index<'a> = IndexRef<'a>;

    fn id(&self) -> TransactionId {
        self.id
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn commit(&mut self) -> CoreResult<()> {
        self.state.ensure_active()?;

        let changes = std::mem::take(self.changes.get_mut());
        if !self.writable || changes.is_empty() {
            self.finish(TransactionState::Committed);
            trace!(txn = %self.id, writable = self.writable, "committed without changes");
            return Ok(());
        }

        let view = std::mem::take(self.view.get_mut());
        let mut catalog = Arc::unwrap_or_clone(view);
        catalog.sequence = catalog.sequence.next();
        let sequence = catalog.sequence;

        if let Err(err) = self.core.durability.persist(&catalog, &changes) {
            self.finish(TransactionState::RolledBack);
            warn!(txn = %self.id, %sequence, error = %err, "commit failed, rolled back");
            return Err(err);
        }

        self.core.manager.publish(catalog);
        self.finish(TransactionState::Committed);
        debug!(
            txn = %self.id,
            %sequence,
            tables = changes.tables.len(),
            indexes = changes.indexes.len(),
            schema_changed = changes.schema_changed,
            "committed"
        );
        Ok(())
    }

    fn rollback(&mut self) -> CoreResult<()> {
        self.state.ensure_active()?;
        let discarded = std::mem::take(self.changes.get_mut());
        self.finish(TransactionState::RolledBack);
        debug!(
            txn = %self.id,
            discarded_tables = discarded.tables.len(),
            "rolled back"
        );
        Ok(())
    }

    fn table(&self, name: &str) -> CoreResult<TableRef<'_>> {
        self.read(|catalog| catalog.table(name).map(|_| ()))?;
        Ok(TableRef::new(self, name))
    }

    fn create_table(&self, name: &str) -> CoreResult<()> {
        self.write(|catalog| catalog.create_table(name))?;
        let mut changes = self.changes.borrow_mut();
        changes.touch_table(name, None);
        changes.schema_changed = true;
        trace!(txn = %self.id, table = name, "created table");
        Ok(())
    }

    fn drop_table(&self, name: &str) -> CoreResult<()> {
        let dropped = self.write(|catalog| catalog.drop_table(name))?;
        self.changes.borrow_mut().forget_table(name, &dropped);
        trace!(txn = %self.id, table = name, indexes = dropped.len(), "dropped table");
        Ok(())
    }

    fn index(&self, table: &str, name: &str) -> CoreResult<IndexRef<'_>> {
        self.read(|catalog| catalog.index(table, name).map(|_| ()))?;
        Ok(IndexRef::new(self, table, name))
    }

    fn indexes(&self, table: &str) -> CoreResult<HashMap<String, IndexRef<'_>>> {
        let names = self.read(|catalog| {
            catalog.table(table)?;
            Ok(catalog.index_names(table))
        })?;
        Ok(names
            .into_iter()
            .map(|name| {
                let index = IndexRef::new(self, table, &name);
                (name, index)
            })
            .collect())
    }

    fn create_index(&self, table: &str, field: &str) -> CoreResult<IndexRef<'_>> {
        self.write(|catalog| catalog.create_index(table, field))?;
        let mut changes = self.changes.borrow_mut();
        changes.touch_index(table, field, None);
        changes.schema_changed = true;
        trace!(txn = %self.id, table, field, "created index");
        Ok(IndexRef::new(self, table, field))
    }

    fn drop_index(&self, table: &str, name: &str) -> CoreResult<()> {
        self.write(|catalog| catalog.drop_index(table, name))?;
        self.changes.borrow_mut().forget_index(table, name);
        trace!(txn = %self.id, table, index = name, "dropped index");
        Ok(())
    }
}

impl Drop for MvccTransaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            self.finish(TransactionState::RolledBack);
            debug!(txn = %self.id, writable = self.writable, "rolled back on drop");
        }
    }
}

impl std::fmt::Debug for MvccTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MvccTransaction")
            .field("id", &self.id)
            .field("writable", &self.writable)
            .field("state", &self.state)
            .field("sequence", &self.view.borrow().sequence)
            .finish_non_exhaustive()
    }
}
