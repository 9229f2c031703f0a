//! The backend contract.
//!
//! Four traits, one per role: [`Engine`] owns a storage instance and hands
//! out [`Transaction`]s, which in turn hand out [`Table`] and [`Index`]
//! handles. Code above this layer depends only on these traits, so any
//! backend implementing all four can be swapped in.
//!
//! # Lifetimes
//!
//! Handles borrow the transaction that issued them. `commit` and `rollback`
//! take `&mut self`, so a handle can never be used after its transaction
//! has ended; the borrow checker rejects it.
//!
//! # Example
//!
//! ```rust
//! use quill_core::{Engine, MemoryEngine, Record, Table, Transaction, TuningContext};
//!
//! let engine = MemoryEngine::default();
//!
//! let mut tx = engine.begin(true)?;
//! tx.create_table("users")?;
//! let id = tx
//!     .table("users")?
//!     .insert(Record::new().with("name", "ada"), &TuningContext::new())?;
//! tx.commit()?;
//!
//! let mut rx = engine.begin(false)?;
//! assert_eq!(rx.table("users")?.get(id)?.get("name"), Some(&"ada".into()));
//! rx.rollback()?;
//!
//! engine.close()?;
//! # Ok::<(), quill_core::CoreError>(())
//! ```

use crate::error::CoreResult;
use crate::tuning::TuningContext;
use crate::types::{RecordId, TransactionId};
use crate::value::{Record, Value};
use std::collections::HashMap;

/// Lifecycle owner of one storage instance.
///
/// At most one writable transaction is active at any instant; any number of
/// read-only transactions may run beside it.
pub trait Engine: Send + Sync {
    /// Transaction type issued by this engine.
    type Transaction: Transaction;

    /// Starts a transaction.
    ///
    /// A read-only transaction sees the state committed before `begin`
    /// returned, unaffected by any later commit.
    ///
    /// # Errors
    ///
    /// - `EngineClosed` if the engine has been closed.
    /// - `WriterConflict` if `writable` and the writer slot cannot be taken
    ///   under the configured `WriterPolicy`.
    fn begin(&self, writable: bool) -> CoreResult<Self::Transaction>;

    /// Closes the engine. Closing a closed engine is a no-op.
    ///
    /// # Errors
    ///
    /// `LeakedTransaction` if any transaction is still active.
    fn close(&self) -> CoreResult<()>;
}

/// One unit of work.
///
/// Every call on a committed or rolled-back transaction fails with
/// `TransactionClosed`.
pub trait Transaction: Send {
    /// Table handle borrowed from the transaction.
    type Table<'a>: Table
    where
        Self: 'a;

    /// Index handle borrowed from the transaction.
    type Index<'a>: Index
    where
        Self: 'a;

    /// Engine-unique id of this transaction.
    fn id(&self) -> TransactionId;

    /// Whether this transaction may write.
    fn is_writable(&self) -> bool;

    /// Applies every mutation and ends the transaction.
    ///
    /// Nothing becomes visible to other transactions until this returns
    /// `Ok`. Read-only transactions just end.
    fn commit(&mut self) -> CoreResult<()>;

    /// Discards every mutation and ends the transaction.
    fn rollback(&mut self) -> CoreResult<()>;

    /// Looks up a table in this transaction's view.
    fn table(&self, name: &str) -> CoreResult<Self::Table<'_>>;

    /// Creates an empty table.
    ///
    /// # Errors
    ///
    /// `ReadOnly` on a read-only transaction, `TableAlreadyExists` if the
    /// name is taken.
    fn create_table(&self, name: &str) -> CoreResult<()>;

    /// Removes a table together with all of its indexes.
    fn drop_table(&self, name: &str) -> CoreResult<()>;

    /// Looks up an index on `table`.
    fn index(&self, table: &str, name: &str) -> CoreResult<Self::Index<'_>>;

    /// Every index on `table`, keyed by index name.
    ///
    /// # Errors
    ///
    /// `TableNotFound` if `table` does not exist.
    fn indexes(&self, table: &str) -> CoreResult<HashMap<String, Self::Index<'_>>>;

    /// Creates an empty index over `field` of `table`, named after the field.
    ///
    /// # Errors
    ///
    /// `ReadOnly` on a read-only transaction, `TableNotFound` if the table
    /// is missing, `IndexAlreadyExists` if `field` is already indexed.
    fn create_index(&self, table: &str, field: &str) -> CoreResult<Self::Index<'_>>;

    /// Removes an index.
    fn drop_index(&self, table: &str, name: &str) -> CoreResult<()>;
}

/// A named record collection, scoped to one transaction.
pub trait Table {
    /// Lazy, restartable iterator over the table's records.
    type Cursor: Iterator<Item = (RecordId, Record)>;

    /// Name of the table.
    fn name(&self) -> &str;

    /// Stores a new record and returns its id.
    fn insert(&self, record: Record, tuning: &TuningContext) -> CoreResult<RecordId>;

    /// Overwrites the record stored under `id`.
    fn replace(&self, id: RecordId, record: Record, tuning: &TuningContext) -> CoreResult<()>;

    /// Removes the record stored under `id`.
    fn delete(&self, id: RecordId) -> CoreResult<()>;

    /// Reads the record stored under `id`.
    fn get(&self, id: RecordId) -> CoreResult<Record>;

    /// Number of records.
    fn len(&self) -> CoreResult<usize>;

    /// Whether the table holds no records.
    fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Opens a cursor over the table as it is now.
    fn cursor(&self) -> CoreResult<Self::Cursor>;
}

/// Ordered lookup over one field of a table, scoped to one transaction.
pub trait Index {
    /// Lazy iterator over `(value, record id)` entries in key order.
    type Cursor: Iterator<Item = CoreResult<(Value, RecordId)>>;

    /// Name of the index.
    fn name(&self) -> &str;

    /// Table the index belongs to.
    fn table(&self) -> &str;

    /// Indexed field.
    fn field(&self) -> CoreResult<String>;

    /// Adds the entry `value -> id`. Adding an existing entry is a no-op.
    fn set(&self, value: &Value, id: RecordId, tuning: &TuningContext) -> CoreResult<()>;

    /// Removes the entry `value -> id`, returning whether it existed.
    fn delete(&self, value: &Value, id: RecordId) -> CoreResult<bool>;

    /// Ids of every record indexed under `value`, in id order.
    fn lookup(&self, value: &Value) -> CoreResult<Vec<RecordId>>;

    /// Number of entries.
    fn len(&self) -> CoreResult<usize>;

    /// Opens a cursor over the index as it is now.
    fn cursor(&self) -> CoreResult<Self::Cursor>;
}
