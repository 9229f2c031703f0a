//! Table and index handles.
//!
//! A handle is just a name plus a borrow of its transaction. Every call
//! resolves the name again against the transaction's current view, so a
//! handle whose table or index was dropped in the meantime reports
//! `NotFound` instead of touching stale state.

use super::mvcc::MvccTransaction;
use crate::cursor::{IndexCursor, RecordCursor};
use crate::error::{CoreError, CoreResult};
use crate::traits::{Index, Table};
use crate::tuning::TuningContext;
use crate::types::RecordId;
use crate::value::{IndexKey, Record, Value};
use std::sync::Arc;

/// Handle to a table, valid while its transaction is borrowed.
#[derive(Debug, Clone)]
pub struct TableRef<'tx> {
    tx: &'tx MvccTransaction,
    name: String,
}

impl<'tx> TableRef<'tx> {
    pub(crate) fn new(tx: &'tx MvccTransaction, name: &str) -> Self {
        Self {
            tx,
            name: name.to_owned(),
        }
    }

    fn ensure_record(&self, id: RecordId) -> CoreResult<()> {
        self.tx.read(|catalog| {
            if catalog.table(&self.name)?.records.contains_key(&id) {
                Ok(())
            } else {
                Err(CoreError::record_not_found(&self.name, id))
            }
        })
    }
}

impl Table for TableRef<'_> {
    type Cursor = RecordCursor;

    fn name(&self) -> &str {
        &self.name
    }

    fn insert(&self, record: Record, tuning: &TuningContext) -> CoreResult<RecordId> {
        let id = self
            .tx
            .write(|catalog| Ok(catalog.table_mut(&self.name)?.insert(record)))?;
        self.tx.touch_table(&self.name, tuning.fill_percent());
        Ok(id)
    }

    fn replace(&self, id: RecordId, record: Record, tuning: &TuningContext) -> CoreResult<()> {
        self.tx.ensure_writable()?;
        self.ensure_record(id)?;
        self.tx.write(|catalog| {
            catalog.table_mut(&self.name)?.replace(id, record);
            Ok(())
        })?;
        self.tx.touch_table(&self.name, tuning.fill_percent());
        Ok(())
    }

    fn delete(&self, id: RecordId) -> CoreResult<()> {
        self.tx.ensure_writable()?;
        self.ensure_record(id)?;
        self.tx.write(|catalog| {
            catalog.table_mut(&self.name)?.delete(id);
            Ok(())
        })?;
        self.tx.touch_table(&self.name, None);
        Ok(())
    }

    fn get(&self, id: RecordId) -> CoreResult<Record> {
        self.tx.read(|catalog| {
            catalog
                .table(&self.name)?
                .records
                .get(&id)
                .cloned()
                .ok_or_else(|| CoreError::record_not_found(&self.name, id))
        })
    }

    fn len(&self) -> CoreResult<usize> {
        self.tx
            .read(|catalog| Ok(catalog.table(&self.name)?.records.len()))
    }

    fn cursor(&self) -> CoreResult<RecordCursor> {
        self.tx
            .read(|catalog| Ok(RecordCursor::new(Arc::clone(catalog.table(&self.name)?))))
    }
}

/// Handle to an index, valid while its transaction is borrowed.
#[derive(Debug, Clone)]
pub struct IndexRef<'tx> {
    tx: &'tx MvccTransaction,
    table: String,
    name: String,
}

impl<'tx> IndexRef<'tx> {
    pub(crate) fn new(tx: &'tx MvccTransaction, table: &str, name: &str) -> Self {
        Self {
            tx,
            table: table.to_owned(),
            name: name.to_owned(),
        }
    }
}

impl Index for IndexRef<'_> {
    type Cursor = IndexCursor;

    fn name(&self) -> &str {
        &self.name
    }

    fn table(&self) -> &str {
        &self.table
    }

    fn field(&self) -> CoreResult<String> {
        self.tx
            .read(|catalog| Ok(catalog.index(&self.table, &self.name)?.field.clone()))
    }

    fn set(&self, value: &Value, id: RecordId, tuning: &TuningContext) -> CoreResult<()> {
        let key = IndexKey::encode(value);
        self.tx.write(|catalog| {
            catalog
                .index_mut(&self.table, &self.name)?
                .entries
                .insert((key, id));
            Ok(())
        })?;
        self.tx
            .touch_index(&self.table, &self.name, tuning.fill_percent());
        Ok(())
    }

    fn delete(&self, value: &Value, id: RecordId) -> CoreResult<bool> {
        let entry = (IndexKey::encode(value), id);
        self.tx.ensure_writable()?;
        let present = self.tx.read(|catalog| {
            Ok(catalog
                .index(&self.table, &self.name)?
                .entries
                .contains(&entry))
        })?;
        if !present {
            return Ok(false);
        }

        self.tx.write(|catalog| {
            catalog
                .index_mut(&self.table, &self.name)?
                .entries
                .remove(&entry);
            Ok(())
        })?;
        self.tx.touch_index(&self.table, &self.name, None);
        Ok(true)
    }

    fn lookup(&self, value: &Value) -> CoreResult<Vec<RecordId>> {
        let key = IndexKey::encode(value);
        self.tx
            .read(|catalog| Ok(catalog.index(&self.table, &self.name)?.lookup(&key)))
    }

    fn len(&self) -> CoreResult<usize> {
        self.tx
            .read(|catalog| Ok(catalog.index(&self.table, &self.name)?.entries.len()))
    }

    fn cursor(&self) -> CoreResult<IndexCursor> {
        self.tx.read(|catalog| {
            Ok(IndexCursor::new(Arc::clone(
                catalog.index(&self.table, &self.name)?,
            )))
        })
    }
}
