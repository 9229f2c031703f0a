//! Immutable snapshot state shared between transactions.
//!
//! A [`Catalog`] is the complete visible state of an engine at one commit
//! sequence. Tables and indexes sit behind `Arc`s so that a writer copies
//! only what it touches: the first mutation of a table clones that table,
//! every other table stays shared with the readers' snapshots.

use crate::error::{CoreError, CoreResult};
use crate::types::{RecordId, SequenceNumber};
use crate::value::{IndexKey, Record};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Key of an index in the catalog: `(table, index name)`.
pub(crate) type IndexName = (String, String);

/// Records of one table.
#[derive(Debug, Clone, Default)]
pub(crate) struct TableData {
    pub(crate) records: BTreeMap<RecordId, Record>,
    pub(crate) next_id: u64,
}

impl TableData {
    pub(crate) fn insert(&mut self, record: Record) -> RecordId {
        let id = RecordId::new(self.next_id);
        self.next_id += 1;
        self.records.insert(id, record);
        id
    }

    /// Replaces an existing record; returns false if `id` is absent.
    pub(crate) fn replace(&mut self, id: RecordId, record: Record) -> bool {
        match self.records.get_mut(&id) {
            Some(slot) => {
                *slot = record;
                true
            }
            None => false,
        }
    }

    pub(crate) fn delete(&mut self, id: RecordId) -> bool {
        self.records.remove(&id).is_some()
    }
}

/// Entries of one index, ordered by key then record.
#[derive(Debug, Clone)]
pub(crate) struct IndexData {
    pub(crate) field: String,
    pub(crate) entries: BTreeSet<(IndexKey, RecordId)>,
}

impl IndexData {
    pub(crate) fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            entries: BTreeSet::new(),
        }
    }

    pub(crate) fn lookup(&self, key: &IndexKey) -> Vec<RecordId> {
        self.entries
            .range((key.clone(), RecordId::MIN)..=(key.clone(), RecordId::MAX))
            .map(|(_, id)| *id)
            .collect()
    }
}

/// Everything visible at one commit sequence.
#[derive(Debug, Clone, Default)]
pub(crate) struct Catalog {
    pub(crate) sequence: SequenceNumber,
    pub(crate) tables: BTreeMap<String, Arc<TableData>>,
    pub(crate) indexes: BTreeMap<IndexName, Arc<IndexData>>,
}

impl Catalog {
    pub(crate) fn table(&self, name: &str) -> CoreResult<&Arc<TableData>> {
        self.tables
            .get(name)
            .ok_or_else(|| CoreError::table_not_found(name))
    }

    /// Returns the table for writing, cloning it if a snapshot still shares it.
    pub(crate) fn table_mut(&mut self, name: &str) -> CoreResult<&mut TableData> {
        self.tables
            .get_mut(name)
            .map(Arc::make_mut)
            .ok_or_else(|| CoreError::table_not_found(name))
    }

    pub(crate) fn create_table(&mut self, name: &str) -> CoreResult<()> {
        validate_name("table", name)?;
        if self.tables.contains_key(name) {
            return Err(CoreError::table_already_exists(name));
        }
        self.tables
            .insert(name.to_owned(), Arc::new(TableData::default()));
        Ok(())
    }

    /// Removes a table and all of its indexes, returning the index names.
    pub(crate) fn drop_table(&mut self, name: &str) -> CoreResult<Vec<String>> {
        if self.tables.remove(name).is_none() {
            return Err(CoreError::table_not_found(name));
        }
        let dropped = self.index_names(name);
        for index in &dropped {
            self.indexes.remove(&(name.to_owned(), index.clone()));
        }
        Ok(dropped)
    }

    pub(crate) fn index(&self, table: &str, name: &str) -> CoreResult<&Arc<IndexData>> {
        self.indexes
            .get(&(table.to_owned(), name.to_owned()))
            .ok_or_else(|| CoreError::index_not_found(table, name))
    }

    pub(crate) fn index_mut(&mut self, table: &str, name: &str) -> CoreResult<&mut IndexData> {
        self.indexes
            .get_mut(&(table.to_owned(), name.to_owned()))
            .map(Arc::make_mut)
            .ok_or_else(|| CoreError::index_not_found(table, name))
    }

    /// Creates the index on `field`; the index takes the field's name.
    pub(crate) fn create_index(&mut self, table: &str, field: &str) -> CoreResult<()> {
        validate_name("field", field)?;
        if !self.tables.contains_key(table) {
            return Err(CoreError::table_not_found(table));
        }
        let key = (table.to_owned(), field.to_owned());
        if self.indexes.contains_key(&key) {
            return Err(CoreError::index_already_exists(table, field));
        }
        self.indexes.insert(key, Arc::new(IndexData::new(field)));
        Ok(())
    }

    pub(crate) fn drop_index(&mut self, table: &str, name: &str) -> CoreResult<()> {
        self.indexes
            .remove(&(table.to_owned(), name.to_owned()))
            .map(|_| ())
            .ok_or_else(|| CoreError::index_not_found(table, name))
    }

    /// Names of every index on `table`, in name order.
    pub(crate) fn index_names(&self, table: &str) -> Vec<String> {
        self.indexes
            .range((table.to_owned(), String::new())..)
            .take_while(|((t, _), _)| t == table)
            .map(|((_, name), _)| name.clone())
            .collect()
    }
}

fn validate_name(what: &str, name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::invalid_name(format!("{what} name must not be empty")));
    }
    Ok(())
}
