//! Lazy cursors over table and index snapshots.
//!
//! A cursor holds its own reference to the table or index state it was
//! opened on. Writes made after the cursor was created copy that state
//! first, so a cursor always walks a stable view and can be rewound to
//! replay exactly the same sequence.

use crate::catalog::{IndexData, TableData};
use crate::error::CoreResult;
use crate::types::RecordId;
use crate::value::{IndexKey, Record, Value};
use std::ops::Bound;
use std::sync::Arc;

/// Iterates `(RecordId, Record)` pairs of a table in id order.
#[derive(Debug, Clone)]
pub struct RecordCursor {
    table: Arc<TableData>,
    position: Bound<RecordId>,
}

impl RecordCursor {
    pub(crate) fn new(table: Arc<TableData>) -> Self {
        Self {
            table,
            position: Bound::Unbounded,
        }
    }

    /// Restarts iteration from the first record.
    pub fn rewind(&mut self) {
        self.position = Bound::Unbounded;
    }

    /// Positions the cursor at the first record with id `>= id`.
    pub fn seek(&mut self, id: RecordId) {
        self.position = Bound::Included(id);
    }
}

impl Iterator for RecordCursor {
    type Item = (RecordId, Record);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, record) = self
            .table
            .records
            .range((self.position, Bound::Unbounded))
            .next()?;
        self.position = Bound::Excluded(*id);
        Some((*id, record.clone()))
    }
}

/// Iterates `(Value, RecordId)` entries of an index in key order.
///
/// Entries sharing a key come out in record id order.
#[derive(Debug, Clone)]
pub struct IndexCursor {
    index: Arc<IndexData>,
    position: Bound<(IndexKey, RecordId)>,
}

impl IndexCursor {
    pub(crate) fn new(index: Arc<IndexData>) -> Self {
        Self {
            index,
            position: Bound::Unbounded,
        }
    }

    /// Restarts iteration from the smallest key.
    pub fn rewind(&mut self) {
        self.position = Bound::Unbounded;
    }

    /// Positions the cursor at the first entry with key `>= value`.
    pub fn seek(&mut self, value: &Value) {
        self.position = Bound::Included((IndexKey::encode(value), RecordId::MIN));
    }
}

impl Iterator for IndexCursor {
    type Item = CoreResult<(Value, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self
            .index
            .entries
            .range((self.position.clone(), Bound::Unbounded))
            .next()?
            .clone();
        self.position = Bound::Excluded(entry.clone());
        let (key, id) = entry;
        Some(key.decode().map(|value| (value, id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(n: u64) -> Arc<TableData> {
        let mut table = TableData::default();
        for i in 0..n {
            table.insert(Record::new().with("i", i as i64));
        }
        Arc::new(table)
    }

    #[test]
    fn record_cursor_walks_in_id_order() {
        let cursor = RecordCursor::new(table_with(3));
        let ids: Vec<_> = cursor.map(|(id, _)| id.as_u64()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn record_cursor_rewind_and_seek() {
        let mut cursor = RecordCursor::new(table_with(5));
        assert_eq!(cursor.next().map(|(id, _)| id), Some(RecordId::new(0)));
        assert_eq!(cursor.next().map(|(id, _)| id), Some(RecordId::new(1)));

        cursor.rewind();
        assert_eq!(cursor.next().map(|(id, _)| id), Some(RecordId::new(0)));

        cursor.seek(RecordId::new(3));
        let rest: Vec<_> = cursor.map(|(id, _)| id.as_u64()).collect();
        assert_eq!(rest, vec![3, 4]);
    }

    #[test]
    fn record_cursor_is_stable_against_later_writes() {
        let mut shared = table_with(2);
        let cursor = RecordCursor::new(Arc::clone(&shared));

        Arc::make_mut(&mut shared).insert(Record::new());
        assert_eq!(shared.records.len(), 3);
        assert_eq!(cursor.count(), 2);
    }

    #[test]
    fn index_cursor_orders_by_key() {
        let mut index = IndexData::new("n");
        for (value, id) in [(30, 1), (10, 2), (20, 3), (10, 0)] {
            index
                .entries
                .insert((IndexKey::encode(&Value::Integer(value)), RecordId::new(id)));
        }

        let mut cursor = IndexCursor::new(Arc::new(index));
        let entries: Vec<_> = cursor.by_ref().collect::<CoreResult<_>>().unwrap();
        assert_eq!(
            entries,
            vec![
                (Value::Integer(10), RecordId::new(0)),
                (Value::Integer(10), RecordId::new(2)),
                (Value::Integer(20), RecordId::new(3)),
                (Value::Integer(30), RecordId::new(1)),
            ]
        );

        cursor.seek(&Value::Integer(15));
        let (value, _) = cursor.next().unwrap().unwrap();
        assert_eq!(value, Value::Integer(20));
    }
}
