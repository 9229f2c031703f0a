//! Transaction state and change tracking.

use crate::catalog::IndexName;
use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;

/// State of a transaction.
///
/// `Active` is the only non-terminal state. Both terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is open and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back.
    RolledBack,
}

impl TransactionState {
    /// Returns true for `Committed` and `RolledBack`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::Active
    }

    pub(crate) fn ensure_active(self) -> CoreResult<()> {
        match self {
            Self::Active => Ok(()),
            Self::Committed | Self::RolledBack => Err(CoreError::TransactionClosed),
        }
    }
}

/// What a writable transaction changed, and the fill hint for each change.
///
/// A `None` hint means the backend default applies. A later write that
/// carries a hint replaces an earlier one; a write without a hint keeps it.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChangeSet {
    pub(crate) tables: BTreeMap<String, Option<f64>>,
    pub(crate) indexes: BTreeMap<IndexName, Option<f64>>,
    pub(crate) schema_changed: bool,
}

impl ChangeSet {
    pub(crate) fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.indexes.is_empty() && !self.schema_changed
    }

    pub(crate) fn touch_table(&mut self, table: &str, hint: Option<f64>) {
        let slot = self.tables.entry(table.to_owned()).or_insert(None);
        if hint.is_some() {
            *slot = hint;
        }
    }

    pub(crate) fn touch_index(&mut self, table: &str, name: &str, hint: Option<f64>) {
        let slot = self
            .indexes
            .entry((table.to_owned(), name.to_owned()))
            .or_insert(None);
        if hint.is_some() {
            *slot = hint;
        }
    }

    pub(crate) fn forget_table(&mut self, table: &str, indexes: &[String]) {
        self.tables.remove(table);
        for index in indexes {
            self.indexes.remove(&(table.to_owned(), index.clone()));
        }
        self.schema_changed = true;
    }

    pub(crate) fn forget_index(&mut self, table: &str, name: &str) {
        self.indexes.remove(&(table.to_owned(), name.to_owned()));
        self.schema_changed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_is_open() {
        assert!(TransactionState::Active.ensure_active().is_ok());
        assert!(TransactionState::Committed.is_terminal());
        assert!(matches!(
            TransactionState::RolledBack.ensure_active(),
            Err(CoreError::TransactionClosed)
        ));
    }

    #[test]
    fn new_change_set_is_empty() {
        assert!(ChangeSet::default().is_empty());
    }

    #[test]
    fn later_hint_wins_and_missing_hint_keeps_previous() {
        let mut changes = ChangeSet::default();
        changes.touch_table("t", None);
        assert_eq!(changes.tables["t"], None);

        changes.touch_table("t", Some(0.9));
        changes.touch_table("t", None);
        assert_eq!(changes.tables["t"], Some(0.9));

        changes.touch_table("t", Some(0.6));
        assert_eq!(changes.tables["t"], Some(0.6));
    }

    #[test]
    fn forgetting_a_table_still_counts_as_a_change() {
        let mut changes = ChangeSet::default();
        changes.touch_table("t", None);
        changes.touch_index("t", "f", Some(1.0));

        changes.forget_table("t", &["f".to_owned()]);
        assert!(changes.tables.is_empty());
        assert!(changes.indexes.is_empty());
        assert!(!changes.is_empty());
    }
}
