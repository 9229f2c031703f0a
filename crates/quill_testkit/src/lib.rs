//! # Quill Testkit
//!
//! Test utilities for Quill.
//!
//! This crate provides:
//! - Fixtures for in-memory and file-backed engines
//! - A conformance suite any [`quill_core::Engine`] must pass
//! - Property-based test generators using proptest
//! - Concurrency stress helpers
//! - Page stores that fail on demand, for recovery tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quill_core::MemoryEngine;
//!
//! // Expands to one #[test] per contract check.
//! quill_testkit::contract_tests!(|| MemoryEngine::default());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod contract;
pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use crash::{CrashHandle, CrashPoint, CrashablePageStore};
pub use fixtures::*;
pub use generators::*;
pub use stress::*;

/// Expands to one `#[test]` per check in [`contract`], each run against a
/// fresh engine built by `$factory`.
#[macro_export]
macro_rules! contract_tests {
    ($factory:expr) => {
        $crate::contract_tests!(@checks $factory;
            terminal_transactions_reject_calls,
            at_most_one_writer,
            create_then_lookup_in_same_transaction,
            duplicate_table_is_rejected,
            index_on_missing_table_is_rejected,
            read_only_transactions_cannot_write,
            fill_percent_hint_is_accepted,
            users_scenario,
            snapshot_scenario,
            close_with_open_transaction,
            rollback_is_invisible,
            indexes_follow_snapshot,
            table_iteration_is_stable,
            index_iterates_in_key_order,
            drop_table_removes_indexes,
            record_ids_are_not_reused,
        );
    };
    (@checks $factory:expr; $($check:ident),* $(,)?) => {
        $(
            #[test]
            fn $check() {
                $crate::init_tracing();
                let engine = ($factory)();
                $crate::contract::$check(&engine);
            }
        )*
    };
}
