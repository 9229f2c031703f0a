//! Transactions over copy-on-write catalog snapshots.
//!
//! ## Isolation
//!
//! Every transaction starts from the catalog committed at `begin`. Readers
//! only ever look at that snapshot. The single writer mutates a private
//! copy: the catalog is cloned on its first write, and each table or index
//! is cloned on its first write, so untouched state stays shared.
//!
//! ## Commit
//!
//! A writable commit stamps the private catalog with the next sequence
//! number, hands it to the engine's durability backend and, once that
//! succeeds, publishes it as the state new transactions start from.
//! Readers that began earlier keep their old snapshot.

mod handles;
mod manager;
mod mvcc;
mod state;

pub use handles::{IndexRef, TableRef};
pub use mvcc::MvccTransaction;
pub use state::TransactionState;

pub(crate) use manager::TransactionManager;
pub(crate) use state::ChangeSet;
