//! Ledger adapters that live alongside the domain
//!
//! The PostgreSQL adapter lives in `infra_db`.

pub mod memory;

pub use memory::{InMemoryDirectory, InMemoryLedgerStore};
#[cfg(any(test, feature = "testing"))]
pub use memory::HeldCustomerLock;
