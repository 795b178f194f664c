//! Test Utilities Crate
//!
//! Shared fixtures and helpers for the BrickBook test suites.
//!
//! # Modules
//!
//! - `fixtures`: amounts, dates, customer profiles, in-memory ledger wiring
//! - `builders`: `LedgerEntryBuilder` for store-free tests
//! - `database`: PostgreSQL container harness
//! - `assertions`: ledger invariant checks
//! - `generators`: proptest strategies for amounts and operation sequences

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
