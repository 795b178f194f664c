//! Port adapters backed by PostgreSQL
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresLedgerStore;
//! use domain_ledger::LedgerStore;
//!
//! let store: Arc<dyn LedgerStore> = Arc::new(PostgresLedgerStore::new(pool, lock_timeout));
//! store.append(draft).await?;
//! ```

pub mod advance;
pub mod directory;

pub use advance::PostgresLedgerStore;
pub use directory::PostgresReferenceDirectory;
