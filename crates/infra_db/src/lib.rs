//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the advance ledger using SQLx.
//!
//! - [`pool`]: connection pool, ping, migrations
//! - [`repositories`]: SQL over the ledger, customer and sale tables
//! - [`adapters`]: `LedgerStore` and `ReferenceDirectory` implementations
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, DatabaseConfig, PostgresLedgerStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/brickbook")).await?;
//! let store = PostgresLedgerStore::new(pool, Duration::from_secs(5));
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{
    create_pool, create_pool_from_url, ping, run_migrations, DatabaseConfig, DatabasePool,
};
pub use error::DatabaseError;
pub use adapters::{PostgresLedgerStore, PostgresReferenceDirectory};
