//! Core Kernel - Foundational types shared by the BrickBook crates
//!
//! - Money and currency handling with precise decimal arithmetic
//! - Business-timezone report periods
//! - Strongly-typed identifiers
//! - Port/adapter plumbing (errors, health checks)

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;
pub mod error;

pub use money::{Money, Currency, MoneyError};
pub use temporal::{DateRange, ReportPeriod, Timezone, TemporalError};
pub use identifiers::{CustomerId, SaleId, LedgerEntryId};
pub use ports::{
    PortError, DomainPort, AdapterHealth, HealthCheckResult, HealthCheckable,
};
pub use error::CoreError;
