//! SQL repositories
//!
//! Repositories speak in row types and [`DatabaseError`](crate::DatabaseError);
//! the adapters translate to domain types.

pub mod advance;
pub mod reference;

pub use advance::{AdvanceEntryRow, AdvanceRepository, BalanceRow, EntryFilter, NewAdvanceEntry};
pub use reference::{CustomerRow, ReferenceRepository, SaleRow};
