//! Advance Ledger Domain
//!
//! Tracks money a customer has paid ahead of (or in excess of) what they
//! owe. The ledger is append-only:
//!
//! - **FundsAdded**: manual top-up, positive
//! - **ExtraPayment**: overpayment on a sale, positive
//! - **ConsumedBySale**: advance applied to a sale, negative
//! - **Reversed**: correction carrying the negated amount of its target
//!
//! # Invariants
//!
//! - A customer's balance equals the sum of their entry amounts
//! - The balance never goes negative
//! - Entries never change; an entry is reversed at most once
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_ledger::{InMemoryLedgerStore, LedgerService, LedgerSettings};
//!
//! let store = Arc::new(InMemoryLedgerStore::default());
//! let service = LedgerService::new(store, LedgerSettings::default());
//!
//! service.add_funds(customer, dec!(5000), None, None).await?;
//! let receipt = service.consume_for_sale(customer, dec!(2000), sale).await?;
//! assert_eq!(receipt.balance, dec!(3000));
//! ```

pub mod entry;
pub mod error;
pub mod ports;
pub mod projector;
pub mod service;
pub mod reporting;
pub mod adapters;

pub use entry::{EntryDraft, EntryKind, KindFilter, LedgerEntry, MAX_AMOUNT};
pub use error::LedgerError;
pub use ports::{
    AppendReceipt, CustomerBalance, CustomerProfile, CustomerSnapshot, FeedQuery, LedgerReader,
    LedgerStore, ReferenceDirectory, SaleReference,
};
pub use projector::{BalanceProjector, Reconciliation};
pub use service::{LedgerService, LedgerSettings, NewBalance};
pub use reporting::{
    breakdown, filter_entries, sum_by_kind, AdvanceSummary, KindTotals, LedgerReports,
    PeriodGranularity, PeriodTotals,
};
pub use adapters::{InMemoryDirectory, InMemoryLedgerStore};
