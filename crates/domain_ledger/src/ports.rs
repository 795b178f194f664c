//! Advance Ledger Ports
//!
//! Port traits the ledger needs from its persistence layer, split by
//! capability:
//!
//! - [`LedgerReader`]: read-only access, all reports are built on this
//! - [`LedgerStore`]: adds `append`, only [`LedgerService`](crate::LedgerService)
//!   holds one
//! - [`ReferenceDirectory`]: display details (customer names, invoice numbers)
//!   owned by other parts of the application
//!
//! Adapters:
//!
//! - **In-memory**: [`InMemoryLedgerStore`](crate::adapters::InMemoryLedgerStore)
//! - **PostgreSQL**: `infra_db::adapters::PostgresLedgerStore`
//!
//! ```rust,ignore
//! let store: Arc<dyn LedgerStore> = match config.storage {
//!     StorageBackend::Memory => Arc::new(InMemoryLedgerStore::new(settings.lock_timeout)),
//!     StorageBackend::Postgres => Arc::new(PostgresLedgerStore::new(pool, settings.lock_timeout)),
//! };
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use core_kernel::{
    CustomerId, DateRange, DomainPort, HealthCheckable, LedgerEntryId, PortError, SaleId,
};

use crate::entry::{EntryDraft, KindFilter, LedgerEntry};
use crate::error::LedgerError;

/// Ledger-wide listing filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedQuery {
    /// Restrict to one customer
    pub customer_id: Option<CustomerId>,
    pub kind: KindFilter,
    /// Half-open UTC window on `created_at`
    pub range: Option<DateRange>,
    /// Maximum entries returned, newest first
    pub limit: Option<usize>,
}

impl FeedQuery {
    pub fn for_customer(customer_id: CustomerId) -> Self {
        Self {
            customer_id: Some(customer_id),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: KindFilter) -> Self {
        self.kind = kind;
        self
    }

    pub fn within(mut self, range: Option<DateRange>) -> Self {
        self.range = range;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if `entry` passes every filter except `limit`
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.customer_id.map_or(true, |id| id == entry.customer_id)
            && self.kind.matches(entry.kind)
            && self.range.map_or(true, |r| r.contains(entry.created_at))
    }
}

/// Result of a successful append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReceipt {
    pub entry: LedgerEntry,
    /// Customer balance after the append
    pub balance: Decimal,
}

/// Denormalized balance row for one customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerBalance {
    pub customer_id: CustomerId,
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// One customer's balance and entries, read together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerSnapshot {
    pub customer_id: CustomerId,
    /// Denormalized balance, zero when the customer has no row
    pub balance: Decimal,
    /// Newest first
    pub entries: Vec<LedgerEntry>,
}

impl CustomerSnapshot {
    pub fn empty(customer_id: CustomerId) -> Self {
        Self {
            customer_id,
            balance: Decimal::ZERO,
            entries: Vec::new(),
        }
    }
}

/// Read-only access to the ledger
#[async_trait]
pub trait LedgerReader: DomainPort + HealthCheckable {
    /// Entries for one customer, newest first
    async fn list_by_customer(
        &self,
        customer_id: CustomerId,
        filter: KindFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Balance and matching entries as of one instant
    ///
    /// No append for the customer can land between the two reads, so the
    /// balance always equals the sum of the unfiltered entries.
    async fn customer_snapshot(
        &self,
        customer_id: CustomerId,
        filter: KindFilter,
    ) -> Result<CustomerSnapshot, LedgerError>;

    /// Entries across customers, newest first
    async fn list_entries(&self, query: &FeedQuery) -> Result<Vec<LedgerEntry>, LedgerError>;

    async fn find_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Returns true if a `Reversed` entry targets `id`
    async fn is_reversed(&self, id: LedgerEntryId) -> Result<bool, LedgerError>;

    /// Denormalized balance, zero when the customer has no row
    async fn stored_balance(&self, customer_id: CustomerId) -> Result<Decimal, LedgerError>;

    /// Every customer that has a balance row
    async fn balances(&self) -> Result<Vec<CustomerBalance>, LedgerError>;
}

/// Read-write access to the ledger
#[async_trait]
pub trait LedgerStore: LedgerReader {
    /// Stores `draft` and updates the customer's balance atomically
    ///
    /// Implementations serialize appends per customer and reject, before
    /// writing, any draft that would make the balance negative or that
    /// targets an entry which already has a reversal.
    async fn append(&self, draft: EntryDraft) -> Result<AppendReceipt, LedgerError>;
}

/// Display details for a customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub id: CustomerId,
    pub name: String,
    pub phone: Option<String>,
}

/// Display details for a sale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleReference {
    pub id: SaleId,
    pub invoice_no: String,
}

/// Lookup of customer and sale details owned outside the ledger
///
/// Missing ids are simply absent from the returned maps.
#[async_trait]
pub trait ReferenceDirectory: DomainPort {
    async fn customer_profiles(
        &self,
        ids: &[CustomerId],
    ) -> Result<HashMap<CustomerId, CustomerProfile>, PortError>;

    async fn sale_references(
        &self,
        ids: &[SaleId],
    ) -> Result<HashMap<SaleId, SaleReference>, PortError>;
}
