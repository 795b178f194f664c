//! PostgreSQL Advance Ledger Adapter
//!
//! Implements [`LedgerStore`] on top of [`AdvanceRepository`].
//!
//! # Append
//!
//! Each append is one transaction:
//!
//! 1. `SET LOCAL lock_timeout` and lock the customer's `customer_balances`
//!    row with `SELECT ... FOR UPDATE` (created at zero on first use)
//! 2. For reversals, confirm the target belongs to the customer and has no
//!    reversal yet
//! 3. Apply the domain balance check
//! 4. Insert the entry and write the new balance
//!
//! A rejected draft rolls back, so no balance row is left behind for a
//! customer whose first append failed.
//!
//! # Error Handling
//!
//! - `55P03` lock timeout, `40001`/`40P01`, pool exhaustion -> `Contention`
//! - `23505` on the single-reversal index -> `AlreadyReversed`
//! - everything else -> `Storage`, logged at `warn` when transient

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

use core_kernel::{
    CustomerId, DomainPort, HealthCheckResult, HealthCheckable, LedgerEntryId, PortError, SaleId,
};
use domain_ledger::projector::apply_to_balance;
use domain_ledger::{
    AppendReceipt, CustomerBalance, CustomerSnapshot, EntryDraft, EntryKind, FeedQuery,
    KindFilter, LedgerEntry, LedgerError, LedgerReader, LedgerStore,
};

use crate::error::DatabaseError;
use crate::repositories::advance::{
    AdvanceEntryRow, AdvanceRepository, BalanceRow, EntryFilter, NewAdvanceEntry,
};

/// PostgreSQL-backed ledger store
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    repository: AdvanceRepository,
    lock_timeout: Duration,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self {
            repository: AdvanceRepository::new(pool),
            lock_timeout,
        }
    }

    pub fn repository(&self) -> &AdvanceRepository {
        &self.repository
    }
}

/// Maps database failures onto ledger errors
pub(crate) fn db_to_ledger_error(error: DatabaseError) -> LedgerError {
    match error {
        DatabaseError::LockTimeout(message) | DatabaseError::SerializationFailure(message) => {
            LedgerError::contention(message)
        }
        DatabaseError::PoolExhausted => {
            LedgerError::contention("no database connection available")
        }
        other => {
            let error = PortError::from(other);
            if error.is_transient() {
                warn!(error = %error, "Transient storage failure");
            } else {
                error!(error = %error, "Storage failure");
            }
            LedgerError::Storage(error)
        }
    }
}

fn row_to_entry(row: AdvanceEntryRow) -> Result<LedgerEntry, LedgerError> {
    let kind = row.kind.parse::<EntryKind>().map_err(|_| {
        LedgerError::Storage(PortError::internal(format!(
            "entry {} has unknown kind '{}'",
            row.entry_id, row.kind
        )))
    })?;

    Ok(LedgerEntry {
        id: LedgerEntryId::from_uuid(row.entry_id),
        sequence: row.sequence,
        customer_id: CustomerId::from_uuid(row.customer_id),
        kind,
        amount: row.amount,
        description: row.description,
        reference: row.reference,
        related_sale_id: row.related_sale_id.map(SaleId::from_uuid),
        reverses: row.reverses_entry_id.map(LedgerEntryId::from_uuid),
        created_at: row.created_at,
    })
}

fn rows_to_entries(rows: Vec<AdvanceEntryRow>) -> Result<Vec<LedgerEntry>, LedgerError> {
    rows.into_iter().map(row_to_entry).collect()
}

fn row_to_balance(row: BalanceRow) -> CustomerBalance {
    CustomerBalance {
        customer_id: CustomerId::from_uuid(row.customer_id),
        balance: row.balance,
        updated_at: row.updated_at,
    }
}

fn kind_column(filter: KindFilter) -> Option<&'static str> {
    match filter {
        KindFilter::All => None,
        KindFilter::Only(kind) => Some(kind.as_str()),
    }
}

impl DomainPort for PostgresLedgerStore {}

#[async_trait]
impl HealthCheckable for PostgresLedgerStore {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let result = crate::pool::ping(self.repository.pool()).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => HealthCheckResult::healthy("postgres-ledger", latency_ms),
            Err(e) => HealthCheckResult::unhealthy(
                "postgres-ledger",
                latency_ms,
                format!("Database error: {}", e),
            ),
        }
    }
}

#[async_trait]
impl LedgerReader for PostgresLedgerStore {
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    async fn list_by_customer(
        &self,
        customer_id: CustomerId,
        filter: KindFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = self
            .repository
            .list_by_customer(*customer_id.as_uuid(), kind_column(filter))
            .await
            .map_err(db_to_ledger_error)?;
        debug!(count = rows.len(), "Loaded customer history");
        rows_to_entries(rows)
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    async fn customer_snapshot(
        &self,
        customer_id: CustomerId,
        filter: KindFilter,
    ) -> Result<CustomerSnapshot, LedgerError> {
        let (balance, rows) = self
            .repository
            .customer_snapshot(*customer_id.as_uuid(), kind_column(filter))
            .await
            .map_err(db_to_ledger_error)?;
        debug!(count = rows.len(), "Loaded customer snapshot");
        Ok(CustomerSnapshot {
            customer_id,
            balance: balance.map_or(Decimal::ZERO, |r| r.balance),
            entries: rows_to_entries(rows)?,
        })
    }

    #[instrument(skip(self))]
    async fn list_entries(&self, query: &FeedQuery) -> Result<Vec<LedgerEntry>, LedgerError> {
        let filter = EntryFilter {
            customer_id: query.customer_id.map(|id| *id.as_uuid()),
            kind: kind_column(query.kind).map(str::to_string),
            from: query.range.map(|r| r.start),
            to: query.range.map(|r| r.end),
            limit: query.limit.map(|l| l as i64),
        };
        let rows = self
            .repository
            .list_entries(&filter)
            .await
            .map_err(db_to_ledger_error)?;
        debug!(count = rows.len(), "Loaded ledger feed");
        rows_to_entries(rows)
    }

    #[instrument(skip(self), fields(entry_id = %id))]
    async fn find_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, LedgerError> {
        self.repository
            .find_entry(*id.as_uuid())
            .await
            .map_err(db_to_ledger_error)?
            .map(row_to_entry)
            .transpose()
    }

    async fn is_reversed(&self, id: LedgerEntryId) -> Result<bool, LedgerError> {
        self.repository
            .is_reversed(*id.as_uuid())
            .await
            .map_err(db_to_ledger_error)
    }

    async fn stored_balance(&self, customer_id: CustomerId) -> Result<Decimal, LedgerError> {
        let row = self
            .repository
            .get_balance(*customer_id.as_uuid())
            .await
            .map_err(db_to_ledger_error)?;
        Ok(row.map_or(Decimal::ZERO, |r| r.balance))
    }

    async fn balances(&self) -> Result<Vec<CustomerBalance>, LedgerError> {
        let rows = self
            .repository
            .list_balances()
            .await
            .map_err(db_to_ledger_error)?;
        Ok(rows.into_iter().map(row_to_balance).collect())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(
        skip(self, draft),
        fields(customer_id = %draft.customer_id(), kind = %draft.kind(), amount = %draft.amount())
    )]
    async fn append(&self, draft: EntryDraft) -> Result<AppendReceipt, LedgerError> {
        let customer_uuid = *draft.customer_id().as_uuid();
        let mut tx = self.repository.begin().await.map_err(db_to_ledger_error)?;

        let locked = AdvanceRepository::lock_balance(&mut *tx, customer_uuid, self.lock_timeout)
            .await
            .map_err(|e| {
                if e.is_retryable() {
                    warn!(error = %e, "Customer balance row busy");
                }
                db_to_ledger_error(e)
            })?;

        if let Some(target) = draft.reverses() {
            let target_uuid = *target.as_uuid();
            if !AdvanceRepository::entry_belongs_to(&mut *tx, target_uuid, customer_uuid)
                .await
                .map_err(db_to_ledger_error)?
            {
                return Err(LedgerError::NotFound(target));
            }
            if AdvanceRepository::has_reversal(&mut *tx, target_uuid)
                .await
                .map_err(db_to_ledger_error)?
            {
                return Err(LedgerError::AlreadyReversed(target));
            }
        }

        let balance = apply_to_balance(locked.balance, &draft)?;
        let created_at = Utc::now().max(locked.updated_at);

        let new_entry = NewAdvanceEntry {
            entry_id: *LedgerEntryId::new_v7().as_uuid(),
            customer_id: customer_uuid,
            kind: draft.kind().as_str().to_string(),
            amount: draft.amount(),
            description: draft.description().to_string(),
            reference: draft.reference().map(str::to_string),
            related_sale_id: draft.related_sale_id().map(|id| *id.as_uuid()),
            reverses_entry_id: draft.reverses().map(|id| *id.as_uuid()),
            created_at,
        };

        let row = match AdvanceRepository::insert_entry(&mut *tx, new_entry).await {
            Ok(row) => row,
            Err(DatabaseError::DuplicateEntry(message)) => {
                return Err(match draft.reverses() {
                    Some(target) => LedgerError::AlreadyReversed(target),
                    None => db_to_ledger_error(DatabaseError::DuplicateEntry(message)),
                });
            }
            Err(e) => return Err(db_to_ledger_error(e)),
        };

        AdvanceRepository::set_balance(&mut *tx, customer_uuid, balance, row.created_at)
            .await
            .map_err(db_to_ledger_error)?;
        tx.commit()
            .await
            .map_err(|e| db_to_ledger_error(e.into()))?;

        let entry = row_to_entry(row)?;
        debug!(entry_id = %entry.id, balance = %balance, "Appended ledger entry");
        Ok(AppendReceipt { entry, balance })
    }
}
