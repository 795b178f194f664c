//! Advance ledger repository
//!
//! Plain SQL over `advance_entries` and `customer_balances`. The write path
//! is split into steps that run on one transaction so the adapter can put
//! the domain balance check between locking the row and inserting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

use crate::error::DatabaseError;

const ENTRY_COLUMNS: &str = "entry_id, sequence, customer_id, kind, amount, description, \
     reference, related_sale_id, reverses_entry_id, created_at";

/// Row in `advance_entries`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdvanceEntryRow {
    pub entry_id: Uuid,
    pub sequence: i64,
    pub customer_id: Uuid,
    pub kind: String,
    pub amount: Decimal,
    pub description: String,
    pub reference: Option<String>,
    pub related_sale_id: Option<Uuid>,
    pub reverses_entry_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Row in `customer_balances`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BalanceRow {
    pub customer_id: Uuid,
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Values for a new `advance_entries` row
#[derive(Debug, Clone)]
pub struct NewAdvanceEntry {
    pub entry_id: Uuid,
    pub customer_id: Uuid,
    pub kind: String,
    pub amount: Decimal,
    pub description: String,
    pub reference: Option<String>,
    pub related_sale_id: Option<Uuid>,
    pub reverses_entry_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Filter for ledger-wide listings
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub customer_id: Option<Uuid>,
    pub kind: Option<String>,
    /// Inclusive lower bound on `created_at`
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AdvanceRepository {
    pool: PgPool,
}

impl AdvanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, DatabaseError> {
        Ok(self.pool.begin().await?)
    }

    /// Locks the customer's balance row for the rest of the transaction,
    /// creating it at zero if needed
    ///
    /// Waits at most `lock_timeout`; a busy row fails with
    /// [`DatabaseError::LockTimeout`].
    pub async fn lock_balance(
        conn: &mut PgConnection,
        customer_id: Uuid,
        lock_timeout: Duration,
    ) -> Result<BalanceRow, DatabaseError> {
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", lock_timeout.as_millis()))
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO customer_balances (customer_id, balance)
            VALUES ($1, 0)
            ON CONFLICT (customer_id) DO NOTHING
            "#,
        )
        .bind(customer_id)
        .execute(&mut *conn)
        .await?;

        let row = sqlx::query_as::<_, BalanceRow>(
            r#"
            SELECT customer_id, balance, updated_at
            FROM customer_balances
            WHERE customer_id = $1
            FOR UPDATE
            "#,
        )
        .bind(customer_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }

    /// Returns true if `entry_id` exists and belongs to `customer_id`
    pub async fn entry_belongs_to(
        conn: &mut PgConnection,
        entry_id: Uuid,
        customer_id: Uuid,
    ) -> Result<bool, DatabaseError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM advance_entries WHERE entry_id = $1 AND customer_id = $2
            )
            "#,
        )
        .bind(entry_id)
        .bind(customer_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(exists)
    }

    pub async fn has_reversal(
        conn: &mut PgConnection,
        entry_id: Uuid,
    ) -> Result<bool, DatabaseError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM advance_entries WHERE reverses_entry_id = $1)",
        )
        .bind(entry_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(exists)
    }

    pub async fn insert_entry(
        conn: &mut PgConnection,
        entry: NewAdvanceEntry,
    ) -> Result<AdvanceEntryRow, DatabaseError> {
        let sql = format!(
            r#"
            INSERT INTO advance_entries (
                entry_id, customer_id, kind, amount, description,
                reference, related_sale_id, reverses_entry_id, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        );

        let row = sqlx::query_as::<_, AdvanceEntryRow>(&sql)
            .bind(entry.entry_id)
            .bind(entry.customer_id)
            .bind(entry.kind)
            .bind(entry.amount)
            .bind(entry.description)
            .bind(entry.reference)
            .bind(entry.related_sale_id)
            .bind(entry.reverses_entry_id)
            .bind(entry.created_at)
            .fetch_one(&mut *conn)
            .await?;

        Ok(row)
    }

    pub async fn set_balance(
        conn: &mut PgConnection,
        customer_id: Uuid,
        balance: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE customer_balances
            SET balance = $2, updated_at = $3
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .bind(balance)
        .bind(updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Entries for one customer, newest first
    pub async fn list_by_customer(
        &self,
        customer_id: Uuid,
        kind: Option<&str>,
    ) -> Result<Vec<AdvanceEntryRow>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_customer_entries(&mut conn, customer_id, kind).await
    }

    /// Balance row and entries for one customer from a single snapshot
    ///
    /// Both reads run in one `REPEATABLE READ` transaction, so an append
    /// committed in between is either fully visible or not at all.
    pub async fn customer_snapshot(
        &self,
        customer_id: Uuid,
        kind: Option<&str>,
    ) -> Result<(Option<BalanceRow>, Vec<AdvanceEntryRow>), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let balance = Self::fetch_balance(&mut *tx, customer_id).await?;
        let entries = Self::fetch_customer_entries(&mut *tx, customer_id, kind).await?;
        tx.commit().await?;
        Ok((balance, entries))
    }

    async fn fetch_customer_entries(
        conn: &mut PgConnection,
        customer_id: Uuid,
        kind: Option<&str>,
    ) -> Result<Vec<AdvanceEntryRow>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM advance_entries
            WHERE customer_id = $1
              AND ($2::text IS NULL OR kind = $2)
            ORDER BY created_at DESC, sequence DESC
            "#,
            ENTRY_COLUMNS
        );

        let rows = sqlx::query_as::<_, AdvanceEntryRow>(&sql)
            .bind(customer_id)
            .bind(kind)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    /// Entries across customers, newest first
    pub async fn list_entries(
        &self,
        filter: &EntryFilter,
    ) -> Result<Vec<AdvanceEntryRow>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM advance_entries
            WHERE ($1::uuid IS NULL OR customer_id = $1)
              AND ($2::text IS NULL OR kind = $2)
              AND ($3::timestamptz IS NULL OR created_at >= $3)
              AND ($4::timestamptz IS NULL OR created_at < $4)
            ORDER BY created_at DESC, sequence DESC
            LIMIT $5
            "#,
            ENTRY_COLUMNS
        );

        let rows = sqlx::query_as::<_, AdvanceEntryRow>(&sql)
            .bind(filter.customer_id)
            .bind(filter.kind.as_deref())
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn find_entry(
        &self,
        entry_id: Uuid,
    ) -> Result<Option<AdvanceEntryRow>, DatabaseError> {
        let sql = format!("SELECT {} FROM advance_entries WHERE entry_id = $1", ENTRY_COLUMNS);
        let row = sqlx::query_as::<_, AdvanceEntryRow>(&sql)
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn is_reversed(&self, entry_id: Uuid) -> Result<bool, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Self::has_reversal(&mut conn, entry_id).await
    }

    pub async fn get_balance(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<BalanceRow>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_balance(&mut conn, customer_id).await
    }

    async fn fetch_balance(
        conn: &mut PgConnection,
        customer_id: Uuid,
    ) -> Result<Option<BalanceRow>, DatabaseError> {
        let row = sqlx::query_as::<_, BalanceRow>(
            "SELECT customer_id, balance, updated_at FROM customer_balances WHERE customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row)
    }

    pub async fn list_balances(&self) -> Result<Vec<BalanceRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, BalanceRow>(
            "SELECT customer_id, balance, updated_at FROM customer_balances ORDER BY customer_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
