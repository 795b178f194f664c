//! Customer and sale lookups for ledger display

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DatabaseError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CustomerRow {
    pub customer_id: Uuid,
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SaleRow {
    pub sale_id: Uuid,
    pub invoice_no: String,
}

/// Read-only access to `customers` and `sales`
#[derive(Debug, Clone)]
pub struct ReferenceRepository {
    pool: PgPool,
}

impl ReferenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn customers_by_ids(&self, ids: &[Uuid]) -> Result<Vec<CustomerRow>, DatabaseError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, CustomerRow>(
            "SELECT customer_id, name, phone FROM customers WHERE customer_id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn sales_by_ids(&self, ids: &[Uuid]) -> Result<Vec<SaleRow>, DatabaseError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, SaleRow>(
            "SELECT sale_id, invoice_no FROM sales WHERE sale_id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
