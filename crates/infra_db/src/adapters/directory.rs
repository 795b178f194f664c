//! PostgreSQL reference directory
//!
//! Resolves customer names and invoice numbers for ledger listings from the
//! application's `customers` and `sales` tables.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{debug, instrument};

use core_kernel::{CustomerId, DomainPort, PortError, SaleId};
use domain_ledger::{CustomerProfile, ReferenceDirectory, SaleReference};

use crate::repositories::reference::ReferenceRepository;

#[derive(Debug, Clone)]
pub struct PostgresReferenceDirectory {
    repository: ReferenceRepository,
}

impl PostgresReferenceDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: ReferenceRepository::new(pool),
        }
    }
}

impl DomainPort for PostgresReferenceDirectory {}

#[async_trait]
impl ReferenceDirectory for PostgresReferenceDirectory {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn customer_profiles(
        &self,
        ids: &[CustomerId],
    ) -> Result<HashMap<CustomerId, CustomerProfile>, PortError> {
        let uuids: Vec<_> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = self
            .repository
            .customers_by_ids(&uuids)
            .await
            .map_err(PortError::from)?;
        debug!(found = rows.len(), "Resolved customers");

        Ok(rows
            .into_iter()
            .map(|row| {
                let id = CustomerId::from_uuid(row.customer_id);
                let profile = CustomerProfile {
                    id,
                    name: row.name,
                    phone: row.phone,
                };
                (id, profile)
            })
            .collect())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn sale_references(
        &self,
        ids: &[SaleId],
    ) -> Result<HashMap<SaleId, SaleReference>, PortError> {
        let uuids: Vec<_> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = self
            .repository
            .sales_by_ids(&uuids)
            .await
            .map_err(PortError::from)?;
        debug!(found = rows.len(), "Resolved sales");

        Ok(rows
            .into_iter()
            .map(|row| {
                let id = SaleId::from_uuid(row.sale_id);
                (id, SaleReference { id, invoice_no: row.invoice_no })
            })
            .collect())
    }
}
