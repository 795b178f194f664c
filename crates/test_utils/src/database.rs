//! Database Test Utilities
//!
//! Starts PostgreSQL in a container, applies the ledger schema and hands
//! out a pool. Tests using it need Docker and are marked `#[ignore]`.

use once_cell::sync::Lazy;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

use domain_ledger::{CustomerProfile, SaleReference};

const POSTGRES_IMAGE: &str = "postgres";
const POSTGRES_USER: &str = "brickbook";
const POSTGRES_PASSWORD: &str = "brickbook_test";
const POSTGRES_DB: &str = "brickbook_test";

/// Image tag, overridable with `TEST_POSTGRES_TAG`
static POSTGRES_TAG: Lazy<String> =
    Lazy::new(|| std::env::var("TEST_POSTGRES_TAG").unwrap_or_else(|_| "16-alpine".to_string()));

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone)]
pub struct TestDatabaseConfig {
    pub user: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
}

impl Default for TestDatabaseConfig {
    fn default() -> Self {
        Self {
            user: POSTGRES_USER.to_string(),
            password: POSTGRES_PASSWORD.to_string(),
            database: POSTGRES_DB.to_string(),
            host: "localhost".to_string(),
            port: 5432,
        }
    }
}

impl TestDatabaseConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// A running PostgreSQL container with the ledger schema applied
pub struct TestDatabase {
    _container: ContainerAsync<GenericImage>,
    pub config: TestDatabaseConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    pub async fn new() -> Result<Self, BoxError> {
        let container = GenericImage::new(POSTGRES_IMAGE, POSTGRES_TAG.as_str())
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_env_var("POSTGRES_USER", POSTGRES_USER)
            .with_env_var("POSTGRES_PASSWORD", POSTGRES_PASSWORD)
            .with_env_var("POSTGRES_DB", POSTGRES_DB)
            .start()
            .await?;

        let config = TestDatabaseConfig {
            host: container.get_host().await?.to_string(),
            port: container.get_host_port_ipv4(5432).await?,
            ..TestDatabaseConfig::default()
        };

        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.connection_url())
            .await?;

        let db = Self {
            _container: container,
            config,
            pool,
        };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), BoxError> {
        let schema = include_str!("../../../migrations/20240101_000001_initial_schema.sql");
        sqlx::raw_sql(schema).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn insert_customer(&self, profile: &CustomerProfile) -> Result<(), BoxError> {
        sqlx::query("INSERT INTO customers (customer_id, name, phone) VALUES ($1, $2, $3)")
            .bind(*profile.id.as_uuid())
            .bind(&profile.name)
            .bind(&profile.phone)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_sale(&self, sale: &SaleReference) -> Result<(), BoxError> {
        sqlx::query("INSERT INTO sales (sale_id, invoice_no) VALUES ($1, $2)")
            .bind(*sale.id.as_uuid())
            .bind(&sale.invoice_no)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub async fn create_isolated_test_database() -> Result<TestDatabase, BoxError> {
    TestDatabase::new().await
}

/// Declares an ignored tokio test that receives a fresh database as `db`
#[macro_export]
macro_rules! db_test {
    ($name:ident, |$db:ident| $body:block) => {
        #[tokio::test]
        #[ignore = "requires docker"]
        async fn $name() {
            let $db = $crate::database::create_isolated_test_database()
                .await
                .expect("Failed to create test database");
            $body
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_connection_url() {
        let url = TestDatabaseConfig::default().connection_url();
        assert!(url.starts_with("postgres://"));
        assert!(url.contains(POSTGRES_USER));
        assert!(url.ends_with(POSTGRES_DB));
    }
}
