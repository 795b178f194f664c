//! Pre-built Test Fixtures
//!
//! Predictable ledger data for unit and integration tests.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use fake::faker::name::en::Name;
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use core_kernel::{CustomerId, SaleId, Timezone};
use domain_ledger::{
    CustomerProfile, InMemoryDirectory, InMemoryLedgerStore, LedgerService, LedgerSettings,
    SaleReference,
};

/// Amounts used across the ledger scenarios
pub struct AmountFixtures;

impl AmountFixtures {
    pub fn top_up() -> Decimal {
        dec!(5000)
    }

    pub fn sale_consumption() -> Decimal {
        dec!(2000)
    }

    pub fn overpayment() -> Decimal {
        dec!(300)
    }
}

/// Fixed instants and dates in the business timezone
pub struct TemporalFixtures;

impl TemporalFixtures {
    pub fn business_timezone() -> Timezone {
        Timezone::default()
    }

    /// 10:00 IST on 17 Oct 2026
    pub fn business_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 4, 30, 0).unwrap()
    }

    /// 23:30 IST on 16 Oct 2026, still the 16th locally but 18:00 UTC
    pub fn late_evening() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 18, 0, 0).unwrap()
    }

    pub fn business_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }
}

/// Customer and sale display records
pub struct ReferenceFixtures;

impl ReferenceFixtures {
    /// A customer with a generated name and phone
    pub fn customer() -> CustomerProfile {
        CustomerProfile {
            id: CustomerId::new(),
            name: Name().fake(),
            phone: Some(PhoneNumber().fake()),
        }
    }

    pub fn named_customer(name: &str) -> CustomerProfile {
        CustomerProfile {
            id: CustomerId::new(),
            name: name.to_string(),
            phone: None,
        }
    }

    pub fn sale(invoice_no: &str) -> SaleReference {
        SaleReference {
            id: SaleId::new(),
            invoice_no: invoice_no.to_string(),
        }
    }
}

/// In-memory ledger wiring shared by service and API tests
pub struct LedgerFixture {
    pub store: Arc<InMemoryLedgerStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub service: Arc<LedgerService>,
}

impl LedgerFixture {
    pub fn new() -> Self {
        Self::with_settings(LedgerSettings::default())
    }

    pub fn with_settings(settings: LedgerSettings) -> Self {
        let store = Arc::new(InMemoryLedgerStore::new(settings.lock_timeout));
        let service = Arc::new(LedgerService::new(store.clone(), settings));
        Self {
            store,
            directory: Arc::new(InMemoryDirectory::new()),
            service,
        }
    }

    /// Registers a generated customer and returns their id
    pub async fn customer(&self) -> CustomerId {
        let profile = ReferenceFixtures::customer();
        let id = profile.id;
        self.directory.register_customer(profile).await;
        id
    }

    /// Registers a sale and returns its id
    pub async fn sale(&self, invoice_no: &str) -> SaleId {
        let sale = ReferenceFixtures::sale(invoice_no);
        let id = sale.id;
        self.directory.register_sale(sale).await;
        id
    }

    /// A customer who has already topped up `amount`
    pub async fn funded_customer(&self, amount: Decimal) -> CustomerId {
        let id = self.customer().await;
        self.service
            .add_funds(id, amount, Some("Opening advance".to_string()), None)
            .await
            .expect("fixture top-up failed");
        id
    }
}

impl Default for LedgerFixture {
    fn default() -> Self {
        Self::new()
    }
}
