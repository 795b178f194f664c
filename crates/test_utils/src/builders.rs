//! Test Data Builders
//!
//! Builds stored-looking [`LedgerEntry`] values directly, for report and
//! projection tests that don't need a store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{CustomerId, LedgerEntryId, SaleId};
use domain_ledger::{EntryKind, LedgerEntry};

use crate::fixtures::TemporalFixtures;

pub struct LedgerEntryBuilder {
    id: LedgerEntryId,
    sequence: i64,
    customer_id: CustomerId,
    kind: EntryKind,
    amount: Decimal,
    description: Option<String>,
    reference: Option<String>,
    related_sale_id: Option<SaleId>,
    reverses: Option<LedgerEntryId>,
    created_at: DateTime<Utc>,
}

impl Default for LedgerEntryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerEntryBuilder {
    /// A 1000.00 top-up for a fresh customer
    pub fn new() -> Self {
        Self {
            id: LedgerEntryId::new_v7(),
            sequence: 1,
            customer_id: CustomerId::new(),
            kind: EntryKind::FundsAdded,
            amount: dec!(1000),
            description: None,
            reference: None,
            related_sale_id: None,
            reverses: None,
            created_at: TemporalFixtures::business_morning(),
        }
    }

    pub fn funds_added(amount: Decimal) -> Self {
        Self::new().kind(EntryKind::FundsAdded).amount(amount)
    }

    pub fn extra_payment(amount: Decimal) -> Self {
        Self::new()
            .kind(EntryKind::ExtraPayment)
            .amount(amount)
            .sale(SaleId::new())
    }

    /// Consumption of `amount`, stored negated
    pub fn consumed(amount: Decimal) -> Self {
        Self::new()
            .kind(EntryKind::ConsumedBySale)
            .amount(-amount)
            .sale(SaleId::new())
    }

    /// Reversal of `original`, carrying its negated amount
    pub fn reversal_of(original: &LedgerEntry) -> Self {
        Self::new()
            .customer(original.customer_id)
            .kind(EntryKind::Reversed)
            .amount(-original.amount)
            .reverses(original.id)
            .sequence(original.sequence + 1)
    }

    pub fn id(mut self, id: LedgerEntryId) -> Self {
        self.id = id;
        self
    }

    pub fn sequence(mut self, sequence: i64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn customer(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = customer_id;
        self
    }

    pub fn kind(mut self, kind: EntryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn sale(mut self, sale_id: SaleId) -> Self {
        self.related_sale_id = Some(sale_id);
        self
    }

    pub fn reverses(mut self, id: LedgerEntryId) -> Self {
        self.reverses = Some(id);
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn build(self) -> LedgerEntry {
        LedgerEntry {
            id: self.id,
            sequence: self.sequence,
            customer_id: self.customer_id,
            kind: self.kind,
            amount: self.amount,
            description: self
                .description
                .unwrap_or_else(|| self.kind.default_description().to_string()),
            reference: self.reference,
            related_sale_id: self.related_sale_id,
            reverses: self.reverses,
            created_at: self.created_at,
        }
    }
}
