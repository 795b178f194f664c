//! Ledger entries
//!
//! A [`LedgerEntry`] is one immutable, signed fact about a customer's advance
//! balance. Entries are only ever appended; a mistake is corrected by a new
//! [`EntryKind::Reversed`] entry pointing at the original.
//!
//! New entries start life as an [`EntryDraft`]. Drafts can only be built
//! through the kind-specific constructors, which enforce the sign convention
//! and the non-zero rule, so a store never sees an ill-formed entry.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{CustomerId, LedgerEntryId, SaleId};

use crate::error::LedgerError;

/// Largest magnitude an entry amount or a balance may reach: 999,999,999,999.99
///
/// Matches the `NUMERIC(14, 2)` columns the PostgreSQL store writes to, so
/// both stores accept and reject the same amounts.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);

/// The closed set of balance-affecting events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Manual top-up by the customer
    FundsAdded,
    /// Overpayment on a sale, kept as advance
    ExtraPayment,
    /// Advance applied against a sale's due amount
    ConsumedBySale,
    /// Correction negating an earlier entry
    Reversed,
}

impl EntryKind {
    pub const ALL: [EntryKind; 4] = [
        EntryKind::FundsAdded,
        EntryKind::ExtraPayment,
        EntryKind::ConsumedBySale,
        EntryKind::Reversed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::FundsAdded => "FundsAdded",
            EntryKind::ExtraPayment => "ExtraPayment",
            EntryKind::ConsumedBySale => "ConsumedBySale",
            EntryKind::Reversed => "Reversed",
        }
    }

    /// Transaction type names used by earlier versions of the application
    pub fn legacy_name(&self) -> Option<&'static str> {
        match self {
            EntryKind::FundsAdded => Some("ADVANCE_ADDED"),
            EntryKind::ExtraPayment => Some("ADVANCE_PAYMENT"),
            EntryKind::ConsumedBySale => Some("ADVANCE_USED"),
            EntryKind::Reversed => None,
        }
    }

    /// Description stored when the caller supplies none
    pub fn default_description(&self) -> &'static str {
        match self {
            EntryKind::FundsAdded => "Advance payment added",
            EntryKind::ExtraPayment => "Extra payment on sale",
            EntryKind::ConsumedBySale => "Advance used for sale",
            EntryKind::Reversed => "Reversal",
        }
    }

    /// Returns true if `amount` carries the sign this kind requires
    pub fn accepts(&self, amount: Decimal) -> bool {
        match self {
            EntryKind::FundsAdded | EntryKind::ExtraPayment => amount > Decimal::ZERO,
            EntryKind::ConsumedBySale => amount < Decimal::ZERO,
            EntryKind::Reversed => !amount.is_zero(),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = LedgerError;

    /// Accepts the canonical names, the legacy `ADVANCE_*` names and snake_case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "fundsadded" | "advanceadded" => Ok(EntryKind::FundsAdded),
            "extrapayment" | "advancepayment" => Ok(EntryKind::ExtraPayment),
            "consumedbysale" | "advanceused" => Ok(EntryKind::ConsumedBySale),
            "reversed" | "reversal" => Ok(EntryKind::Reversed),
            _ => Err(LedgerError::UnknownKind(s.to_string())),
        }
    }
}

/// Narrows listings to one kind of entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindFilter {
    #[default]
    All,
    Only(EntryKind),
}

impl KindFilter {
    pub fn matches(&self, kind: EntryKind) -> bool {
        match self {
            KindFilter::All => true,
            KindFilter::Only(only) => *only == kind,
        }
    }
}

impl From<EntryKind> for KindFilter {
    fn from(kind: EntryKind) -> Self {
        KindFilter::Only(kind)
    }
}

impl FromStr for KindFilter {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Ok(KindFilter::All);
        }
        trimmed.parse().map(KindFilter::Only)
    }
}

/// An immutable, stored ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    /// Store-assigned insertion order, breaks `created_at` ties
    pub sequence: i64,
    pub customer_id: CustomerId,
    pub kind: EntryKind,
    /// Signed: positive credits the advance, negative debits it
    pub amount: Decimal,
    pub description: String,
    pub reference: Option<String>,
    pub related_sale_id: Option<SaleId>,
    /// The entry this one negates (only set on `Reversed`)
    pub reverses: Option<LedgerEntryId>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Absolute value of the amount, as shown on reports
    pub fn magnitude(&self) -> Decimal {
        self.amount.abs()
    }

    /// Sort key for newest-first listings
    pub fn recency_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.sequence)
    }
}

/// A validated entry awaiting `id`, `sequence` and `created_at` from a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    customer_id: CustomerId,
    kind: EntryKind,
    amount: Decimal,
    description: String,
    reference: Option<String>,
    related_sale_id: Option<SaleId>,
    reverses: Option<LedgerEntryId>,
}

impl EntryDraft {
    /// Manual top-up; `amount` must be positive
    pub fn funds_added(
        customer_id: CustomerId,
        amount: Decimal,
        description: Option<String>,
        reference: Option<String>,
    ) -> Result<Self, LedgerError> {
        Self::build(customer_id, EntryKind::FundsAdded, amount, description, reference, None, None)
    }

    /// Overpayment on `sale_id`; `amount` must be positive
    pub fn extra_payment(
        customer_id: CustomerId,
        amount: Decimal,
        sale_id: SaleId,
        description: Option<String>,
    ) -> Result<Self, LedgerError> {
        Self::build(
            customer_id,
            EntryKind::ExtraPayment,
            amount,
            description,
            None,
            Some(sale_id),
            None,
        )
    }

    /// Consumption against `sale_id`; `amount` is the positive magnitude and
    /// is stored negated
    pub fn consumed_by_sale(
        customer_id: CustomerId,
        amount: Decimal,
        sale_id: SaleId,
    ) -> Result<Self, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "consumption must be positive, got {}",
                amount
            )));
        }
        Self::build(
            customer_id,
            EntryKind::ConsumedBySale,
            -amount,
            None,
            None,
            Some(sale_id),
            None,
        )
    }

    /// Correction of `original`, carrying its negated amount
    pub fn reversal(original: &LedgerEntry, reason: &str) -> Result<Self, LedgerError> {
        if original.kind == EntryKind::Reversed {
            return Err(LedgerError::NotReversible(format!(
                "{} is itself a reversal",
                original.id
            )));
        }
        let reason = reason.trim();
        let description = if reason.is_empty() {
            format!("Reversal of {}", original.id)
        } else {
            format!("Reversal: {}", reason)
        };
        Self::build(
            original.customer_id,
            EntryKind::Reversed,
            -original.amount,
            Some(description),
            original.reference.clone(),
            original.related_sale_id,
            Some(original.id),
        )
    }

    fn build(
        customer_id: CustomerId,
        kind: EntryKind,
        amount: Decimal,
        description: Option<String>,
        reference: Option<String>,
        related_sale_id: Option<SaleId>,
        reverses: Option<LedgerEntryId>,
    ) -> Result<Self, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount("amount must not be zero".to_string()));
        }
        if !kind.accepts(amount) {
            return Err(LedgerError::InvalidAmount(format!(
                "amount {} has the wrong sign for {}",
                amount, kind
            )));
        }
        if amount.abs() > MAX_AMOUNT {
            return Err(LedgerError::InvalidAmount(format!(
                "amount {} exceeds the maximum of {}",
                amount.abs(),
                MAX_AMOUNT
            )));
        }

        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| kind.default_description().to_string());
        let reference = reference
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        Ok(Self {
            customer_id,
            kind,
            amount,
            description,
            reference,
            related_sale_id,
            reverses,
        })
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn related_sale_id(&self) -> Option<SaleId> {
        self.related_sale_id
    }

    pub fn reverses(&self) -> Option<LedgerEntryId> {
        self.reverses
    }

    /// Completes the draft with the identity a store assigned to it
    pub fn into_entry(
        self,
        id: LedgerEntryId,
        sequence: i64,
        created_at: DateTime<Utc>,
    ) -> LedgerEntry {
        LedgerEntry {
            id,
            sequence,
            customer_id: self.customer_id,
            kind: self.kind,
            amount: self.amount,
            description: self.description,
            reference: self.reference,
            related_sale_id: self.related_sale_id,
            reverses: self.reverses,
            created_at,
        }
    }
}
