//! Advance ledger DTOs
//!
//! Field names are camelCase on the wire. Amounts are JSON numbers.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use validator::Validate;

use core_kernel::{CustomerId, LedgerEntryId, ReportPeriod, SaleId, Timezone};
use domain_ledger::{
    AdvanceSummary, CustomerBalance, CustomerProfile, EntryKind, KindFilter, LedgerEntry,
    NewBalance, PeriodGranularity, PeriodTotals, Reconciliation, SaleReference,
};

use crate::error::ApiError;

// Requests

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddFundsRequest {
    #[validate(length(min = 1, message = "customerId is required"))]
    pub customer_id: String,
    pub amount: Decimal,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    #[validate(length(min = 1, message = "customerId is required"))]
    pub customer_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExtraPaymentRequest {
    #[validate(length(min = 1, message = "customerId is required"))]
    pub customer_id: String,
    pub amount: Decimal,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReverseRequest {
    #[serde(default)]
    #[validate(length(max = 500))]
    pub reason: String,
}

/// Query string shared by the feed, summary and breakdown routes
///
/// Every field is kept as text so a bad value produces the API's own
/// error body instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub customer_id: Option<String>,
    pub period: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<String>,
    pub granularity: Option<String>,
}

impl FeedParams {
    /// Accepts canonical and legacy kind names
    pub fn kind_filter(&self) -> Result<KindFilter, ApiError> {
        Ok(self.kind.as_deref().unwrap_or("").parse::<KindFilter>()?)
    }

    pub fn customer_id(&self) -> Result<Option<CustomerId>, ApiError> {
        self.customer_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_customer_id)
            .transpose()
    }

    /// `from`/`to` win over `period`; a lone `from` runs up to today
    pub fn period(&self, now: DateTime<Utc>, tz: Timezone) -> Result<ReportPeriod, ApiError> {
        let from = non_empty(&self.from).map(parse_date).transpose()?;
        let to = non_empty(&self.to).map(parse_date).transpose()?;
        match (from, to) {
            (Some(from), Some(to)) => Ok(ReportPeriod::custom(from, to)?),
            (Some(from), None) => Ok(ReportPeriod::custom(from, tz.local_date(now))?),
            (None, Some(_)) => Err(ApiError::bad_request("'to' requires 'from'")),
            (None, None) => Ok(self.period.as_deref().unwrap_or("").parse::<ReportPeriod>()?),
        }
    }

    pub fn limit(&self) -> Result<Option<usize>, ApiError> {
        let Some(raw) = non_empty(&self.limit) else {
            return Ok(None);
        };
        match raw.parse::<usize>() {
            Ok(limit) if limit > 0 => Ok(Some(limit)),
            _ => Err(ApiError::bad_request(format!(
                "limit must be a positive integer, got '{}'",
                raw
            ))),
        }
    }

    pub fn granularity(&self) -> Result<PeriodGranularity, ApiError> {
        match non_empty(&self.granularity) {
            Some(raw) => Ok(raw.parse::<PeriodGranularity>()?),
            None => Ok(PeriodGranularity::Day),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceParams {
    pub only_positive: Option<String>,
}

impl BalanceParams {
    pub fn only_positive(&self) -> Result<bool, ApiError> {
        match non_empty(&self.only_positive).map(str::to_ascii_lowercase).as_deref() {
            None | Some("false") | Some("0") => Ok(false),
            Some("true") | Some("1") => Ok(true),
            Some(other) => Err(ApiError::bad_request(format!(
                "onlyPositive must be true or false, got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl HistoryParams {
    pub fn kind_filter(&self) -> Result<KindFilter, ApiError> {
        Ok(self.kind.as_deref().unwrap_or("").parse::<KindFilter>()?)
    }
}

pub fn parse_customer_id(raw: &str) -> Result<CustomerId, ApiError> {
    CustomerId::from_str(raw.trim())
        .map_err(|_| ApiError::bad_request(format!("invalid customer id '{}'", raw)))
}

pub fn parse_sale_id(raw: &str) -> Result<SaleId, ApiError> {
    SaleId::from_str(raw.trim())
        .map_err(|_| ApiError::bad_request(format!("invalid sale id '{}'", raw)))
}

pub fn parse_entry_id(raw: &str) -> Result<LedgerEntryId, ApiError> {
    LedgerEntryId::from_str(raw.trim())
        .map_err(|_| ApiError::bad_request(format!("invalid entry id '{}'", raw)))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("expected a YYYY-MM-DD date, got '{}'", raw)))
}

// Responses

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl From<&CustomerProfile> for CustomerRef {
    fn from(profile: &CustomerProfile) -> Self {
        Self {
            name: profile.name.clone(),
            phone: profile.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRef {
    pub invoice_no: String,
}

/// Display details looked up for a page of entries
#[derive(Debug, Default)]
pub struct References {
    pub customers: HashMap<CustomerId, CustomerProfile>,
    pub sales: HashMap<SaleId, SaleReference>,
}

impl References {
    pub fn customer(&self, id: &CustomerId) -> Option<CustomerRef> {
        self.customers.get(id).map(CustomerRef::from)
    }

    pub fn sale(&self, id: &SaleId) -> Option<SaleRef> {
        self.sales.get(id).map(|s| SaleRef {
            invoice_no: s.invoice_no.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionItem {
    pub id: LedgerEntryId,
    pub customer_id: CustomerId,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_id: Option<SaleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverses: Option<LedgerEntryId>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale: Option<SaleRef>,
}

impl TransactionItem {
    pub fn new(entry: LedgerEntry, refs: &References) -> Self {
        Self {
            customer: refs.customer(&entry.customer_id),
            sale: entry.related_sale_id.as_ref().and_then(|id| refs.sale(id)),
            id: entry.id,
            customer_id: entry.customer_id,
            amount: entry.amount,
            kind: entry.kind,
            description: entry.description,
            reference: entry.reference,
            sale_id: entry.related_sale_id,
            reverses: entry.reverses,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBalanceResponse {
    pub message: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub new_balance: Decimal,
    pub entry: TransactionItem,
}

impl NewBalanceResponse {
    pub fn new(message: impl Into<String>, result: NewBalance, refs: &References) -> Self {
        Self {
            message: message.into(),
            new_balance: result.balance,
            entry: TransactionItem::new(result.entry, refs),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub customer_id: CustomerId,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerBalanceItem {
    pub customer_id: CustomerId,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerRef>,
}

impl CustomerBalanceItem {
    pub fn new(row: CustomerBalance, refs: &References) -> Self {
        Self {
            customer: refs.customer(&row.customer_id),
            customer_id: row.customer_id,
            balance: row.balance,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceListResponse {
    pub customers: Vec<CustomerBalanceItem>,
    pub count: usize,
    /// Sum of the listed balances
    #[serde(with = "rust_decimal::serde::float")]
    pub total_outstanding: Decimal,
}

impl BalanceListResponse {
    pub fn new(customers: Vec<CustomerBalanceItem>) -> Self {
        let total_outstanding = customers.iter().map(|c| c.balance).sum();
        Self {
            count: customers.len(),
            customers,
            total_outstanding,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub period: String,
    pub count: usize,
    pub transactions: Vec<TransactionItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub customer_id: CustomerId,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub transactions: Vec<TransactionItem>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_added: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_used: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_payments: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_reversed: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub net_advance: Decimal,
}

impl From<AdvanceSummary> for SummaryResponse {
    fn from(summary: AdvanceSummary) -> Self {
        Self {
            total_added: summary.total_added,
            total_used: summary.total_used,
            total_payments: summary.total_payments,
            total_reversed: summary.total_reversed,
            net_advance: summary.net_advance,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodTotalsItem {
    pub label: String,
    pub start: NaiveDate,
    #[serde(flatten)]
    pub totals: SummaryResponse,
    pub count: usize,
}

impl From<PeriodTotals> for PeriodTotalsItem {
    fn from(bucket: PeriodTotals) -> Self {
        Self {
            label: bucket.label,
            start: bucket.start,
            count: bucket.totals.count,
            totals: AdvanceSummary::from(bucket.totals).into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownResponse {
    pub granularity: PeriodGranularity,
    pub period: String,
    pub buckets: Vec<PeriodTotalsItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub customer_id: CustomerId,
    #[serde(with = "rust_decimal::serde::float")]
    pub stored: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub computed: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub difference: Decimal,
    pub consistent: bool,
}

impl From<Reconciliation> for ReconcileResponse {
    fn from(r: Reconciliation) -> Self {
        Self {
            customer_id: r.customer_id,
            stored: r.stored,
            computed: r.computed,
            difference: r.difference,
            consistent: r.consistent,
        }
    }
}
