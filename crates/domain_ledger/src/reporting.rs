//! Read-only ledger reports
//!
//! Everything here works from a [`LedgerReader`], which has no append
//! capability, so report code cannot change a balance.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use core_kernel::{TemporalError, Timezone};

use crate::entry::{EntryKind, LedgerEntry};
use crate::error::LedgerError;
use crate::ports::{CustomerBalance, FeedQuery, LedgerReader};

/// Totals per entry kind
///
/// `used` is a magnitude; every other field is a signed sum, so
/// `net == added + extra_payments - used + reversed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KindTotals {
    pub added: Decimal,
    pub used: Decimal,
    pub extra_payments: Decimal,
    pub reversed: Decimal,
    pub net: Decimal,
    pub count: usize,
}

impl KindTotals {
    pub fn record(&mut self, entry: &LedgerEntry) {
        match entry.kind {
            EntryKind::FundsAdded => self.added += entry.amount,
            EntryKind::ExtraPayment => self.extra_payments += entry.amount,
            EntryKind::ConsumedBySale => self.used += entry.magnitude(),
            EntryKind::Reversed => self.reversed += entry.amount,
        }
        self.net += entry.amount;
        self.count += 1;
    }
}

/// Totals for a list of entries
pub fn sum_by_kind<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> KindTotals {
    entries.into_iter().fold(KindTotals::default(), |mut totals, entry| {
        totals.record(entry);
        totals
    })
}

/// Applies `query` to an already loaded list, keeping its order
pub fn filter_entries(entries: &[LedgerEntry], query: &FeedQuery) -> Vec<LedgerEntry> {
    let matching = entries.iter().filter(|e| query.matches(e)).cloned();
    match query.limit {
        Some(limit) => matching.take(limit).collect(),
        None => matching.collect(),
    }
}

/// Customer-facing advance summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdvanceSummary {
    pub total_added: Decimal,
    pub total_used: Decimal,
    pub total_payments: Decimal,
    pub total_reversed: Decimal,
    pub net_advance: Decimal,
}

impl From<KindTotals> for AdvanceSummary {
    fn from(totals: KindTotals) -> Self {
        Self {
            total_added: totals.added,
            total_used: totals.used,
            total_payments: totals.extra_payments,
            total_reversed: totals.reversed,
            net_advance: totals.net,
        }
    }
}

/// Bucket size for period breakdowns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodGranularity {
    #[default]
    Day,
    Month,
}

impl PeriodGranularity {
    fn bucket(&self, date: NaiveDate) -> NaiveDate {
        match self {
            PeriodGranularity::Day => date,
            PeriodGranularity::Month => date.with_day(1).unwrap_or(date),
        }
    }

    fn label(&self, bucket: NaiveDate) -> String {
        match self {
            PeriodGranularity::Day => bucket.format("%Y-%m-%d").to_string(),
            PeriodGranularity::Month => bucket.format("%Y-%m").to_string(),
        }
    }
}

impl FromStr for PeriodGranularity {
    type Err = TemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "day" | "daily" => Ok(PeriodGranularity::Day),
            "month" | "monthly" => Ok(PeriodGranularity::Month),
            other => Err(TemporalError::UnknownPeriod(other.to_string())),
        }
    }
}

/// Totals for one day or month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodTotals {
    pub label: String,
    /// First local date of the bucket
    pub start: NaiveDate,
    pub totals: KindTotals,
}

/// Groups entries into local-date buckets, oldest first
pub fn breakdown(
    entries: &[LedgerEntry],
    granularity: PeriodGranularity,
    timezone: Timezone,
) -> Vec<PeriodTotals> {
    let mut buckets: BTreeMap<NaiveDate, KindTotals> = BTreeMap::new();
    for entry in entries {
        let bucket = granularity.bucket(timezone.local_date(entry.created_at));
        buckets.entry(bucket).or_default().record(entry);
    }
    buckets
        .into_iter()
        .map(|(start, totals)| PeriodTotals {
            label: granularity.label(start),
            start,
            totals,
        })
        .collect()
}

/// Report queries over a ledger reader
pub struct LedgerReports<R: LedgerReader + ?Sized = dyn LedgerReader> {
    reader: Arc<R>,
    timezone: Timezone,
}

impl<R: LedgerReader + ?Sized> LedgerReports<R> {
    pub fn new(reader: Arc<R>, timezone: Timezone) -> Self {
        Self { reader, timezone }
    }

    pub fn timezone(&self) -> Timezone {
        self.timezone
    }

    /// Entries matching `query`, newest first
    pub async fn transaction_feed(
        &self,
        query: &FeedQuery,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.reader.list_entries(query).await
    }

    /// Totals over every entry matching `query`; `limit` is ignored
    pub async fn summary(&self, query: &FeedQuery) -> Result<AdvanceSummary, LedgerError> {
        let entries = self.unbounded(query).await?;
        Ok(sum_by_kind(&entries).into())
    }

    pub async fn period_breakdown(
        &self,
        query: &FeedQuery,
        granularity: PeriodGranularity,
    ) -> Result<Vec<PeriodTotals>, LedgerError> {
        let entries = self.unbounded(query).await?;
        Ok(breakdown(&entries, granularity, self.timezone))
    }

    /// Balance rows, largest balance first
    pub async fn customer_balances(
        &self,
        only_positive: bool,
    ) -> Result<Vec<CustomerBalance>, LedgerError> {
        let mut rows = self.reader.balances().await?;
        if only_positive {
            rows.retain(|row| row.balance > Decimal::ZERO);
        }
        rows.sort_by(|a, b| {
            b.balance
                .cmp(&a.balance)
                .then_with(|| a.customer_id.cmp(&b.customer_id))
        });
        Ok(rows)
    }

    async fn unbounded(&self, query: &FeedQuery) -> Result<Vec<LedgerEntry>, LedgerError> {
        let query = FeedQuery {
            limit: None,
            ..query.clone()
        };
        self.reader.list_entries(&query).await
    }
}
