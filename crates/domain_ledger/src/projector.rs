//! Balance projection
//!
//! A customer's balance can be read two ways: from the denormalized balance
//! row the store maintains inside `append`, or by summing every entry. The
//! first is what callers normally see; the second is the audit.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use core_kernel::CustomerId;

use crate::entry::{EntryDraft, KindFilter, LedgerEntry, MAX_AMOUNT};
use crate::error::LedgerError;
use crate::ports::{CustomerSnapshot, LedgerReader};

/// Sum of entry amounts
pub fn project<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Decimal {
    entries.into_iter().map(|e| e.amount).sum()
}

/// Balance after applying `draft` to `balance`
///
/// Stores call this while holding the customer's lock so the check and the
/// write are one step. A credit that would lift the balance past
/// [`MAX_AMOUNT`] is an `InvalidAmount`.
pub fn apply_to_balance(balance: Decimal, draft: &EntryDraft) -> Result<Decimal, LedgerError> {
    let next = balance
        .checked_add(draft.amount())
        .filter(|next| *next <= MAX_AMOUNT)
        .ok_or_else(|| {
            LedgerError::InvalidAmount(format!(
                "balance {} plus {} exceeds the maximum of {}",
                balance,
                draft.amount(),
                MAX_AMOUNT
            ))
        })?;
    if next < Decimal::ZERO {
        return Err(LedgerError::InsufficientBalance {
            requested: -draft.amount(),
            available: balance,
        });
    }
    Ok(next)
}

/// Stored vs computed balance for one customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub customer_id: CustomerId,
    pub stored: Decimal,
    pub computed: Decimal,
    /// `stored - computed`
    pub difference: Decimal,
    pub consistent: bool,
}

impl Reconciliation {
    pub fn new(customer_id: CustomerId, stored: Decimal, computed: Decimal) -> Self {
        let difference = stored - computed;
        Self {
            customer_id,
            stored,
            computed,
            difference,
            consistent: difference.is_zero(),
        }
    }

    /// Compares a snapshot's balance with the sum of its entries
    ///
    /// Only meaningful for an unfiltered snapshot.
    pub fn of(snapshot: &CustomerSnapshot) -> Self {
        Self::new(snapshot.customer_id, snapshot.balance, project(&snapshot.entries))
    }
}

/// Balance reads over any ledger reader
pub struct BalanceProjector<R: LedgerReader + ?Sized> {
    reader: Arc<R>,
}

impl<R: LedgerReader + ?Sized> Clone for BalanceProjector<R> {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
        }
    }
}

impl<R: LedgerReader + ?Sized> BalanceProjector<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self { reader }
    }

    /// Denormalized balance
    pub async fn current_balance(&self, customer_id: CustomerId) -> Result<Decimal, LedgerError> {
        self.reader.stored_balance(customer_id).await
    }

    /// Balance recomputed from every entry
    pub async fn recompute(&self, customer_id: CustomerId) -> Result<Decimal, LedgerError> {
        let entries = self.reader.list_by_customer(customer_id, KindFilter::All).await?;
        Ok(project(&entries))
    }

    /// Stored vs computed balance from one snapshot, so concurrent appends
    /// never show up as a mismatch
    pub async fn reconcile(&self, customer_id: CustomerId) -> Result<Reconciliation, LedgerError> {
        let snapshot = self.reader.customer_snapshot(customer_id, KindFilter::All).await?;
        Ok(Reconciliation::of(&snapshot))
    }

    /// Reconciles every customer that has a balance row
    pub async fn reconcile_all(&self) -> Result<Vec<Reconciliation>, LedgerError> {
        let balances = self.reader.balances().await?;
        let mut results = Vec::with_capacity(balances.len());
        for row in balances {
            results.push(self.reconcile(row.customer_id).await?);
        }
        Ok(results)
    }
}
