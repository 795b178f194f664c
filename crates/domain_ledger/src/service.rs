//! Ledger service
//!
//! [`LedgerService`] is the only way to change a customer's advance balance.
//! Each operation validates its input, builds an [`EntryDraft`] and hands it
//! to the store, which performs the balance check and the write as one step.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use core_kernel::{Currency, CustomerId, LedgerEntryId, Money, SaleId};

use crate::entry::{EntryDraft, EntryKind, KindFilter, LedgerEntry, MAX_AMOUNT};
use crate::error::LedgerError;
use crate::ports::{AppendReceipt, CustomerSnapshot, LedgerStore};
use crate::projector::{BalanceProjector, Reconciliation};
use crate::reporting::{sum_by_kind, AdvanceSummary};

/// Ledger-wide settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    /// Amounts are rounded to this currency's minor unit
    pub currency: Currency,
    /// Upper bound on waiting for a customer's lock; stores are built with it
    pub lock_timeout: Duration,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            currency: Currency::INR,
            lock_timeout: Duration::from_millis(5000),
        }
    }
}

/// A stored entry together with the balance it produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBalance {
    pub entry: LedgerEntry,
    pub balance: Decimal,
}

impl From<AppendReceipt> for NewBalance {
    fn from(receipt: AppendReceipt) -> Self {
        Self {
            entry: receipt.entry,
            balance: receipt.balance,
        }
    }
}

/// Mutation entry point for the advance ledger
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    projector: BalanceProjector<dyn LedgerStore>,
    settings: LedgerSettings,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, settings: LedgerSettings) -> Self {
        Self {
            projector: BalanceProjector::new(Arc::clone(&store)),
            store,
            settings,
        }
    }

    /// Records a manual top-up
    pub async fn add_funds(
        &self,
        customer_id: CustomerId,
        amount: Decimal,
        description: Option<String>,
        reference: Option<String>,
    ) -> Result<NewBalance, LedgerError> {
        let amount = self.positive_amount(amount)?;
        let draft = EntryDraft::funds_added(customer_id, amount, description, reference)?;
        self.commit(draft).await
    }

    /// Records the part of a sale payment that exceeded the amount due
    pub async fn record_extra_payment(
        &self,
        customer_id: CustomerId,
        amount: Decimal,
        sale_id: SaleId,
        description: Option<String>,
    ) -> Result<NewBalance, LedgerError> {
        let amount = self.positive_amount(amount)?;
        let draft = EntryDraft::extra_payment(customer_id, amount, sale_id, description)?;
        self.commit(draft).await
    }

    /// Applies advance against a sale
    ///
    /// Fails with `InsufficientBalance` if `amount` exceeds the balance at the
    /// moment of the append.
    pub async fn consume_for_sale(
        &self,
        customer_id: CustomerId,
        amount: Decimal,
        sale_id: SaleId,
    ) -> Result<NewBalance, LedgerError> {
        let amount = self.positive_amount(amount)?;
        let draft = EntryDraft::consumed_by_sale(customer_id, amount, sale_id)?;
        self.commit(draft).await
    }

    /// Appends a correction that negates `entry_id`
    pub async fn reverse(
        &self,
        entry_id: LedgerEntryId,
        reason: &str,
    ) -> Result<NewBalance, LedgerError> {
        let original = self
            .store
            .find_entry(entry_id)
            .await?
            .ok_or(LedgerError::NotFound(entry_id))?;

        if original.kind == EntryKind::Reversed {
            return Err(LedgerError::NotReversible(format!(
                "{} is itself a reversal",
                entry_id
            )));
        }
        if self.store.is_reversed(entry_id).await? {
            return Err(LedgerError::AlreadyReversed(entry_id));
        }

        let draft = EntryDraft::reversal(&original, reason)?;
        self.commit(draft).await
    }

    /// Entries for a customer, newest first
    pub async fn get_history(
        &self,
        customer_id: CustomerId,
        filter: KindFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.store.list_by_customer(customer_id, filter).await
    }

    /// Entries for a customer together with the balance they add up to
    pub async fn history_snapshot(
        &self,
        customer_id: CustomerId,
        filter: KindFilter,
    ) -> Result<CustomerSnapshot, LedgerError> {
        self.store.customer_snapshot(customer_id, filter).await
    }

    pub async fn get_summary(
        &self,
        customer_id: CustomerId,
    ) -> Result<AdvanceSummary, LedgerError> {
        let entries = self.store.list_by_customer(customer_id, KindFilter::All).await?;
        Ok(sum_by_kind(&entries).into())
    }

    pub async fn current_balance(&self, customer_id: CustomerId) -> Result<Decimal, LedgerError> {
        self.projector.current_balance(customer_id).await
    }

    pub async fn reconcile(&self, customer_id: CustomerId) -> Result<Reconciliation, LedgerError> {
        self.projector.reconcile(customer_id).await
    }

    pub async fn reconcile_all(&self) -> Result<Vec<Reconciliation>, LedgerError> {
        self.projector.reconcile_all().await
    }

    fn positive_amount(&self, amount: Decimal) -> Result<Decimal, LedgerError> {
        let normalized = Money::new(amount, self.settings.currency).normalized();
        if !normalized.is_positive() {
            return Err(LedgerError::InvalidAmount(format!(
                "amount must be greater than zero, got {}",
                amount
            )));
        }
        if normalized.amount() > MAX_AMOUNT {
            return Err(LedgerError::InvalidAmount(format!(
                "amount must not exceed {}, got {}",
                MAX_AMOUNT, amount
            )));
        }
        Ok(normalized.amount())
    }

    async fn commit(&self, draft: EntryDraft) -> Result<NewBalance, LedgerError> {
        self.store.append(draft).await.map(NewBalance::from)
    }
}
