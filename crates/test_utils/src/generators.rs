//! Property-Based Test Generators
//!
//! Proptest strategies for ledger amounts and operation sequences.

use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::{CustomerId, LedgerEntryId, SaleId};
use domain_ledger::{LedgerError, LedgerService, NewBalance};

/// Positive amounts in paise, up to ten lakh rupees
pub fn positive_amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|paise| Decimal::new(paise, 2))
}

/// Amounts with more precision than the ledger keeps
pub fn unnormalized_amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000_000i64, 3u32..6u32).prop_map(|(m, scale)| Decimal::new(m, scale))
}

/// One service call against a single customer
#[derive(Debug, Clone)]
pub enum LedgerOperation {
    AddFunds(Decimal),
    ExtraPayment(Decimal),
    Consume(Decimal),
    /// Reverse the n-th (mod count) previously stored entry
    Reverse(usize),
}

pub fn ledger_operation_strategy() -> impl Strategy<Value = LedgerOperation> {
    prop_oneof![
        3 => positive_amount_strategy().prop_map(LedgerOperation::AddFunds),
        1 => positive_amount_strategy().prop_map(LedgerOperation::ExtraPayment),
        3 => positive_amount_strategy().prop_map(LedgerOperation::Consume),
        1 => any::<usize>().prop_map(LedgerOperation::Reverse),
    ]
}

pub fn operation_sequence_strategy(
    max_len: usize,
) -> impl Strategy<Value = Vec<LedgerOperation>> {
    prop::collection::vec(ledger_operation_strategy(), 1..max_len)
}

impl LedgerOperation {
    /// Runs the operation; `stored` holds ids of earlier successful entries
    ///
    /// Returns `None` for a reversal when nothing has been stored yet.
    pub async fn apply(
        &self,
        service: &LedgerService,
        customer_id: CustomerId,
        stored: &[LedgerEntryId],
    ) -> Option<Result<NewBalance, LedgerError>> {
        let result = match self {
            LedgerOperation::AddFunds(amount) => {
                service.add_funds(customer_id, *amount, None, None).await
            }
            LedgerOperation::ExtraPayment(amount) => {
                service
                    .record_extra_payment(customer_id, *amount, SaleId::new(), None)
                    .await
            }
            LedgerOperation::Consume(amount) => {
                service.consume_for_sale(customer_id, *amount, SaleId::new()).await
            }
            LedgerOperation::Reverse(index) => {
                if stored.is_empty() {
                    return None;
                }
                service.reverse(stored[index % stored.len()], "generated").await
            }
        };
        Some(result)
    }
}
