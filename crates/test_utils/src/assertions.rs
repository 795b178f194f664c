//! Custom Test Assertions
//!
//! Ledger-specific checks with messages that show the offending values.

use rust_decimal::Decimal;

use domain_ledger::{sum_by_kind, EntryKind, LedgerEntry, Reconciliation};

/// Asserts the balance equals the sum of entry amounts
pub fn assert_conserved(entries: &[LedgerEntry], balance: Decimal) {
    let sum: Decimal = entries.iter().map(|e| e.amount).sum();
    assert_eq!(
        sum, balance,
        "Balance {} does not match entry sum {} over {} entries",
        balance,
        sum,
        entries.len()
    );
}

pub fn assert_non_negative(balance: Decimal) {
    assert!(balance >= Decimal::ZERO, "Balance went negative: {}", balance);
}

/// Asserts entries are ordered by `(created_at, sequence)` descending
pub fn assert_newest_first(entries: &[LedgerEntry]) {
    for pair in entries.windows(2) {
        assert!(
            pair[0].recency_key() > pair[1].recency_key(),
            "Entries out of order: {} (seq {}) listed before {} (seq {})",
            pair[0].id,
            pair[0].sequence,
            pair[1].id,
            pair[1].sequence
        );
    }
}

/// Asserts every amount carries the sign its kind requires
pub fn assert_signs_match_kinds(entries: &[LedgerEntry]) {
    for entry in entries {
        assert!(
            entry.kind.accepts(entry.amount),
            "Entry {} of kind {} has amount {}",
            entry.id,
            entry.kind,
            entry.amount
        );
    }
}

/// Asserts no entry is the target of more than one reversal
pub fn assert_single_reversals(entries: &[LedgerEntry]) {
    let mut targets: Vec<_> = entries
        .iter()
        .filter(|e| e.kind == EntryKind::Reversed)
        .filter_map(|e| e.reverses)
        .collect();
    let total = targets.len();
    targets.sort();
    targets.dedup();
    assert_eq!(targets.len(), total, "An entry was reversed more than once");
}

pub fn assert_reconciled(reconciliation: &Reconciliation) {
    assert!(
        reconciliation.consistent,
        "Customer {} stored balance {} differs from computed {} by {}",
        reconciliation.customer_id,
        reconciliation.stored,
        reconciliation.computed,
        reconciliation.difference
    );
}

/// Asserts the net of `entries` as reported by `sum_by_kind`
pub fn assert_net(entries: &[LedgerEntry], expected: Decimal) {
    let totals = sum_by_kind(entries);
    assert_eq!(totals.net, expected, "Net advance mismatch: {:?}", totals);
}
