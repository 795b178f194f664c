//! Advance ledger errors

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{LedgerEntryId, PortError};

/// Errors that can occur in the advance ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Amount is zero, negative where a positive value is required, or has
    /// the wrong sign for its entry kind
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Debit would take the balance below zero
    #[error("Insufficient advance balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    /// Entry does not exist
    #[error("Ledger entry not found: {0}")]
    NotFound(LedgerEntryId),

    /// Entry already has a reversal
    #[error("Ledger entry already reversed: {0}")]
    AlreadyReversed(LedgerEntryId),

    /// Entry kind cannot be reversed
    #[error("Entry cannot be reversed: {0}")]
    NotReversible(String),

    /// Unrecognised entry kind name
    #[error("Unknown entry kind: {0}")]
    UnknownKind(String),

    /// Per-customer lock could not be acquired in time
    #[error("Ledger busy: {0}")]
    Contention(String),

    /// Underlying store failed
    #[error("Storage error: {0}")]
    Storage(#[source] PortError),
}

impl LedgerError {
    pub fn contention(message: impl Into<String>) -> Self {
        LedgerError::Contention(message.into())
    }

    /// Returns true if the caller may retry the same request unchanged
    ///
    /// Storage failures count as retryable whatever their cause; the ledger
    /// never retries them itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Contention(_) | LedgerError::Storage(_))
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::AlreadyReversed(_) => "ALREADY_REVERSED",
            LedgerError::NotReversible(_) => "NOT_REVERSIBLE",
            LedgerError::UnknownKind(_) => "UNKNOWN_KIND",
            LedgerError::Contention(_) => "CONTENTION",
            LedgerError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<PortError> for LedgerError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Timeout { operation, duration_ms } => LedgerError::Contention(format!(
                "{} did not acquire the customer lock within {}ms",
                operation, duration_ms
            )),
            other => LedgerError::Storage(other),
        }
    }
}
