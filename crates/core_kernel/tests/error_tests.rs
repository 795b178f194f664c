//! Tests for core_kernel error types

use core_kernel::error::CoreError;
use core_kernel::money::MoneyError;
use core_kernel::temporal::TemporalError;
use core_kernel::CustomerId;

#[test]
fn test_core_error_validation() {
    let error = CoreError::validation("Amount must be positive");

    match error {
        CoreError::Validation(msg) => assert_eq!(msg, "Amount must be positive"),
        _ => panic!("Expected Validation error"),
    }
}

#[test]
fn test_core_error_from_money_error() {
    let money_error = MoneyError::UnknownCurrency("XYZ".to_string());
    let core_error: CoreError = money_error.into();

    assert!(matches!(core_error, CoreError::Money(_)));
    assert!(core_error.to_string().contains("XYZ"));
}

#[test]
fn test_core_error_from_temporal_error() {
    let core_error: CoreError = TemporalError::UnknownPeriod("fortnight".to_string()).into();
    assert!(matches!(core_error, CoreError::Temporal(_)));
}

#[test]
fn test_core_error_from_bad_identifier() {
    let parse_error = "CUS-not-a-uuid".parse::<CustomerId>().unwrap_err();
    let core_error: CoreError = parse_error.into();
    assert!(matches!(core_error, CoreError::InvalidIdentifier(_)));
}

#[test]
fn test_core_error_configuration() {
    let error = CoreError::configuration("Missing API_JWT_SECRET");
    assert!(error.to_string().starts_with("Configuration error"));
}
