//! HTTP tests for the advance ledger API
//!
//! The router runs against the in-memory store, so these need no database.

use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use axum_test::TestServer;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::time::Duration;

use core_kernel::CustomerId;
use domain_ledger::{LedgerSettings, MAX_AMOUNT};
use interface_api::{auth::create_token, config::ApiConfig, create_router, AppState};
use test_utils::{LedgerFixture, ReferenceFixtures};

const SECRET: &str = "api-test-secret";

struct Harness {
    server: TestServer,
    fixture: LedgerFixture,
}

impl Harness {
    fn new() -> Self {
        Self::with_fixture(LedgerFixture::new())
    }

    fn with_fixture(fixture: LedgerFixture) -> Self {
        let config = ApiConfig {
            jwt_secret: SECRET.to_string(),
            ..ApiConfig::default()
        };
        let state = AppState::new(fixture.store.clone(), fixture.directory.clone(), config)
            .expect("default config is valid");
        let server = TestServer::new(create_router(state)).expect("router builds");
        Self { server, fixture }
    }

    async fn named_customer(&self, name: &str) -> CustomerId {
        let profile = ReferenceFixtures::named_customer(name);
        let id = profile.id;
        self.fixture.directory.register_customer(profile).await;
        id
    }
}

fn bearer(roles: &[&str]) -> HeaderValue {
    let token = create_token(
        "cashier-1",
        roles.iter().map(|r| r.to_string()).collect(),
        SECRET,
        3600,
    )
    .expect("token");
    HeaderValue::from_str(&format!("Bearer {}", token)).expect("header")
}

fn clerk() -> HeaderValue {
    bearer(&["advance:read", "advance:write"])
}

fn admin() -> HeaderValue {
    bearer(&["admin"])
}

fn number(value: &Value) -> f64 {
    value.as_f64().unwrap_or_else(|| panic!("expected a number, got {}", value))
}

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness_is_public() {
        let h = Harness::new();
        let response = h.server.get("/health").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "healthy");
    }

    #[tokio::test]
    async fn test_readiness_reports_store() {
        let h = Harness::new();
        let response = h.server.get("/health/ready").await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["status"], "ready");
        assert_eq!(body["store"]["status"], "healthy");
    }
}

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let h = Harness::new();
        let response = h.server.get("/api/v1/advance").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body = response.json::<Value>();
        assert_eq!(body["code"], "UNAUTHORIZED");
        assert_eq!(body["retryable"], false);
    }

    #[tokio::test]
    async fn test_token_signed_with_other_secret() {
        let h = Harness::new();
        let token = create_token("intruder", vec!["admin".into()], "wrong", 3600).unwrap();
        let header = HeaderValue::from_str(&format!("Bearer {}", token)).unwrap();
        let response = h
            .server
            .get("/api/v1/advance")
            .add_header(AUTHORIZATION, header)
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_read_only_user_cannot_write() {
        let h = Harness::new();
        let customer = h.named_customer("Read Only Test").await;
        let response = h
            .server
            .post("/api/v1/advance")
            .add_header(AUTHORIZATION, bearer(&["advance:read"]))
            .json(&json!({ "customerId": customer.to_string(), "amount": 100 }))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(response.json::<Value>()["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_reversal_needs_reverse_permission() {
        let h = Harness::new();
        let customer = h.fixture.funded_customer(dec!(500)).await;
        let entries = h.fixture.service.get_history(customer, Default::default()).await.unwrap();

        let response = h
            .server
            .post(&format!("/api/v1/advance/entries/{}/reverse", entries[0].id))
            .add_header(AUTHORIZATION, clerk())
            .json(&json!({ "reason": "typo" }))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }
}

mod write_tests {
    use super::*;

    #[tokio::test]
    async fn test_add_funds_returns_new_balance_and_entry() {
        let h = Harness::new();
        let customer = h.named_customer("Ramesh Traders").await;

        let response = h
            .server
            .post("/api/v1/advance")
            .add_header(AUTHORIZATION, clerk())
            .json(&json!({
                "customerId": customer.to_string(),
                "amount": 5000,
                "description": "Cash advance",
                "reference": "RCPT-7"
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body = response.json::<Value>();
        assert_eq!(number(&body["newBalance"]), 5000.0);
        assert_eq!(body["entry"]["type"], "FundsAdded");
        assert_eq!(number(&body["entry"]["amount"]), 5000.0);
        assert_eq!(body["entry"]["description"], "Cash advance");
        assert_eq!(body["entry"]["reference"], "RCPT-7");
        assert_eq!(body["entry"]["customer"]["name"], "Ramesh Traders");
        assert!(body["entry"].get("saleId").is_none());
    }

    #[tokio::test]
    async fn test_amount_as_string_is_accepted_and_rounded() {
        let h = Harness::new();
        let customer = h.named_customer("Rounding").await;
        let response = h
            .server
            .post("/api/v1/advance")
            .add_header(AUTHORIZATION, clerk())
            .json(&json!({ "customerId": customer.to_string(), "amount": "10.005" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(number(&response.json::<Value>()["newBalance"]), 10.01);
    }

    #[tokio::test]
    async fn test_zero_amount_is_bad_request() {
        let h = Harness::new();
        let customer = h.named_customer("Zero").await;
        let response = h
            .server
            .post("/api/v1/advance")
            .add_header(AUTHORIZATION, clerk())
            .json(&json!({ "customerId": customer.to_string(), "amount": 0 }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["code"], "INVALID_AMOUNT");
    }

    #[tokio::test]
    async fn test_oversized_amount_is_bad_request() {
        let h = Harness::new();
        let customer = h.named_customer("Oversized").await;

        for amount in ["1000000000000", "79228162514264337593543950335"] {
            let response = h
                .server
                .post("/api/v1/advance")
                .add_header(AUTHORIZATION, clerk())
                .json(&json!({ "customerId": customer.to_string(), "amount": amount }))
                .await;
            response.assert_status(StatusCode::BAD_REQUEST);
            assert_eq!(response.json::<Value>()["code"], "INVALID_AMOUNT");
        }
    }

    #[tokio::test]
    async fn test_credit_past_balance_limit_is_bad_request() {
        let h = Harness::new();
        let customer = h.fixture.funded_customer(MAX_AMOUNT).await;

        let response = h
            .server
            .post("/api/v1/advance")
            .add_header(AUTHORIZATION, clerk())
            .json(&json!({ "customerId": customer.to_string(), "amount": "1" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["code"], "INVALID_AMOUNT");

        let balance = h.fixture.service.current_balance(customer).await.unwrap();
        assert_eq!(balance, MAX_AMOUNT);
    }

    #[tokio::test]
    async fn test_malformed_input_is_bad_request() {
        let h = Harness::new();

        let missing_amount = h
            .server
            .post("/api/v1/advance")
            .add_header(AUTHORIZATION, clerk())
            .json(&json!({ "customerId": CustomerId::new().to_string() }))
            .await;
        missing_amount.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(missing_amount.json::<Value>()["code"], "BAD_REQUEST");

        let bad_id = h
            .server
            .post("/api/v1/advance")
            .add_header(AUTHORIZATION, clerk())
            .json(&json!({ "customerId": "not-a-customer", "amount": 10 }))
            .await;
        bad_id.assert_status(StatusCode::BAD_REQUEST);

        let long_reference = h
            .server
            .post("/api/v1/advance")
            .add_header(AUTHORIZATION, clerk())
            .json(&json!({
                "customerId": CustomerId::new().to_string(),
                "amount": 10,
                "reference": "R".repeat(101)
            }))
            .await;
        long_reference.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_overdraw_is_unprocessable_and_leaves_balance() {
        let h = Harness::new();
        let customer = h.fixture.funded_customer(dec!(1000)).await;
        let sale = h.fixture.sale("INV-2001").await;

        let response = h
            .server
            .post(&format!("/api/v1/advance/sales/{}/consume", sale))
            .add_header(AUTHORIZATION, clerk())
            .json(&json!({ "customerId": customer.to_string(), "amount": 1500 }))
            .await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body = response.json::<Value>();
        assert_eq!(body["code"], "INSUFFICIENT_BALANCE");
        assert_eq!(body["retryable"], false);

        let balance = h
            .server
            .get(&format!("/api/v1/advance/customers/{}", customer))
            .add_header(AUTHORIZATION, clerk())
            .await;
        assert_eq!(number(&balance.json::<Value>()["balance"]), 1000.0);
    }

    #[tokio::test]
    async fn test_consume_and_extra_payment_carry_sale() {
        let h = Harness::new();
        let customer = h.fixture.funded_customer(dec!(5000)).await;
        let sale = h.fixture.sale("INV-1042").await;

        let consumed = h
            .server
            .post(&format!("/api/v1/advance/sales/{}/consume", sale))
            .add_header(AUTHORIZATION, clerk())
            .json(&json!({ "customerId": customer.to_string(), "amount": 3000 }))
            .await;
        consumed.assert_status(StatusCode::CREATED);
        let body = consumed.json::<Value>();
        assert_eq!(number(&body["newBalance"]), 2000.0);
        assert_eq!(body["entry"]["type"], "ConsumedBySale");
        assert_eq!(number(&body["entry"]["amount"]), -3000.0);
        assert_eq!(body["entry"]["sale"]["invoiceNo"], "INV-1042");

        let extra = h
            .server
            .post(&format!("/api/v1/advance/sales/{}/extra-payment", sale))
            .add_header(AUTHORIZATION, clerk())
            .json(&json!({ "customerId": customer.to_string(), "amount": 250.5 }))
            .await;
        extra.assert_status(StatusCode::CREATED);
        let body = extra.json::<Value>();
        assert_eq!(number(&body["newBalance"]), 2250.5);
        assert_eq!(body["entry"]["type"], "ExtraPayment");
        assert_eq!(body["entry"]["saleId"], json!(sale));
    }

    #[tokio::test]
    async fn test_reversal_lifecycle() {
        let h = Harness::new();
        let customer = h.fixture.funded_customer(dec!(5000)).await;
        let sale = h.fixture.sale("INV-3").await;
        let consumed = h
            .fixture
            .service
            .consume_for_sale(customer, dec!(3000), sale)
            .await
            .unwrap();
        let path = format!("/api/v1/advance/entries/{}/reverse", consumed.entry.id);

        let first = h
            .server
            .post(&path)
            .add_header(AUTHORIZATION, admin())
            .json(&json!({ "reason": "sale cancelled" }))
            .await;
        first.assert_status(StatusCode::CREATED);
        let body = first.json::<Value>();
        assert_eq!(number(&body["newBalance"]), 5000.0);
        assert_eq!(body["entry"]["type"], "Reversed");
        assert_eq!(body["entry"]["description"], "Reversal: sale cancelled");
        assert_eq!(body["entry"]["reverses"], json!(consumed.entry.id));

        let again = h
            .server
            .post(&path)
            .add_header(AUTHORIZATION, admin())
            .json(&json!({ "reason": "again" }))
            .await;
        again.assert_status(StatusCode::CONFLICT);
        assert_eq!(again.json::<Value>()["code"], "ALREADY_REVERSED");

        let reversal_id = body["entry"]["id"].as_str().unwrap().to_string();
        let of_reversal = h
            .server
            .post(&format!("/api/v1/advance/entries/{}/reverse", reversal_id))
            .add_header(AUTHORIZATION, admin())
            .json(&json!({}))
            .await;
        of_reversal.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(of_reversal.json::<Value>()["code"], "NOT_REVERSIBLE");
    }

    #[tokio::test]
    async fn test_reverse_unknown_entry_is_not_found() {
        let h = Harness::new();
        let response = h
            .server
            .post("/api/v1/advance/entries/ADV-0190a9a4-7b5e-7c3a-9f00-000000000000/reverse")
            .add_header(AUTHORIZATION, admin())
            .json(&json!({ "reason": "typo" }))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_busy_customer_is_retryable() {
        let h = Harness::with_fixture(LedgerFixture::with_settings(LedgerSettings {
            lock_timeout: Duration::from_millis(25),
            ..LedgerSettings::default()
        }));
        let customer = h.named_customer("Busy").await;
        let held = h.fixture.store.hold_customer_lock(customer).await;

        let response = h
            .server
            .post("/api/v1/advance")
            .add_header(AUTHORIZATION, clerk())
            .json(&json!({ "customerId": customer.to_string(), "amount": 10 }))
            .await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body = response.json::<Value>();
        assert_eq!(body["code"], "CONTENTION");
        assert_eq!(body["retryable"], true);
        drop(held);
    }
}

mod read_tests {
    use super::*;

    async fn seeded() -> (Harness, CustomerId, CustomerId) {
        let h = Harness::new();
        let a = h.named_customer("Anand Builders").await;
        let b = h.named_customer("Bina Hardware").await;
        let sale = h.fixture.sale("INV-9").await;
        let service = &h.fixture.service;
        service.add_funds(a, dec!(5000), None, None).await.unwrap();
        service.consume_for_sale(a, dec!(1200), sale).await.unwrap();
        service.record_extra_payment(a, dec!(300), sale, None).await.unwrap();
        service.add_funds(b, dec!(700), None, None).await.unwrap();
        service.consume_for_sale(b, dec!(700), sale).await.unwrap();
        (h, a, b)
    }

    #[tokio::test]
    async fn test_customer_history_newest_first() {
        let (h, a, _) = seeded().await;
        let response = h
            .server
            .get(&format!("/api/v1/advance/customers/{}/history", a))
            .add_header(AUTHORIZATION, clerk())
            .await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(number(&body["balance"]), 4100.0);
        let types: Vec<&str> = body["transactions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["type"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["ExtraPayment", "ConsumedBySale", "FundsAdded"]);
    }

    #[tokio::test]
    async fn test_history_filter_accepts_legacy_name() {
        let (h, a, _) = seeded().await;
        let response = h
            .server
            .get(&format!("/api/v1/advance/customers/{}/history?type=ADVANCE_PAYMENT", a))
            .add_header(AUTHORIZATION, clerk())
            .await;
        let body = response.json::<Value>();
        let transactions = body["transactions"].as_array().unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0]["type"], "ExtraPayment");
    }

    #[tokio::test]
    async fn test_unknown_type_filter_is_bad_request() {
        let (h, _, _) = seeded().await;
        let response = h
            .server
            .get("/api/v1/advance/transactions?type=REFUND")
            .add_header(AUTHORIZATION, clerk())
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["code"], "UNKNOWN_KIND");
    }

    #[tokio::test]
    async fn test_customer_summary() {
        let (h, a, _) = seeded().await;
        let response = h
            .server
            .get(&format!("/api/v1/advance/customers/{}/summary", a))
            .add_header(AUTHORIZATION, clerk())
            .await;
        let body = response.json::<Value>();
        assert_eq!(number(&body["totalAdded"]), 5000.0);
        assert_eq!(number(&body["totalUsed"]), 1200.0);
        assert_eq!(number(&body["totalPayments"]), 300.0);
        assert_eq!(number(&body["totalReversed"]), 0.0);
        assert_eq!(number(&body["netAdvance"]), 4100.0);
    }

    #[tokio::test]
    async fn test_feed_filters_and_enriches() {
        let (h, _, b) = seeded().await;

        let used = h
            .server
            .get("/api/v1/advance/transactions?type=ADVANCE_USED")
            .add_header(AUTHORIZATION, clerk())
            .await;
        let body = used.json::<Value>();
        assert_eq!(body["count"], 2);
        assert_eq!(body["period"], "All time");
        for item in body["transactions"].as_array().unwrap() {
            assert_eq!(item["type"], "ConsumedBySale");
            assert_eq!(item["sale"]["invoiceNo"], "INV-9");
            assert!(item["customer"]["name"].is_string());
        }

        let limited = h
            .server
            .get(&format!("/api/v1/advance/transactions?customerId={}&limit=1", b))
            .add_header(AUTHORIZATION, clerk())
            .await;
        let body = limited.json::<Value>();
        assert_eq!(body["count"], 1);
        assert_eq!(body["transactions"][0]["type"], "ConsumedBySale");
        assert_eq!(body["transactions"][0]["customer"]["name"], "Bina Hardware");
    }

    #[tokio::test]
    async fn test_ledger_summary_for_today() {
        let (h, _, _) = seeded().await;
        let response = h
            .server
            .get("/api/v1/advance/summary?period=today")
            .add_header(AUTHORIZATION, clerk())
            .await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(number(&body["totalAdded"]), 5700.0);
        assert_eq!(number(&body["totalUsed"]), 1900.0);
        assert_eq!(number(&body["netAdvance"]), 4100.0);
    }

    #[tokio::test]
    async fn test_breakdown_by_month() {
        let (h, _, _) = seeded().await;
        let response = h
            .server
            .get("/api/v1/advance/breakdown?granularity=month")
            .add_header(AUTHORIZATION, clerk())
            .await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["granularity"], "month");
        let buckets = body["buckets"].as_array().unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0]["count"], 5);
        assert_eq!(number(&buckets[0]["netAdvance"]), 4100.0);
    }

    #[tokio::test]
    async fn test_bad_granularity() {
        let (h, _, _) = seeded().await;
        let response = h
            .server
            .get("/api/v1/advance/breakdown?granularity=fortnight")
            .add_header(AUTHORIZATION, clerk())
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_balance_listing() {
        let (h, a, _) = seeded().await;

        let all = h
            .server
            .get("/api/v1/advance")
            .add_header(AUTHORIZATION, clerk())
            .await;
        let body = all.json::<Value>();
        assert_eq!(body["count"], 2);
        assert_eq!(body["customers"][0]["customerId"], json!(a));
        assert_eq!(body["customers"][0]["customer"]["name"], "Anand Builders");
        assert_eq!(number(&body["totalOutstanding"]), 4100.0);

        let positive = h
            .server
            .get("/api/v1/advance?onlyPositive=true")
            .add_header(AUTHORIZATION, clerk())
            .await;
        let body = positive.json::<Value>();
        assert_eq!(body["count"], 1);
        assert_eq!(body["customers"][0]["customerId"], json!(a));
    }

    #[tokio::test]
    async fn test_unknown_customer_has_zero_balance() {
        let h = Harness::new();
        let response = h
            .server
            .get(&format!("/api/v1/advance/customers/{}", CustomerId::new()))
            .add_header(AUTHORIZATION, clerk())
            .await;
        response.assert_status_ok();
        assert_eq!(number(&response.json::<Value>()["balance"]), 0.0);
    }

    #[tokio::test]
    async fn test_reconciliation_is_consistent() {
        let (h, a, _) = seeded().await;

        let one = h
            .server
            .get(&format!("/api/v1/advance/customers/{}/reconcile", a))
            .add_header(AUTHORIZATION, clerk())
            .await;
        let body = one.json::<Value>();
        assert_eq!(body["consistent"], true);
        assert_eq!(number(&body["stored"]), 4100.0);
        assert_eq!(number(&body["difference"]), 0.0);

        let all = h
            .server
            .get("/api/v1/advance/reconcile")
            .add_header(AUTHORIZATION, clerk())
            .await;
        let body = all.json::<Value>();
        assert_eq!(body["checked"], 2);
        assert_eq!(body["consistent"], true);
        assert!(body["mismatches"].as_array().unwrap().is_empty());
    }
}
