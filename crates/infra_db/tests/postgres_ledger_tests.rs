//! PostgreSQL adapter tests
//!
//! Run with `cargo test -p infra_db -- --ignored` on a machine with Docker.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{CustomerId, HealthCheckable, SaleId};
use domain_ledger::{
    EntryKind, FeedQuery, KindFilter, LedgerError, LedgerReader, LedgerService, LedgerSettings,
    ReferenceDirectory, MAX_AMOUNT,
};
use infra_db::{PostgresLedgerStore, PostgresReferenceDirectory};
use test_utils::{
    assert_conserved, assert_newest_first, assert_reconciled, db_test, ReferenceFixtures,
};

fn service_for(store: Arc<PostgresLedgerStore>) -> LedgerService {
    LedgerService::new(store, LedgerSettings::default())
}

mod append_tests {
    use super::*;

    db_test!(test_top_up_and_consume_round_trip, |db| {
        let store = Arc::new(PostgresLedgerStore::new(db.pool.clone(), Duration::from_secs(5)));
        let service = service_for(store.clone());
        let customer = CustomerId::new();

        service.add_funds(customer, dec!(5000), Some("top-up".into()), None).await.unwrap();
        let receipt = service.consume_for_sale(customer, dec!(2000), SaleId::new()).await.unwrap();
        assert_eq!(receipt.balance, dec!(3000));

        let history = store.list_by_customer(customer, KindFilter::All).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_newest_first(&history);
        assert_conserved(&history, store.stored_balance(customer).await.unwrap());
        assert_eq!(history[0].kind, EntryKind::ConsumedBySale);
    });

    db_test!(test_overdraw_leaves_no_trace, |db| {
        let store = Arc::new(PostgresLedgerStore::new(db.pool.clone(), Duration::from_secs(5)));
        let service = service_for(store.clone());
        let customer = CustomerId::new();

        let result = service.consume_for_sale(customer, dec!(1), SaleId::new()).await;
        assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));
        assert!(store.balances().await.unwrap().is_empty());
        assert_eq!(store.stored_balance(customer).await.unwrap(), Decimal::ZERO);
    });

    db_test!(test_double_reversal_rejected, |db| {
        let store = Arc::new(PostgresLedgerStore::new(db.pool.clone(), Duration::from_secs(5)));
        let service = service_for(store.clone());
        let customer = CustomerId::new();

        service.add_funds(customer, dec!(100), None, None).await.unwrap();
        let payment = service
            .record_extra_payment(customer, dec!(300), SaleId::new(), Some("overpaid".into()))
            .await
            .unwrap();
        let reversal = service.reverse(payment.entry.id, "mistake").await.unwrap();
        assert_eq!(reversal.balance, dec!(100));

        let again = service.reverse(payment.entry.id, "mistake").await;
        assert!(matches!(again, Err(LedgerError::AlreadyReversed(_))));
        assert!(store.is_reversed(payment.entry.id).await.unwrap());
    });

    db_test!(test_concurrent_consumptions_serialize, |db| {
        let store = Arc::new(PostgresLedgerStore::new(db.pool.clone(), Duration::from_secs(5)));
        let service = Arc::new(service_for(store.clone()));
        let customer = CustomerId::new();
        service.add_funds(customer, dec!(1000), None, None).await.unwrap();

        let consume = |service: Arc<LedgerService>| {
            tokio::spawn(async move {
                service.consume_for_sale(customer, dec!(600), SaleId::new()).await
            })
        };
        let a = consume(service.clone());
        let b = consume(service.clone());
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(store.stored_balance(customer).await.unwrap(), dec!(400));
    });

    db_test!(test_held_row_lock_is_contention, |db| {
        let store = Arc::new(PostgresLedgerStore::new(db.pool.clone(), Duration::from_millis(100)));
        let service = service_for(store.clone());
        let customer = CustomerId::new();
        service.add_funds(customer, dec!(50), None, None).await.unwrap();

        let mut blocker = db.pool.begin().await.unwrap();
        sqlx::query("SELECT balance FROM customer_balances WHERE customer_id = $1 FOR UPDATE")
            .bind(*customer.as_uuid())
            .execute(&mut *blocker)
            .await
            .unwrap();

        let result = service.add_funds(customer, dec!(10), None, None).await;
        assert!(matches!(result, Err(LedgerError::Contention(_))));
        blocker.rollback().await.unwrap();
    });

    db_test!(test_amount_past_column_range_is_invalid, |db| {
        let store = Arc::new(PostgresLedgerStore::new(db.pool.clone(), Duration::from_secs(5)));
        let service = service_for(store.clone());
        let customer = CustomerId::new();

        let result = service.add_funds(customer, dec!(1000000000000), None, None).await;
        assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));

        service.add_funds(customer, MAX_AMOUNT, None, None).await.unwrap();
        let result = service.add_funds(customer, dec!(0.01), None, None).await;
        assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));
        assert_eq!(store.stored_balance(customer).await.unwrap(), MAX_AMOUNT);
    });
}

mod read_tests {
    use super::*;

    db_test!(test_feed_limit_and_customer_filter, |db| {
        let store = Arc::new(PostgresLedgerStore::new(db.pool.clone(), Duration::from_secs(5)));
        let service = service_for(store.clone());
        let a = CustomerId::new();
        let b = CustomerId::new();
        for _ in 0..3 {
            service.add_funds(a, dec!(10), None, None).await.unwrap();
            service.add_funds(b, dec!(20), None, None).await.unwrap();
        }

        let feed = store.list_entries(&FeedQuery::default().limit(4)).await.unwrap();
        assert_eq!(feed.len(), 4);
        assert_newest_first(&feed);

        let only_a = store.list_entries(&FeedQuery::for_customer(a)).await.unwrap();
        assert_eq!(only_a.len(), 3);

        let reconciliation = service.reconcile_all().await.unwrap();
        assert!(reconciliation.iter().all(|r| r.consistent));
    });

    db_test!(test_reconcile_during_writes_sees_one_snapshot, |db| {
        let store = Arc::new(PostgresLedgerStore::new(db.pool.clone(), Duration::from_secs(5)));
        let service = Arc::new(service_for(store.clone()));
        let customer = CustomerId::new();
        service.add_funds(customer, dec!(1), None, None).await.unwrap();

        let writer = {
            let service = service.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    service.add_funds(customer, dec!(1), None, None).await.unwrap();
                }
            })
        };
        for _ in 0..100 {
            assert_reconciled(&service.reconcile(customer).await.unwrap());
        }
        writer.await.unwrap();

        let snapshot = store.customer_snapshot(customer, KindFilter::All).await.unwrap();
        assert_eq!(snapshot.balance, dec!(101));
        assert_conserved(&snapshot.entries, snapshot.balance);
    });

    db_test!(test_directory_resolves_names, |db| {
        let customer = ReferenceFixtures::named_customer("Shree Ganesh Builders");
        let sale = ReferenceFixtures::sale("INV-2026-0042");
        db.insert_customer(&customer).await.unwrap();
        db.insert_sale(&sale).await.unwrap();

        let directory = PostgresReferenceDirectory::new(db.pool.clone());
        let customers = directory
            .customer_profiles(&[customer.id, CustomerId::new()])
            .await
            .unwrap();
        let sales = directory.sale_references(&[sale.id]).await.unwrap();

        assert_eq!(customers.len(), 1);
        assert_eq!(customers[&customer.id].name, "Shree Ganesh Builders");
        assert_eq!(sales[&sale.id].invoice_no, "INV-2026-0042");
    });

    db_test!(test_health_check_reports_healthy, |db| {
        let store = PostgresLedgerStore::new(db.pool.clone(), Duration::from_secs(5));
        assert!(store.health_check().await.is_healthy());
    });
}
