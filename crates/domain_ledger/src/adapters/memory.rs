//! In-memory ledger adapter
//!
//! Keeps each customer's entries and balance behind its own
//! `tokio::sync::Mutex`, so appends for one customer are serialized while
//! different customers proceed in parallel. Every lock acquisition is bounded
//! by the configured timeout and surfaces as [`LedgerError::Contention`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use core_kernel::{
    AdapterHealth, CustomerId, DomainPort, HealthCheckResult, HealthCheckable, LedgerEntryId,
    PortError, SaleId,
};

use crate::entry::{EntryDraft, EntryKind, KindFilter, LedgerEntry};
use crate::error::LedgerError;
use crate::ports::{
    AppendReceipt, CustomerBalance, CustomerProfile, CustomerSnapshot, FeedQuery, LedgerReader,
    LedgerStore, ReferenceDirectory, SaleReference,
};
use crate::projector::apply_to_balance;
use crate::reporting::filter_entries;

#[derive(Debug, Default)]
struct CustomerBook {
    balance: Decimal,
    /// Insertion order
    entries: Vec<LedgerEntry>,
    /// Ids that already have a reversal
    reversed: HashSet<LedgerEntryId>,
    /// Set by the first successful append
    updated_at: Option<DateTime<Utc>>,
}

impl CustomerBook {
    fn find(&self, id: LedgerEntryId) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

/// Holds one customer's lock until dropped
///
/// Lets tests simulate a long-running append on another connection.
#[cfg(any(test, feature = "testing"))]
pub struct HeldCustomerLock {
    _guard: OwnedMutexGuard<CustomerBook>,
}

/// Ledger store backed by process memory
#[derive(Debug)]
pub struct InMemoryLedgerStore {
    books: RwLock<HashMap<CustomerId, Arc<Mutex<CustomerBook>>>>,
    index: RwLock<HashMap<LedgerEntryId, CustomerId>>,
    sequence: AtomicI64,
    lock_timeout: Duration,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl InMemoryLedgerStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            books: RwLock::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
            sequence: AtomicI64::new(0),
            lock_timeout,
        }
    }

    /// Acquires the customer's lock and keeps it until the returned value is
    /// dropped
    #[cfg(any(test, feature = "testing"))]
    pub async fn hold_customer_lock(&self, customer_id: CustomerId) -> HeldCustomerLock {
        let book = self.book_or_create(customer_id).await;
        HeldCustomerLock {
            _guard: book.lock_owned().await,
        }
    }

    async fn book(&self, customer_id: CustomerId) -> Option<Arc<Mutex<CustomerBook>>> {
        self.books.read().await.get(&customer_id).cloned()
    }

    async fn book_or_create(&self, customer_id: CustomerId) -> Arc<Mutex<CustomerBook>> {
        if let Some(book) = self.book(customer_id).await {
            return book;
        }
        let mut books = self.books.write().await;
        Arc::clone(books.entry(customer_id).or_default())
    }

    async fn lock(
        &self,
        book: Arc<Mutex<CustomerBook>>,
        operation: &str,
    ) -> Result<OwnedMutexGuard<CustomerBook>, LedgerError> {
        tokio::time::timeout(self.lock_timeout, book.lock_owned())
            .await
            .map_err(|_| {
                PortError::timeout(operation, self.lock_timeout.as_millis() as u64).into()
            })
    }

    async fn owner_of(&self, id: LedgerEntryId) -> Option<CustomerId> {
        self.index.read().await.get(&id).copied()
    }
}

fn newest_first(entries: &mut [LedgerEntry]) {
    entries.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
}

impl DomainPort for InMemoryLedgerStore {}

#[async_trait]
impl HealthCheckable for InMemoryLedgerStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            adapter_id: "memory-ledger".to_string(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: Some("In-memory store".to_string()),
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl LedgerReader for InMemoryLedgerStore {
    async fn list_by_customer(
        &self,
        customer_id: CustomerId,
        filter: KindFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.customer_snapshot(customer_id, filter).await?.entries)
    }

    async fn customer_snapshot(
        &self,
        customer_id: CustomerId,
        filter: KindFilter,
    ) -> Result<CustomerSnapshot, LedgerError> {
        let Some(book) = self.book(customer_id).await else {
            return Ok(CustomerSnapshot::empty(customer_id));
        };
        let book = self.lock(book, "customer_snapshot").await?;
        let mut entries: Vec<_> = book
            .entries
            .iter()
            .filter(|e| filter.matches(e.kind))
            .cloned()
            .collect();
        newest_first(&mut entries);
        Ok(CustomerSnapshot {
            customer_id,
            balance: book.balance,
            entries,
        })
    }

    async fn list_entries(&self, query: &FeedQuery) -> Result<Vec<LedgerEntry>, LedgerError> {
        let books: Vec<_> = match query.customer_id {
            Some(id) => self.book(id).await.into_iter().collect(),
            None => self.books.read().await.values().cloned().collect(),
        };

        let mut entries = Vec::new();
        for book in books {
            let book = self.lock(book, "list_entries").await?;
            entries.extend(book.entries.iter().cloned());
        }
        newest_first(&mut entries);
        Ok(filter_entries(&entries, query))
    }

    async fn find_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, LedgerError> {
        let Some(customer_id) = self.owner_of(id).await else {
            return Ok(None);
        };
        let Some(book) = self.book(customer_id).await else {
            return Ok(None);
        };
        let book = self.lock(book, "find_entry").await?;
        Ok(book.find(id).cloned())
    }

    async fn is_reversed(&self, id: LedgerEntryId) -> Result<bool, LedgerError> {
        let Some(customer_id) = self.owner_of(id).await else {
            return Ok(false);
        };
        let Some(book) = self.book(customer_id).await else {
            return Ok(false);
        };
        let book = self.lock(book, "is_reversed").await?;
        Ok(book.reversed.contains(&id))
    }

    async fn stored_balance(&self, customer_id: CustomerId) -> Result<Decimal, LedgerError> {
        let Some(book) = self.book(customer_id).await else {
            return Ok(Decimal::ZERO);
        };
        let book = self.lock(book, "stored_balance").await?;
        Ok(book.balance)
    }

    async fn balances(&self) -> Result<Vec<CustomerBalance>, LedgerError> {
        let books: Vec<_> = self
            .books
            .read()
            .await
            .iter()
            .map(|(id, book)| (*id, Arc::clone(book)))
            .collect();

        let mut rows = Vec::new();
        for (customer_id, book) in books {
            let book = self.lock(book, "balances").await?;
            if let Some(updated_at) = book.updated_at {
                rows.push(CustomerBalance {
                    customer_id,
                    balance: book.balance,
                    updated_at,
                });
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn append(&self, draft: EntryDraft) -> Result<AppendReceipt, LedgerError> {
        let book = self.book_or_create(draft.customer_id()).await;
        let mut book = self.lock(book, "append").await?;

        if let Some(target) = draft.reverses() {
            if book.find(target).is_none() {
                return Err(LedgerError::NotFound(target));
            }
            if book.reversed.contains(&target) {
                return Err(LedgerError::AlreadyReversed(target));
            }
        }
        let balance = apply_to_balance(book.balance, &draft)?;

        let now = Utc::now();
        let created_at = match book.updated_at {
            Some(last) if last > now => last,
            _ => now,
        };
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = draft.into_entry(LedgerEntryId::new_v7(), sequence, created_at);

        self.index.write().await.insert(entry.id, entry.customer_id);
        if let (EntryKind::Reversed, Some(target)) = (entry.kind, entry.reverses) {
            book.reversed.insert(target);
        }
        book.balance = balance;
        book.updated_at = Some(created_at);
        book.entries.push(entry.clone());

        Ok(AppendReceipt { entry, balance })
    }
}

/// Reference directory backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    customers: RwLock<HashMap<CustomerId, CustomerProfile>>,
    sales: RwLock<HashMap<SaleId, SaleReference>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_customer(&self, profile: CustomerProfile) {
        self.customers.write().await.insert(profile.id, profile);
    }

    pub async fn register_sale(&self, sale: SaleReference) {
        self.sales.write().await.insert(sale.id, sale);
    }
}

impl DomainPort for InMemoryDirectory {}

#[async_trait]
impl ReferenceDirectory for InMemoryDirectory {
    async fn customer_profiles(
        &self,
        ids: &[CustomerId],
    ) -> Result<HashMap<CustomerId, CustomerProfile>, PortError> {
        let customers = self.customers.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| customers.get(id).map(|p| (*id, p.clone())))
            .collect())
    }

    async fn sale_references(
        &self,
        ids: &[SaleId],
    ) -> Result<HashMap<SaleId, SaleReference>, PortError> {
        let sales = self.sales.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| sales.get(id).map(|s| (*id, s.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn top_up(customer: CustomerId, amount: Decimal) -> EntryDraft {
        EntryDraft::funds_added(customer, amount, None, None).unwrap()
    }

    #[tokio::test]
    async fn test_append_updates_balance_and_history() {
        let store = InMemoryLedgerStore::default();
        let customer = CustomerId::new();

        store.append(top_up(customer, dec!(100))).await.unwrap();
        let receipt = store.append(top_up(customer, dec!(50))).await.unwrap();

        assert_eq!(receipt.balance, dec!(150));
        assert_eq!(store.stored_balance(customer).await.unwrap(), dec!(150));

        let history = store.list_by_customer(customer, KindFilter::All).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].amount, dec!(50));
        assert!(history[0].sequence > history[1].sequence);
    }

    #[tokio::test]
    async fn test_failed_first_append_leaves_no_balance_row() {
        let store = InMemoryLedgerStore::default();
        let customer = CustomerId::new();
        let draft = EntryDraft::consumed_by_sale(customer, dec!(10), SaleId::new()).unwrap();

        assert!(matches!(
            store.append(draft).await,
            Err(LedgerError::InsufficientBalance { .. })
        ));
        assert!(store.balances().await.unwrap().is_empty());
        assert_eq!(store.stored_balance(customer).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_second_reversal_rejected_by_store() {
        let store = InMemoryLedgerStore::default();
        let customer = CustomerId::new();
        let original = store.append(top_up(customer, dec!(100))).await.unwrap().entry;

        store.append(EntryDraft::reversal(&original, "a").unwrap()).await.unwrap();
        let second = store.append(EntryDraft::reversal(&original, "b").unwrap()).await;

        assert!(matches!(second, Err(LedgerError::AlreadyReversed(id)) if id == original.id));
        assert!(store.is_reversed(original.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_held_lock_times_out_as_contention() {
        let store = InMemoryLedgerStore::new(Duration::from_millis(20));
        let customer = CustomerId::new();
        let _held = store.hold_customer_lock(customer).await;

        let result = store.append(top_up(customer, dec!(1))).await;
        assert!(matches!(result, Err(LedgerError::Contention(_))));
    }

    #[tokio::test]
    async fn test_feed_limit_and_filter() {
        let store = InMemoryLedgerStore::default();
        let a = CustomerId::new();
        let b = CustomerId::new();
        for _ in 0..3 {
            store.append(top_up(a, dec!(10))).await.unwrap();
            store.append(top_up(b, dec!(20))).await.unwrap();
        }

        let all = store.list_entries(&FeedQuery::default()).await.unwrap();
        assert_eq!(all.len(), 6);

        let only_b = store.list_entries(&FeedQuery::for_customer(b).limit(2)).await.unwrap();
        assert_eq!(only_b.len(), 2);
        assert!(only_b.iter().all(|e| e.customer_id == b));
    }

    #[tokio::test]
    async fn test_snapshot_of_unknown_customer_is_empty() {
        let store = InMemoryLedgerStore::default();
        let customer = CustomerId::new();
        let snapshot = store.customer_snapshot(customer, KindFilter::All).await.unwrap();
        assert_eq!(snapshot, CustomerSnapshot::empty(customer));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_snapshot_stays_consistent_under_writes() {
        let store = Arc::new(InMemoryLedgerStore::default());
        let customer = CustomerId::new();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..500 {
                    store.append(top_up(customer, dec!(1))).await.unwrap();
                }
            })
        };

        for _ in 0..500 {
            let snapshot = store.customer_snapshot(customer, KindFilter::All).await.unwrap();
            let sum: Decimal = snapshot.entries.iter().map(|e| e.amount).sum();
            assert_eq!(snapshot.balance, sum);
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_directory_skips_unknown_ids() {
        let directory = InMemoryDirectory::new();
        let known = CustomerId::new();
        directory
            .register_customer(CustomerProfile {
                id: known,
                name: "Ramesh Traders".into(),
                phone: None,
            })
            .await;

        let found = directory.customer_profiles(&[known, CustomerId::new()]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[&known].name, "Ramesh Traders");
    }
}
