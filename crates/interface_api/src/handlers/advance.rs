//! Advance ledger handlers
//!
//! Writes go through [`LedgerService`](domain_ledger::LedgerService); reads
//! that span customers go through [`LedgerReports`](domain_ledger::LedgerReports).

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

use core_kernel::{CustomerId, SaleId};
use domain_ledger::{FeedQuery, LedgerEntry};

use crate::auth::{permissions, require, Claims};
use crate::dto::advance::{
    parse_customer_id, parse_entry_id, parse_sale_id, AddFundsRequest, BalanceListResponse,
    BalanceParams, BalanceResponse, BreakdownResponse, ConsumeRequest, CustomerBalanceItem,
    ExtraPaymentRequest, FeedParams, FeedResponse, HistoryParams, HistoryResponse,
    NewBalanceResponse, PeriodTotalsItem, ReconcileResponse, References, ReverseRequest,
    SummaryResponse, TransactionItem,
};
use crate::dto::validated;
use crate::error::ApiError;
use crate::AppState;

type Created<T> = (StatusCode, Json<T>);

/// Customers with a balance row, largest balance first
pub async fn list_balances(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<BalanceParams>,
) -> Result<Json<BalanceListResponse>, ApiError> {
    require(&claims, permissions::ADVANCE_READ)?;
    let rows = state.reports.customer_balances(params.only_positive()?).await?;

    let customer_ids: Vec<CustomerId> = rows.iter().map(|r| r.customer_id).collect();
    let refs = lookup(&state, &customer_ids, &[]).await;
    let items = rows
        .into_iter()
        .map(|row| CustomerBalanceItem::new(row, &refs))
        .collect();

    Ok(Json(BalanceListResponse::new(items)))
}

pub async fn add_funds(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<AddFundsRequest>, JsonRejection>,
) -> Result<Created<NewBalanceResponse>, ApiError> {
    require(&claims, permissions::ADVANCE_WRITE)?;
    let request = validated(payload)?;
    let customer_id = parse_customer_id(&request.customer_id)?;

    let result = state
        .ledger
        .add_funds(customer_id, request.amount, request.description, request.reference)
        .await?;

    info!(
        user = %claims.sub,
        customer_id = %customer_id,
        entry_id = %result.entry.id,
        amount = %result.entry.amount,
        balance = %result.balance,
        "Advance added"
    );

    let refs = references_for(&state, std::slice::from_ref(&result.entry)).await;
    Ok((
        StatusCode::CREATED,
        Json(NewBalanceResponse::new("Advance added successfully", result, &refs)),
    ))
}

/// Ledger-wide feed, newest first
pub async fn transaction_feed(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<FeedParams>,
) -> Result<Json<FeedResponse>, ApiError> {
    require(&claims, permissions::ADVANCE_READ)?;
    let (query, label) = feed_query(&state, &params)?;

    let entries = state.reports.transaction_feed(&query).await?;
    let refs = references_for(&state, &entries).await;
    let transactions: Vec<TransactionItem> = entries
        .into_iter()
        .map(|entry| TransactionItem::new(entry, &refs))
        .collect();

    Ok(Json(FeedResponse {
        period: label,
        count: transactions.len(),
        transactions,
    }))
}

pub async fn summary(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<FeedParams>,
) -> Result<Json<SummaryResponse>, ApiError> {
    require(&claims, permissions::ADVANCE_READ)?;
    let (query, _) = feed_query(&state, &params)?;
    let summary = state.reports.summary(&query).await?;
    Ok(Json(summary.into()))
}

pub async fn breakdown(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<FeedParams>,
) -> Result<Json<BreakdownResponse>, ApiError> {
    require(&claims, permissions::ADVANCE_READ)?;
    let granularity = params.granularity()?;
    let (query, label) = feed_query(&state, &params)?;

    let buckets = state.reports.period_breakdown(&query, granularity).await?;
    Ok(Json(BreakdownResponse {
        granularity,
        period: label,
        buckets: buckets.into_iter().map(PeriodTotalsItem::from).collect(),
    }))
}

pub async fn customer_balance(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    require(&claims, permissions::ADVANCE_READ)?;
    let customer_id = parse_customer_id(&id)?;
    let balance = state.ledger.current_balance(customer_id).await?;
    Ok(Json(BalanceResponse {
        customer_id,
        balance,
    }))
}

pub async fn customer_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    require(&claims, permissions::ADVANCE_READ)?;
    let customer_id = parse_customer_id(&id)?;
    let filter = params.kind_filter()?;

    let snapshot = state.ledger.history_snapshot(customer_id, filter).await?;
    let refs = references_for(&state, &snapshot.entries).await;

    Ok(Json(HistoryResponse {
        customer_id,
        balance: snapshot.balance,
        transactions: snapshot
            .entries
            .into_iter()
            .map(|entry| TransactionItem::new(entry, &refs))
            .collect(),
    }))
}

pub async fn customer_summary(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<SummaryResponse>, ApiError> {
    require(&claims, permissions::ADVANCE_READ)?;
    let customer_id = parse_customer_id(&id)?;
    let summary = state.ledger.get_summary(customer_id).await?;
    Ok(Json(summary.into()))
}

pub async fn reconcile_customer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    require(&claims, permissions::ADVANCE_READ)?;
    let customer_id = parse_customer_id(&id)?;
    let result = state.ledger.reconcile(customer_id).await?;
    if !result.consistent {
        warn!(
            customer_id = %customer_id,
            stored = %result.stored,
            computed = %result.computed,
            "Stored advance balance disagrees with entries"
        );
    }
    Ok(Json(result.into()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileAllResponse {
    pub checked: usize,
    pub consistent: bool,
    /// Customers whose stored balance disagrees with their entries
    pub mismatches: Vec<ReconcileResponse>,
}

pub async fn reconcile_all(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ReconcileAllResponse>, ApiError> {
    require(&claims, permissions::ADVANCE_READ)?;
    let results = state.ledger.reconcile_all().await?;
    let checked = results.len();
    let mismatches: Vec<ReconcileResponse> = results
        .into_iter()
        .filter(|r| !r.consistent)
        .map(ReconcileResponse::from)
        .collect();

    if !mismatches.is_empty() {
        warn!(checked, mismatches = mismatches.len(), "Advance reconciliation found mismatches");
    }

    Ok(Json(ReconcileAllResponse {
        checked,
        consistent: mismatches.is_empty(),
        mismatches,
    }))
}

pub async fn consume_for_sale(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(sale_id): Path<String>,
    payload: Result<Json<ConsumeRequest>, JsonRejection>,
) -> Result<Created<NewBalanceResponse>, ApiError> {
    require(&claims, permissions::ADVANCE_WRITE)?;
    let sale_id = parse_sale_id(&sale_id)?;
    let request = validated(payload)?;
    let customer_id = parse_customer_id(&request.customer_id)?;

    let result = state
        .ledger
        .consume_for_sale(customer_id, request.amount, sale_id)
        .await?;

    info!(
        user = %claims.sub,
        customer_id = %customer_id,
        sale_id = %sale_id,
        amount = %request.amount,
        balance = %result.balance,
        "Advance applied to sale"
    );

    let refs = references_for(&state, std::slice::from_ref(&result.entry)).await;
    Ok((
        StatusCode::CREATED,
        Json(NewBalanceResponse::new("Advance applied to sale", result, &refs)),
    ))
}

pub async fn record_extra_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(sale_id): Path<String>,
    payload: Result<Json<ExtraPaymentRequest>, JsonRejection>,
) -> Result<Created<NewBalanceResponse>, ApiError> {
    require(&claims, permissions::ADVANCE_WRITE)?;
    let sale_id = parse_sale_id(&sale_id)?;
    let request = validated(payload)?;
    let customer_id = parse_customer_id(&request.customer_id)?;

    let result = state
        .ledger
        .record_extra_payment(customer_id, request.amount, sale_id, request.description)
        .await?;

    info!(
        user = %claims.sub,
        customer_id = %customer_id,
        sale_id = %sale_id,
        amount = %result.entry.amount,
        balance = %result.balance,
        "Extra payment kept as advance"
    );

    let refs = references_for(&state, std::slice::from_ref(&result.entry)).await;
    Ok((
        StatusCode::CREATED,
        Json(NewBalanceResponse::new("Extra payment recorded as advance", result, &refs)),
    ))
}

pub async fn reverse_entry(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    payload: Result<Json<ReverseRequest>, JsonRejection>,
) -> Result<Created<NewBalanceResponse>, ApiError> {
    require(&claims, permissions::ADVANCE_REVERSE)?;
    let entry_id = parse_entry_id(&id)?;
    let request = validated(payload)?;

    let result = state.ledger.reverse(entry_id, &request.reason).await?;

    info!(
        user = %claims.sub,
        reversed = %entry_id,
        entry_id = %result.entry.id,
        balance = %result.balance,
        "Ledger entry reversed"
    );

    let refs = references_for(&state, std::slice::from_ref(&result.entry)).await;
    Ok((
        StatusCode::CREATED,
        Json(NewBalanceResponse::new("Entry reversed", result, &refs)),
    ))
}

/// Builds the store query and a period label from the query string
fn feed_query(state: &AppState, params: &FeedParams) -> Result<(FeedQuery, String), ApiError> {
    let timezone = state.reports.timezone();
    let now = Utc::now();
    let period = params.period(now, timezone)?;
    let query = FeedQuery {
        customer_id: params.customer_id()?,
        kind: params.kind_filter()?,
        range: period.range(now, timezone),
        limit: params.limit()?,
    };
    Ok((query, period.label()))
}

async fn references_for(state: &AppState, entries: &[LedgerEntry]) -> References {
    let customers: BTreeSet<CustomerId> = entries.iter().map(|e| e.customer_id).collect();
    let sales: BTreeSet<SaleId> = entries.iter().filter_map(|e| e.related_sale_id).collect();
    let customers: Vec<CustomerId> = customers.into_iter().collect();
    let sales: Vec<SaleId> = sales.into_iter().collect();
    lookup(state, &customers, &sales).await
}

/// Fetches display details; a failing directory only drops the details
async fn lookup(state: &AppState, customers: &[CustomerId], sales: &[SaleId]) -> References {
    let customers = if customers.is_empty() {
        HashMap::new()
    } else {
        state
            .directory
            .customer_profiles(customers)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Customer lookup failed");
                HashMap::new()
            })
    };
    let sales = if sales.is_empty() {
        HashMap::new()
    } else {
        state.directory.sale_references(sales).await.unwrap_or_else(|e| {
            warn!(error = %e, "Sale lookup failed");
            HashMap::new()
        })
    };
    References { customers, sales }
}
