use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::{self, AlertTrigger};
use crate::config::{
    ACTIVE_SEARCH_LIMIT, DEFAULT_DEAL_LIMIT, DEFAULT_DISCOUNT_THRESHOLD_PCT,
    DEFAULT_HISTORY_DAYS, SOLD_LOOKBACK_DAYS, SOLD_SAMPLE_LIMIT,
};
use crate::error::{AppError, Result};
use crate::fetcher::{ListingClient, SearchQuery};
use crate::scorer::deal_scorer::score_deals;
use crate::stats::round2;
use crate::store::TrackingStore;
use crate::types::{
    ItemDetails, ListingRecord, PriceTrend, SortBy, TrackRequest,
};

#[derive(Clone)]
pub struct ApiState {
    pub store: TrackingStore,
    /// Absent when no eBay credentials were configured at startup. Remote
    /// operations check this explicitly and fail as upstream-unavailable.
    pub listings: Option<Arc<ListingClient>>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/items", post(track_item).get(list_items))
        .route("/items/needing_check", get(needing_check))
        .route("/items/:id", delete(untrack_item))
        .route("/items/:id/prices", post(add_price_point))
        .route("/items/:id/history", get(price_history))
        .route("/alerts", get(check_alerts))
        .route("/deals", get(find_deals))
        .route("/search", get(search_listings))
        .route("/listings/:id", get(listing_details))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct UntrackQuery {
    pub delete_history: Option<bool>,
}

#[derive(Deserialize)]
pub struct PricePointBody {
    pub price: f64,
    pub shipping_cost: Option<f64>,
    pub condition: Option<String>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub days: Option<i64>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub active_only: Option<bool>,
    pub sort_by: Option<SortBy>,
}

#[derive(Deserialize)]
pub struct DealsQuery {
    pub keywords: String,
    pub discount_threshold: Option<f64>,
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Response types. Monetary fields are rounded to 2 decimals and timestamps
// rendered date-only here, at the boundary, never in the store.
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct TrackResponse {
    pub status: &'static str,
    pub item_id: String,
    pub title: String,
    pub first_price: f64,
    pub alert_threshold: Option<f64>,
    pub alert_percentage: Option<f64>,
}

#[derive(Serialize)]
pub struct UntrackResponse {
    pub status: &'static str,
    pub item_id: String,
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct PricePointResponse {
    pub status: &'static str,
    pub item_id: String,
    pub price: f64,
}

#[derive(Serialize)]
pub struct HistoryPointResponse {
    pub date: String,
    pub price: f64,
    pub shipping: f64,
    pub condition: Option<String>,
}

#[derive(Serialize)]
pub struct HistoryStatsResponse {
    pub data_points: usize,
    pub current_price: f64,
    pub lowest_price: f64,
    pub highest_price: f64,
    pub average_price: f64,
    pub median_price: f64,
    pub price_trend: PriceTrend,
    pub percent_change: f64,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub status: &'static str,
    pub item_id: String,
    pub title: String,
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub price_history: Vec<HistoryPointResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<HistoryStatsResponse>,
}

#[derive(Serialize)]
pub struct TrackedItemResponse {
    pub item_id: String,
    pub title: String,
    pub category: Option<String>,
    pub url: Option<String>,
    pub first_price: f64,
    pub current_price: f64,
    pub alert_threshold: Option<f64>,
    pub alert_percentage: Option<f64>,
    pub check_frequency: String,
    pub notes: Option<String>,
    pub tracking_since: String,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub status: &'static str,
    pub count: usize,
    pub items: Vec<TrackedItemResponse>,
}

#[derive(Serialize)]
pub struct NeedingCheckResponse {
    pub status: &'static str,
    pub count: usize,
    pub item_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct TriggeredAlertResponse {
    pub item_id: String,
    pub title: String,
    pub current_price: f64,
    pub triggers: Vec<AlertTrigger>,
}

#[derive(Serialize)]
pub struct AlertSweepResponse {
    pub status: &'static str,
    pub checked: usize,
    pub alerts: Vec<TriggeredAlertResponse>,
}

#[derive(Serialize)]
pub struct MarketStatsResponse {
    pub sample_size: usize,
    pub average_price: f64,
    pub median_price: f64,
    pub price_range: [f64; 2],
}

#[derive(Serialize)]
pub struct DealResponse {
    pub item_id: String,
    pub title: String,
    pub url: String,
    pub price: f64,
    pub shipping_cost: f64,
    pub condition: String,
    pub discount_amount: f64,
    pub discount_percent: f64,
    pub deal_score: f64,
}

#[derive(Serialize)]
pub struct DealsResponse {
    pub status: &'static str,
    pub keywords: String,
    pub discount_threshold: f64,
    pub market: MarketStatsResponse,
    pub total_qualifying: usize,
    pub deals: Vec<DealResponse>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub status: &'static str,
    pub keywords: String,
    pub results_count: usize,
    pub items: Vec<ListingRecord>,
}

#[derive(Serialize)]
pub struct DetailsResponse {
    pub status: &'static str,
    pub item: ItemDetails,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<ApiState>) -> Result<Json<serde_json::Value>> {
    let tracked = state.store.count_items().await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "tracked_items": tracked,
        "listing_client": state.listings.is_some(),
    })))
}

async fn track_item(
    State(state): State<ApiState>,
    Json(req): Json<TrackRequest>,
) -> Result<Json<TrackResponse>> {
    let confirmation = state.store.track(&req).await?;
    Ok(Json(TrackResponse {
        status: "success",
        item_id: confirmation.item_id,
        title: confirmation.title,
        first_price: round2(confirmation.first_price),
        alert_threshold: confirmation.alert_threshold,
        alert_percentage: confirmation.alert_percentage,
    }))
}

async fn untrack_item(
    State(state): State<ApiState>,
    Path(item_id): Path<String>,
    Query(params): Query<UntrackQuery>,
) -> Result<Json<UntrackResponse>> {
    let outcome = state
        .store
        .untrack(&item_id, params.delete_history.unwrap_or(false))
        .await?;
    let message = if outcome.deleted_history {
        "Item and all history deleted"
    } else {
        "Item marked inactive (history preserved)"
    };
    Ok(Json(UntrackResponse {
        status: "success",
        item_id: outcome.item_id,
        message,
    }))
}

async fn add_price_point(
    State(state): State<ApiState>,
    Path(item_id): Path<String>,
    Json(body): Json<PricePointBody>,
) -> Result<Json<PricePointResponse>> {
    state
        .store
        .add_price_point(
            &item_id,
            body.price,
            body.shipping_cost.unwrap_or(0.0),
            body.condition.as_deref(),
        )
        .await?;
    Ok(Json(PricePointResponse {
        status: "success",
        item_id,
        price: round2(body.price),
    }))
}

async fn price_history(
    State(state): State<ApiState>,
    Path(item_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>> {
    let days = params.days.unwrap_or(DEFAULT_HISTORY_DAYS);
    let report = state.store.price_history(&item_id, days).await?;

    let message = report
        .stats
        .is_none()
        .then_some("No price history available for this period");

    Ok(Json(HistoryResponse {
        status: "success",
        item_id: report.item_id,
        title: report.title,
        url: report.url,
        message,
        price_history: report
            .points
            .iter()
            .map(|p| HistoryPointResponse {
                date: date_only(p.timestamp),
                price: round2(p.price),
                shipping: round2(p.shipping_cost),
                condition: p.condition.clone(),
            })
            .collect(),
        stats: report.stats.map(|s| HistoryStatsResponse {
            data_points: s.data_points,
            current_price: round2(s.current_price),
            lowest_price: round2(s.lowest_price),
            highest_price: round2(s.highest_price),
            average_price: round2(s.average_price),
            median_price: round2(s.median_price),
            price_trend: s.price_trend,
            percent_change: round2(s.percent_change),
        }),
    }))
}

async fn list_items(
    State(state): State<ApiState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<ListResponse>> {
    let items = state
        .store
        .list_tracked(
            params.active_only.unwrap_or(true),
            params.sort_by.unwrap_or_default(),
        )
        .await?;

    let items: Vec<TrackedItemResponse> = items
        .into_iter()
        .map(|i| TrackedItemResponse {
            item_id: i.item_id,
            title: i.title,
            category: i.category,
            url: i.url,
            first_price: round2(i.first_price),
            current_price: round2(i.current_price),
            alert_threshold: i.alert_threshold,
            alert_percentage: i.alert_percentage,
            check_frequency: i.check_frequency,
            notes: i.notes,
            tracking_since: date_only(i.tracking_since),
        })
        .collect();

    Ok(Json(ListResponse {
        status: "success",
        count: items.len(),
        items,
    }))
}

async fn needing_check(State(state): State<ApiState>) -> Result<Json<NeedingCheckResponse>> {
    let item_ids = state.store.items_needing_check().await?;
    Ok(Json(NeedingCheckResponse {
        status: "success",
        count: item_ids.len(),
        item_ids,
    }))
}

async fn check_alerts(State(state): State<ApiState>) -> Result<Json<AlertSweepResponse>> {
    let candidates = state.store.alert_candidates().await?;
    let checked = candidates.len();

    let mut triggered = Vec::new();
    for item in candidates {
        let current = state
            .store
            .latest_price(&item.item_id)
            .await?
            .map(|p| p.price)
            .unwrap_or(item.first_seen_price);
        let triggers = alerts::evaluate(&item, current);
        if !triggers.is_empty() {
            triggered.push(TriggeredAlertResponse {
                item_id: item.item_id,
                title: item.title,
                current_price: round2(current),
                triggers,
            });
        }
    }

    Ok(Json(AlertSweepResponse {
        status: "success",
        checked,
        alerts: triggered,
    }))
}

async fn find_deals(
    State(state): State<ApiState>,
    Query(params): Query<DealsQuery>,
) -> Result<Json<DealsResponse>> {
    let client = require_client(&state)?;

    let sold = client
        .sold_listings(&params.keywords, SOLD_LOOKBACK_DAYS, SOLD_SAMPLE_LIMIT)
        .await?;
    let sample: Vec<f64> = sold.iter().map(|s| s.price).collect();

    let active = client
        .search(&SearchQuery {
            keywords: params.keywords.clone(),
            limit: Some(ACTIVE_SEARCH_LIMIT),
            ..Default::default()
        })
        .await?;

    let discount_threshold = params
        .discount_threshold
        .unwrap_or(DEFAULT_DISCOUNT_THRESHOLD_PCT);
    let limit = params.limit.unwrap_or(DEFAULT_DEAL_LIMIT);

    let report = score_deals(&sample, &active, discount_threshold, limit)?;

    Ok(Json(DealsResponse {
        status: "success",
        keywords: params.keywords,
        discount_threshold,
        market: MarketStatsResponse {
            sample_size: report.market.sample_size,
            average_price: round2(report.market.average),
            median_price: round2(report.market.median),
            price_range: [round2(report.market.min), round2(report.market.max)],
        },
        total_qualifying: report.total_qualifying,
        deals: report
            .deals
            .into_iter()
            .map(|d| DealResponse {
                item_id: d.item_id,
                title: d.title,
                url: d.url,
                price: round2(d.price),
                shipping_cost: round2(d.shipping_cost),
                condition: d.condition,
                discount_amount: round2(d.discount_amount),
                discount_percent: round2(d.discount_percent),
                deal_score: round2(d.deal_score),
            })
            .collect(),
    }))
}

async fn search_listings(
    State(state): State<ApiState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>> {
    let client = require_client(&state)?;
    let keywords = query.keywords.clone();
    let items: Vec<ListingRecord> = client
        .search(&query)
        .await?
        .into_iter()
        .map(|mut l| {
            l.price = round2(l.price);
            l.shipping_cost = round2(l.shipping_cost);
            l
        })
        .collect();

    Ok(Json(SearchResponse {
        status: "success",
        keywords,
        results_count: items.len(),
        items,
    }))
}

async fn listing_details(
    State(state): State<ApiState>,
    Path(item_id): Path<String>,
) -> Result<Json<DetailsResponse>> {
    let client = require_client(&state)?;
    let mut item = client.item_details(&item_id).await?;
    item.price = round2(item.price);
    item.shipping_cost = round2(item.shipping_cost);
    item.converted_price = item.converted_price.map(round2);

    Ok(Json(DetailsResponse {
        status: "success",
        item,
    }))
}

fn require_client(state: &ApiState) -> Result<&Arc<ListingClient>> {
    state.listings.as_ref().ok_or_else(|| {
        AppError::UpstreamUnavailable(
            "eBay credentials not configured (set EBAY_APP_ID)".to_string(),
        )
    })
}

/// First 10 characters of the ISO-8601 rendition: the date only.
fn date_only(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
