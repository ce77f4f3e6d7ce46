use serde::{Deserialize, Serialize};

use crate::db::models::PricePointRow;

// ---------------------------------------------------------------------------
// Listing records (normalized from eBay API responses)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingRecord {
    pub item_id: String,
    pub title: String,
    pub url: String,
    pub price: f64,
    pub currency: String,
    pub condition: String,
    pub location: String,
    pub shipping_cost: f64,
    pub shipping_type: String,
    pub image_url: Option<String>,
    pub listing_type: String,
    pub time_left: String,
    pub end_time: Option<String>,
    pub watch_count: Option<u64>,
}

/// One completed sale, used only as market-sample input to the deal scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoldListing {
    pub item_id: String,
    pub title: String,
    pub price: f64,
    pub condition: String,
    pub sold_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellerInfo {
    pub username: String,
    pub feedback_score: i64,
    pub positive_feedback_percent: f64,
    pub top_rated: bool,
}

/// Richer single-item record from the Shopping API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDetails {
    pub item_id: String,
    pub title: String,
    pub description: String,
    pub condition: String,
    pub condition_id: Option<String>,
    pub price: f64,
    pub currency: String,
    pub converted_price: Option<f64>,
    pub location: String,
    pub country: String,
    pub shipping_cost: f64,
    pub shipping_type: String,
    pub handling_time: Option<i64>,
    pub seller: SellerInfo,
    pub listing_type: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub time_left: String,
    pub view_count: Option<u64>,
    pub view_url: String,
    pub image_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Condition grading
// ---------------------------------------------------------------------------

/// Item condition bucket used by the deal scorer. Parsed from the display
/// name's text before any " - " qualifier ("New - Open Box" grades as New).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionGrade {
    New,
    Refurbished,
    Used,
    Unknown,
}

impl ConditionGrade {
    pub fn parse(raw: &str) -> Self {
        let base = raw.split(" - ").next().unwrap_or(raw).trim();
        match base {
            "New" => ConditionGrade::New,
            "Refurbished" => ConditionGrade::Refurbished,
            "Used" => ConditionGrade::Used,
            _ => ConditionGrade::Unknown,
        }
    }

    pub fn score(self) -> f64 {
        use crate::config::deal_weights::*;
        match self {
            ConditionGrade::New => CONDITION_NEW,
            ConditionGrade::Refurbished => CONDITION_REFURBISHED,
            ConditionGrade::Used => CONDITION_USED,
            ConditionGrade::Unknown => 0.0,
        }
    }
}

impl std::fmt::Display for ConditionGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConditionGrade::New => "new",
            ConditionGrade::Refurbished => "refurbished",
            ConditionGrade::Used => "used",
            ConditionGrade::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Price trend classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceTrend {
    Increasing,
    Decreasing,
    Stable,
    /// Fewer than two observations in the window.
    Unknown,
}

impl std::fmt::Display for PriceTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PriceTrend::Increasing => "increasing",
            PriceTrend::Decreasing => "decreasing",
            PriceTrend::Stable => "stable",
            PriceTrend::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Store operation inputs/outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TrackRequest {
    pub item_id: String,
    pub title: String,
    pub price: f64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub alert_threshold: Option<f64>,
    #[serde(default)]
    pub alert_percentage: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackedConfirmation {
    pub item_id: String,
    pub title: String,
    pub first_price: f64,
    pub alert_threshold: Option<f64>,
    pub alert_percentage: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UntrackOutcome {
    pub item_id: String,
    /// True when the item row and all its history were hard-deleted.
    pub deleted_history: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    DateAdded,
    CurrentPrice,
}

/// One watchlist entry annotated with its latest observed price.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedSummary {
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
    /// Unix seconds; rendered date-only at the API boundary.
    pub tracking_since: i64,
}

/// Window statistics over a price-history query. All values full precision;
/// rounding happens at the API boundary.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryStats {
    pub data_points: usize,
    pub current_price: f64,
    pub lowest_price: f64,
    pub highest_price: f64,
    pub average_price: f64,
    pub median_price: f64,
    pub price_trend: PriceTrend,
    pub percent_change: f64,
}

/// Result of a price-history query. `stats` is None when the item exists but
/// has no observations inside the requested window.
#[derive(Debug)]
pub struct PriceHistoryReport {
    pub item_id: String,
    pub title: String,
    pub url: Option<String>,
    pub points: Vec<PricePointRow>,
    pub stats: Option<HistoryStats>,
}

// ---------------------------------------------------------------------------
// Deal scoring
// ---------------------------------------------------------------------------

/// Statistics over the sold-listing market sample.
#[derive(Debug, Clone, Serialize)]
pub struct MarketStats {
    pub sample_size: usize,
    pub average: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

/// One ranked deal candidate: source listing fields plus computed scores.
#[derive(Debug, Clone, Serialize)]
pub struct Deal {
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

#[derive(Debug, Clone, Serialize)]
pub struct DealReport {
    pub market: MarketStats,
    /// Count of qualifying listings before truncation to the caller's limit.
    pub total_qualifying: usize,
    pub deals: Vec<Deal>,
}
