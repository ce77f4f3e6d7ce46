use crate::error::{AppError, Result};

pub const FINDING_API_URL: &str = "https://svcs.ebay.com/services/search/FindingService/v1";
pub const SHOPPING_API_URL: &str = "https://open.api.ebay.com/shopping";

/// Currency assumed for all price filters and stored observations.
pub const DEFAULT_CURRENCY: &str = "USD";

/// HTTP timeout for eBay API calls (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Sold-listing lookback window for market-value analysis (days).
pub const SOLD_LOOKBACK_DAYS: u32 = 90;

/// Cap on the sold-listing sample used as the market reference.
pub const SOLD_SAMPLE_LIMIT: usize = 100;

/// Cap on active listings fetched per deal search.
pub const ACTIVE_SEARCH_LIMIT: usize = 50;

/// Minimum discount from the market average for a listing to qualify (percent).
pub const DEFAULT_DISCOUNT_THRESHOLD_PCT: f64 = 15.0;

/// Default number of ranked deals returned.
pub const DEFAULT_DEAL_LIMIT: usize = 10;

/// Default price-history window (days).
pub const DEFAULT_HISTORY_DAYS: i64 = 30;

/// Percent-change bands for trend classification over a history window.
pub mod trend_thresholds {
    pub const DECREASING_BELOW_PCT: f64 = -5.0;
    pub const INCREASING_ABOVE_PCT: f64 = 5.0;
}

/// Deal-score components. Total score range is 0-10.
pub mod deal_weights {
    /// discount_percent / PRICE_SCORE_DIVISOR, capped at PRICE_SCORE_CAP.
    pub const PRICE_SCORE_DIVISOR: f64 = 10.0;
    pub const PRICE_SCORE_CAP: f64 = 5.0;
    pub const CONDITION_NEW: f64 = 3.0;
    pub const CONDITION_REFURBISHED: f64 = 2.0;
    pub const CONDITION_USED: f64 = 1.0;
    pub const FREE_SHIPPING_BONUS: f64 = 2.0;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub finding_api_url: String,
    pub shopping_api_url: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// eBay application id (EBAY_APP_ID). Remote search, item details and
    /// deal finding are disabled when absent; local tracking still works.
    pub app_id: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            finding_api_url: std::env::var("FINDING_API_URL")
                .unwrap_or_else(|_| FINDING_API_URL.to_string()),
            shopping_api_url: std::env::var("SHOPPING_API_URL")
                .unwrap_or_else(|_| SHOPPING_API_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "ebay_tracking.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            app_id: std::env::var("EBAY_APP_ID").ok().filter(|s| !s.is_empty()),
        })
    }
}
