/// Database row types for the two persisted tables. Timestamps are stored as
/// Unix seconds. Used by sqlx `query_as` queries.
use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TrackedItemRow {
    pub item_id: String,
    pub title: String,
    pub category: Option<String>,
    pub url: Option<String>,
    pub first_seen_price: f64,
    pub first_seen_date: i64,
    pub alert_threshold: Option<f64>,
    pub alert_percentage: Option<f64>,
    pub check_frequency: String,
    pub notes: Option<String>,
    pub active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PricePointRow {
    pub id: i64,
    pub item_id: String,
    pub price: f64,
    pub shipping_cost: f64,
    pub currency: String,
    pub condition: Option<String>,
    pub timestamp: i64,
}
