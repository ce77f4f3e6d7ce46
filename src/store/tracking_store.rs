use chrono::Utc;
use sqlx::SqlitePool;

use crate::config::DEFAULT_CURRENCY;
use crate::db::models::{PricePointRow, TrackedItemRow};
use crate::error::{AppError, Result};
use crate::stats;
use crate::types::{
    HistoryStats, PriceHistoryReport, SortBy, TrackRequest, TrackedConfirmation, TrackedSummary,
    UntrackOutcome,
};

const ITEM_COLUMNS: &str = "item_id, title, category, url, first_seen_price, first_seen_date, \
     alert_threshold, alert_percentage, check_frequency, notes, active, created_at";

const POINT_COLUMNS: &str =
    "id, item_id, price, shipping_cost, currency, condition, timestamp";

/// Persisted watchlist and price-history store over SQLite.
///
/// Mutations that span both tables (`track`, hard `untrack`) run inside a
/// single transaction so the watchlist row and its history never diverge.
#[derive(Clone)]
pub struct TrackingStore {
    pool: SqlitePool,
}

impl TrackingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert the watchlist row (full replace, reactivates the item) and
    /// record one price observation at the tracked price. Re-tracking an
    /// existing id replaces its metadata but leaves prior history intact.
    pub async fn track(&self, req: &TrackRequest) -> Result<TrackedConfirmation> {
        let now = now_ts();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tracked_items
                (item_id, title, category, url, first_seen_price, first_seen_date,
                 alert_threshold, alert_percentage, notes, active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
            ON CONFLICT(item_id) DO UPDATE SET
                title = excluded.title,
                category = excluded.category,
                url = excluded.url,
                first_seen_price = excluded.first_seen_price,
                first_seen_date = excluded.first_seen_date,
                alert_threshold = excluded.alert_threshold,
                alert_percentage = excluded.alert_percentage,
                notes = excluded.notes,
                active = 1,
                created_at = excluded.created_at
            "#,
        )
        .bind(&req.item_id)
        .bind(&req.title)
        .bind(&req.category)
        .bind(&req.url)
        .bind(req.price)
        .bind(now)
        .bind(req.alert_threshold)
        .bind(req.alert_percentage)
        .bind(&req.notes)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO price_history (item_id, price, shipping_cost, currency, timestamp)
            VALUES (?, ?, 0, ?, ?)
            "#,
        )
        .bind(&req.item_id)
        .bind(req.price)
        .bind(DEFAULT_CURRENCY)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(TrackedConfirmation {
            item_id: req.item_id.clone(),
            title: req.title.clone(),
            first_price: req.price,
            alert_threshold: req.alert_threshold,
            alert_percentage: req.alert_percentage,
        })
    }

    /// Soft delete (`active = 0`, history kept) or, with `delete_history`,
    /// remove the history rows and the item row in one transaction. An
    /// unknown id is a no-op success in both modes.
    pub async fn untrack(&self, item_id: &str, delete_history: bool) -> Result<UntrackOutcome> {
        if delete_history {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM price_history WHERE item_id = ?")
                .bind(item_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM tracked_items WHERE item_id = ?")
                .bind(item_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        } else {
            sqlx::query("UPDATE tracked_items SET active = 0 WHERE item_id = ?")
                .bind(item_id)
                .execute(&self.pool)
                .await?;
        }

        Ok(UntrackOutcome {
            item_id: item_id.to_string(),
            deleted_history: delete_history,
        })
    }

    /// Append one observation. The item must have been tracked at some point
    /// (active or not); appends to never-tracked ids are rejected.
    pub async fn add_price_point(
        &self,
        item_id: &str,
        price: f64,
        shipping_cost: f64,
        condition: Option<&str>,
    ) -> Result<()> {
        if self.get_item(item_id).await?.is_none() {
            return Err(AppError::NotFound(item_id.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO price_history (item_id, price, shipping_cost, currency, condition, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item_id)
        .bind(price)
        .bind(shipping_cost)
        .bind(DEFAULT_CURRENCY)
        .bind(condition)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Observations within the last `days`, ascending by timestamp, with
    /// window statistics. An empty window on a known item returns a report
    /// with `stats: None`; an unknown item is `NotFound`.
    pub async fn price_history(&self, item_id: &str, days: i64) -> Result<PriceHistoryReport> {
        let item = self
            .get_item(item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(item_id.to_string()))?;

        let cutoff = now_ts() - days * 86_400;
        let points = sqlx::query_as::<_, PricePointRow>(&format!(
            "SELECT {POINT_COLUMNS} FROM price_history \
             WHERE item_id = ? AND timestamp >= ? ORDER BY timestamp ASC"
        ))
        .bind(item_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let stats = compute_window_stats(&points);

        Ok(PriceHistoryReport {
            item_id: item.item_id,
            title: item.title,
            url: item.url,
            points,
            stats,
        })
    }

    /// All tracked items, each annotated with its most recent observed price
    /// (first-seen price when no observation exists).
    pub async fn list_tracked(
        &self,
        active_only: bool,
        sort: SortBy,
    ) -> Result<Vec<TrackedSummary>> {
        let mut sql = format!("SELECT {ITEM_COLUMNS} FROM tracked_items");
        if active_only {
            sql.push_str(" WHERE active = 1");
        }
        match sort {
            // current_price sorts on the stored first-seen price column; the
            // live annotated price below is not part of the query.
            SortBy::CurrentPrice => sql.push_str(" ORDER BY first_seen_price ASC"),
            SortBy::DateAdded => sql.push_str(" ORDER BY created_at DESC"),
        }

        let items = sqlx::query_as::<_, TrackedItemRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        let mut result = Vec::with_capacity(items.len());
        for item in items {
            let latest = self.latest_price(&item.item_id).await?;
            let current_price = latest.map(|p| p.price).unwrap_or(item.first_seen_price);
            result.push(TrackedSummary {
                item_id: item.item_id,
                title: item.title,
                category: item.category,
                url: item.url,
                first_price: item.first_seen_price,
                current_price,
                alert_threshold: item.alert_threshold,
                alert_percentage: item.alert_percentage,
                check_frequency: item.check_frequency,
                notes: item.notes,
                tracking_since: item.created_at,
            });
        }
        Ok(result)
    }

    /// Ids of items due for a price check: currently all active items.
    /// TODO: honor check_frequency once a scheduler consumes this list.
    pub async fn items_needing_check(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT item_id FROM tracked_items WHERE active = 1",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Active items with at least one alert rule configured.
    pub async fn alert_candidates(&self) -> Result<Vec<TrackedItemRow>> {
        let rows = sqlx::query_as::<_, TrackedItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM tracked_items \
             WHERE active = 1 AND (alert_threshold IS NOT NULL OR alert_percentage IS NOT NULL)"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn latest_price(&self, item_id: &str) -> Result<Option<PricePointRow>> {
        let row = sqlx::query_as::<_, PricePointRow>(&format!(
            "SELECT {POINT_COLUMNS} FROM price_history \
             WHERE item_id = ? ORDER BY timestamp DESC LIMIT 1"
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn count_items(&self) -> Result<i64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tracked_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn get_item(&self, item_id: &str) -> Result<Option<TrackedItemRow>> {
        let row = sqlx::query_as::<_, TrackedItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM tracked_items WHERE item_id = ?"
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

fn compute_window_stats(points: &[PricePointRow]) -> Option<HistoryStats> {
    if points.is_empty() {
        return None;
    }
    let prices: Vec<f64> = points.iter().map(|p| p.price).collect();
    let (trend, change) = stats::classify_trend(&prices);
    Some(HistoryStats {
        data_points: prices.len(),
        current_price: prices[prices.len() - 1],
        lowest_price: prices.iter().cloned().fold(f64::INFINITY, f64::min),
        highest_price: prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        average_price: stats::mean(&prices),
        median_price: stats::median_upper(&prices),
        price_trend: trend,
        percent_change: change,
    })
}

fn now_ts() -> i64 {
    Utc::now().timestamp()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PriceTrend;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    async fn mem_store() -> TrackingStore {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        TrackingStore::new(pool)
    }

    fn req(item_id: &str, price: f64) -> TrackRequest {
        TrackRequest {
            item_id: item_id.to_string(),
            title: format!("Item {item_id}"),
            price,
            url: None,
            category: None,
            alert_threshold: None,
            alert_percentage: None,
            notes: None,
        }
    }

    async fn insert_point_at(store: &TrackingStore, item_id: &str, price: f64, ts: i64) {
        sqlx::query(
            "INSERT INTO price_history (item_id, price, shipping_cost, currency, timestamp) \
             VALUES (?, ?, 0, 'USD', ?)",
        )
        .bind(item_id)
        .bind(price)
        .bind(ts)
        .execute(&store.pool)
        .await
        .unwrap();
    }

    async fn backdate_all_points(store: &TrackingStore, item_id: &str, ts: i64) {
        sqlx::query("UPDATE price_history SET timestamp = ? WHERE item_id = ?")
            .bind(ts)
            .bind(item_id)
            .execute(&store.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn track_then_history_returns_single_point() {
        let store = mem_store().await;
        store.track(&req("it1", 499.99)).await.unwrap();

        let report = store.price_history("it1", 1).await.unwrap();
        assert_eq!(report.points.len(), 1);
        assert_eq!(report.points[0].price, 499.99);

        let stats = report.stats.expect("window should have stats");
        assert_eq!(stats.data_points, 1);
        assert_eq!(stats.current_price, 499.99);
        assert_eq!(stats.price_trend, PriceTrend::Unknown);
    }

    #[tokio::test]
    async fn retrack_updates_metadata_but_keeps_history() {
        let store = mem_store().await;
        store.track(&req("it1", 100.0)).await.unwrap();
        store.add_price_point("it1", 90.0, 0.0, None).await.unwrap();

        let mut retrack = req("it1", 80.0);
        retrack.title = "Renamed".to_string();
        store.track(&retrack).await.unwrap();

        // 1 initial + 1 explicit + 1 from re-track
        let report = store.price_history("it1", 30).await.unwrap();
        assert_eq!(report.points.len(), 3);
        assert_eq!(report.title, "Renamed");

        let item = store.get_item("it1").await.unwrap().unwrap();
        assert!(item.active);
        assert_eq!(item.first_seen_price, 80.0);
    }

    #[tokio::test]
    async fn soft_untrack_preserves_history() {
        let store = mem_store().await;
        store.track(&req("it1", 50.0)).await.unwrap();
        store.add_price_point("it1", 45.0, 0.0, None).await.unwrap();

        let outcome = store.untrack("it1", false).await.unwrap();
        assert!(!outcome.deleted_history);

        let report = store.price_history("it1", 30).await.unwrap();
        assert_eq!(report.points.len(), 2);

        assert!(store.list_tracked(true, SortBy::DateAdded).await.unwrap().is_empty());
        assert_eq!(store.list_tracked(false, SortBy::DateAdded).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn hard_untrack_removes_item_and_history() {
        let store = mem_store().await;
        store.track(&req("it1", 50.0)).await.unwrap();

        let outcome = store.untrack("it1", true).await.unwrap();
        assert!(outcome.deleted_history);

        let err = store.price_history("it1", 30).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn hard_untrack_unknown_id_is_noop_success() {
        let store = mem_store().await;
        assert!(store.untrack("ghost", true).await.is_ok());
        assert!(store.untrack("ghost", false).await.is_ok());
    }

    #[tokio::test]
    async fn add_price_point_requires_tracked_item() {
        let store = mem_store().await;
        let err = store.add_price_point("ghost", 10.0, 0.0, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn add_price_point_allowed_on_inactive_item() {
        let store = mem_store().await;
        store.track(&req("it1", 50.0)).await.unwrap();
        store.untrack("it1", false).await.unwrap();

        store.add_price_point("it1", 42.0, 3.5, Some("Used")).await.unwrap();
        let report = store.price_history("it1", 30).await.unwrap();
        assert_eq!(report.points.len(), 2);
        assert_eq!(report.points[1].condition.as_deref(), Some("Used"));
    }

    #[tokio::test]
    async fn history_window_excludes_old_points() {
        let store = mem_store().await;
        store.track(&req("it1", 100.0)).await.unwrap();
        backdate_all_points(&store, "it1", now_ts() - 40 * 86_400).await;
        store.add_price_point("it1", 75.0, 0.0, None).await.unwrap();

        let report = store.price_history("it1", 30).await.unwrap();
        let stats = report.stats.unwrap();
        assert_eq!(stats.data_points, 1);
        assert_eq!(stats.current_price, 75.0);
    }

    #[tokio::test]
    async fn empty_window_is_distinct_from_not_found() {
        let store = mem_store().await;
        store.track(&req("it1", 100.0)).await.unwrap();
        backdate_all_points(&store, "it1", now_ts() - 40 * 86_400).await;

        let report = store.price_history("it1", 7).await.unwrap();
        assert!(report.points.is_empty());
        assert!(report.stats.is_none());
        assert_eq!(report.title, "Item it1");
    }

    #[tokio::test]
    async fn window_stats_median_and_trend() {
        let store = mem_store().await;
        store.track(&req("it1", 10.0)).await.unwrap();
        let base = now_ts() - 3_600;
        backdate_all_points(&store, "it1", base).await;
        insert_point_at(&store, "it1", 20.0, base + 60).await;
        insert_point_at(&store, "it1", 30.0, base + 120).await;
        insert_point_at(&store, "it1", 40.0, base + 180).await;

        let stats = store.price_history("it1", 1).await.unwrap().stats.unwrap();
        assert_eq!(stats.data_points, 4);
        assert_eq!(stats.current_price, 40.0);
        assert_eq!(stats.lowest_price, 10.0);
        assert_eq!(stats.highest_price, 40.0);
        assert!((stats.average_price - 25.0).abs() < 1e-9);
        // Floor-index median of even-length window: upper middle, not 25.
        assert_eq!(stats.median_price, 30.0);
        assert_eq!(stats.price_trend, PriceTrend::Increasing);
        assert!((stats.percent_change - 300.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn current_price_sort_orders_by_first_seen_price() {
        let store = mem_store().await;
        store.track(&req("expensive", 100.0)).await.unwrap();
        store.track(&req("cheap", 50.0)).await.unwrap();
        // Live price of "expensive" drops below "cheap"; the sort must not care.
        store.add_price_point("expensive", 10.0, 0.0, None).await.unwrap();

        let items = store.list_tracked(true, SortBy::CurrentPrice).await.unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["cheap", "expensive"]);

        let expensive = items.iter().find(|i| i.item_id == "expensive").unwrap();
        assert_eq!(expensive.current_price, 10.0);
        assert_eq!(expensive.first_price, 100.0);
    }

    #[tokio::test]
    async fn date_added_sort_is_newest_first() {
        let store = mem_store().await;
        store.track(&req("older", 10.0)).await.unwrap();
        store.track(&req("newer", 20.0)).await.unwrap();
        sqlx::query("UPDATE tracked_items SET created_at = ? WHERE item_id = 'older'")
            .bind(now_ts() - 86_400)
            .execute(&store.pool)
            .await
            .unwrap();

        let items = store.list_tracked(true, SortBy::DateAdded).await.unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["newer", "older"]);
    }

    #[tokio::test]
    async fn items_needing_check_returns_all_active_ids() {
        let store = mem_store().await;
        store.track(&req("a", 1.0)).await.unwrap();
        store.track(&req("b", 2.0)).await.unwrap();
        store.track(&req("c", 3.0)).await.unwrap();
        store.untrack("b", false).await.unwrap();

        let mut ids = store.items_needing_check().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn alert_candidates_require_active_and_configured_rule() {
        let store = mem_store().await;
        let mut with_alert = req("alerted", 100.0);
        with_alert.alert_threshold = Some(80.0);
        store.track(&with_alert).await.unwrap();
        store.track(&req("plain", 50.0)).await.unwrap();

        let mut inactive = req("inactive", 60.0);
        inactive.alert_percentage = Some(10.0);
        store.track(&inactive).await.unwrap();
        store.untrack("inactive", false).await.unwrap();

        let candidates = store.alert_candidates().await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].item_id, "alerted");
    }
}
