use crate::config::deal_weights::{PRICE_SCORE_CAP, PRICE_SCORE_DIVISOR, FREE_SHIPPING_BONUS};
use crate::error::{AppError, Result};
use crate::stats;
use crate::types::{ConditionGrade, Deal, DealReport, ListingRecord, MarketStats};

/// Statistics over the sold-listing price sample. Non-positive prices are
/// discarded; returns None when nothing usable remains.
pub fn compute_market_stats(sold_prices: &[f64]) -> Option<MarketStats> {
    let prices: Vec<f64> = sold_prices.iter().copied().filter(|p| *p > 0.0).collect();
    if prices.is_empty() {
        return None;
    }
    Some(MarketStats {
        sample_size: prices.len(),
        average: stats::mean(&prices),
        median: stats::median_upper(&prices),
        min: prices.iter().cloned().fold(f64::INFINITY, f64::min),
        max: prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
    })
}

/// Rank active listings against the sold-listing market sample.
///
/// A listing qualifies when its price is positive and at or below
/// `average * (1 - discount_threshold_pct / 100)`. Each qualifying listing
/// gets a 0-10 composite score from discount magnitude (capped), condition
/// grade, and free shipping. Equal scores keep their input order; the
/// returned list is truncated to `limit` while `total_qualifying` counts
/// everything that qualified.
pub fn score_deals(
    sold_prices: &[f64],
    listings: &[ListingRecord],
    discount_threshold_pct: f64,
    limit: usize,
) -> Result<DealReport> {
    let market = compute_market_stats(sold_prices).ok_or_else(|| {
        AppError::InsufficientData(
            "no sold listings with usable prices for this query".to_string(),
        )
    })?;

    if listings.is_empty() {
        return Err(AppError::NoActiveListings(
            "active-listing search returned no results".to_string(),
        ));
    }

    let threshold_price = market.average * (1.0 - discount_threshold_pct / 100.0);

    let mut deals: Vec<Deal> = listings
        .iter()
        .filter(|l| l.price > 0.0 && l.price <= threshold_price)
        .map(|l| {
            let discount_amount = market.average - l.price;
            let discount_percent = discount_amount / market.average * 100.0;
            let price_score = (discount_percent / PRICE_SCORE_DIVISOR).min(PRICE_SCORE_CAP);
            let condition_score = ConditionGrade::parse(&l.condition).score();
            let shipping_score = if l.shipping_cost == 0.0 { FREE_SHIPPING_BONUS } else { 0.0 };
            Deal {
                item_id: l.item_id.clone(),
                title: l.title.clone(),
                url: l.url.clone(),
                price: l.price,
                shipping_cost: l.shipping_cost,
                condition: l.condition.clone(),
                discount_amount,
                discount_percent,
                deal_score: price_score + condition_score + shipping_score,
            }
        })
        .collect();

    let total_qualifying = deals.len();

    // sort_by is stable: ties keep input order.
    deals.sort_by(|a, b| {
        b.deal_score
            .partial_cmp(&a.deal_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    deals.truncate(limit);

    Ok(DealReport { market, total_qualifying, deals })
}
