//! Shared price-series statistics used by the history queries and the deal
//! scorer.

use crate::config::trend_thresholds;
use crate::types::PriceTrend;

pub fn mean(prices: &[f64]) -> f64 {
    if prices.is_empty() {
        return 0.0;
    }
    prices.iter().sum::<f64>() / prices.len() as f64
}

/// Median by floor-index selection: the element at index `n / 2` of the
/// ascending-sorted sequence. For even n this is the upper-middle element,
/// not the mean of the two middle elements.
pub fn median_upper(prices: &[f64]) -> f64 {
    if prices.is_empty() {
        return 0.0;
    }
    let mut sorted = prices.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted[sorted.len() / 2]
}

/// Percent change from `first` to `last`. Returns 0 when `first` is not a
/// usable baseline.
pub fn percent_change(first: f64, last: f64) -> f64 {
    if first <= 0.0 {
        return 0.0;
    }
    (last - first) / first * 100.0
}

/// Classify the trend of a window's price sequence from its first and last
/// points. Returns the trend and the percent change driving it.
pub fn classify_trend(prices: &[f64]) -> (PriceTrend, f64) {
    if prices.len() < 2 {
        return (PriceTrend::Unknown, 0.0);
    }
    let change = percent_change(prices[0], prices[prices.len() - 1]);
    let trend = if change < trend_thresholds::DECREASING_BELOW_PCT {
        PriceTrend::Decreasing
    } else if change > trend_thresholds::INCREASING_ABOVE_PCT {
        PriceTrend::Increasing
    } else {
        PriceTrend::Stable
    };
    (trend, change)
}

/// Round to 2 decimal places. Applied at the response boundary only.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_even_count_takes_upper_middle() {
        assert_eq!(median_upper(&[10.0, 20.0, 30.0, 40.0]), 30.0);
    }

    #[test]
    fn median_odd_count_takes_middle() {
        assert_eq!(median_upper(&[30.0, 10.0, 20.0]), 20.0);
    }

    #[test]
    fn median_single_point() {
        assert_eq!(median_upper(&[42.5]), 42.5);
    }

    #[test]
    fn median_sorts_before_selecting() {
        assert_eq!(median_upper(&[40.0, 10.0, 30.0, 20.0]), 30.0);
    }

    #[test]
    fn trend_decreasing_past_threshold() {
        let (trend, change) = classify_trend(&[100.0, 80.0]);
        assert_eq!(trend, PriceTrend::Decreasing);
        assert!((change + 20.0).abs() < 1e-9);
    }

    #[test]
    fn trend_stable_within_band() {
        let (trend, _) = classify_trend(&[100.0, 103.0]);
        assert_eq!(trend, PriceTrend::Stable);
        // Boundary: exactly +5% / -5% is still stable.
        let (trend, _) = classify_trend(&[100.0, 105.0]);
        assert_eq!(trend, PriceTrend::Stable);
        let (trend, _) = classify_trend(&[100.0, 95.0]);
        assert_eq!(trend, PriceTrend::Stable);
    }

    #[test]
    fn trend_increasing_past_threshold() {
        let (trend, change) = classify_trend(&[100.0, 110.0]);
        assert_eq!(trend, PriceTrend::Increasing);
        assert!((change - 10.0).abs() < 1e-9);
    }

    #[test]
    fn trend_uses_window_endpoints_not_extremes() {
        // Dips in the middle don't matter; only first vs last.
        let (trend, _) = classify_trend(&[100.0, 50.0, 101.0]);
        assert_eq!(trend, PriceTrend::Stable);
    }

    #[test]
    fn trend_single_point_unknown() {
        let (trend, change) = classify_trend(&[99.0]);
        assert_eq!(trend, PriceTrend::Unknown);
        assert_eq!(change, 0.0);
    }

    #[test]
    fn mean_of_window() {
        assert!((mean(&[1.0, 2.0, 6.0]) - 3.0).abs() < 1e-9);
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn rounding_two_decimals() {
        assert_eq!(round2(19.994999), 19.99);
        assert_eq!(round2(19.995001), 20.0);
    }
}
