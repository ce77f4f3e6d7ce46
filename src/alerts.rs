//! Alert evaluation for tracked items. Kept separate from the store's write
//! paths: only the explicit alert sweep invokes it, never `track` or the
//! price-observation insert.

use serde::Serialize;

use crate::db::models::TrackedItemRow;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum AlertTrigger {
    /// Current price at or below the configured absolute threshold.
    ThresholdReached { threshold: f64 },
    /// Price dropped from the first-seen baseline by at least the configured
    /// percentage.
    PercentDrop {
        configured_pct: f64,
        actual_pct: f64,
        baseline: f64,
    },
}

/// Evaluate both alert rules for one item against its latest observed price.
/// Rules are independent; both can fire on the same observation.
pub fn evaluate(item: &TrackedItemRow, current_price: f64) -> Vec<AlertTrigger> {
    let mut triggers = Vec::new();

    if let Some(threshold) = item.alert_threshold {
        if current_price <= threshold {
            triggers.push(AlertTrigger::ThresholdReached { threshold });
        }
    }

    if let Some(pct) = item.alert_percentage {
        let baseline = item.first_seen_price;
        if baseline > 0.0 {
            let actual_pct = (baseline - current_price) / baseline * 100.0;
            if actual_pct >= pct {
                triggers.push(AlertTrigger::PercentDrop {
                    configured_pct: pct,
                    actual_pct,
                    baseline,
                });
            }
        }
    }

    triggers
}
