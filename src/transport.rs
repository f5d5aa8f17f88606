//! Notification payloads and the delivery interface
//!
//! Payloads are structured, not rendered: the embedding transport decides
//! how an update is presented, so the core stays presentation-agnostic.

use crate::config::ChannelRef;
use crate::error::DeliveryError;
use crate::session::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Proximity threshold for the 52-week classification, in percent.
const NEAR_52W_THRESHOLD: f64 = 2.0;

/// Position of the current price within its 52-week range.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FiftyTwoWeekContext {
    NearHigh,
    NearLow,
    PctOffHigh { percent: f64 },
}

impl FiftyTwoWeekContext {
    /// Classify `price` against its 52-week bounds. None when the bounds are
    /// missing or unusable.
    pub fn classify(price: f64, year_high: Option<f64>, year_low: Option<f64>) -> Option<Self> {
        let high = year_high?;
        let low = year_low?;
        if high <= 0.0 {
            return None;
        }

        let off_high = (high - price) / high * 100.0;
        let off_low = if low > 0.0 {
            (price - low) / low * 100.0
        } else {
            f64::INFINITY
        };

        if off_high < NEAR_52W_THRESHOLD {
            Some(FiftyTwoWeekContext::NearHigh)
        } else if off_low < NEAR_52W_THRESHOLD {
            Some(FiftyTwoWeekContext::NearLow)
        } else {
            Some(FiftyTwoWeekContext::PctOffHigh { percent: off_high })
        }
    }
}

/// Extended-hours price, tagged with the sub-session it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtendedPrice {
    pub session: Session,
    pub price: f64,
}

/// One symbol's update within a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolUpdate {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    /// Pre/post-market price when the batch was built outside regular hours.
    pub extended: Option<ExtendedPrice>,
    pub fifty_two_week: Option<FiftyTwoWeekContext>,
}

/// Batch entry: a successful update or an explicit unavailable marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchEntry {
    Update(SymbolUpdate),
    Unavailable { symbol: String, reason: String },
}

impl BatchEntry {
    pub fn symbol(&self) -> &str {
        match self {
            BatchEntry::Update(update) => &update.symbol,
            BatchEntry::Unavailable { symbol, .. } => symbol,
        }
    }
}

/// One full watchlist pass, ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateBatch {
    pub generated_at: DateTime<Utc>,
    pub session: Session,
    pub entries: Vec<BatchEntry>,
}

impl UpdateBatch {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outbound delivery, implemented by the embedding chat transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one batch to the given channel.
    async fn post(
        &self,
        channel: &ChannelRef,
        batch: &UpdateBatch,
    ) -> Result<(), DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn near_high_within_two_percent() {
        let ctx = FiftyTwoWeekContext::classify(99.0, Some(100.0), Some(50.0));
        assert_eq!(ctx, Some(FiftyTwoWeekContext::NearHigh));
    }

    #[test]
    fn near_low_within_two_percent() {
        let ctx = FiftyTwoWeekContext::classify(50.5, Some(100.0), Some(50.0));
        assert_eq!(ctx, Some(FiftyTwoWeekContext::NearLow));
    }

    #[test]
    fn otherwise_reports_distance_off_high() {
        match FiftyTwoWeekContext::classify(80.0, Some(100.0), Some(50.0)) {
            Some(FiftyTwoWeekContext::PctOffHigh { percent }) => {
                assert!((percent - 20.0).abs() < 1e-9);
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn missing_or_degenerate_bounds_yield_none() {
        assert_eq!(FiftyTwoWeekContext::classify(80.0, None, Some(50.0)), None);
        assert_eq!(FiftyTwoWeekContext::classify(80.0, Some(100.0), None), None);
        assert_eq!(FiftyTwoWeekContext::classify(80.0, Some(0.0), Some(0.0)), None);
    }

    #[test]
    fn zero_low_does_not_classify_near_low() {
        // A zero 52-week low would make every price "near low".
        match FiftyTwoWeekContext::classify(10.0, Some(100.0), Some(0.0)) {
            Some(FiftyTwoWeekContext::PctOffHigh { .. }) => {}
            other => panic!("unexpected classification: {:?}", other),
        }
    }
}
