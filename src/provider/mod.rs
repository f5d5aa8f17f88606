//! Market-data provider interface

pub mod yahoo;

use crate::error::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot quote for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub last_price: f64,
    pub previous_close: f64,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub year_high: Option<f64>,
    pub year_low: Option<f64>,
    /// Pre-market price, when the venue reports one.
    pub pre_market_price: Option<f64>,
    /// After-hours price, when the venue reports one.
    pub post_market_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Change versus the previous close.
    pub fn change(&self) -> f64 {
        self.last_price - self.previous_close
    }

    /// Percent change versus the previous close.
    pub fn change_percent(&self) -> f64 {
        if self.previous_close == 0.0 {
            0.0
        } else {
            self.change() / self.previous_close * 100.0
        }
    }
}

/// Upstream quote source, implemented per venue.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Fetch a fresh quote for one symbol.
    async fn fetch(&self, symbol: &str) -> Result<Quote, FetchError>;
}
