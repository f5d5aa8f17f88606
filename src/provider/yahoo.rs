//! Yahoo Finance quote provider

use crate::config::normalize_symbol;
use crate::error::FetchError;
use crate::provider::{DataProvider, Quote};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const BASE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";

/// Per-request timeout. A slow upstream call becomes a `FetchError`, never a
/// stalled cycle.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Yahoo API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    result: Vec<YahooQuote>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooQuote {
    symbol: String,
    regular_market_price: Option<f64>,
    regular_market_previous_close: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
    pre_market_price: Option<f64>,
    post_market_price: Option<f64>,
    market_cap: Option<f64>,
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<f64>,
}

fn convert(symbol: &str, raw: YahooQuote) -> Result<Quote, FetchError> {
    let last_price = raw.regular_market_price.ok_or_else(|| FetchError::Malformed {
        symbol: symbol.to_string(),
        message: "missing regularMarketPrice".to_string(),
    })?;
    let previous_close =
        raw.regular_market_previous_close
            .ok_or_else(|| FetchError::Malformed {
                symbol: symbol.to_string(),
                message: "missing regularMarketPreviousClose".to_string(),
            })?;

    Ok(Quote {
        symbol: normalize_symbol(&raw.symbol),
        last_price,
        previous_close,
        day_high: raw.regular_market_day_high,
        day_low: raw.regular_market_day_low,
        year_high: raw.fifty_two_week_high,
        year_low: raw.fifty_two_week_low,
        pre_market_price: raw.pre_market_price,
        post_market_price: raw.post_market_price,
        market_cap: raw.market_cap,
        pe_ratio: raw.trailing_pe,
        timestamp: Utc::now(),
    })
}

/// Quote provider backed by the Yahoo Finance v7 quote endpoint.
pub struct YahooProvider {
    client: Client,
}

impl YahooProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn map_request_error(symbol: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                symbol: symbol.to_string(),
                timeout: REQUEST_TIMEOUT,
            }
        } else {
            FetchError::Upstream {
                symbol: symbol.to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataProvider for YahooProvider {
    async fn fetch(&self, symbol: &str) -> Result<Quote, FetchError> {
        let symbol = normalize_symbol(symbol);
        debug!(%symbol, "Fetching quote");

        let response = self
            .client
            .get(BASE_URL)
            .query(&[("symbols", symbol.as_str())])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| Self::map_request_error(&symbol, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Upstream {
                symbol,
                message: format!("HTTP {}", status),
            });
        }

        let envelope: QuoteEnvelope =
            response.json().await.map_err(|e| FetchError::Malformed {
                symbol: symbol.clone(),
                message: e.to_string(),
            })?;

        if let Some(error) = envelope.quote_response.error {
            return Err(FetchError::Upstream {
                symbol,
                message: error.to_string(),
            });
        }

        let raw = envelope
            .quote_response
            .result
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::Upstream {
                symbol: symbol.clone(),
                message: "no quote data returned".to_string(),
            })?;

        convert(&symbol, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "quoteResponse": {
            "result": [{
                "symbol": "aapl",
                "regularMarketPrice": 189.25,
                "regularMarketPreviousClose": 187.0,
                "regularMarketDayHigh": 190.1,
                "regularMarketDayLow": 186.5,
                "fiftyTwoWeekHigh": 199.62,
                "fiftyTwoWeekLow": 140.1,
                "postMarketPrice": 189.6,
                "marketCap": 2950000000000.0,
                "trailingPE": 29.4
            }],
            "error": null
        }
    }"#;

    #[test]
    fn parses_and_converts_quote_response() {
        let envelope: QuoteEnvelope = serde_json::from_str(FIXTURE).unwrap();
        let raw = envelope.quote_response.result.into_iter().next().unwrap();
        let quote = convert("AAPL", raw).unwrap();

        assert_eq!(quote.symbol, "AAPL");
        assert_eq!(quote.last_price, 189.25);
        assert_eq!(quote.previous_close, 187.0);
        assert_eq!(quote.year_high, Some(199.62));
        assert_eq!(quote.post_market_price, Some(189.6));
        assert_eq!(quote.pre_market_price, None);
        assert!((quote.change() - 2.25).abs() < 1e-9);
    }

    #[test]
    fn missing_price_is_malformed() {
        let raw: YahooQuote =
            serde_json::from_str(r#"{"symbol": "AAPL", "regularMarketPreviousClose": 187.0}"#)
                .unwrap();
        let err = convert("AAPL", raw).unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }

    #[test]
    fn empty_result_list_deserializes() {
        let envelope: QuoteEnvelope =
            serde_json::from_str(r#"{"quoteResponse": {"result": [], "error": null}}"#).unwrap();
        assert!(envelope.quote_response.result.is_empty());
    }
}
