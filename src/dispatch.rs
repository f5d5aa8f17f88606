//! Update cycle orchestration
//!
//! One cycle fans out cached fetches for every watched symbol, builds the
//! notification batch, and hands it to the transport. Per-symbol outcomes
//! are independent: a failed symbol becomes an unavailable marker, never a
//! failed cycle.

use crate::cache::QuoteCache;
use crate::clock::Clock;
use crate::config::WatchlistConfig;
use crate::error::FetchError;
use crate::provider::{DataProvider, Quote};
use crate::session::{classify, extended_session, Session};
use crate::transport::{
    BatchEntry, ExtendedPrice, FiftyTwoWeekContext, SymbolUpdate, Transport, UpdateBatch,
};
use chrono_tz::Tz;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bound on each upstream fetch. A slow symbol times out on its own instead
/// of stalling the cycle.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-symbol outcomes of one cycle, in watchlist order.
#[derive(Debug)]
pub struct CycleResult {
    pub results: Vec<(String, Result<Quote, FetchError>)>,
}

impl CycleResult {
    pub fn get(&self, symbol: &str) -> Option<&Result<Quote, FetchError>> {
        self.results
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, r)| r)
    }
}

pub struct UpdateDispatcher {
    cache: Arc<QuoteCache>,
    provider: Arc<dyn DataProvider>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    fetch_timeout: Duration,
}

impl UpdateDispatcher {
    pub fn new(
        cache: Arc<QuoteCache>,
        provider: Arc<dyn DataProvider>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        timezone: Tz,
    ) -> Self {
        Self {
            cache,
            provider,
            transport,
            clock,
            timezone,
            fetch_timeout: FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Fetch every symbol concurrently through the cache.
    pub async fn run_cycle(&self, symbols: &[String]) -> CycleResult {
        info!(symbols = symbols.len(), "Running update cycle");

        let fetches = symbols.iter().map(|symbol| async move {
            (symbol.clone(), self.fetch_one(symbol).await)
        });

        CycleResult {
            results: join_all(fetches).await,
        }
    }

    /// One scheduled pass: fetch, build the batch, post it to the configured
    /// channel. With no channel the batch is computed but not delivered.
    /// Delivery failures are logged and do not affect cache or schedule.
    pub async fn run_scheduled_cycle(&self, config: &WatchlistConfig) -> CycleResult {
        let result = self.run_cycle(&config.symbols).await;
        let batch = self.build_batch(&result);

        match &config.channel {
            Some(channel) if !batch.is_empty() => {
                if let Err(e) = self.transport.post(channel, &batch).await {
                    warn!(error = %e, "Batch delivery failed");
                }
            }
            Some(_) => debug!("Empty batch, nothing to post"),
            None => debug!("No channel configured, delivery suppressed"),
        }

        result
    }

    /// Build the delivery batch for a cycle's outcomes. Failed symbols get
    /// explicit unavailable markers.
    pub fn build_batch(&self, result: &CycleResult) -> UpdateBatch {
        let now = self.clock.now_utc();
        let session = classify(now, self.timezone).session;
        let extended = extended_session(now, self.timezone);

        let entries = result
            .results
            .iter()
            .map(|(symbol, outcome)| match outcome {
                Ok(quote) => BatchEntry::Update(build_update(quote, extended)),
                Err(err) => BatchEntry::Unavailable {
                    symbol: symbol.clone(),
                    reason: err.to_string(),
                },
            })
            .collect();

        UpdateBatch {
            generated_at: now,
            session,
            entries,
        }
    }

    async fn fetch_one(&self, symbol: &str) -> Result<Quote, FetchError> {
        let provider = Arc::clone(&self.provider);
        let bound = self.fetch_timeout;

        self.cache
            .get_or_fetch(symbol, move |sym| async move {
                match tokio::time::timeout(bound, provider.fetch(&sym)).await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout {
                        symbol: sym,
                        timeout: bound,
                    }),
                }
            })
            .await
    }
}

/// Build one symbol's notification payload. `extended` names the
/// sub-session whose extended-hours price applies, or None during regular
/// hours.
fn build_update(quote: &Quote, extended: Option<Session>) -> SymbolUpdate {
    let extended = extended.and_then(|session| {
        match session {
            Session::Pre => quote.pre_market_price,
            Session::Post => quote.post_market_price,
            Session::Regular | Session::Closed => None,
        }
        .map(|price| ExtendedPrice { session, price })
    });

    SymbolUpdate {
        symbol: quote.symbol.clone(),
        price: quote.last_price,
        change: quote.change(),
        change_percent: quote.change_percent(),
        extended,
        fifty_two_week: FiftyTwoWeekContext::classify(
            quote.last_price,
            quote.year_high,
            quote.year_low,
        ),
    }
}
