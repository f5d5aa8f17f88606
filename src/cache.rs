//! Short-TTL quote cache with per-key single-flight
//!
//! Sits in front of the data provider. Fresh entries are served without an
//! upstream call; concurrent misses for the same symbol collapse onto one
//! in-flight fetch whose result (or error) is shared by every waiter.
//! Failures are never cached and never evict a previously stored value.
//! Eviction is lazy: a stale entry is simply invisible, nothing sweeps it.

use crate::config::normalize_symbol;
use crate::error::FetchError;
use crate::provider::Quote;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

/// Freshness window, uniform across all symbols.
pub const CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CacheEntry {
    quote: Quote,
    fetched_at: Instant,
}

/// One in-flight fetch per key, created on demand and discarded after it
/// resolves. Every concurrent caller awaits the same cell.
type FlightCell = Arc<OnceCell<Result<Quote, FetchError>>>;

pub struct QuoteCache {
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
    flights: DashMap<String, FlightCell>,
}

impl QuoteCache {
    pub fn new() -> Self {
        Self {
            ttl: CACHE_TTL,
            entries: DashMap::new(),
            flights: DashMap::new(),
        }
    }

    /// Return the cached quote, or run `fetch` and cache its result.
    ///
    /// Concurrent callers for the same symbol share one underlying fetch:
    /// exactly one `fetch` future runs, and all waiters receive its quote or
    /// its error. A failed fetch propagates without touching the stored
    /// entry, so a stale-but-present value survives transient failures.
    pub async fn get_or_fetch<F, Fut>(&self, symbol: &str, fetch: F) -> Result<Quote, FetchError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Quote, FetchError>> + Send,
    {
        let symbol = normalize_symbol(symbol);

        if let Some(quote) = self.fresh(&symbol) {
            trace!(%symbol, "Cache hit");
            return Ok(quote);
        }

        let cell: FlightCell = self
            .flights
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = cell
            .get_or_init(|| async {
                // Another flight may have refreshed the entry between our
                // miss and joining this cell.
                if let Some(quote) = self.fresh(&symbol) {
                    return Ok(quote);
                }
                debug!(%symbol, "Cache miss, fetching");
                let fetched = fetch(symbol.clone()).await;
                if let Ok(quote) = &fetched {
                    self.entries.insert(
                        symbol.clone(),
                        CacheEntry {
                            quote: quote.clone(),
                            fetched_at: Instant::now(),
                        },
                    );
                }
                fetched
            })
            .await
            .clone();

        // Drop the flight so the next TTL expiry starts a new fetch. Guarded
        // by pointer identity: a newer flight for the same key stays put.
        self.flights
            .remove_if(&symbol, |_, current| Arc::ptr_eq(current, &cell));

        result
    }

    /// Fresh cached quote for `symbol`, if any. Stale entries are misses.
    fn fresh(&self, symbol: &str) -> Option<Quote> {
        self.entries
            .get(symbol)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.quote.clone())
    }
}

impl Default for QuoteCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quote(symbol: &str, price: f64) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            last_price: price,
            previous_close: price - 1.0,
            day_high: None,
            day_low: None,
            year_high: None,
            year_low: None,
            pre_market_price: None,
            post_market_price: None,
            market_cap: None,
            pe_ratio: None,
            timestamp: Utc::now(),
        }
    }

    fn backdate(cache: &QuoteCache, symbol: &str, age: Duration) {
        cache.entries.get_mut(symbol).unwrap().fetched_at = Instant::now() - age;
    }

    #[tokio::test]
    async fn fresh_entry_skips_fetch() {
        let cache = QuoteCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let got = cache
                .get_or_fetch("aapl", |sym| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(quote(&sym, 100.0)) }
                })
                .await
                .unwrap();
            assert_eq!(got.symbol, "AAPL");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_fetch() {
        let cache = Arc::new(QuoteCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks = (0..10).map(|_| {
            let cache = cache.clone();
            let calls = calls.clone();
            async move {
                cache
                    .get_or_fetch("MSFT", move |sym| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(quote(&sym, 410.0))
                    })
                    .await
            }
        });

        let results = join_all(tasks).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap().last_price, 410.0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_error() {
        let cache = Arc::new(QuoteCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks = (0..5).map(|_| {
            let cache = cache.clone();
            let calls = calls.clone();
            async move {
                cache
                    .get_or_fetch("TSLA", move |sym| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err(FetchError::Upstream {
                            symbol: sym,
                            message: "503".to_string(),
                        })
                    })
                    .await
            }
        });

        let results = join_all(tasks).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            let err = result.unwrap_err();
            assert_eq!(
                err,
                FetchError::Upstream {
                    symbol: "TSLA".to_string(),
                    message: "503".to_string()
                }
            );
        }

        // The error was not cached: the next call fetches again.
        let got = cache
            .get_or_fetch("TSLA", |sym| async move { Ok(quote(&sym, 250.0)) })
            .await
            .unwrap();
        assert_eq!(got.last_price, 250.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_value() {
        let cache = QuoteCache::new();

        cache
            .get_or_fetch("NVDA", |sym| async move { Ok(quote(&sym, 120.0)) })
            .await
            .unwrap();

        // Age the entry past the TTL so the failing fetch actually runs.
        backdate(&cache, "NVDA", Duration::from_secs(61));

        let err = cache
            .get_or_fetch("NVDA", |sym| async move {
                Err(FetchError::Timeout {
                    symbol: sym,
                    timeout: Duration::from_secs(5),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));

        // The old entry survived the failure.
        assert_eq!(cache.entries.get("NVDA").unwrap().quote.last_price, 120.0);

        // Once fresh again it is served without a fetch.
        backdate(&cache, "NVDA", Duration::from_secs(0));
        let got = cache
            .get_or_fetch("NVDA", |_| async move {
                panic!("must not fetch a fresh entry")
            })
            .await
            .unwrap();
        assert_eq!(got.last_price, 120.0);
    }

    #[tokio::test]
    async fn stale_entry_triggers_exactly_one_refetch() {
        let cache = QuoteCache::new();
        let calls = AtomicUsize::new(0);

        cache
            .get_or_fetch("AMD", |sym| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(quote(&sym, 150.0)) }
            })
            .await
            .unwrap();

        backdate(&cache, "AMD", Duration::from_secs(61));

        let got = cache
            .get_or_fetch("AMD", |sym| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(quote(&sym, 155.0)) }
            })
            .await
            .unwrap();

        assert_eq!(got.last_price, 155.0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn keys_are_case_normalized() {
        let cache = QuoteCache::new();
        let calls = AtomicUsize::new(0);

        for key in ["spy", "SPY", " Spy "] {
            cache
                .get_or_fetch(key, |sym| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(quote(&sym, 540.0)) }
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
