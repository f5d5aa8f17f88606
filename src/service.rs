//! Notifier service
//!
//! Composition root: wires the cache, dispatcher and scheduler onto the
//! collaborator interfaces (data provider, transport, config store) and
//! exposes the command-level operations the embedding application maps its
//! chat commands onto.

use crate::cache::QuoteCache;
use crate::clock::{Clock, SystemClock};
use crate::config::{normalize_symbol, ChannelRef, ConfigHandle, ConfigStore, UpdateInterval};
use crate::dispatch::UpdateDispatcher;
use crate::error::{NotifierError, Result};
use crate::provider::{DataProvider, Quote};
use crate::scheduler::{Scheduler, SchedulerHandle, SchedulerPhase};
use crate::session::{resolve_timezone, DEFAULT_TIMEZONE};
use crate::transport::{BatchEntry, SymbolUpdate, Transport, UpdateBatch};
use chrono_tz::Tz;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Service-level settings consumed at startup.
#[derive(Debug, Clone)]
pub struct NotifierSettings {
    /// Reference timezone for the trading calendar.
    pub timezone: String,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

pub struct NotifierService {
    config: Arc<ConfigHandle>,
    dispatcher: Arc<UpdateDispatcher>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl NotifierService {
    /// Build the service against the real wall clock.
    pub async fn new(
        provider: Arc<dyn DataProvider>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn ConfigStore>,
        settings: NotifierSettings,
    ) -> Result<Self> {
        Self::with_clock(provider, transport, store, settings, Arc::new(SystemClock)).await
    }

    /// Build the service with an explicit clock.
    pub async fn with_clock(
        provider: Arc<dyn DataProvider>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn ConfigStore>,
        settings: NotifierSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let timezone = match resolve_timezone(&settings.timezone) {
            Ok(tz) => tz,
            Err(e) => {
                warn!(error = %e, fallback = DEFAULT_TIMEZONE, "Falling back to default timezone");
                resolve_timezone(DEFAULT_TIMEZONE)?
            }
        };

        let config = Arc::new(ConfigHandle::load(store).await?);
        let cache = Arc::new(QuoteCache::new());
        let dispatcher = Arc::new(UpdateDispatcher::new(
            cache,
            provider,
            transport,
            Arc::clone(&clock),
            timezone,
        ));

        Ok(Self {
            config,
            dispatcher,
            clock,
            timezone,
            scheduler: Mutex::new(None),
        })
    }

    /// Reference timezone in effect.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Start the scheduled update loop. No-op when already running.
    pub fn start(&self) {
        let mut slot = self.scheduler.lock();
        if slot.is_some() {
            warn!("Scheduler already running");
            return;
        }
        let scheduler = Scheduler::new(
            Arc::clone(&self.config),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.clock),
            self.timezone,
        );
        *slot = Some(scheduler.start());
        info!("Notifier service started");
    }

    /// Stop the scheduler, letting an in-flight cycle finish.
    pub async fn shutdown(&self) {
        let handle = self.scheduler.lock().take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler
            .lock()
            .as_ref()
            .map(|h| h.phase() != SchedulerPhase::Stopped)
            .unwrap_or(false)
    }

    pub fn schedule_phase(&self) -> Option<SchedulerPhase> {
        self.scheduler.lock().as_ref().map(|h| h.phase())
    }

    // ========================================================================
    // Command-level operations
    // ========================================================================

    /// Add a symbol to the watchlist, validating it with a live fetch first.
    /// Returns the fetched quote so the invoker can echo the current price.
    pub async fn add_symbol(&self, symbol: &str) -> Result<Quote> {
        let symbol = normalize_symbol(symbol);
        if self.config.symbols().contains(&symbol) {
            return Err(NotifierError::Config(format!(
                "{} is already on the watchlist",
                symbol
            )));
        }
        let quote = self.fetch_quote(&symbol).await?;
        self.config.add_symbol(&symbol).await?;
        Ok(quote)
    }

    pub async fn remove_symbol(&self, symbol: &str) -> Result<()> {
        self.config.remove_symbol(symbol).await
    }

    pub fn symbols(&self) -> Vec<String> {
        self.config.symbols()
    }

    pub fn interval(&self) -> UpdateInterval {
        self.config.interval()
    }

    pub fn channel(&self) -> Option<ChannelRef> {
        self.config.channel()
    }

    /// Change the schedule interval. Takes effect on the next tick.
    pub async fn set_interval(&self, interval: UpdateInterval) {
        self.config.set_interval(interval).await;
    }

    /// Change the schedule interval from a user-facing preset string.
    pub async fn set_interval_preset(&self, preset: &str) -> Result<UpdateInterval> {
        let interval = UpdateInterval::from_preset(preset)?;
        self.config.set_interval(interval).await;
        Ok(interval)
    }

    /// Point scheduled posts at a channel. Effective for the next post.
    pub async fn set_channel(&self, channel: ChannelRef) {
        self.config.set_channel(Some(channel)).await;
    }

    /// Clear the destination channel: cycles keep fetching, delivery stops.
    pub async fn clear_channel(&self) {
        self.config.set_channel(None).await;
    }

    /// Ad-hoc single-symbol check through the same cached fetch path as the
    /// schedule. Failures are reported to the invoker directly.
    pub async fn check(&self, symbol: &str) -> Result<SymbolUpdate> {
        let symbol = normalize_symbol(symbol);
        let symbols = [symbol];
        let result = self.dispatcher.run_cycle(&symbols).await;
        let batch = self.dispatcher.build_batch(&result);

        let (_, outcome) = result
            .results
            .into_iter()
            .next()
            .ok_or_else(|| NotifierError::Internal("empty cycle result".to_string()))?;
        outcome?;

        match batch.entries.into_iter().next() {
            Some(BatchEntry::Update(update)) => Ok(update),
            _ => Err(NotifierError::Internal(
                "cycle produced no update for fetched symbol".to_string(),
            )),
        }
    }

    /// Ad-hoc full-watchlist pass. The batch is returned, not posted, so
    /// the invoker can deliver it on its own context.
    pub async fn check_watchlist(&self) -> UpdateBatch {
        let symbols = self.config.symbols();
        let result = self.dispatcher.run_cycle(&symbols).await;
        self.dispatcher.build_batch(&result)
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote> {
        let symbols = [symbol.to_string()];
        let result = self.dispatcher.run_cycle(&symbols).await;
        match result.results.into_iter().next() {
            Some((_, Ok(quote))) => Ok(quote),
            Some((_, Err(e))) => Err(e.into()),
            None => Err(NotifierError::Internal("empty cycle result".to_string())),
        }
    }
}
