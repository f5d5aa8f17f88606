//! Watchlist configuration
//!
//! The core holds the authoritative in-memory copy of the watchlist config.
//! Durability belongs to the embedding application: every mutating setter
//! signals the `ConfigStore` collaborator with the new snapshot, and the
//! store decides how (and whether) to persist it.

use crate::error::{NotifierError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Opaque identifier of the destination channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef(pub String);

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ChannelRef {
    fn from(s: &str) -> Self {
        ChannelRef(s.to_string())
    }
}

/// Update interval preset. The schedule only supports this fixed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum UpdateInterval {
    Minutes15,
    Minutes30,
    Hours1,
    Hours2,
    Hours4,
}

impl UpdateInterval {
    pub fn minutes(self) -> u32 {
        match self {
            UpdateInterval::Minutes15 => 15,
            UpdateInterval::Minutes30 => 30,
            UpdateInterval::Hours1 => 60,
            UpdateInterval::Hours2 => 120,
            UpdateInterval::Hours4 => 240,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::from_secs(u64::from(self.minutes()) * 60)
    }

    pub fn from_minutes(minutes: u32) -> Result<Self> {
        match minutes {
            15 => Ok(UpdateInterval::Minutes15),
            30 => Ok(UpdateInterval::Minutes30),
            60 => Ok(UpdateInterval::Hours1),
            120 => Ok(UpdateInterval::Hours2),
            240 => Ok(UpdateInterval::Hours4),
            other => Err(NotifierError::Config(format!(
                "invalid interval {} minutes (valid: 15, 30, 60, 120, 240)",
                other
            ))),
        }
    }

    /// Parse a user-facing preset: 15m, 30m, 1h, 2h, 4h.
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset.to_ascii_lowercase().as_str() {
            "15m" => Ok(UpdateInterval::Minutes15),
            "30m" => Ok(UpdateInterval::Minutes30),
            "1h" => Ok(UpdateInterval::Hours1),
            "2h" => Ok(UpdateInterval::Hours2),
            "4h" => Ok(UpdateInterval::Hours4),
            other => Err(NotifierError::Config(format!(
                "invalid interval preset '{}' (valid: 15m, 30m, 1h, 2h, 4h)",
                other
            ))),
        }
    }
}

impl TryFrom<u32> for UpdateInterval {
    type Error = String;

    fn try_from(minutes: u32) -> std::result::Result<Self, String> {
        UpdateInterval::from_minutes(minutes).map_err(|e| e.to_string())
    }
}

impl From<UpdateInterval> for u32 {
    fn from(interval: UpdateInterval) -> u32 {
        interval.minutes()
    }
}

impl Default for UpdateInterval {
    fn default() -> Self {
        UpdateInterval::Hours1
    }
}

impl fmt::Display for UpdateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preset = match self {
            UpdateInterval::Minutes15 => "15m",
            UpdateInterval::Minutes30 => "30m",
            UpdateInterval::Hours1 => "1h",
            UpdateInterval::Hours2 => "2h",
            UpdateInterval::Hours4 => "4h",
        };
        f.write_str(preset)
    }
}

/// Watchlist configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchlistConfig {
    /// Destination channel for scheduled posts. None suppresses delivery.
    pub channel: Option<ChannelRef>,
    /// Watched symbols, ordered, unique, uppercased.
    pub symbols: Vec<String>,
    /// Schedule interval.
    pub interval: UpdateInterval,
}

/// Durable config storage, implemented by the embedding application.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load the persisted config at startup.
    async fn load(&self) -> Result<WatchlistConfig>;

    /// Called after every mutating setter with the new snapshot.
    async fn on_config_changed(&self, config: &WatchlistConfig);
}

/// Canonical symbol form used for config entries and cache keys.
pub(crate) fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

/// Shared handle to the authoritative config copy.
///
/// Setters mutate under the lock, then notify the store with the released
/// snapshot. The scheduler and dispatcher only ever read snapshots.
pub struct ConfigHandle {
    inner: RwLock<WatchlistConfig>,
    store: Arc<dyn ConfigStore>,
}

impl ConfigHandle {
    /// Load the config from the store. Stored symbols are normalized and
    /// deduplicated so the in-memory copy upholds the ordered-unique
    /// invariant regardless of what the store returns.
    pub async fn load(store: Arc<dyn ConfigStore>) -> Result<Self> {
        let mut config = store.load().await?;
        let mut symbols: Vec<String> = Vec::with_capacity(config.symbols.len());
        for raw in &config.symbols {
            let symbol = normalize_symbol(raw);
            if !symbol.is_empty() && !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        config.symbols = symbols;
        info!(
            symbols = config.symbols.len(),
            interval = %config.interval,
            "Watchlist config loaded"
        );
        Ok(Self {
            inner: RwLock::new(config),
            store,
        })
    }

    /// Current config snapshot.
    pub fn snapshot(&self) -> WatchlistConfig {
        self.inner.read().clone()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.inner.read().symbols.clone()
    }

    pub fn interval(&self) -> UpdateInterval {
        self.inner.read().interval
    }

    pub fn channel(&self) -> Option<ChannelRef> {
        self.inner.read().channel.clone()
    }

    /// Set or clear the destination channel. Effective for the next post.
    pub async fn set_channel(&self, channel: Option<ChannelRef>) {
        {
            let mut config = self.inner.write();
            config.channel = channel;
        }
        self.publish().await;
    }

    /// Change the schedule interval. Applies from the next scheduled tick;
    /// a pending wait is never shortened or extended retroactively.
    pub async fn set_interval(&self, interval: UpdateInterval) {
        {
            let mut config = self.inner.write();
            config.interval = interval;
        }
        info!(interval = %interval, "Update interval changed");
        self.publish().await;
    }

    /// Add a symbol to the watchlist. Returns the normalized form.
    pub async fn add_symbol(&self, symbol: &str) -> Result<String> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(NotifierError::Config("empty symbol".to_string()));
        }
        {
            let mut config = self.inner.write();
            if config.symbols.contains(&symbol) {
                return Err(NotifierError::Config(format!(
                    "{} is already on the watchlist",
                    symbol
                )));
            }
            config.symbols.push(symbol.clone());
        }
        self.publish().await;
        Ok(symbol)
    }

    /// Remove a symbol from the watchlist.
    pub async fn remove_symbol(&self, symbol: &str) -> Result<()> {
        let symbol = normalize_symbol(symbol);
        {
            let mut config = self.inner.write();
            let before = config.symbols.len();
            config.symbols.retain(|s| s != &symbol);
            if config.symbols.len() == before {
                return Err(NotifierError::Config(format!(
                    "{} is not on the watchlist",
                    symbol
                )));
            }
        }
        self.publish().await;
        Ok(())
    }

    async fn publish(&self) {
        let snapshot = self.snapshot();
        self.store.on_config_changed(&snapshot).await;
    }
}
