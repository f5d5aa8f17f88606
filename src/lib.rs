//! quotewatch - scheduled market-data notifier
//!
//! Periodically fetches quotes for a configurable watchlist, gates on US
//! trading hours, and hands structured update batches to a transport. The
//! chat transport, the upstream quote source and the durable config store
//! are collaborator traits implemented by the embedding application; a
//! Yahoo Finance provider is bundled.

pub mod cache;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod provider;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod transport;

pub use cache::QuoteCache;
pub use clock::{Clock, SystemClock};
pub use config::{ChannelRef, ConfigHandle, ConfigStore, UpdateInterval, WatchlistConfig};
pub use dispatch::{CycleResult, UpdateDispatcher};
pub use error::{DeliveryError, FetchError, NotifierError, Result};
pub use provider::{DataProvider, Quote};
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerPhase};
pub use service::{NotifierService, NotifierSettings};
pub use session::{classify, Session, SessionWindow};
pub use transport::{BatchEntry, SymbolUpdate, Transport, UpdateBatch};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging for the embedding application. Call once at
/// startup.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quotewatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
