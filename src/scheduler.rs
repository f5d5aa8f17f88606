//! Periodic update scheduler
//!
//! One background task drives the fetch-and-post cycles. Each iteration
//! snapshots the configured interval, sleeps, gates on the trading-session
//! calendar, then runs one cycle to completion before waiting again. The
//! interval is measured from the end of the previous cycle, so ticks are
//! "at least N minutes apart" rather than aligned to wall-clock marks, and
//! two cycles can never overlap: a tick that comes due during a slow cycle
//! is deferred until that cycle finishes.

use crate::clock::Clock;
use crate::config::ConfigHandle;
use crate::dispatch::UpdateDispatcher;
use crate::session::classify;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Scheduler lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Waiting,
    Firing,
    Stopped,
}

/// Observable schedule state.
pub struct ScheduleState {
    phase: RwLock<SchedulerPhase>,
    last_fired_at: RwLock<Option<DateTime<Utc>>>,
}

impl ScheduleState {
    fn new() -> Self {
        Self {
            phase: RwLock::new(SchedulerPhase::Waiting),
            last_fired_at: RwLock::new(None),
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        *self.phase.read()
    }

    pub fn last_fired_at(&self) -> Option<DateTime<Utc>> {
        *self.last_fired_at.read()
    }

    fn set_phase(&self, phase: SchedulerPhase) {
        *self.phase.write() = phase;
    }

    fn mark_fired(&self, at: DateTime<Utc>) {
        *self.last_fired_at.write() = Some(at);
    }
}

pub struct Scheduler {
    config: Arc<ConfigHandle>,
    dispatcher: Arc<UpdateDispatcher>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    state: Arc<ScheduleState>,
}

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    state: Arc<ScheduleState>,
}

impl SchedulerHandle {
    pub fn phase(&self) -> SchedulerPhase {
        self.state.phase()
    }

    pub fn last_fired_at(&self) -> Option<DateTime<Utc>> {
        self.state.last_fired_at()
    }

    /// Stop the scheduler. A pending wait is cancelled immediately; an
    /// in-flight cycle runs to completion first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

impl Scheduler {
    pub fn new(
        config: Arc<ConfigHandle>,
        dispatcher: Arc<UpdateDispatcher>,
        clock: Arc<dyn Clock>,
        timezone: Tz,
    ) -> Self {
        Self {
            config,
            dispatcher,
            clock,
            timezone,
            state: Arc::new(ScheduleState::new()),
        }
    }

    /// Spawn the scheduler task.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown, receiver) = watch::channel(false);
        let state = Arc::clone(&self.state);
        let task = tokio::spawn(self.run(receiver));
        SchedulerHandle {
            shutdown,
            task,
            state,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Scheduler started");

        loop {
            // Snapshot the interval before waiting: a change mid-wait only
            // applies from the next tick.
            let interval = self.config.interval().duration();
            self.state.set_phase(SchedulerPhase::Waiting);
            debug!(seconds = interval.as_secs(), "Waiting for next tick");

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }

            let now = self.clock.now_utc();
            let window = classify(now, self.timezone);
            if !window.in_window {
                debug!(session = ?window.session, "Outside trading hours, tick skipped");
                continue;
            }

            self.state.set_phase(SchedulerPhase::Firing);
            self.state.mark_fired(now);

            // Cycle errors are per-symbol or logged downstream; nothing
            // short of shutdown stops the loop.
            let config = self.config.snapshot();
            self.dispatcher.run_scheduled_cycle(&config).await;
        }

        self.state.set_phase(SchedulerPhase::Stopped);
        info!("Scheduler stopped");
    }
}
