//! Tick-driven probe scheduler.
//!
//! The scheduler waits on "tick or shutdown" and runs the probe inline, so
//! probes never overlap. When a probe outlasts the tick interval the missed
//! ticks are coalesced by the tick source; they are never dispatched
//! concurrently.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Farthest deadline handed to tokio timers, about 30 years out.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + duration`, clamped to [`FAR_FUTURE`] so huge durations never
/// overflow the clock.
pub(crate) fn instant_after(duration: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(duration.min(FAR_FUTURE)).unwrap_or(now)
}

/// A source of tick events. `None` means the source is exhausted.
pub trait TickSource: Send {
    fn tick(&mut self) -> impl Future<Output = Option<Instant>> + Send;
}

/// Ticks pushed through a channel, used to drive the scheduler by hand.
impl TickSource for mpsc::Receiver<Instant> {
    async fn tick(&mut self) -> Option<Instant> {
        self.recv().await
    }
}

/// Wall-clock ticks every `period`, first one a full period after creation.
///
/// Ticks missed while a probe is running collapse into a single tick.
pub struct IntervalTicks {
    interval: Interval,
}

impl IntervalTicks {
    /// Panics if `period` is zero.
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(instant_after(period), period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }
}

impl TickSource for IntervalTicks {
    async fn tick(&mut self) -> Option<Instant> {
        Some(self.interval.tick().await)
    }
}

pub struct Scheduler<T> {
    ticks: T,
}

impl<T: TickSource> Scheduler<T> {
    pub fn new(ticks: T) -> Self {
        Self { ticks }
    }

    /// Run `probe` once per tick until shutdown is signalled.
    ///
    /// Shutdown always wins over a pending tick: after waking on a tick the
    /// flag is checked again before dispatch, so a buffered tick is dropped
    /// once shutdown has been requested. An in-flight probe is never
    /// aborted. Dropping the shutdown sender counts as shutdown.
    ///
    /// Returns the number of probes dispatched.
    pub async fn run<F, Fut>(&mut self, mut shutdown: watch::Receiver<bool>, mut probe: F) -> u64
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut dispatched = 0u64;

        loop {
            if shutdown_requested(&shutdown) {
                info!(dispatched, "stopping scheduler");
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(dispatched, "stopping scheduler");
                        break;
                    }
                }
                tick = self.ticks.tick() => {
                    if tick.is_none() {
                        info!(dispatched, "tick source closed, stopping scheduler");
                        break;
                    }
                    debug!("ticker has been triggered");

                    if shutdown_requested(&shutdown) {
                        info!(dispatched, "tick received, but shutdown has higher priority");
                        break;
                    }

                    probe().await;
                    dispatched += 1;
                }
            }
        }

        dispatched
    }
}

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}
