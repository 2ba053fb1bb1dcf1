//! Background renewal scheduler
//!
//! Triggers a renewal sweep at a fixed interval. At most one sweep runs at
//! a time; ticks that arrive while a sweep is in flight are dropped.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::manager::RenewalManager;

/// Default check interval (12 hours)
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(12 * 3600);

/// Minimum check interval (1 second)
const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Work performed on each tick
#[async_trait]
pub trait Sweep: Send + Sync + 'static {
    async fn sweep(&self);
}

#[async_trait]
impl Sweep for RenewalManager {
    async fn sweep(&self) {
        // Enumeration failures are logged by the manager
        if let Ok(summary) = self.run().await {
            debug!(?summary, "Scheduled renewal sweep done");
        }
    }
}

/// Single-flight interval scheduler
pub struct RenewalScheduler<S> {
    /// Sweep to run on each tick
    sweep: Arc<S>,
    /// Tick period
    check_interval: Duration,
    /// One permit; held by the running sweep
    limiter: Arc<Semaphore>,
    /// Ticks dropped because a sweep was still running
    skipped_ticks: AtomicU64,
}

impl<S: Sweep> RenewalScheduler<S> {
    pub fn new(sweep: Arc<S>) -> Self {
        Self {
            sweep,
            check_interval: DEFAULT_CHECK_INTERVAL,
            limiter: Arc::new(Semaphore::new(1)),
            skipped_ticks: AtomicU64::new(0),
        }
    }

    /// Set the check interval
    ///
    /// The interval is clamped to a minimum of 1 second.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval.max(MIN_CHECK_INTERVAL);
        self
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Number of ticks skipped so far
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped_ticks.load(Ordering::Relaxed)
    }

    /// True while a sweep holds the permit
    pub fn is_sweeping(&self) -> bool {
        self.limiter.available_permits() == 0
    }

    /// Tick until `shutdown` is cancelled.
    ///
    /// The first sweep starts one interval after the call. On cancellation
    /// no new sweep starts; a sweep already in flight is awaited.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            check_interval_secs = self.check_interval.as_secs(),
            "Starting certificate renewal scheduler"
        );

        let mut ticker = interval_at(Instant::now() + self.check_interval, self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.on_tick(),
            }
        }

        if self.is_sweeping() {
            info!("Waiting for the running renewal sweep to finish");
        }
        // The semaphore is never closed
        let _ = self.limiter.acquire().await;

        info!("Certificate renewal scheduler stopped");
    }

    fn on_tick(&self) {
        match Arc::clone(&self.limiter).try_acquire_owned() {
            Ok(permit) => {
                debug!("Running scheduled certificate renewal sweep");
                let sweep = Arc::clone(&self.sweep);
                tokio::spawn(async move {
                    sweep.sweep().await;
                    drop(permit);
                });
            }
            Err(_) => {
                self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
                warn!("Renewal already in progress, skipping this tick");
            }
        }
    }
}
