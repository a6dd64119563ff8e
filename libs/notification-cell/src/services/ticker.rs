use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;

use crate::models::Cadence;
use crate::services::scheduler::NotificationScheduler;

/// Drives the hourly and per-minute notification batches until shutdown.
///
/// A cadence never overlaps itself: a tick that arrives while the previous
/// batch of the same cadence is still running is skipped.
pub struct NotificationTicker {
    scheduler: Arc<NotificationScheduler>,
    hourly_period: Duration,
    minute_period: Duration,
}

impl NotificationTicker {
    pub fn new(config: &AppConfig, scheduler: Arc<NotificationScheduler>) -> Self {
        Self::with_periods(
            scheduler,
            Duration::from_secs(config.hourly_tick_seconds.max(1)),
            Duration::from_secs(config.minute_tick_seconds.max(1)),
        )
    }

    pub fn with_periods(
        scheduler: Arc<NotificationScheduler>,
        hourly_period: Duration,
        minute_period: Duration,
    ) -> Self {
        Self {
            scheduler,
            hourly_period,
            minute_period,
        }
    }

    /// Spawns one loop per cadence. Each loop exits once `shutdown` turns
    /// `true` or its sender is dropped, after the batch it started last has
    /// finished.
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            "Starting notification ticker (hourly every {:?}, minute every {:?})",
            self.hourly_period, self.minute_period
        );

        vec![
            tokio::spawn(run_cadence_loop(
                self.scheduler.clone(),
                Cadence::Hourly,
                self.hourly_period,
                shutdown.clone(),
            )),
            tokio::spawn(run_cadence_loop(
                self.scheduler.clone(),
                Cadence::Minute,
                self.minute_period,
                shutdown,
            )),
        ]
    }
}

async fn run_cadence_loop(
    scheduler: Arc<NotificationScheduler>,
    cadence: Cadence,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticks = interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                if in_flight.as_ref().is_some_and(|batch| !batch.is_finished()) {
                    warn!("Previous {} batch still running, skipping tick", cadence);
                    continue;
                }

                let scheduler = scheduler.clone();
                in_flight = Some(tokio::spawn(async move {
                    let report = scheduler.run_cadence(cadence, Utc::now()).await;
                    if report.failures() > 0 {
                        warn!("{} tick finished with {} failed kinds", cadence, report.failures());
                    } else {
                        debug!("{} tick finished", cadence);
                    }
                }));
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    // The last batch finishes publishing and stamping before the loop returns.
    if let Some(batch) = in_flight {
        info!("Waiting for the running {} batch before stopping", cadence);
        if let Err(e) = batch.await {
            error!("{} batch ended abnormally: {}", cadence, e);
        }
    }
    info!("Stopped {} notification loop", cadence);
}
