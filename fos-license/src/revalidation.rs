//! Periodic background revalidation with clock-jump detection.

use crate::device::{collect_cancellable, FingerprintSource};
use crate::validator::LicenseValidator;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Timing of the background revalidation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevalidationSchedule {
    /// Revalidate at least this often.
    pub revalidate_interval: Duration,
    /// How often wall-clock and monotonic time are compared.
    pub clock_check_interval: Duration,
    /// Disagreement between the two that counts as a clock change.
    pub clock_jump_threshold: Duration,
}

impl Default for RevalidationSchedule {
    fn default() -> Self {
        Self {
            revalidate_interval: Duration::from_secs(6 * 60 * 60),
            clock_check_interval: Duration::from_secs(60),
            clock_jump_threshold: Duration::from_secs(120),
        }
    }
}

/// Spawns the revalidation loop. It exits when `shutdown` becomes `true`
/// or its sender is dropped.
pub fn spawn_revalidation(
    validator: Arc<LicenseValidator>,
    fingerprints: Arc<dyn FingerprintSource>,
    schedule: RevalidationSchedule,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(schedule.clock_check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut last_wall = Utc::now();
        let mut last_mono = Instant::now();
        let mut last_revalidation = last_mono;
        info!(
            interval_secs = schedule.revalidate_interval.as_secs(),
            "License revalidation started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let wall = Utc::now();
            let mono = Instant::now();
            let wall_elapsed = wall - last_wall;
            let mono_elapsed = mono.duration_since(last_mono);
            last_wall = wall;
            last_mono = mono;

            let jump = chrono::Duration::from_std(mono_elapsed).ok().filter(|mono_delta| {
                (wall_elapsed - *mono_delta)
                    .abs()
                    .to_std()
                    .is_ok_and(|drift| drift > schedule.clock_jump_threshold)
            });
            if let Some(mono_delta) = jump {
                validator.record_clock_jump(wall_elapsed, mono_delta);
            }
            let jumped = jump.is_some();

            let due = mono.duration_since(last_revalidation) >= schedule.revalidate_interval;
            if !(jumped || due) {
                continue;
            }

            let Some(local) = collect_cancellable(Arc::clone(&fingerprints), &mut shutdown).await
            else {
                break;
            };
            match validator.revalidate(Utc::now(), &local) {
                Ok(result) => debug!(status = %result.status, jumped, "Revalidated license"),
                Err(e) => warn!(error = %e, "Background revalidation skipped"),
            }
            last_revalidation = Instant::now();
        }

        info!("License revalidation stopped");
    })
}
