use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::registry::AssemblerRegistry;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted_stale: usize,
    pub evicted_completed: usize,
    /// Assemblers skipped because a chunk was being written to them.
    pub busy: usize,
    pub remaining: usize,
}

/// Periodically drops assemblers that stopped receiving chunks.
///
/// Only in-memory state is removed; partial files stay on disk. Completed assemblers are
/// kept as a guard against late duplicates unless a completed retention is configured.
#[derive(Debug, Clone)]
pub struct AssemblerJanitor {
    registry: AssemblerRegistry,
    interval: Duration,
    stale_after: Duration,
    completed_retention: Option<Duration>,
}

impl AssemblerJanitor {
    pub fn new(registry: AssemblerRegistry, interval: Duration, stale_after: Duration) -> Self {
        Self {
            registry,
            interval,
            stale_after,
            completed_retention: None,
        }
    }

    pub fn with_completed_retention(mut self, retention: Option<Duration>) -> Self {
        self.completed_retention = retention;
        self
    }

    /// Start the sweep loop. Returns a JoinHandle for graceful shutdown
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; nothing can be stale yet.
            ticker.tick().await;

            tracing::info!(
                interval_secs = self.interval.as_secs(),
                stale_after_secs = self.stale_after.as_secs(),
                "Assembler janitor started"
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = self.sweep(Instant::now());
                        if report.evicted_stale + report.evicted_completed > 0 {
                            tracing::info!(
                                evicted_stale = report.evicted_stale,
                                evicted_completed = report.evicted_completed,
                                remaining = report.remaining,
                                "Assembler sweep finished"
                            );
                        } else {
                            tracing::debug!(remaining = report.remaining, "Assembler sweep found nothing to evict");
                        }
                    }
                }
            }

            tracing::info!("Assembler janitor stopped");
        })
    }

    /// Evicts every assembler idle longer than the threshold as of `now`.
    ///
    /// Assemblers whose lock is held are being written to and count as active.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();
        let mut map = self.registry.map();

        map.retain(|upload_id, entry| {
            let Ok(assembler) = entry.try_lock() else {
                report.busy += 1;
                return true;
            };
            let idle = now.saturating_duration_since(assembler.last_update);

            if !assembler.complete && idle > self.stale_after {
                tracing::warn!(
                    upload_id = %upload_id,
                    idle_secs = idle.as_secs(),
                    chunks_received = assembler.chunks_received,
                    destination = %assembler.destination.display(),
                    "Evicting stale assembler"
                );
                report.evicted_stale += 1;
                return false;
            }
            if assembler.complete
                && self
                    .completed_retention
                    .is_some_and(|retention| idle > retention)
            {
                report.evicted_completed += 1;
                return false;
            }
            true
        });

        report.remaining = map.len();
        report
    }
}
