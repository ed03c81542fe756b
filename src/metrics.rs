use crate::bus::EventBus;
use crate::error::{HearthError, Result};
use crate::events::{Event, MetricsSample};
use std::path::Path;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;
use sysinfo::{Disks, System};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Something that can take a reading of host resource usage
pub trait MetricsSource: Send {
    /// Take one sample.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the host readings is unavailable
    fn sample(&mut self) -> Result<MetricsSample>;
}

/// Host metrics read through `sysinfo`.
///
/// CPU usage is computed between two consecutive calls, so the first sample
/// always reports 0%.
pub struct SysinfoSource {
    system: System,
    disks: Disks,
    primed: bool,
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: System::new(),
            disks: Disks::new_with_refreshed_list(),
            primed: false,
        }
    }

    fn primary_disk_usage(&mut self) -> Result<(u64, u64)> {
        self.disks.refresh();
        let root = Path::new("/");
        let disk = self
            .disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == root)
            .or_else(|| self.disks.list().first())
            .ok_or_else(|| HearthError::Metrics("no disks found".to_string()))?;

        let total = disk.total_space();
        Ok((disk_used(total, disk.available_space()), total))
    }
}

/// Used space as seen by an unprivileged user.
///
/// `sysinfo` only exposes the space available to non-root users, so blocks
/// reserved for root (typically 5% on ext4) are counted as used. `df` reports
/// a slightly lower figure for the same filesystem.
fn disk_used(total: u64, available: u64) -> u64 {
    total.saturating_sub(available)
}

impl MetricsSource for SysinfoSource {
    #[allow(clippy::cast_precision_loss)]
    fn sample(&mut self) -> Result<MetricsSample> {
        self.system.refresh_cpu_usage();
        let cpu_load = if self.primed {
            f64::from(self.system.global_cpu_info().cpu_usage())
        } else {
            self.primed = true;
            0.0
        };

        self.system.refresh_memory();
        let memory_total = self.system.total_memory();
        if memory_total == 0 {
            return Err(HearthError::Metrics("memory totals unavailable".to_string()));
        }
        let memory_used = self.system.used_memory();

        let (disk_used, disk_total) = self.primary_disk_usage()?;

        Ok(MetricsSample {
            cpu_load,
            memory_used: memory_used as f64 / BYTES_PER_GIB,
            memory_total: memory_total as f64 / BYTES_PER_GIB,
            disk_used: disk_used as f64 / BYTES_PER_GIB,
            disk_total: disk_total as f64 / BYTES_PER_GIB,
        })
    }
}

/// Periodic host sampler that publishes a `MetricsSample` every cycle
pub struct MetricsCollector {
    source: Mutex<Box<dyn MetricsSource>>,
    latest: RwLock<Option<MetricsSample>>,
    bus: EventBus,
}

impl MetricsCollector {
    pub fn new(source: Box<dyn MetricsSource>, bus: EventBus) -> Self {
        Self {
            source: Mutex::new(source),
            latest: RwLock::new(None),
            bus,
        }
    }

    /// Most recent successful sample, if any
    pub fn latest(&self) -> Option<MetricsSample> {
        *self.latest.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest sample, or a fresh one if no cycle has completed yet.
    pub fn current(&self) -> Option<MetricsSample> {
        self.latest().or_else(|| self.sample().ok())
    }

    fn sample(&self) -> Result<MetricsSample> {
        let sample = self
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sample()?;
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(sample);
        Ok(sample)
    }

    /// Run one cycle: sample and publish, or skip on failure.
    ///
    /// Returns whether an event was published.
    pub fn collect_once(&self) -> bool {
        match self.sample() {
            Ok(sample) => {
                debug!(
                    "Metrics sample: cpu={:.1}% mem={:.2}/{:.2}GB disk={:.1}/{:.1}GB",
                    sample.cpu_load,
                    sample.memory_used,
                    sample.memory_total,
                    sample.disk_used,
                    sample.disk_total
                );
                self.bus.publish(Event::MetricsSample(sample));
                true
            }
            Err(e) => {
                warn!("Skipping metrics cycle: {e}");
                false
            }
        }
    }

    /// Sample every `period` until `cancel_token` fires.
    pub async fn run(&self, period: Duration, cancel_token: CancellationToken) {
        info!("Starting metrics collector (every {}s)", period.as_secs());
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => break,
                _ = interval.tick() => {
                    self.collect_once();
                }
            }
        }

        info!("Metrics collector stopped");
    }
}
