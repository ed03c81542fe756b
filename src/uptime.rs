//! Periodic reachability probing of the configured services
//!
//! Every cycle probes all targets in parallel (bounded by a semaphore), builds a
//! complete new status map, swaps it into the [`StatusStore`] and publishes a
//! `service` event only for targets whose state differs from the previous cycle.

use crate::bus::EventBus;
use crate::config::{ConfigStore, Settings};
use crate::error::Result;
use crate::events::Event;
use crate::status::{ServiceState, StatusMap, StatusStore, Target};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Probe client together with the certificate policy it was built with
struct ProbeClient {
    client: reqwest::Client,
    insecure_skip_verify: bool,
}

pub struct HealthChecker {
    config: Arc<ConfigStore>,
    status: Arc<StatusStore>,
    bus: EventBus,
    client: Mutex<Option<ProbeClient>>,
    wake: Arc<Notify>,
}

impl HealthChecker {
    pub fn new(config: Arc<ConfigStore>, status: Arc<StatusStore>, bus: EventBus) -> Self {
        Self {
            config,
            status,
            bus,
            client: Mutex::new(None),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Handle that triggers an extra cycle when notified, e.g. after a reload.
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Returns a client matching the current certificate policy, rebuilding
    /// it only when the policy changed.
    fn client_for(&self, settings: &Settings) -> Result<reqwest::Client> {
        let mut cached = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(probe) = cached.as_ref() {
            if probe.insecure_skip_verify == settings.insecure_skip_verify {
                return Ok(probe.client.clone());
            }
        }

        if settings.insecure_skip_verify {
            info!("Certificate validation is disabled for service probes");
        }
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(settings.insecure_skip_verify)
            .build()?;
        *cached = Some(ProbeClient {
            client: client.clone(),
            insecure_skip_verify: settings.insecure_skip_verify,
        });
        Ok(client)
    }

    /// Probe every target once, update the store and publish changes.
    ///
    /// Returns the number of `service` events published.
    pub async fn check_once(&self) -> usize {
        let config = self.config.snapshot();
        let settings = &config.settings;
        let targets = config.targets();

        let client = match self.client_for(settings) {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to build probe client, skipping cycle: {e}");
                return 0;
            }
        };

        debug!("Starting probe cycle for {} targets", targets.len());
        let results = probe_all(
            &client,
            targets,
            settings.probe_timeout(),
            settings.max_concurrent_probes,
        )
        .await;

        let previous = self.status.replace(results.clone());
        let changes = diff(&previous, &results);
        for (id, state) in &changes {
            debug!("Target {id} is now {state}");
            self.bus.publish(Event::status_changed(id.clone(), *state));
        }

        debug!("Probe cycle finished, {} changes", changes.len());
        changes.len()
    }

    /// Probe on `period` until `cancel_token` fires; a notification on the
    /// waker starts an extra cycle right away.
    pub async fn run(&self, period: Duration, cancel_token: CancellationToken) {
        info!("Starting health checker (every {}s)", period.as_secs());
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => break,
                _ = interval.tick() => {}
                () = self.wake.notified() => {
                    debug!("Probe cycle requested");
                    interval.reset();
                }
            }

            tokio::select! {
                () = cancel_token.cancelled() => break,
                _ = self.check_once() => {}
            }
        }

        info!("Health checker stopped");
    }
}

/// Targets whose state in `current` differs from `previous`.
///
/// A target missing from `previous` counts as `Unknown`, so its first probe
/// always reports a change.
fn diff(previous: &StatusMap, current: &StatusMap) -> Vec<(String, ServiceState)> {
    current
        .iter()
        .filter(|(id, state)| previous.get(*id).copied().unwrap_or_default() != **state)
        .map(|(id, state)| (id.clone(), *state))
        .collect()
}

/// Probes every target with at most `max_concurrent` requests in flight.
///
/// The probes live in a `JoinSet`, so dropping this future (on shutdown)
/// aborts whatever is still running.
async fn probe_all(
    client: &reqwest::Client,
    targets: Vec<Target>,
    timeout: Duration,
    max_concurrent: usize,
) -> StatusMap {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut results = StatusMap::with_capacity(targets.len());
    let mut tasks = JoinSet::new();

    for target in targets {
        let client = client.clone();
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let state = match semaphore.acquire_owned().await {
                Ok(_permit) => check_site_status(&client, &target.url, timeout).await,
                Err(_) => ServiceState::Down,
            };
            (target.id, state)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((id, state)) => {
                results.insert(id, state);
            }
            Err(e) => error!("Probe task failed: {e}"),
        }
    }
    results
}

/// A target is up when a HEAD request gets any response within `timeout`.
async fn check_site_status(client: &reqwest::Client, url: &str, timeout: Duration) -> ServiceState {
    debug!("Checking site status: {url}");
    match client.head(url).timeout(timeout).send().await {
        Ok(response) => {
            debug!("Site {url} is UP: status {}", response.status());
            ServiceState::Up
        }
        Err(e) => {
            debug!("Site {url} is DOWN: error {e}");
            ServiceState::Down
        }
    }
}
