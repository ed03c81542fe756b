use crate::error::{HearthError, Result};
use crate::status::Target;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Default configuration file name
pub const CONFIG_FILE: &str = "config.json5";

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_METRICS_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 10;
pub const DEFAULT_OUTBOX_CAPACITY: usize = 100;

/// Application configuration structure
///
/// Group structure is kept for the rendering layer; the monitoring core only
/// looks at the flattened list returned by [`Config::targets`].
#[derive(Debug, Default, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub settings: Settings,
    pub services: Vec<ServiceGroup>,
    pub bookmarks: Vec<BookmarkGroup>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Title shown in the page header
    pub title: String,
    /// Port the server listens on when none is given on the command line
    pub port: u16,
    pub show_title: bool,
    /// Seconds between two probe cycles
    pub health_interval_secs: u64,
    /// Seconds between two host metrics samples
    pub metrics_interval_secs: u64,
    /// Per-probe timeout in seconds
    pub probe_timeout_secs: u64,
    /// Upper bound on probes in flight during one cycle
    pub max_concurrent_probes: usize,
    /// Accept self-signed or otherwise invalid certificates when probing
    pub insecure_skip_verify: bool,
    /// Events buffered per connected client before new ones are dropped
    pub outbox_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            title: "Hearth".to_string(),
            port: DEFAULT_PORT,
            show_title: true,
            health_interval_secs: DEFAULT_HEALTH_INTERVAL_SECS,
            metrics_interval_secs: DEFAULT_METRICS_INTERVAL_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            max_concurrent_probes: DEFAULT_MAX_CONCURRENT_PROBES,
            insecure_skip_verify: false,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

impl Settings {
    #[must_use]
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    #[must_use]
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServiceGroup {
    pub group: String,
    pub items: Vec<Service>,
}

/// A monitored service shown on the dashboard
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Service {
    pub name: String,
    /// URL probed for reachability; its fingerprint is the service identity
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BookmarkGroup {
    pub group: String,
    pub items: Vec<Bookmark>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Bookmark {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub abbr: String,
}

impl Config {
    /// Load the application configuration from `path`.
    ///
    /// Files ending in `.yaml` or `.yml` are read as YAML, anything else as JSON5.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read, parsed or validated
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let config_str = fs::read_to_string(path).map_err(HearthError::ConfigRead)?;
        let config = Self::parse(&config_str, is_yaml(path))?;
        info!(
            "Configuration loaded successfully: {} services in {} groups",
            config.services.iter().map(|g| g.items.len()).sum::<usize>(),
            config.services.len()
        );
        Ok(config)
    }

    /// Parse and validate configuration text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid JSON5/YAML or fails validation
    pub fn parse(source: &str, yaml: bool) -> Result<Self> {
        let config: Config = if yaml {
            serde_yaml::from_str(source)?
        } else {
            json5::from_str(source)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `HearthError::ConfigInvalid` describing the first problem found
    pub fn validate(&self) -> Result<()> {
        let settings = &self.settings;
        if settings.health_interval_secs == 0 {
            return Err(invalid("health_interval_secs must be greater than zero"));
        }
        if settings.metrics_interval_secs == 0 {
            return Err(invalid("metrics_interval_secs must be greater than zero"));
        }
        if settings.probe_timeout_secs == 0 {
            return Err(invalid("probe_timeout_secs must be greater than zero"));
        }
        if settings.max_concurrent_probes == 0 {
            return Err(invalid("max_concurrent_probes must be greater than zero"));
        }
        if settings.outbox_capacity == 0 {
            return Err(invalid("outbox_capacity must be greater than zero"));
        }

        for service in self.services.iter().flat_map(|group| &group.items) {
            if service.name.trim().is_empty() {
                return Err(invalid("Service name cannot be empty"));
            }
            if service.url.trim().is_empty() {
                return Err(invalid(format!(
                    "Service URL cannot be empty: {}",
                    service.name
                )));
            }
            if Url::parse(&service.url).is_err() {
                return Err(invalid(format!("Invalid URL format: {}", service.url)));
            }
        }

        Ok(())
    }

    /// Flat, de-duplicated list of probe targets.
    ///
    /// Services sharing a URL share one target; the first name wins.
    #[must_use]
    pub fn targets(&self) -> Vec<Target> {
        let mut seen = HashSet::new();
        self.services
            .iter()
            .flat_map(|group| &group.items)
            .map(|service| Target::new(&service.name, &service.url))
            .filter(|target| seen.insert(target.id.clone()))
            .collect()
    }
}

fn invalid(message: impl Into<String>) -> HearthError {
    HearthError::ConfigInvalid(message.into())
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml")
    )
}

/// Owner of the active configuration snapshot.
///
/// Readers get an `Arc` to a complete `Config`; a reload swaps the whole value
/// under the write lock, so a reader sees either the old or the new snapshot.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<Config>>,
}

impl ConfigStore {
    #[must_use]
    pub fn new(path: PathBuf, config: Config) -> Self {
        Self {
            path,
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Load `path` and create a store around it.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial configuration cannot be loaded
    pub fn open(path: PathBuf) -> Result<Self> {
        let config = Config::load(&path)?;
        Ok(Self::new(path, config))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Arc<Config> {
        let guard = self.current.read().unwrap_or_else(|poisoned| {
            warn!("Config lock was poisoned, recovering last snapshot");
            PoisonError::into_inner(poisoned)
        });
        Arc::clone(&guard)
    }

    pub fn replace(&self, config: Config) -> Arc<Config> {
        let next = Arc::new(config);
        let mut guard = self.current.write().unwrap_or_else(|poisoned| {
            warn!("Config lock was poisoned, overwriting snapshot");
            PoisonError::into_inner(poisoned)
        });
        *guard = Arc::clone(&next);
        next
    }

    /// Re-read the configuration file and swap it in.
    ///
    /// The file is parsed before the lock is taken; on failure the previous
    /// snapshot stays active.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated
    pub fn reload(&self) -> Result<Arc<Config>> {
        let config = Config::load(&self.path)?;
        Ok(self.replace(config))
    }
}
