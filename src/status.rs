use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// Number of hex characters kept from the URL digest.
const FINGERPRINT_LEN: usize = 8;

/// Derive the stable short identity of a probe target from its URL.
///
/// The URL bytes are hashed exactly as given, so `http://nas` and `http://nas/`
/// are different targets.
#[must_use]
pub fn fingerprint(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(FINGERPRINT_LEN);
    id
}

/// A single probe target derived from the configured services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Fingerprint of `url`
    pub id: String,
    /// Display name of the first service using this URL
    pub name: String,
    /// URL that is probed
    pub url: String,
}

impl Target {
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: fingerprint(&url),
            name: name.into(),
            url,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    #[default]
    Unknown,
    Up,
    Down,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Unknown => f.write_str("unknown"),
            ServiceState::Up => f.write_str("up"),
            ServiceState::Down => f.write_str("down"),
        }
    }
}

/// Status of every target from one probe cycle, keyed by fingerprint
pub type StatusMap = HashMap<String, ServiceState>;

/// Last known health of every target.
///
/// The map is never edited in place: each probe cycle hands over a complete
/// new map, so readers always see the results of exactly one cycle.
#[derive(Debug, Default)]
pub struct StatusStore {
    current: RwLock<Arc<StatusMap>>,
}

impl StatusStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current snapshot. Holding it does not block the next swap.
    pub fn snapshot(&self) -> Arc<StatusMap> {
        let guard = self.current.read().unwrap_or_else(|poisoned| {
            warn!("Status store lock was poisoned, recovering last snapshot");
            PoisonError::into_inner(poisoned)
        });
        Arc::clone(&guard)
    }

    /// State of a single target; targets never probed are `Unknown`.
    pub fn get(&self, id: &str) -> ServiceState {
        self.snapshot().get(id).copied().unwrap_or_default()
    }

    /// Installs `next` as the current snapshot and returns the one it replaced.
    pub fn replace(&self, next: StatusMap) -> Arc<StatusMap> {
        let mut guard = self.current.write().unwrap_or_else(|poisoned| {
            warn!("Status store lock was poisoned, overwriting snapshot");
            PoisonError::into_inner(poisoned)
        });
        std::mem::replace(&mut *guard, Arc::new(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let first = fingerprint("http://fake-target");
        let second = fingerprint("http://fake-target");
        assert_eq!(first, second);
        assert_eq!(first.len(), 8);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_fingerprint_known_value() {
        // sha256("") = e3b0c442...
        assert_eq!(fingerprint(""), "e3b0c442");
    }

    #[test]
    fn test_fingerprint_is_byte_exact() {
        assert_ne!(fingerprint("http://nas.lan"), fingerprint("http://nas.lan/"));
        assert_ne!(fingerprint("http://nas.lan"), fingerprint("http://NAS.lan"));
    }

    #[test]
    fn test_fingerprint_distinct_for_many_urls() {
        let ids: std::collections::HashSet<String> = (0..2000)
            .map(|i| fingerprint(&format!("http://host-{i}.lan:8080")))
            .collect();
        assert_eq!(ids.len(), 2000);
    }

    #[test]
    fn test_target_identity_follows_url() {
        let a = Target::new("Jellyfin", "http://media.lan");
        let b = Target::new("Media", "http://media.lan");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_service_state_serialization() {
        assert_eq!(serde_json::to_string(&ServiceState::Up).unwrap(), "\"up\"");
        assert_eq!(serde_json::to_string(&ServiceState::Down).unwrap(), "\"down\"");
        assert_eq!(ServiceState::Unknown.to_string(), "unknown");
    }

    #[test]
    fn test_status_store_unknown_by_default() {
        let store = StatusStore::new();
        assert_eq!(store.get("deadbeef"), ServiceState::Unknown);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_status_store_replace_returns_previous() {
        let store = StatusStore::new();
        let mut first = StatusMap::new();
        first.insert("a".to_string(), ServiceState::Up);
        store.replace(first);

        let held = store.snapshot();

        let mut second = StatusMap::new();
        second.insert("b".to_string(), ServiceState::Down);
        let previous = store.replace(second);

        assert_eq!(previous.get("a"), Some(&ServiceState::Up));
        // A reader holding the old snapshot keeps a complete view of that cycle.
        assert_eq!(held.len(), 1);
        assert_eq!(held.get("a"), Some(&ServiceState::Up));
        assert_eq!(store.get("a"), ServiceState::Unknown);
        assert_eq!(store.get("b"), ServiceState::Down);
    }

    #[test]
    fn test_status_store_readers_never_see_mixed_cycles() {
        let store = Arc::new(StatusStore::new());
        let ids: Vec<String> = (0..32).map(|i| format!("t{i}")).collect();

        let writer = {
            let store = Arc::clone(&store);
            let ids = ids.clone();
            std::thread::spawn(move || {
                for cycle in 0..500 {
                    let state = if cycle % 2 == 0 {
                        ServiceState::Up
                    } else {
                        ServiceState::Down
                    };
                    store.replace(ids.iter().map(|id| (id.clone(), state)).collect());
                }
            })
        };

        for _ in 0..500 {
            let snapshot = store.snapshot();
            let mut states = snapshot.values();
            if let Some(first) = states.next() {
                assert!(states.all(|s| s == first), "snapshot mixed two cycles");
                assert_eq!(snapshot.len(), ids.len());
            }
        }

        writer.join().unwrap();
    }
}
