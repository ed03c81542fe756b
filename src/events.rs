use crate::status::ServiceState;
use serde::{Deserialize, Serialize};

/// Message pushed to every connected dashboard.
///
/// Serialized as `{"type": ..., "data": ...}`; `reload` carries no `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// Configuration was reloaded, clients should refresh their whole view
    #[serde(rename = "reload")]
    Reload,
    /// A target changed state since the previous probe cycle
    #[serde(rename = "service")]
    StatusChanged(StatusChange),
    /// Periodic host metrics sample
    #[serde(rename = "metrics")]
    MetricsSample(MetricsSample),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Target fingerprint
    pub id: String,
    pub status: ServiceState,
}

/// Host metrics; memory and disk in GiB, CPU in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    #[serde(rename = "CPULoad")]
    pub cpu_load: f64,
    #[serde(rename = "MemoryUsed")]
    pub memory_used: f64,
    #[serde(rename = "MemoryTotal")]
    pub memory_total: f64,
    #[serde(rename = "DiskUsed")]
    pub disk_used: f64,
    #[serde(rename = "DiskTotal")]
    pub disk_total: f64,
}

impl Event {
    #[must_use]
    pub fn status_changed(id: impl Into<String>, status: ServiceState) -> Self {
        Event::StatusChanged(StatusChange {
            id: id.into(),
            status,
        })
    }

    /// Wire name of the event kind, used in log lines
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Reload => "reload",
            Event::StatusChanged(_) => "service",
            Event::MetricsSample(_) => "metrics",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reload_has_no_data() {
        let value = serde_json::to_value(Event::Reload).unwrap();
        assert_eq!(value, json!({"type": "reload"}));
    }

    #[test]
    fn test_service_event_shape() {
        let value = serde_json::to_value(Event::status_changed("1a2b3c4d", ServiceState::Down))
            .unwrap();
        assert_eq!(
            value,
            json!({"type": "service", "data": {"id": "1a2b3c4d", "status": "down"}})
        );
    }

    #[test]
    fn test_metrics_event_field_names() {
        let event = Event::MetricsSample(MetricsSample {
            cpu_load: 12.5,
            memory_used: 3.0,
            memory_total: 16.0,
            disk_used: 100.0,
            disk_total: 500.0,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "metrics");
        assert_eq!(value["data"]["CPULoad"], 12.5);
        assert_eq!(value["data"]["MemoryUsed"], 3.0);
        assert_eq!(value["data"]["MemoryTotal"], 16.0);
        assert_eq!(value["data"]["DiskUsed"], 100.0);
        assert_eq!(value["data"]["DiskTotal"], 500.0);
        assert_eq!(event.kind(), "metrics");
    }
}
