//! # Hearth Library
//!
//! Core of the Hearth homelab dashboard: it keeps every open browser tab
//! informed about service up/down transitions, host metrics and configuration
//! reloads over Server-Sent Events.
//!
//! ## Overview
//!
//! - `config`: Configuration model, loading and the swappable `ConfigStore`
//! - `watcher`: Reloads the configuration when its file changes
//! - `status`: Target fingerprints and the per-cycle `StatusStore`
//! - `uptime`: Periodic, concurrent health probing with change detection
//! - `metrics`: Periodic host CPU/memory/disk sampling
//! - `events` / `bus`: Event types and the non-blocking fan-out hub
//! - `stream`: The per-connection SSE handler
//! - `server`: Wires everything together behind an Axum router
//!
//! ## Getting Started
//!
//! ```no_run
//! use hearth::{config::CONFIG_FILE, server};
//! use std::path::PathBuf;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), hearth::error::HearthError> {
//!     let cancel_token = CancellationToken::new();
//!     let config_path = Some(PathBuf::from(CONFIG_FILE));
//!
//!     server::run(Some(3000), config_path, cancel_token).await
//! }
//! ```
//!
//! ## Delivery contract
//!
//! Publishing never waits on a client. Each client has a bounded outbox and
//! events that do not fit are dropped for that client only. Metrics arrive
//! every few seconds anyway, and a reconnecting client is sent the full
//! current status before any live event.

/// Custom error types module
///
/// Defines the `HearthError` enum used for consistent error handling across the
/// application.
pub mod error;

/// Configuration management module
///
/// Loads the JSON5 (or YAML) configuration, validates it and holds the active
/// snapshot in a `ConfigStore` that is swapped wholesale on reload.
pub mod config;

/// Configuration file watching
pub mod watcher;

/// Target identities and the last known status of every target
pub mod status;

/// Uptime monitoring module
///
/// Probes every configured service on a fixed period and publishes a `service`
/// event for each target whose state flipped since the previous cycle.
pub mod uptime;

/// Host metrics sampling
pub mod metrics;

/// Events pushed to dashboards
pub mod events;

/// Publish/subscribe hub with drop-on-full delivery
pub mod bus;

/// Server-Sent Events endpoint
pub mod stream;

/// Server operations module
///
/// Builds the shared state, spawns the background monitors and serves the
/// Axum router until the cancellation token fires.
pub mod server;
