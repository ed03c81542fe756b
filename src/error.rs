//! Custom error types for the Hearth dashboard
//!
//! This module defines the crate error type and implements the necessary traits
//! to properly propagate errors from configuration loading, file watching,
//! host sampling and the HTTP server.

use std::fmt;

/// Main error type for the Hearth application
#[derive(Debug)]
pub enum HearthError {
    /// Error occurred while parsing address
    AddressParse(std::net::AddrParseError),

    /// Error occurred while binding or running the server
    ServerRun(std::io::Error),

    /// Error occurred while reading configuration file
    ConfigRead(std::io::Error),

    /// Any other file system or process I/O failure
    Io(std::io::Error),

    /// Error occurred while parsing a JSON5 configuration
    ConfigParse(json5::Error),

    /// Error occurred while parsing a YAML configuration
    ConfigYaml(serde_yaml::Error),

    /// Configuration parsed but failed validation
    ConfigInvalid(String),

    /// Error reported by the file system watcher
    Watch(notify::Error),

    /// Error occurred while building the probe HTTP client
    Http(reqwest::Error),

    /// Host metrics could not be sampled
    Metrics(String),

    /// Generic error with a message
    Generic(String),
}

impl fmt::Display for HearthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HearthError::AddressParse(e) => {
                write!(f, "Failed to parse network address: {e}")
            }
            HearthError::ServerRun(e) => {
                write!(f, "Server runtime error: {e}")
            }
            HearthError::ConfigRead(e) => {
                write!(f, "Failed to read configuration file: {e}")
            }
            HearthError::Io(e) => {
                write!(f, "I/O error: {e}")
            }
            HearthError::ConfigParse(e) => {
                write!(f, "Failed to parse configuration: {e}")
            }
            HearthError::ConfigYaml(e) => {
                write!(f, "Failed to parse configuration: {e}")
            }
            HearthError::ConfigInvalid(msg) => {
                write!(f, "Invalid configuration: {msg}")
            }
            HearthError::Watch(e) => {
                write!(f, "Configuration watcher error: {e}")
            }
            HearthError::Http(e) => {
                write!(f, "HTTP client error: {e}")
            }
            HearthError::Metrics(msg) => {
                write!(f, "Failed to sample host metrics: {msg}")
            }
            HearthError::Generic(msg) => {
                write!(f, "Error: {msg}")
            }
        }
    }
}

impl std::error::Error for HearthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HearthError::AddressParse(e) => Some(e),
            HearthError::ServerRun(e) | HearthError::ConfigRead(e) | HearthError::Io(e) => {
                Some(e)
            }
            HearthError::ConfigParse(e) => Some(e),
            HearthError::ConfigYaml(e) => Some(e),
            HearthError::Watch(e) => Some(e),
            HearthError::Http(e) => Some(e),
            HearthError::ConfigInvalid(_) | HearthError::Metrics(_) | HearthError::Generic(_) => {
                None
            }
        }
    }
}

impl From<std::net::AddrParseError> for HearthError {
    fn from(error: std::net::AddrParseError) -> Self {
        HearthError::AddressParse(error)
    }
}

impl From<std::io::Error> for HearthError {
    fn from(error: std::io::Error) -> Self {
        HearthError::Io(error)
    }
}

impl From<json5::Error> for HearthError {
    fn from(error: json5::Error) -> Self {
        HearthError::ConfigParse(error)
    }
}

impl From<serde_yaml::Error> for HearthError {
    fn from(error: serde_yaml::Error) -> Self {
        HearthError::ConfigYaml(error)
    }
}

impl From<notify::Error> for HearthError {
    fn from(error: notify::Error) -> Self {
        HearthError::Watch(error)
    }
}

impl From<reqwest::Error> for HearthError {
    fn from(error: reqwest::Error) -> Self {
        HearthError::Http(error)
    }
}

impl From<&str> for HearthError {
    fn from(message: &str) -> Self {
        HearthError::Generic(message.to_string())
    }
}

impl From<String> for HearthError {
    fn from(message: String) -> Self {
        HearthError::Generic(message)
    }
}

/// Result type alias using our custom error type
pub type Result<T> = std::result::Result<T, HearthError>;
