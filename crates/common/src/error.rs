//! Error types for Fleetwire

use thiserror::Error;

/// Result type alias using Fleetwire Error
pub type Result<T> = std::result::Result<T, Error>;

/// Fleetwire error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error("Duplicate mesh address {addr}: assigned to both {first} and {second}")]
    DuplicateAddress {
        addr: String,
        first: String,
        second: String,
    },

    #[error("Host {host} failed during {step}: {message}")]
    HostOperation {
        host: String,
        step: String,
        message: String,
    },

    #[error("Command `{program}` failed: {stderr}")]
    CommandFailed { program: String, stderr: String },

    #[error("Resource not found: {kind} {id}")]
    NotFound { kind: String, id: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap any error as a host-scoped provisioning failure.
    pub fn host_op(host: &str, step: &str, err: impl std::fmt::Display) -> Self {
        Error::HostOperation {
            host: host.to_string(),
            step: step.to_string(),
            message: err.to_string(),
        }
    }
}
