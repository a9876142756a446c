//! Error types for docker-g5k

use thiserror::Error;

/// Result type for docker-g5k operations
pub type Result<T> = std::result::Result<T, G5kError>;

/// docker-g5k error types
#[derive(Error, Debug)]
pub enum G5kError {
    /// Missing or invalid input, detected before any external call
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Job submission, polling or deployment failure
    #[error("Reservation error on site '{site}': {message}")]
    Reservation { site: String, message: String },

    /// Hostname resolution or placeholder mapping mismatch
    #[error("Allocation error: {0}")]
    Allocation(String),

    /// Cluster-management init/join failure
    #[error("Bootstrap error: {0}")]
    Bootstrap(String),

    #[error("Swarm mode cluster is already initialized")]
    AlreadyInitialized,

    #[error("Swarm mode cluster is not initialized")]
    NotInitialized,

    /// Per-node provisioning failure
    #[error("Error while provisioning node '{machine}': {message}")]
    Provisioning { machine: String, message: String },

    #[error("Remote command failed on '{host}': {message}")]
    RemoteCommand { host: String, message: String },

    /// Certificate authority or certificate issuance failure
    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Machine not found: {0}")]
    MachineNotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl G5kError {
    pub(crate) fn reservation(site: &str, message: impl ToString) -> Self {
        G5kError::Reservation {
            site: site.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn provisioning(machine: &str, message: impl ToString) -> Self {
        G5kError::Provisioning {
            machine: machine.to_string(),
            message: message.to_string(),
        }
    }
}
