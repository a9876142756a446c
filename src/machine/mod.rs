//! Provisioning backend
//!
//! A machine is a deployed node the engine has been installed on. The
//! backend creates machines, runs commands on them and keeps a durable
//! record of every machine it created; `remove-cluster` relies on those
//! records to find the reservations to kill.

pub mod certs;
pub mod keypair;
pub mod ssh;
pub mod store;

pub use certs::CertificateAuthority;
pub use keypair::SshKeyPair;
pub use ssh::SshBackend;
pub use store::MachineStore;

use crate::error::Result;
use crate::g5k::JobId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Everything the backend needs to create one machine
#[derive(Debug, Clone)]
pub struct MachineSpec {
    /// Machine name (`{site}-{id}`)
    pub name: String,
    /// Hostname of the deployed node
    pub hostname: String,
    /// Resolved address of the node, added to its server certificate
    pub address: Option<IpAddr>,
    /// Reservation the node belongs to
    pub driver: DriverConfig,
    /// Key pair installed on the node at deployment
    pub ssh_key: SshKeyPair,
    /// Arbitrary engine flags (`key=value`)
    pub engine_opts: Vec<String>,
    /// Engine labels (`key=value`)
    pub engine_labels: Vec<String>,
}

/// Reservation-side configuration stored with each machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    pub site: String,
    pub job_id: JobId,
    pub username: String,
    pub image: String,
    pub walltime: String,
}

/// Handle on a created machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub name: String,
    pub hostname: String,
    pub ssh_key_path: PathBuf,
}

/// Durable record of a created machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineRecord {
    pub name: String,
    pub hostname: String,
    pub driver: DriverConfig,
    pub ssh_key_path: PathBuf,
    #[serde(default)]
    pub engine_opts: Vec<String>,
    #[serde(default)]
    pub engine_labels: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl MachineRecord {
    /// Handle usable for remote commands on a recorded machine
    pub fn machine(&self) -> Machine {
        Machine {
            name: self.name.clone(),
            hostname: self.hostname.clone(),
            ssh_key_path: self.ssh_key_path.clone(),
        }
    }
}

/// Backend creating and driving machines
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Record a deployed node, then install and configure its container engine
    ///
    /// The record is saved before any remote work, so the node's reservation
    /// can still be found when the installation fails.
    async fn create_machine(&self, spec: &MachineSpec) -> Result<Machine>;

    /// Run a shell command on a machine and return its standard output
    async fn run_remote_command(&self, machine: &Machine, command: &str) -> Result<String>;

    /// Forget a machine
    async fn remove_machine(&self, name: &str) -> Result<()>;

    /// Every recorded machine
    async fn list_machines(&self) -> Result<Vec<MachineRecord>>;
}
