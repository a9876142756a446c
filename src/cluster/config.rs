//! Cluster-wide configuration

use crate::error::{G5kError, Result};
use crate::g5k::Credentials;
use crate::machine::{ProvisioningBackend, SshKeyPair};
use crate::network::HostsTable;
use crate::swarm::StandaloneConfig;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Default image deployed on the reserved nodes
pub const DEFAULT_IMAGE: &str = "debian11-min";

/// Default reservation walltime
pub const DEFAULT_WALLTIME: &str = "1:00:00";

/// Cluster-management layer installed on top of the engines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ClusterManagement {
    /// Plain engines, no cluster management
    #[default]
    None,
    /// Standalone (discovery based) swarm
    Standalone(StandaloneConfig),
    /// Swarm mode (token based)
    Mode,
}

impl ClusterManagement {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, ClusterManagement::None)
    }
}

/// Configuration shared by every node of a cluster, created once per run
pub struct GlobalConfig {
    /// Backend creating and driving the machines
    pub backend: Arc<dyn ProvisioningBackend>,
    /// Account credentials
    pub credentials: Credentials,
    /// Image deployed on the nodes
    pub image: String,
    /// Reservation walltime (`h:m:s`)
    pub walltime: String,
    /// OAR resource properties filter
    pub resource_properties: String,
    /// Key pair used by every node
    pub ssh_key: SshKeyPair,
    /// Machine name to address, filled while allocating nodes
    pub hosts: HostsTable,
    pub management: ClusterManagement,
    /// Machine names of the master/manager nodes
    pub masters: BTreeSet<String>,
    /// Weave overlay networking
    pub weave_networking: bool,
}

impl GlobalConfig {
    pub fn new(
        backend: Arc<dyn ProvisioningBackend>,
        credentials: Credentials,
        ssh_key: SshKeyPair,
    ) -> Self {
        Self {
            backend,
            credentials,
            image: DEFAULT_IMAGE.to_string(),
            walltime: DEFAULT_WALLTIME.to_string(),
            resource_properties: String::new(),
            ssh_key,
            hosts: HostsTable::new(),
            management: ClusterManagement::None,
            masters: BTreeSet::new(),
            weave_networking: false,
        }
    }

    /// Check settings that do not depend on the reserved nodes
    pub fn validate(&self) -> Result<()> {
        if self.credentials.username.is_empty() || self.credentials.password.is_empty() {
            return Err(G5kError::Configuration(
                "You must provide your Grid'5000 account username and password".to_string(),
            ));
        }

        if self.management.is_enabled() && self.masters.is_empty() {
            return Err(G5kError::Configuration(
                "You must select at least one swarm master/manager node".to_string(),
            ));
        }

        if let ClusterManagement::Standalone(standalone) = &self.management {
            if standalone.image.is_empty() {
                return Err(G5kError::Configuration(
                    "You must provide a swarm image".to_string(),
                ));
            }
            if standalone.strategy.is_empty() {
                return Err(G5kError::Configuration(
                    "You must provide a swarm strategy".to_string(),
                ));
            }
        }

        Ok(())
    }
}
