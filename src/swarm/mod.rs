//! Cluster-management bootstrap
//!
//! Decides how a joining node learns the cluster's rendezvous information:
//! a discovery string for standalone swarm, or join tokens obtained from
//! the first manager for swarm mode.

pub mod discovery;
pub mod mode;
pub mod standalone;

pub use discovery::{DiscoveryTokenService, HubTokenService};
pub use mode::SwarmModeCluster;
pub use standalone::{DiscoverySource, StandaloneBootstrap, StandaloneConfig, StandaloneNodeConfig};

use crate::cluster::config::ClusterManagement;
use crate::error::Result;
use crate::network::HostsTable;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Node role in the cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Worker node
    #[default]
    Worker,
    /// Master (standalone) / manager (swarm mode) node
    Manager,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Worker => write!(f, "worker"),
            NodeRole::Manager => write!(f, "manager"),
        }
    }
}

/// Cluster-management state used while provisioning
#[derive(Debug)]
pub enum Bootstrap {
    None,
    Standalone(StandaloneBootstrap),
    Mode(SwarmModeCluster),
}

impl Bootstrap {
    /// Resolve the bootstrap state from the configuration
    ///
    /// Must run after every site has been allocated (the hosts table is
    /// complete) and before any node is provisioned.
    pub async fn resolve(
        management: &ClusterManagement,
        masters: &[String],
        hosts: &HostsTable,
        tokens: &dyn DiscoveryTokenService,
    ) -> Result<Self> {
        Ok(match management {
            ClusterManagement::None => Bootstrap::None,
            ClusterManagement::Standalone(config) => Bootstrap::Standalone(
                StandaloneBootstrap::resolve(config.clone(), masters, hosts, tokens).await?,
            ),
            ClusterManagement::Mode => Bootstrap::Mode(SwarmModeCluster::new()),
        })
    }
}
