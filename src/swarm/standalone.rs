//! Standalone (discovery based) swarm
//!
//! The discovery string is resolved once, after every node has been
//! allocated and before any node is provisioned. Node configurations are
//! then derived from it without side effects.

use super::discovery::{token_discovery, DiscoveryTokenService};
use crate::error::{G5kError, Result};
use crate::machine::certs::{REMOTE_CA_CERT, REMOTE_CERT_DIR, REMOTE_SERVER_CERT, REMOTE_SERVER_KEY};
use crate::machine::ssh::ENGINE_PORT;
use crate::network::weave::WEAVE_PROXY_PORT;
use crate::network::zookeeper::{coordination_service_url, ZOOKEEPER_SCHEME};
use crate::network::HostsTable;
use tracing::info;

/// Port the swarm manager listens on
pub const SWARM_MANAGER_PORT: u16 = 3376;

/// Where the discovery string comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverySource {
    /// User supplied discovery string
    Provided(String),
    /// Token issued by the hosted token service
    Token,
    /// Zookeeper ensemble started on the management nodes
    Zookeeper,
}

/// Standalone swarm settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandaloneConfig {
    /// Swarm image
    pub image: String,
    pub discovery: DiscoverySource,
    /// Scheduling strategy
    pub strategy: String,
    /// Extra flags for `swarm manage` (`key=value`)
    pub master_flags: Vec<String>,
    /// Extra flags for `swarm join` (`key=value`)
    pub join_flags: Vec<String>,
}

impl Default for StandaloneConfig {
    fn default() -> Self {
        Self {
            image: "swarm:latest".to_string(),
            discovery: DiscoverySource::Zookeeper,
            strategy: "spread".to_string(),
            master_flags: Vec::new(),
            join_flags: Vec::new(),
        }
    }
}

/// Standalone swarm with its discovery string resolved
#[derive(Debug, Clone)]
pub struct StandaloneBootstrap {
    config: StandaloneConfig,
    discovery: String,
}

impl StandaloneBootstrap {
    /// Resolve the discovery string
    ///
    /// `masters` must already be present in `hosts` when the Zookeeper source is used.
    pub async fn resolve(
        config: StandaloneConfig,
        masters: &[String],
        hosts: &HostsTable,
        tokens: &dyn DiscoveryTokenService,
    ) -> Result<Self> {
        let discovery = match &config.discovery {
            DiscoverySource::Provided(discovery) => discovery.clone(),
            DiscoverySource::Token => {
                let token = tokens.create_token().await?;
                info!("New swarm discovery token generated: '{}'", token);
                token_discovery(&token)
            }
            DiscoverySource::Zookeeper => {
                if masters.is_empty() {
                    return Err(G5kError::Bootstrap(
                        "Zookeeper discovery requires at least one swarm master".to_string(),
                    ));
                }
                if let Some(missing) = masters.iter().find(|m| !hosts.contains(m)) {
                    return Err(G5kError::Bootstrap(format!(
                        "No address known for swarm master '{}'",
                        missing
                    )));
                }

                info!("No swarm discovery provided, Zookeeper will be deployed on each master node");
                coordination_service_url(ZOOKEEPER_SCHEME, masters, hosts)
            }
        };

        Ok(Self { config, discovery })
    }

    pub fn discovery(&self) -> &str {
        &self.discovery
    }

    /// Whether management nodes run the Zookeeper ensemble
    pub fn uses_zookeeper(&self) -> bool {
        self.config.discovery == DiscoverySource::Zookeeper
    }

    /// Swarm configuration of one node
    pub fn node_config(&self, machine_name: &str, is_master: bool, overlay: bool) -> StandaloneNodeConfig {
        let advertise_port = if overlay { WEAVE_PROXY_PORT } else { ENGINE_PORT };

        StandaloneNodeConfig {
            image: self.config.image.clone(),
            discovery: self.discovery.clone(),
            is_master,
            address: machine_name.to_string(),
            advertise: format!("{}:{}", machine_name, advertise_port),
            strategy: self.config.strategy.clone(),
            master_flags: self.config.master_flags.clone(),
            join_flags: self.config.join_flags.clone(),
        }
    }
}

/// Swarm containers to run on one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandaloneNodeConfig {
    pub image: String,
    pub discovery: String,
    pub is_master: bool,
    /// Machine name, resolvable on every node through the hosts table
    pub address: String,
    /// Engine endpoint advertised to the swarm
    pub advertise: String,
    pub strategy: String,
    pub master_flags: Vec<String>,
    pub join_flags: Vec<String>,
}

fn as_flags(flags: &[String]) -> String {
    flags
        .iter()
        .map(|f| format!(" --{}", f))
        .collect::<String>()
}

impl StandaloneNodeConfig {
    /// `swarm manage` command (management nodes only)
    ///
    /// The manager reuses the node's server certificate, both to serve its
    /// own endpoint and to reach the engines.
    pub fn manage_command(&self) -> Option<String> {
        if !self.is_master {
            return None;
        }

        Some(format!(
            "docker run -d --restart=always --net=host -v {dir}:{dir}:ro --name swarm-agent-master {} manage --tlsverify --tlscacert={} --tlscert={} --tlskey={} -H tcp://0.0.0.0:{} --strategy {} --advertise {}:{}{} {}",
            self.image,
            REMOTE_CA_CERT,
            REMOTE_SERVER_CERT,
            REMOTE_SERVER_KEY,
            SWARM_MANAGER_PORT,
            self.strategy,
            self.address,
            SWARM_MANAGER_PORT,
            as_flags(&self.master_flags),
            self.discovery,
            dir = REMOTE_CERT_DIR,
        ))
    }

    /// `swarm join` command (every node)
    pub fn join_command(&self) -> String {
        format!(
            "docker run -d --restart=always --net=host --name swarm-agent {} join --advertise {}{} {}",
            self.image,
            self.advertise,
            as_flags(&self.join_flags),
            self.discovery
        )
    }

    /// Commands to run on the node, manager first
    pub fn commands(&self) -> Vec<String> {
        self.manage_command()
            .into_iter()
            .chain(std::iter::once(self.join_command()))
            .collect()
    }
}
