//! Cluster: the nodes of one run and their mapping to deployed hosts

use super::config::GlobalConfig;
use super::executor::{ProvisioningExecutor, ProvisioningReport};
use super::node::{machine_name, Node};
use super::provision::ProvisionContext;
use crate::error::{G5kError, Result};
use crate::g5k::JobId;
use crate::machine::SshKeyPair;
use crate::network::{HostResolver, SystemResolver};
use crate::swarm::{Bootstrap, DiscoveryTokenService, NodeRole};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Nodes of a cluster, keyed by machine name
pub struct Cluster {
    config: GlobalConfig,
    nodes: BTreeMap<String, Node>,
    sites: BTreeSet<String>,
    resolver: Arc<dyn HostResolver>,
}

impl Cluster {
    /// Create an empty cluster resolving hostnames with the system resolver
    pub fn new(config: GlobalConfig) -> Self {
        Self::with_resolver(config, Arc::new(SystemResolver))
    }

    pub fn with_resolver(config: GlobalConfig, resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            config,
            nodes: BTreeMap::new(),
            sites: BTreeSet::new(),
            resolver,
        }
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Nodes ordered by machine name
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node(&self, machine_name: &str) -> Option<&Node> {
        self.nodes.get(machine_name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create `count` node placeholders named `{site}-0` to `{site}-(count-1)`
    pub fn create_nodes(&mut self, site: &str, count: usize) -> Result<()> {
        if !self.sites.insert(site.to_string()) {
            return Err(G5kError::Configuration(format!(
                "Site '{}' is already part of the cluster",
                site
            )));
        }

        for index in 0..count {
            let mut node = Node::new(site, index);
            if self.config.masters.contains(&node.machine_name) {
                node.role = NodeRole::Manager;
            }
            self.nodes.insert(node.machine_name.clone(), node);
        }

        debug!("Created {} node(s) for site '{}'", count, site);
        Ok(())
    }

    /// Every designated management node must be part of the reservation
    pub fn check_masters(&self) -> Result<()> {
        match self.config.masters.iter().find(|m| !self.nodes.contains_key(*m)) {
            Some(missing) => Err(G5kError::Configuration(format!(
                "Swarm master/manager node '{}' is not part of the reservation",
                missing
            ))),
            None => Ok(()),
        }
    }

    fn node_mut(&mut self, machine_name: &str) -> Result<&mut Node> {
        self.nodes.get_mut(machine_name).ok_or_else(|| {
            G5kError::Configuration(format!(
                "Node '{}' is not part of the reservation",
                machine_name
            ))
        })
    }

    /// Replace the key pair deployed on the nodes, before any reservation
    pub fn set_ssh_key(&mut self, ssh_key: SshKeyPair) {
        self.config.ssh_key = ssh_key;
    }

    /// Append engine flags to nodes, keyed by machine name
    pub fn set_engine_opts(&mut self, opts: &HashMap<String, Vec<String>>) -> Result<()> {
        for (machine_name, values) in opts {
            self.node_mut(machine_name)?
                .engine_opts
                .extend(values.iter().cloned());
        }
        Ok(())
    }

    /// Append engine labels to nodes, keyed by machine name
    pub fn set_engine_labels(&mut self, labels: &HashMap<String, Vec<String>>) -> Result<()> {
        for (machine_name, values) in labels {
            self.node_mut(machine_name)?
                .engine_labels
                .extend(values.iter().cloned());
        }
        Ok(())
    }

    /// Bind the hosts deployed for `site` to the site's placeholders, in order
    ///
    /// Every hostname is resolved before anything is recorded: a failure
    /// leaves the cluster untouched.
    pub async fn allocate_deployed_nodes_to_machines(
        &mut self,
        site: &str,
        job_id: JobId,
        deployed_nodes: &[String],
    ) -> Result<()> {
        let mut allocations: Vec<(String, &str, IpAddr)> = Vec::with_capacity(deployed_nodes.len());

        for (index, hostname) in deployed_nodes.iter().enumerate() {
            let name = machine_name(site, index);

            match self.nodes.get(&name) {
                None => {
                    return Err(G5kError::Allocation(format!(
                        "No machine '{}' to allocate deployed node '{}' to",
                        name, hostname
                    )))
                }
                Some(node) if node.is_allocated() => {
                    return Err(G5kError::Allocation(format!(
                        "Machine '{}' is already allocated",
                        name
                    )))
                }
                Some(_) => {}
            }

            let ip = self.resolver.resolve(hostname).await?;
            allocations.push((name, hostname.as_str(), ip));
        }

        for (name, hostname, ip) in allocations {
            self.node_mut(&name)?.allocate(job_id, hostname)?;
            self.config.hosts.insert(&name, ip);
            info!("Machine '{}' allocated to node '{}' ({})", name, hostname, ip);
        }

        Ok(())
    }

    /// Provision every node: management nodes first, sequentially, then the
    /// workers concurrently
    pub async fn provision_nodes(
        &self,
        tokens: &dyn DiscoveryTokenService,
    ) -> Result<ProvisioningReport> {
        self.check_masters()?;

        let masters: Vec<String> = self.config.masters.iter().cloned().collect();
        if let Some(unallocated) = masters.iter().find(|m| !self.config.hosts.contains(m)) {
            return Err(G5kError::Allocation(format!(
                "Swarm master/manager node '{}' was not deployed",
                unallocated
            )));
        }

        let bootstrap = Bootstrap::resolve(
            &self.config.management,
            &masters,
            &self.config.hosts,
            tokens,
        )
        .await?;

        let context = Arc::new(ProvisionContext {
            backend: self.config.backend.clone(),
            username: self.config.credentials.username.clone(),
            image: self.config.image.clone(),
            walltime: self.config.walltime.clone(),
            ssh_key: self.config.ssh_key.clone(),
            hosts: self.config.hosts.clone(),
            bootstrap,
            masters,
            weave_networking: self.config.weave_networking,
        });

        // lexical order, which is also the management nodes' provisioning order
        let nodes: Vec<Node> = self.nodes.values().cloned().collect();

        ProvisioningExecutor::new().run(context, nodes).await
    }
}
