//! Per-node provisioning sequence

use super::executor::NodeProvisioner;
use super::node::Node;
use crate::error::{G5kError, Result};
use crate::machine::{DriverConfig, Machine, MachineSpec, ProvisioningBackend, SshKeyPair};
use crate::network::{weave, zookeeper, HostsTable};
use crate::swarm::Bootstrap;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Read-only snapshot of everything a node needs to be provisioned
///
/// Built after every site has been allocated, so the hosts table is final.
pub struct ProvisionContext {
    pub backend: Arc<dyn ProvisioningBackend>,
    pub username: String,
    pub image: String,
    pub walltime: String,
    pub ssh_key: SshKeyPair,
    pub hosts: HostsTable,
    pub bootstrap: Bootstrap,
    /// Management nodes, in provisioning order
    pub masters: Vec<String>,
    pub weave_networking: bool,
}

impl ProvisionContext {
    fn machine_spec(&self, node: &Node) -> Result<MachineSpec> {
        let (hostname, job_id) = node.deployment()?;

        Ok(MachineSpec {
            name: node.machine_name.clone(),
            hostname: hostname.to_string(),
            address: self.hosts.get(&node.machine_name),
            driver: DriverConfig {
                site: node.site.clone(),
                job_id,
                username: self.username.clone(),
                image: self.image.clone(),
                walltime: self.walltime.clone(),
            },
            ssh_key: self.ssh_key.clone(),
            engine_opts: node.engine_opts.clone(),
            engine_labels: node.engine_labels.clone(),
        })
    }

    async fn run(&self, machine: &Machine, command: &str) -> Result<()> {
        debug!("[{}] {}", machine.name, command);
        self.backend.run_remote_command(machine, command).await?;
        Ok(())
    }

    async fn standalone_swarm(&self, node: &Node, machine: &Machine) -> Result<()> {
        let Bootstrap::Standalone(standalone) = &self.bootstrap else {
            return Ok(());
        };

        if node.is_master() && standalone.uses_zookeeper() {
            if let Some(command) = zookeeper::start_command(&node.machine_name, &self.masters) {
                info!("[{}] Starting Zookeeper", machine.name);
                self.run(machine, &command).await?;
            }
        }

        let swarm = standalone.node_config(&node.machine_name, node.is_master(), self.weave_networking);
        for command in swarm.commands() {
            self.run(machine, &command).await?;
        }

        Ok(())
    }

    async fn swarm_mode(&self, node: &Node, machine: &Machine) -> Result<()> {
        let Bootstrap::Mode(cluster) = &self.bootstrap else {
            return Ok(());
        };

        // the first manager initializes, every other node joins
        if node.is_master() && !cluster.is_initialized().await {
            let advertise_addr = self.hosts.get(&node.machine_name).ok_or_else(|| {
                G5kError::Bootstrap(format!(
                    "No address known for swarm manager '{}'",
                    node.machine_name
                ))
            })?;
            cluster
                .init_swarm_mode_cluster(self.backend.as_ref(), machine, advertise_addr)
                .await
        } else {
            cluster
                .join_swarm_mode_cluster(self.backend.as_ref(), machine, node.role)
                .await
        }
    }

    async fn overlay_network(&self, machine: &Machine) -> Result<()> {
        info!("[{}] Starting Weave networking", machine.name);

        for command in weave::net_commands() {
            self.run(machine, &command).await?;
        }

        if let Bootstrap::Standalone(standalone) = &self.bootstrap {
            self.run(machine, &weave::discovery_command(standalone.discovery()))
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl NodeProvisioner for ProvisionContext {
    async fn provision(&self, node: &Node) -> Result<()> {
        let spec = self.machine_spec(node)?;
        let machine = self.backend.create_machine(&spec).await?;

        self.run(&machine, &self.hosts.append_command()).await?;
        self.standalone_swarm(node, &machine).await?;

        if self.weave_networking {
            self.overlay_network(&machine).await?;
        }

        self.swarm_mode(node, &machine).await?;

        info!("[{}] Provisioned", machine.name);
        Ok(())
    }
}
