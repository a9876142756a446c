//! Swarm mode (token based) cluster bootstrap
//!
//! The first management node initializes the cluster; the manager and
//! worker join tokens and the bootstrap address it reports are then used by
//! every other node to join.

use super::NodeRole;
use crate::error::{G5kError, Result};
use crate::machine::{Machine, ProvisioningBackend};
use std::net::IpAddr;
use tokio::sync::RwLock;
use tracing::info;

/// Port of the swarm mode cluster management API
pub const SWARM_MODE_PORT: u16 = 2377;

#[derive(Debug, Clone, Default)]
struct JoinTokens {
    manager: String,
    worker: String,
    bootstrap_addr: String,
}

impl JoinTokens {
    fn is_initialized(&self) -> bool {
        !self.manager.is_empty() && !self.worker.is_empty()
    }
}

/// Swarm mode bootstrap state (`Uninitialized -> Initialized`)
///
/// Initialization holds the write lock for its whole duration, so two
/// management nodes can never both initialize.
#[derive(Debug, Default)]
pub struct SwarmModeCluster {
    tokens: RwLock<JoinTokens>,
}

impl SwarmModeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both join tokens are known
    pub async fn is_initialized(&self) -> bool {
        self.tokens.read().await.is_initialized()
    }

    /// Address nodes join through, once initialized
    pub async fn bootstrap_addr(&self) -> Option<String> {
        let tokens = self.tokens.read().await;
        tokens
            .is_initialized()
            .then(|| tokens.bootstrap_addr.clone())
    }

    /// Initialize the cluster on a management node
    pub async fn init_swarm_mode_cluster(
        &self,
        backend: &dyn ProvisioningBackend,
        manager: &Machine,
        advertise_addr: IpAddr,
    ) -> Result<()> {
        let mut tokens = self.tokens.write().await;
        if tokens.is_initialized() {
            return Err(G5kError::AlreadyInitialized);
        }

        info!("[{}] Initializing swarm mode cluster", manager.name);

        let run = |command: String| async move {
            backend
                .run_remote_command(manager, &command)
                .await
                .map(|out| out.trim().to_string())
                .map_err(|e| {
                    G5kError::Bootstrap(format!("'{}' on '{}': {}", command, manager.name, e))
                })
        };

        run(format!("docker swarm init --advertise-addr {}", advertise_addr)).await?;
        let manager_token = run("docker swarm join-token -q manager".to_string()).await?;
        let worker_token = run("docker swarm join-token -q worker".to_string()).await?;
        let node_addr = run("docker info --format '{{.Swarm.NodeAddr}}'".to_string()).await?;

        if manager_token.is_empty() || worker_token.is_empty() {
            return Err(G5kError::Bootstrap(format!(
                "'{}' returned empty join tokens",
                manager.name
            )));
        }

        let node_addr = if node_addr.is_empty() {
            advertise_addr.to_string()
        } else {
            node_addr
        };

        *tokens = JoinTokens {
            manager: manager_token,
            worker: worker_token,
            bootstrap_addr: format!("{}:{}", node_addr, SWARM_MODE_PORT),
        };

        Ok(())
    }

    /// Join the initialized cluster with the role's token
    pub async fn join_swarm_mode_cluster(
        &self,
        backend: &dyn ProvisioningBackend,
        machine: &Machine,
        role: NodeRole,
    ) -> Result<()> {
        let command = {
            let tokens = self.tokens.read().await;
            if !tokens.is_initialized() {
                return Err(G5kError::NotInitialized);
            }

            let token = match role {
                NodeRole::Manager => &tokens.manager,
                NodeRole::Worker => &tokens.worker,
            };
            format!("docker swarm join --token {} {}", token, tokens.bootstrap_addr)
        };

        info!("[{}] Joining swarm mode cluster as {}", machine.name, role);

        backend
            .run_remote_command(machine, &command)
            .await
            .map_err(|e| G5kError::Bootstrap(format!("'{}' failed to join: {}", machine.name, e)))?;

        Ok(())
    }
}
