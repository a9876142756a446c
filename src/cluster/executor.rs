//! Provisioning executor
//!
//! Management nodes are provisioned one after the other and any failure
//! among them aborts the run: workers would have nothing to join. Workers
//! are then provisioned concurrently; a failing worker is reported without
//! affecting its siblings.

use super::node::Node;
use crate::error::{G5kError, Result};
use crate::swarm::NodeRole;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Performs the provisioning of a single node
#[async_trait]
pub trait NodeProvisioner: Send + Sync + 'static {
    async fn provision(&self, node: &Node) -> Result<()>;
}

/// Progress of a provisioning run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorPhase {
    /// Management nodes are being provisioned, sequentially
    AwaitingManagement,
    /// Worker nodes are being provisioned, concurrently
    ProvisioningWorkers,
    Done,
}

/// Outcome of one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub machine_name: String,
    pub hostname: Option<String>,
    pub role: NodeRole,
    /// Error message when provisioning failed
    pub error: Option<String>,
}

impl NodeReport {
    fn new(node: &Node, error: Option<String>) -> Self {
        Self {
            machine_name: node.machine_name.clone(),
            hostname: node.hostname().map(str::to_string),
            role: node.role,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-node outcomes of a provisioning run, management nodes first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningReport {
    pub nodes: Vec<NodeReport>,
}

impl ProvisioningReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(|n| n.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(|n| !n.is_success())
    }

    pub fn all_succeeded(&self) -> bool {
        self.nodes.iter().all(NodeReport::is_success)
    }
}

/// Orders and parallelizes the provisioning of a cluster's nodes
pub struct ProvisioningExecutor {
    phase: watch::Sender<ExecutorPhase>,
}

impl Default for ProvisioningExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisioningExecutor {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(ExecutorPhase::AwaitingManagement);
        Self { phase }
    }

    pub fn phase(&self) -> ExecutorPhase {
        *self.phase.borrow()
    }

    /// Subscribe to phase changes
    pub fn watch_phase(&self) -> watch::Receiver<ExecutorPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: ExecutorPhase) {
        self.phase.send_replace(phase);
    }

    /// Provision `nodes`; returns once every started provisioning has completed
    ///
    /// Management nodes are taken in the order given. Returns an error only
    /// when a management node fails.
    pub async fn run<P: NodeProvisioner>(
        &self,
        provisioner: Arc<P>,
        nodes: Vec<Node>,
    ) -> Result<ProvisioningReport> {
        let (masters, workers): (Vec<Node>, Vec<Node>) =
            nodes.into_iter().partition(Node::is_master);

        let mut report = ProvisioningReport::default();

        self.set_phase(ExecutorPhase::AwaitingManagement);
        for node in &masters {
            info!(
                "Provisioning swarm master/manager node '{}' ('{}')...",
                node.machine_name,
                node.hostname().unwrap_or("-")
            );

            if let Err(e) = provisioner.provision(node).await {
                return Err(G5kError::Bootstrap(format!(
                    "Error while provisioning swarm master/manager node '{}' ('{}'): {}",
                    node.machine_name,
                    node.hostname().unwrap_or("-"),
                    e
                )));
            }

            report.nodes.push(NodeReport::new(node, None));
        }

        self.set_phase(ExecutorPhase::ProvisioningWorkers);
        if !workers.is_empty() {
            info!("Provisioning {} node(s), it will take a few minutes...", workers.len());
        }

        let tasks: Vec<_> = workers
            .into_iter()
            .map(|node| {
                let provisioner = provisioner.clone();
                let task_node = node.clone();
                let handle =
                    tokio::spawn(async move { provisioner.provision(&task_node).await });
                (node, handle)
            })
            .collect();

        for (node, handle) in tasks {
            let outcome = match handle.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => Some(format!("provisioning task failed: {}", e)),
            };

            match &outcome {
                None => info!("Node '{}' provisioned", node.machine_name),
                Some(e) => error!(
                    "Error while provisioning node '{}' ('{}'): {}",
                    node.machine_name,
                    node.hostname().unwrap_or("-"),
                    e
                ),
            }

            report.nodes.push(NodeReport::new(&node, outcome));
        }

        self.set_phase(ExecutorPhase::Done);
        Ok(report)
    }
}
