//! Cluster provisioning
//!
//! Turns a reservation request into a running cluster: node placeholders
//! are created per site, bound to the deployed hosts, then provisioned with
//! the management nodes first.

#[allow(clippy::module_inception)]
pub mod cluster;
pub mod config;
pub mod executor;
pub mod node;
pub mod provision;
pub mod reservation;

pub use cluster::Cluster;
pub use config::{ClusterManagement, GlobalConfig};
pub use executor::{ExecutorPhase, NodeProvisioner, NodeReport, ProvisioningExecutor, ProvisioningReport};
pub use node::Node;
pub use provision::ProvisionContext;
pub use reservation::{release_jobs, reserve_cluster};
