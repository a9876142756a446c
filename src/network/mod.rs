//! Cluster networking
//!
//! Name resolution between nodes (hosts table), the coordination service
//! backing standalone swarm discovery, and the Weave overlay network.

pub mod hosts;
pub mod resolver;
pub mod weave;
pub mod zookeeper;

pub use hosts::HostsTable;
pub use resolver::{HostResolver, SystemResolver};
