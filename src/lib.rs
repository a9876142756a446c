//! docker-g5k - Docker clusters on Grid'5000
//!
//! Reserves bare-metal nodes on one or more Grid'5000 sites, deploys an
//! image on them and turns them into a Docker cluster:
//!
//! - Node reservation and deployment through the Grid'5000 REST API
//! - Engine installation and configuration over SSH
//! - Swarm mode or standalone swarm bootstrap
//! - Zookeeper discovery and Weave overlay networking

pub mod cluster;
pub mod command;
pub mod error;
pub mod g5k;
pub mod machine;
pub mod network;
pub mod swarm;

#[cfg(test)]
mod testing;

pub use error::{G5kError, Result};
