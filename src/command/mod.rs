//! Command-line commands

pub mod create_cluster;
pub mod flags;
pub mod list_cluster;
pub mod remove_cluster;

pub use create_cluster::CreateClusterArgs;
pub use remove_cluster::RemoveClusterArgs;

use crate::error::Result;
use crate::g5k::Credentials;
use crate::machine::ssh::SshConfig;
use crate::machine::{MachineStore, SshBackend};
use clap::Args;
use std::path::PathBuf;

/// Grid'5000 account
#[derive(Args, Debug, Clone)]
pub struct CredentialsArgs {
    /// Your Grid'5000 account username
    #[arg(long = "g5k-username", env = "G5K_USERNAME")]
    pub username: String,

    /// Your Grid'5000 account password
    #[arg(long = "g5k-password", env = "G5K_PASSWORD", hide_env_values = true)]
    pub password: String,
}

impl CredentialsArgs {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.username, &self.password)
    }
}

/// Local state directory
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("docker-g5k")
}

/// Backend over the local machine store
pub fn ssh_backend() -> Result<SshBackend> {
    let store = MachineStore::new(data_dir().join("machines"))?;
    Ok(SshBackend::new(SshConfig::default(), store))
}
