//! SSH key pair shared by every node of a cluster

use crate::error::{G5kError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

/// Key pair installed on the nodes at deployment and used for every remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKeyPair {
    /// Path of the private key
    pub private_key_path: PathBuf,
    /// OpenSSH public key
    pub public_key: String,
}

impl SshKeyPair {
    /// Generate a new RSA key pair named `id_rsa` in `dir`
    pub async fn generate(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).await?;

        let private_key_path = dir.join("id_rsa");
        let public_key_path = dir.join("id_rsa.pub");

        // ssh-keygen prompts before overwriting
        for path in [&private_key_path, &public_key_path] {
            if fs::try_exists(path).await? {
                fs::remove_file(path).await?;
            }
        }

        let output = Command::new("ssh-keygen")
            .args(["-q", "-t", "rsa", "-b", "2048", "-N", "", "-f"])
            .arg(&private_key_path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(G5kError::Configuration(format!(
                "Failed to generate SSH key pair: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!("Generated SSH key pair in {}", dir.display());

        Self::load(&private_key_path).await
    }

    /// Load an existing key pair, the public key being `<private>.pub`
    pub async fn load(private_key_path: &Path) -> Result<Self> {
        let mut public_key_path = private_key_path.as_os_str().to_owned();
        public_key_path.push(".pub");

        let public_key = fs::read_to_string(PathBuf::from(public_key_path)).await?;

        Ok(Self {
            private_key_path: private_key_path.to_path_buf(),
            public_key: public_key.trim().to_string(),
        })
    }
}
