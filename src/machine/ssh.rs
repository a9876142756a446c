//! Provisioning backend driving deployed nodes over SSH
//!
//! Commands go through the system `ssh` client as root, authenticated with
//! the cluster key pair installed at deployment time.

use super::certs::{self, CertificateAuthority, REMOTE_CA_CERT, REMOTE_SERVER_CERT, REMOTE_SERVER_KEY};
use super::{Machine, MachineRecord, MachineSpec, MachineStore, ProvisioningBackend};
use crate::error::{G5kError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Port the engine listens on for TLS authenticated remote clients
pub const ENGINE_PORT: u16 = 2376;

const ENGINE_INSTALL: &str =
    "command -v docker >/dev/null 2>&1 || curl -fsSL https://get.docker.com | sh";

const ENGINE_DROP_IN: &str = "/etc/systemd/system/docker.service.d/10-docker-g5k.conf";

/// SSH backend configuration
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Remote user
    pub user: String,
    /// Connection attempts before giving up on a freshly deployed node
    pub connect_attempts: u32,
    /// Delay between connection attempts
    pub connect_retry_delay: Duration,
    /// Timeout of a single connection attempt, in seconds
    pub connect_timeout: u32,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            connect_attempts: 10,
            connect_retry_delay: Duration::from_secs(3),
            connect_timeout: 10,
        }
    }
}

/// Backend installing the engine over SSH and recording machines in a [`MachineStore`]
///
/// Creating machines requires a certificate authority, see [`SshBackend::with_tls`].
pub struct SshBackend {
    config: SshConfig,
    store: MachineStore,
    cert_dir: Option<PathBuf>,
    ca: OnceCell<CertificateAuthority>,
}

impl SshBackend {
    pub fn new(config: SshConfig, store: MachineStore) -> Self {
        Self {
            config,
            store,
            cert_dir: None,
            ca: OnceCell::new(),
        }
    }

    /// Secure the engines with the certificate authority kept in `cert_dir`
    ///
    /// The authority is loaded, or generated, when the first machine is created.
    pub fn with_tls(mut self, cert_dir: PathBuf) -> Self {
        self.cert_dir = Some(cert_dir);
        self
    }

    async fn certificate_authority(&self) -> Result<&CertificateAuthority> {
        let cert_dir = self.cert_dir.as_deref().ok_or_else(|| {
            G5kError::Tls("No certificate authority configured for the engines".to_string())
        })?;

        self.ca
            .get_or_try_init(|| CertificateAuthority::load_or_generate(cert_dir))
            .await
    }

    pub fn store(&self) -> &MachineStore {
        &self.store
    }

    async fn ssh(&self, machine: &Machine, command: &str) -> Result<String> {
        debug!("[{}] $ {}", machine.name, command);

        let output = Command::new("ssh")
            .arg("-i")
            .arg(&machine.ssh_key_path)
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.config.connect_timeout))
            .args([
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "UserKnownHostsFile=/dev/null",
                "-o",
                "LogLevel=quiet",
                "-o",
                "BatchMode=yes",
            ])
            .arg(format!("{}@{}", self.config.user, machine.hostname))
            .arg("--")
            .arg(command)
            .output()
            .await?;

        if !output.status.success() {
            return Err(G5kError::RemoteCommand {
                host: machine.hostname.clone(),
                message: format!(
                    "'{}' exited with {}: {}",
                    command,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn wait_for_ssh(&self, machine: &Machine) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.ssh(machine, "true").await {
                Ok(_) => return Ok(()),
                Err(e) if attempt >= self.config.connect_attempts => return Err(e),
                Err(e) => {
                    debug!("[{}] SSH not ready yet ({}): {}", machine.name, attempt, e);
                    attempt += 1;
                    tokio::time::sleep(self.config.connect_retry_delay).await;
                }
            }
        }
    }
}

/// dockerd arguments for the given arbitrary flags and labels
pub fn engine_flags(opts: &[String], labels: &[String]) -> String {
    let mut flags = vec![
        format!("-H tcp://0.0.0.0:{}", ENGINE_PORT),
        "-H unix:///var/run/docker.sock".to_string(),
        "--tlsverify".to_string(),
        format!("--tlscacert={}", REMOTE_CA_CERT),
        format!("--tlscert={}", REMOTE_SERVER_CERT),
        format!("--tlskey={}", REMOTE_SERVER_KEY),
    ];
    flags.extend(opts.iter().map(|o| format!("--{}", o)));
    flags.extend(labels.iter().map(|l| format!("--label {}", l)));
    flags.join(" ")
}

/// Command writing the engine drop-in unit and restarting the engine
pub fn engine_configure_command(opts: &[String], labels: &[String]) -> String {
    format!(
        "mkdir -p /etc/systemd/system/docker.service.d && printf '%s\\n' '[Service]' 'ExecStart=' 'ExecStart=/usr/bin/dockerd {}' > {} && systemctl daemon-reload && systemctl restart docker",
        engine_flags(opts, labels),
        ENGINE_DROP_IN
    )
}

#[async_trait]
impl ProvisioningBackend for SshBackend {
    async fn create_machine(&self, spec: &MachineSpec) -> Result<Machine> {
        let ca = self.certificate_authority().await?;

        if self.store.exists(&spec.name).await? {
            return Err(G5kError::provisioning(
                &spec.name,
                "a machine with this name already exists, remove the previous cluster first",
            ));
        }

        let machine = Machine {
            name: spec.name.clone(),
            hostname: spec.hostname.clone(),
            ssh_key_path: spec.ssh_key.private_key_path.clone(),
        };

        self.store
            .save(&MachineRecord {
                name: spec.name.clone(),
                hostname: spec.hostname.clone(),
                driver: spec.driver.clone(),
                ssh_key_path: machine.ssh_key_path.clone(),
                engine_opts: spec.engine_opts.clone(),
                engine_labels: spec.engine_labels.clone(),
                created_at: Utc::now(),
            })
            .await?;

        self.wait_for_ssh(&machine).await?;

        info!("[{}] Installing Docker Engine on '{}'", spec.name, spec.hostname);
        self.ssh(&machine, ENGINE_INSTALL).await?;

        let server = ca.issue_server_certificate(
            &[spec.name.clone(), spec.hostname.clone(), "localhost".to_string()],
            &spec
                .address
                .into_iter()
                .chain(std::iter::once(IpAddr::from([127, 0, 0, 1])))
                .collect::<Vec<_>>(),
        )?;
        self.ssh(&machine, &certs::install_command(ca.cert_pem(), &server))
            .await?;

        self.ssh(
            &machine,
            &engine_configure_command(&spec.engine_opts, &spec.engine_labels),
        )
        .await?;

        Ok(machine)
    }

    async fn run_remote_command(&self, machine: &Machine, command: &str) -> Result<String> {
        self.ssh(machine, command).await
    }

    async fn remove_machine(&self, name: &str) -> Result<()> {
        self.store.remove(name).await
    }

    async fn list_machines(&self) -> Result<Vec<MachineRecord>> {
        self.store.load_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{DriverConfig, SshKeyPair};
    use tempfile::tempdir;

    fn spec(name: &str) -> MachineSpec {
        MachineSpec {
            name: name.to_string(),
            // never resolves, the connection fails right away
            hostname: "docker-g5k-test.invalid".to_string(),
            address: None,
            driver: DriverConfig {
                site: "lille".to_string(),
                job_id: 5,
                username: "alice".to_string(),
                image: "debian11-min".to_string(),
                walltime: "1:00:00".to_string(),
            },
            ssh_key: SshKeyPair {
                private_key_path: "/tmp/docker-g5k-test/id_rsa".into(),
                public_key: "ssh-rsa AAAA test".to_string(),
            },
            engine_opts: Vec::new(),
            engine_labels: Vec::new(),
        }
    }

    fn backend(dir: &std::path::Path) -> SshBackend {
        let config = SshConfig {
            connect_attempts: 1,
            connect_retry_delay: Duration::ZERO,
            connect_timeout: 1,
            ..Default::default()
        };
        let store = MachineStore::new(dir.join("machines")).unwrap();
        SshBackend::new(config, store).with_tls(dir.join("certs"))
    }

    #[test]
    fn test_engine_flags() {
        let flags = engine_flags(
            &["debug=true".to_string(), "insecure-registry=10.0.0.1:5000".to_string()],
            &["rack=r1".to_string()],
        );

        assert_eq!(
            flags,
            "-H tcp://0.0.0.0:2376 -H unix:///var/run/docker.sock --tlsverify --tlscacert=/etc/docker/ca.pem --tlscert=/etc/docker/server.pem --tlskey=/etc/docker/server-key.pem --debug=true --insecure-registry=10.0.0.1:5000 --label rack=r1"
        );
    }

    #[test]
    fn test_engine_configure_command() {
        let cmd = engine_configure_command(&[], &[]);
        assert!(cmd.contains("'ExecStart=/usr/bin/dockerd -H tcp://0.0.0.0:2376 -H unix:///var/run/docker.sock --tlsverify "));
        assert!(!cmd.contains("2375"));
        assert!(cmd.ends_with("systemctl restart docker"));
    }

    #[tokio::test]
    async fn test_record_kept_when_node_unreachable() {
        let temp = tempdir().unwrap();
        let backend = backend(temp.path());

        assert!(backend.create_machine(&spec("lille-0")).await.is_err());
        assert!(temp.path().join("certs").join("ca.pem").exists());

        let records = backend.list_machines().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "lille-0");
        assert_eq!(records[0].driver.site, "lille");
        assert_eq!(records[0].driver.job_id, 5);
    }

    #[tokio::test]
    async fn test_existing_machine_rejected() {
        let temp = tempdir().unwrap();
        let backend = backend(temp.path());
        let _ = backend.create_machine(&spec("lille-0")).await;

        let result = backend.create_machine(&spec("lille-0")).await;
        assert!(matches!(result, Err(G5kError::Provisioning { .. })));
    }

    #[tokio::test]
    async fn test_create_requires_certificate_authority() {
        let temp = tempdir().unwrap();
        let store = MachineStore::new(temp.path().to_path_buf()).unwrap();
        let backend = SshBackend::new(SshConfig::default(), store);

        let result = backend.create_machine(&spec("lille-0")).await;
        assert!(matches!(result, Err(G5kError::Tls(_))));
        assert!(backend.list_machines().await.unwrap().is_empty());
    }
}
