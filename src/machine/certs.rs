//! TLS material securing the engines' remote API
//!
//! A single certificate authority, kept in the local data directory, signs a
//! client certificate for the local user and a server certificate for every
//! machine. Engines only accept clients presenting a certificate signed by it.

use crate::error::{G5kError, Result};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, SanType,
};
use std::net::IpAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, info};

const CA_COMMON_NAME: &str = "docker-g5k CA";

const CA_VALIDITY: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);
const LEAF_VALIDITY: Duration = Duration::from_secs(3 * 365 * 24 * 60 * 60);

pub const CA_CERT_FILE: &str = "ca.pem";
pub const CA_KEY_FILE: &str = "ca-key.pem";
pub const CLIENT_CERT_FILE: &str = "cert.pem";
pub const CLIENT_KEY_FILE: &str = "key.pem";

/// Directory holding the TLS material on every machine
pub const REMOTE_CERT_DIR: &str = "/etc/docker";
pub const REMOTE_CA_CERT: &str = "/etc/docker/ca.pem";
pub const REMOTE_SERVER_CERT: &str = "/etc/docker/server.pem";
pub const REMOTE_SERVER_KEY: &str = "/etc/docker/server-key.pem";

fn tls(context: &str) -> impl Fn(rcgen::Error) -> G5kError + '_ {
    move |e| G5kError::Tls(format!("{}: {}", context, e))
}

fn ca_params() -> Result<CertificateParams> {
    let mut params = CertificateParams::new(Vec::<String>::new())
        .map_err(tls("Failed to create CA certificate params"))?;

    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, CA_COMMON_NAME);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    let not_before = SystemTime::now();
    params.not_before = not_before.into();
    params.not_after = (not_before + CA_VALIDITY).into();

    Ok(params)
}

/// PEM encoded certificate with its private key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Certificate authority stored as `ca.pem` / `ca-key.pem` in its directory
#[derive(Debug, Clone)]
pub struct CertificateAuthority {
    dir: PathBuf,
    cert_pem: String,
    key_pem: String,
}

impl CertificateAuthority {
    /// Load the authority from `dir`, generating it on first use
    ///
    /// A client certificate (`cert.pem` / `key.pem`) is issued next to it
    /// when missing, so the local engine client can talk to the machines.
    pub async fn load_or_generate(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).await?;

        let cert_path = dir.join(CA_CERT_FILE);
        let key_path = dir.join(CA_KEY_FILE);

        let ca = if fs::try_exists(&cert_path).await? && fs::try_exists(&key_path).await? {
            debug!("Using certificate authority in {}", dir.display());
            Self {
                dir: dir.to_path_buf(),
                cert_pem: fs::read_to_string(&cert_path).await?,
                key_pem: fs::read_to_string(&key_path).await?,
            }
        } else {
            info!("Generating a new certificate authority in {}", dir.display());
            let key_pair = KeyPair::generate().map_err(tls("Failed to generate CA key pair"))?;
            let cert = ca_params()?
                .self_signed(&key_pair)
                .map_err(tls("Failed to generate CA certificate"))?;

            let ca = Self {
                dir: dir.to_path_buf(),
                cert_pem: cert.pem(),
                key_pem: key_pair.serialize_pem(),
            };
            write_pem(&cert_path, &ca.cert_pem, false).await?;
            write_pem(&key_path, &ca.key_pem, true).await?;
            ca
        };

        let client_cert_path = dir.join(CLIENT_CERT_FILE);
        if !fs::try_exists(&client_cert_path).await? {
            let client = ca.issue_client_certificate()?;
            write_pem(&client_cert_path, &client.cert_pem, false).await?;
            write_pem(&dir.join(CLIENT_KEY_FILE), &client.key_pem, true).await?;
        }

        Ok(ca)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Server certificate for an engine reachable under `names` and `addresses`
    ///
    /// The certificate is also valid for client authentication: the
    /// standalone swarm manager uses it to reach the other engines.
    pub fn issue_server_certificate(
        &self,
        names: &[String],
        addresses: &[IpAddr],
    ) -> Result<IssuedCertificate> {
        let common_name = names.first().map(String::as_str).unwrap_or("docker-g5k");

        let mut params = CertificateParams::new(names.to_vec())
            .map_err(tls("Failed to create server certificate params"))?;
        params
            .subject_alt_names
            .extend(addresses.iter().map(|ip| SanType::IpAddress(*ip)));
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];

        self.issue(params, common_name)
    }

    fn issue_client_certificate(&self) -> Result<IssuedCertificate> {
        let mut params = CertificateParams::new(Vec::<String>::new())
            .map_err(tls("Failed to create client certificate params"))?;
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];

        self.issue(params, "docker-g5k client")
    }

    fn issue(&self, mut params: CertificateParams, common_name: &str) -> Result<IssuedCertificate> {
        let ca_key = KeyPair::from_pem(&self.key_pem).map_err(tls("Failed to parse CA key"))?;
        // same name and key as the stored certificate, enough to sign with
        let ca_cert = ca_params()?
            .self_signed(&ca_key)
            .map_err(tls("Failed to load CA certificate for signing"))?;

        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, common_name);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        let not_before = SystemTime::now();
        params.not_before = not_before.into();
        params.not_after = (not_before + LEAF_VALIDITY).into();

        let key_pair = KeyPair::generate().map_err(tls("Failed to generate key pair"))?;
        let cert = params
            .signed_by(&key_pair, &ca_cert, &ca_key)
            .map_err(tls("Failed to sign certificate"))?;

        Ok(IssuedCertificate {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        })
    }
}

async fn write_pem(path: &Path, pem: &str, private: bool) -> Result<()> {
    fs::write(path, pem).await?;
    if private {
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    Ok(())
}

/// Command installing the CA and a server certificate in [`REMOTE_CERT_DIR`]
pub fn install_command(ca_cert_pem: &str, server: &IssuedCertificate) -> String {
    format!(
        "mkdir -p {dir} && printf '%s' '{ca}' > {ca_path} && printf '%s' '{cert}' > {cert_path} && printf '%s' '{key}' > {key_path} && chmod 600 {key_path}",
        dir = REMOTE_CERT_DIR,
        ca = ca_cert_pem,
        ca_path = REMOTE_CA_CERT,
        cert = server.cert_pem,
        cert_path = REMOTE_SERVER_CERT,
        key = server.key_pem,
        key_path = REMOTE_SERVER_KEY,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_generate_then_reload() {
        let temp = tempdir().unwrap();

        let ca = CertificateAuthority::load_or_generate(temp.path()).await.unwrap();
        assert!(ca.cert_pem().starts_with("-----BEGIN CERTIFICATE-----"));
        for file in [CA_CERT_FILE, CA_KEY_FILE, CLIENT_CERT_FILE, CLIENT_KEY_FILE] {
            assert!(temp.path().join(file).exists(), "{} missing", file);
        }

        let mode = std::fs::metadata(temp.path().join(CA_KEY_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);

        let reloaded = CertificateAuthority::load_or_generate(temp.path()).await.unwrap();
        assert_eq!(reloaded.cert_pem(), ca.cert_pem());
    }

    #[tokio::test]
    async fn test_issue_server_certificate() {
        let temp = tempdir().unwrap();
        let ca = CertificateAuthority::load_or_generate(temp.path()).await.unwrap();

        let server = ca
            .issue_server_certificate(
                &["lille-0".to_string(), "chifflet-1.lille.grid5000.fr".to_string()],
                &["10.0.0.1".parse().unwrap()],
            )
            .unwrap();

        assert!(server.cert_pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(server.key_pem.contains("PRIVATE KEY"));
        assert_ne!(server.cert_pem, ca.cert_pem());

        let other = ca.issue_server_certificate(&["lille-1".to_string()], &[]).unwrap();
        assert_ne!(other.key_pem, server.key_pem);
    }

    #[test]
    fn test_install_command() {
        let server = IssuedCertificate {
            cert_pem: "CERT".to_string(),
            key_pem: "KEY".to_string(),
        };

        let cmd = install_command("CA", &server);
        assert!(cmd.starts_with("mkdir -p /etc/docker && "));
        assert!(cmd.contains("printf '%s' 'CA' > /etc/docker/ca.pem"));
        assert!(cmd.contains("printf '%s' 'CERT' > /etc/docker/server.pem"));
        assert!(cmd.contains("printf '%s' 'KEY' > /etc/docker/server-key.pem"));
        assert!(cmd.ends_with("chmod 600 /etc/docker/server-key.pem"));
    }
}
