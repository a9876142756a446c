//! `create-cluster`: reserve, deploy and provision a new cluster

use super::flags::{parse_node_flags, parse_reserve_nodes, parse_swarm_masters};
use super::{data_dir, ssh_backend, CredentialsArgs};
use crate::cluster::config::{DEFAULT_IMAGE, DEFAULT_WALLTIME};
use crate::cluster::{
    release_jobs, reserve_cluster, Cluster, ClusterManagement, GlobalConfig, ProvisioningReport,
};
use crate::error::{G5kError, Result};
use crate::g5k::{walltime, ApiConfig, JobId, ReservationClient, G5k};
use crate::machine::{ProvisioningBackend, SshKeyPair};
use crate::swarm::discovery::DEFAULT_TOKEN_SERVICE_URL;
use crate::swarm::{DiscoverySource, DiscoveryTokenService, HubTokenService, StandaloneConfig};
use chrono::Utc;
use clap::{Args, ValueEnum};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Discovery backend of a standalone swarm when no discovery string is given
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DiscoveryBackend {
    /// Zookeeper ensemble on the swarm master nodes
    #[default]
    Zookeeper,
    /// Token from the hosted discovery service
    Token,
}

/// `create-cluster` flags
#[derive(Args, Debug, Clone)]
pub struct CreateClusterArgs {
    #[command(flatten)]
    pub credentials: CredentialsArgs,

    /// Nodes to reserve, as 'site:count' (repeatable)
    #[arg(long = "g5k-reserve-nodes", required = true)]
    pub reserve_nodes: Vec<String>,

    /// Reservation walltime ('h:m:s')
    #[arg(long = "g5k-walltime", default_value = DEFAULT_WALLTIME)]
    pub walltime: String,

    /// Image deployed on the nodes
    #[arg(long = "g5k-image", default_value = DEFAULT_IMAGE)]
    pub image: String,

    /// OAR resource properties filter
    #[arg(long = "g5k-resource-properties", default_value = "")]
    pub resource_properties: String,

    /// Engine flag for a node, as 'site-id:key=value' (repeatable)
    #[arg(long = "engine-opt")]
    pub engine_opts: Vec<String>,

    /// Engine label for a node, as 'site-id:key=value' (repeatable)
    #[arg(long = "engine-label")]
    pub engine_labels: Vec<String>,

    /// Swarm master/manager node, as 'site-id' (repeatable)
    #[arg(long = "swarm-master")]
    pub swarm_masters: Vec<String>,

    /// Create a swarm mode cluster
    #[arg(long = "swarm-mode-enable", conflicts_with = "swarm_standalone")]
    pub swarm_mode: bool,

    /// Create a standalone swarm cluster
    #[arg(long = "swarm-standalone-enable")]
    pub swarm_standalone: bool,

    /// Standalone swarm image
    #[arg(long = "swarm-image", default_value = "swarm:latest")]
    pub swarm_image: String,

    /// Standalone swarm discovery string
    #[arg(long = "swarm-discovery")]
    pub swarm_discovery: Option<String>,

    /// Discovery backend used when no discovery string is given
    #[arg(long = "swarm-discovery-backend", value_enum, default_value_t = DiscoveryBackend::Zookeeper)]
    pub swarm_discovery_backend: DiscoveryBackend,

    /// Standalone swarm scheduling strategy
    #[arg(long = "swarm-strategy", default_value = "spread")]
    pub swarm_strategy: String,

    /// Standalone swarm master flag, as 'key=value' (repeatable)
    #[arg(long = "swarm-master-join-opt")]
    pub swarm_master_flags: Vec<String>,

    /// Standalone swarm join flag, as 'key=value' (repeatable)
    #[arg(long = "swarm-join-opt")]
    pub swarm_join_flags: Vec<String>,

    /// Enable Weave overlay networking
    #[arg(long = "weave-networking")]
    pub weave_networking: bool,
}

impl CreateClusterArgs {
    /// Cluster-management layer selected by the flags
    pub fn management(&self) -> Result<ClusterManagement> {
        match (self.swarm_mode, self.swarm_standalone) {
            (true, true) => Err(G5kError::Configuration(
                "Swarm mode and standalone swarm are mutually exclusive".to_string(),
            )),
            (true, false) => Ok(ClusterManagement::Mode),
            (false, true) => {
                let discovery = match (&self.swarm_discovery, self.swarm_discovery_backend) {
                    (Some(discovery), _) => DiscoverySource::Provided(discovery.clone()),
                    (None, DiscoveryBackend::Zookeeper) => DiscoverySource::Zookeeper,
                    (None, DiscoveryBackend::Token) => DiscoverySource::Token,
                };

                Ok(ClusterManagement::Standalone(StandaloneConfig {
                    image: self.swarm_image.clone(),
                    discovery,
                    strategy: self.swarm_strategy.clone(),
                    master_flags: self.swarm_master_flags.clone(),
                    join_flags: self.swarm_join_flags.clone(),
                }))
            }
            (false, false) => Ok(ClusterManagement::None),
        }
    }

    /// Validate the flags and build the cluster placeholders
    ///
    /// Nothing external is contacted; returns the cluster and the number of
    /// nodes to reserve per site.
    pub fn build_cluster(
        &self,
        backend: Arc<dyn ProvisioningBackend>,
        ssh_key: SshKeyPair,
    ) -> Result<(Cluster, BTreeMap<String, usize>)> {
        let sites = parse_reserve_nodes(&self.reserve_nodes)?;
        if sites.is_empty() {
            return Err(G5kError::Configuration(
                "You must reserve at least one node".to_string(),
            ));
        }

        walltime::to_seconds(&self.walltime)?;

        let mut config = GlobalConfig::new(backend, self.credentials.credentials(), ssh_key);
        config.image = self.image.clone();
        config.walltime = self.walltime.clone();
        config.resource_properties = self.resource_properties.clone();
        config.management = self.management()?;
        config.masters = parse_swarm_masters(&self.swarm_masters)?;
        config.weave_networking = self.weave_networking;
        config.validate()?;

        let mut cluster = Cluster::new(config);
        for (site, count) in &sites {
            cluster.create_nodes(site, *count)?;
        }
        cluster.check_masters()?;
        cluster.set_engine_opts(&parse_node_flags(&self.engine_opts)?)?;
        cluster.set_engine_labels(&parse_node_flags(&self.engine_labels)?)?;

        Ok((cluster, sites))
    }
}

/// Reserve and deploy every site, then provision the nodes
///
/// Without a working management node the cluster is unusable: its jobs are
/// killed and its machines forgotten before the error is returned. Worker
/// failures only show up in the report.
pub async fn create_cluster(
    cluster: &mut Cluster,
    sites: &BTreeMap<String, usize>,
    client: &dyn ReservationClient,
    tokens: &dyn DiscoveryTokenService,
) -> Result<ProvisioningReport> {
    let jobs = reserve_cluster(cluster, client, sites).await?;
    for (site, job_id) in &jobs {
        info!("Job '{}' is running on site '{}'", job_id, site);
    }

    let report = match cluster.provision_nodes(tokens).await {
        Ok(report) => report,
        Err(e) => {
            error!("Cluster provisioning failed, releasing the reserved nodes: {}", e);
            release_jobs(client, &jobs).await;
            forget_machines(cluster.config().backend.as_ref(), &jobs).await;
            return Err(e);
        }
    };

    let failed: Vec<&str> = report.failed().map(|n| n.machine_name.as_str()).collect();
    if failed.is_empty() {
        info!("{} node(s) provisioned", report.nodes.len());
    } else {
        warn!(
            "{} of {} node(s) provisioned, failed: {}",
            report.nodes.len() - failed.len(),
            report.nodes.len(),
            failed.join(", ")
        );
    }

    Ok(report)
}

async fn forget_machines(backend: &dyn ProvisioningBackend, jobs: &[(String, JobId)]) {
    let records = match backend.list_machines().await {
        Ok(records) => records,
        Err(e) => {
            warn!("Cannot list machines: {}", e);
            return;
        }
    };

    for record in records
        .iter()
        .filter(|r| jobs.contains(&(r.driver.site.clone(), r.driver.job_id)))
    {
        if let Err(e) = backend.remove_machine(&record.name).await {
            warn!("Cannot remove node '{}': {}", record.name, e);
        }
    }
}

/// Validate the flags, then generate the cluster key pair in `key_dir`
///
/// Invalid flags leave nothing behind on disk.
pub async fn prepare_cluster(
    args: &CreateClusterArgs,
    backend: Arc<dyn ProvisioningBackend>,
    key_dir: &Path,
) -> Result<(Cluster, BTreeMap<String, usize>)> {
    let pending_key = SshKeyPair {
        private_key_path: key_dir.join("id_rsa"),
        public_key: String::new(),
    };
    let (mut cluster, sites) = args.build_cluster(backend, pending_key)?;

    let ssh_key = SshKeyPair::generate(key_dir).await?;
    info!("Using SSH key pair {}", ssh_key.private_key_path.display());
    cluster.set_ssh_key(ssh_key);

    Ok((cluster, sites))
}

/// Run `create-cluster`
pub async fn run(args: CreateClusterArgs) -> Result<()> {
    let key_dir = data_dir()
        .join("keys")
        .join(Utc::now().format("%Y%m%d%H%M%S").to_string());
    let backend = Arc::new(ssh_backend()?.with_tls(data_dir().join("certs")));
    let (mut cluster, sites) = prepare_cluster(&args, backend, &key_dir).await?;

    let client = G5k::new(args.credentials.credentials(), ApiConfig::default())?;
    let tokens = HubTokenService::new(DEFAULT_TOKEN_SERVICE_URL)?;

    let report = create_cluster(&mut cluster, &sites, &client, &tokens).await?;
    for node in report.failed() {
        error!(
            "Node '{}' ('{}') is not part of the cluster: {}",
            node.machine_name,
            node.hostname.as_deref().unwrap_or("-"),
            node.error.as_deref().unwrap_or_default()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedTokenService, MockBackend, MockReservation};
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: CreateClusterArgs,
    }

    fn parse(flags: &[&str]) -> CreateClusterArgs {
        let mut argv = vec!["docker-g5k", "--g5k-username", "alice", "--g5k-password", "pw"];
        argv.extend_from_slice(flags);
        TestCli::try_parse_from(argv).unwrap().args
    }

    fn ssh_key() -> SshKeyPair {
        SshKeyPair {
            private_key_path: "/tmp/docker-g5k-test/id_rsa".into(),
            public_key: "ssh-rsa AAAA test".to_string(),
        }
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--g5k-reserve-nodes", "lille:2"]);
        assert_eq!(args.walltime, DEFAULT_WALLTIME);
        assert_eq!(args.image, DEFAULT_IMAGE);
        assert_eq!(args.management().unwrap(), ClusterManagement::None);
    }

    #[test]
    fn test_management_selection() {
        let args = parse(&["--g5k-reserve-nodes", "lille:2", "--swarm-mode-enable"]);
        assert_eq!(args.management().unwrap(), ClusterManagement::Mode);

        let args = parse(&[
            "--g5k-reserve-nodes",
            "lille:2",
            "--swarm-standalone-enable",
            "--swarm-discovery-backend",
            "token",
        ]);
        match args.management().unwrap() {
            ClusterManagement::Standalone(config) => {
                assert_eq!(config.discovery, DiscoverySource::Token);
                assert_eq!(config.image, "swarm:latest");
            }
            other => panic!("unexpected management: {:?}", other),
        }

        let args = parse(&[
            "--g5k-reserve-nodes",
            "lille:2",
            "--swarm-standalone-enable",
            "--swarm-discovery",
            "consul://10.0.0.9:8500",
        ]);
        match args.management().unwrap() {
            ClusterManagement::Standalone(config) => assert_eq!(
                config.discovery,
                DiscoverySource::Provided("consul://10.0.0.9:8500".to_string())
            ),
            other => panic!("unexpected management: {:?}", other),
        }
    }

    #[test]
    fn test_mode_and_standalone_conflict() {
        let argv = [
            "docker-g5k",
            "--g5k-username",
            "alice",
            "--g5k-password",
            "pw",
            "--g5k-reserve-nodes",
            "lille:2",
            "--swarm-mode-enable",
            "--swarm-standalone-enable",
        ];
        assert!(TestCli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_build_cluster() {
        let args = parse(&[
            "--g5k-reserve-nodes",
            "lille:2",
            "--g5k-reserve-nodes",
            "lyon:1",
            "--swarm-mode-enable",
            "--swarm-master",
            "lille-0",
            "--engine-opt",
            "lille-1:storage-driver=overlay2",
            "--engine-label",
            "lyon-0:disk=ssd",
        ]);

        let (cluster, sites) = args
            .build_cluster(Arc::new(MockBackend::new()), ssh_key())
            .unwrap();

        assert_eq!(sites.len(), 2);
        assert_eq!(cluster.len(), 3);
        assert!(cluster.node("lille-0").unwrap().is_master());
        assert_eq!(
            cluster.node("lille-1").unwrap().engine_opts,
            vec!["storage-driver=overlay2"]
        );
        assert_eq!(cluster.node("lyon-0").unwrap().engine_labels, vec!["disk=ssd"]);
    }

    #[test]
    fn test_build_cluster_rejects_invalid_input() {
        let backend: Arc<dyn ProvisioningBackend> = Arc::new(MockBackend::new());

        // management without master
        let args = parse(&["--g5k-reserve-nodes", "lille:2", "--swarm-mode-enable"]);
        assert!(args.build_cluster(backend.clone(), ssh_key()).is_err());

        // master outside the reservation
        let args = parse(&[
            "--g5k-reserve-nodes",
            "lille:2",
            "--swarm-mode-enable",
            "--swarm-master",
            "lyon-0",
        ]);
        assert!(args.build_cluster(backend.clone(), ssh_key()).is_err());

        // engine option for an unknown node
        let args = parse(&["--g5k-reserve-nodes", "lille:2", "--engine-opt", "lille-5:a=b"]);
        assert!(args.build_cluster(backend.clone(), ssh_key()).is_err());

        let args = parse(&["--g5k-reserve-nodes", "lille:2", "--g5k-walltime", "1:99"]);
        assert!(args.build_cluster(backend, ssh_key()).is_err());
    }

    #[tokio::test]
    async fn test_create_cluster_end_to_end() {
        let backend = Arc::new(MockBackend::new());
        let args = parse(&[
            "--g5k-reserve-nodes",
            "lille:2",
            "--swarm-mode-enable",
            "--swarm-master",
            "lille-0",
        ]);
        let (mut cluster, sites) = args.build_cluster(backend.clone(), ssh_key()).unwrap();

        // hostnames that resolve without any name service
        let client = MockReservation::new().with_site("lille", 5, &["127.0.0.1", "127.0.0.2"]);

        let report = create_cluster(&mut cluster, &sites, &client, &FixedTokenService::new("x"))
            .await
            .unwrap();

        assert!(report.all_succeeded());
        assert_eq!(backend.created_machines().len(), 2);
        assert_eq!(backend.commands_matching("docker swarm init").len(), 1);
        assert_eq!(backend.commands_matching("docker swarm join --token").len(), 1);
    }

    #[tokio::test]
    async fn test_management_failure_releases_jobs() {
        let backend = Arc::new(MockBackend::new().failing_machine("lille-0"));
        let args = parse(&[
            "--g5k-reserve-nodes",
            "lille:2",
            "--swarm-mode-enable",
            "--swarm-master",
            "lille-0",
        ]);
        let (mut cluster, sites) = args.build_cluster(backend.clone(), ssh_key()).unwrap();
        let client = MockReservation::new().with_site("lille", 5, &["127.0.0.1", "127.0.0.2"]);

        let result = create_cluster(&mut cluster, &sites, &client, &FixedTokenService::new("x")).await;

        assert!(matches!(result, Err(G5kError::Bootstrap(_))));
        assert_eq!(client.killed(), vec![("lille".to_string(), 5)]);
        assert!(backend.list_machines().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_worker_failure_keeps_jobs() {
        let backend = Arc::new(MockBackend::new().failing_machine("lille-1"));
        let args = parse(&[
            "--g5k-reserve-nodes",
            "lille:2",
            "--swarm-mode-enable",
            "--swarm-master",
            "lille-0",
        ]);
        let (mut cluster, sites) = args.build_cluster(backend.clone(), ssh_key()).unwrap();
        let client = MockReservation::new().with_site("lille", 5, &["127.0.0.1", "127.0.0.2"]);

        let report = create_cluster(&mut cluster, &sites, &client, &FixedTokenService::new("x"))
            .await
            .unwrap();

        assert!(!report.all_succeeded());
        assert!(client.killed().is_empty());
        // the failed worker stays recorded, remove-cluster finds its job
        assert_eq!(backend.list_machines().await.unwrap().len(), 2);
    }

    #[test]
    fn test_zero_nodes_rejected_before_reservation() {
        let args = parse(&["--g5k-reserve-nodes", "lille:0"]);
        let result = args.build_cluster(Arc::new(MockBackend::new()), ssh_key());
        assert!(matches!(result, Err(G5kError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_invalid_flags_leave_no_key_behind() {
        let temp = tempfile::tempdir().unwrap();
        let key_dir = temp.path().join("keys").join("20240101000000");
        let args = parse(&["--g5k-reserve-nodes", "lille:2", "--swarm-mode-enable"]);

        let result = prepare_cluster(&args, Arc::new(MockBackend::new()), &key_dir).await;

        assert!(matches!(result, Err(G5kError::Configuration(_))));
        assert!(!temp.path().join("keys").exists());
    }
}
