//! Test doubles for the external services

use crate::cluster::GlobalConfig;
use crate::error::{G5kError, Result};
use crate::g5k::{Credentials, JobId, ReservationClient};
use crate::machine::{Machine, MachineRecord, MachineSpec, ProvisioningBackend, SshKeyPair};
use crate::network::HostResolver;
use crate::swarm::DiscoveryTokenService;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Valid configuration around `backend`
pub fn config(backend: Arc<MockBackend>) -> GlobalConfig {
    GlobalConfig::new(
        backend,
        Credentials::new("alice", "pw"),
        SshKeyPair {
            private_key_path: "/tmp/docker-g5k-test/id_rsa".into(),
            public_key: "ssh-rsa AAAA test".to_string(),
        },
    )
}

/// Machine record as the backend would have saved it
pub fn record(name: &str, site: &str, job_id: JobId) -> MachineRecord {
    MachineRecord {
        name: name.to_string(),
        hostname: format!("{}.{}.grid5000.fr", name, site),
        driver: crate::machine::DriverConfig {
            site: site.to_string(),
            job_id,
            username: "alice".to_string(),
            image: "debian11-min".to_string(),
            walltime: "1:00:00".to_string(),
        },
        ssh_key_path: "/tmp/docker-g5k-test/id_rsa".into(),
        engine_opts: Vec::new(),
        engine_labels: Vec::new(),
        created_at: Utc::now(),
    }
}

/// In-memory backend recording every call
#[derive(Default)]
pub struct MockBackend {
    failing_commands: Vec<String>,
    failing_machines: HashSet<String>,
    commands: Mutex<Vec<(String, String)>>,
    created: Mutex<Vec<MachineSpec>>,
    records: Mutex<BTreeMap<String, MachineRecord>>,
    removed: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands starting with `prefix` fail
    pub fn failing_command(mut self, prefix: &str) -> Self {
        self.failing_commands.push(prefix.to_string());
        self
    }

    /// Creating machine `name` fails
    pub fn failing_machine(mut self, name: &str) -> Self {
        self.failing_machines.insert(name.to_string());
        self
    }

    pub fn with_record(self, record: MachineRecord) -> Self {
        self.records
            .lock()
            .unwrap()
            .insert(record.name.clone(), record);
        self
    }

    /// Every `(machine, command)` run so far
    pub fn commands(&self) -> Vec<(String, String)> {
        self.commands.lock().unwrap().clone()
    }

    pub fn commands_matching(&self, prefix: &str) -> Vec<(String, String)> {
        self.commands()
            .into_iter()
            .filter(|(_, command)| command.starts_with(prefix))
            .collect()
    }

    pub fn created_machines(&self) -> Vec<MachineSpec> {
        self.created.lock().unwrap().clone()
    }

    pub fn removed_machines(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProvisioningBackend for MockBackend {
    async fn create_machine(&self, spec: &MachineSpec) -> Result<Machine> {
        // recorded before the install, as the SSH backend does
        self.records.lock().unwrap().insert(
            spec.name.clone(),
            MachineRecord {
                name: spec.name.clone(),
                hostname: spec.hostname.clone(),
                driver: spec.driver.clone(),
                ssh_key_path: spec.ssh_key.private_key_path.clone(),
                engine_opts: spec.engine_opts.clone(),
                engine_labels: spec.engine_labels.clone(),
                created_at: Utc::now(),
            },
        );

        if self.failing_machines.contains(&spec.name) {
            return Err(G5kError::provisioning(&spec.name, "simulated engine install failure"));
        }

        self.created.lock().unwrap().push(spec.clone());

        Ok(Machine {
            name: spec.name.clone(),
            hostname: spec.hostname.clone(),
            ssh_key_path: spec.ssh_key.private_key_path.clone(),
        })
    }

    async fn run_remote_command(&self, machine: &Machine, command: &str) -> Result<String> {
        self.commands
            .lock()
            .unwrap()
            .push((machine.name.clone(), command.to_string()));

        if self.failing_commands.iter().any(|p| command.starts_with(p.as_str())) {
            return Err(G5kError::RemoteCommand {
                host: machine.hostname.clone(),
                message: "simulated failure".to_string(),
            });
        }

        let output = if command.ends_with("join-token -q manager") {
            "SWMTKN-manager\n"
        } else if command.ends_with("join-token -q worker") {
            "SWMTKN-worker\n"
        } else if command.starts_with("docker info") {
            "10.0.0.1\n"
        } else {
            ""
        };

        Ok(output.to_string())
    }

    async fn remove_machine(&self, name: &str) -> Result<()> {
        if self.records.lock().unwrap().remove(name).is_none() {
            return Err(G5kError::MachineNotFound(name.to_string()));
        }

        self.removed.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn list_machines(&self) -> Result<Vec<MachineRecord>> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }
}

/// Token service always issuing the same token
pub struct FixedTokenService {
    token: String,
    calls: AtomicUsize,
}

impl FixedTokenService {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryTokenService for FixedTokenService {
    async fn create_token(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.token.clone())
    }
}

/// Resolver backed by a fixed table
#[derive(Default)]
pub struct StaticResolver {
    addresses: HashMap<String, IpAddr>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hostname: &str, ip: &str) -> Self {
        self.addresses
            .insert(hostname.to_string(), ip.parse().unwrap());
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, hostname: &str) -> Result<IpAddr> {
        self.addresses.get(hostname).copied().ok_or_else(|| {
            G5kError::Allocation(format!("No IP address found for '{}' node", hostname))
        })
    }
}

/// Reservation client with one canned job per site
#[derive(Default)]
pub struct MockReservation {
    sites: HashMap<String, (JobId, Vec<String>)>,
    reserved: Mutex<Vec<(String, JobId)>>,
    deployments: Mutex<Vec<(String, String, String)>>,
    killed: Mutex<Vec<(String, JobId)>>,
}

impl MockReservation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserving on `site` returns `job_id` and deploys `hostnames`
    pub fn with_site(mut self, site: &str, job_id: JobId, hostnames: &[&str]) -> Self {
        self.sites.insert(
            site.to_string(),
            (job_id, hostnames.iter().map(|h| h.to_string()).collect()),
        );
        self
    }

    pub fn reserved(&self) -> Vec<(String, JobId)> {
        self.reserved.lock().unwrap().clone()
    }

    /// `(site, public key, image)` of every deployment
    pub fn deployments(&self) -> Vec<(String, String, String)> {
        self.deployments.lock().unwrap().clone()
    }

    pub fn killed(&self) -> Vec<(String, JobId)> {
        self.killed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReservationClient for MockReservation {
    async fn reserve_nodes(
        &self,
        site: &str,
        _count: usize,
        _properties: &str,
        _walltime: &str,
    ) -> Result<JobId> {
        let (job_id, _) = self
            .sites
            .get(site)
            .ok_or_else(|| G5kError::reservation(site, "no resources available"))?;

        self.reserved
            .lock()
            .unwrap()
            .push((site.to_string(), *job_id));
        Ok(*job_id)
    }

    async fn wait_until_job_is_ready(&self, _site: &str, _job_id: JobId) -> Result<()> {
        Ok(())
    }

    async fn deploy_nodes(
        &self,
        site: &str,
        ssh_public_key: &str,
        _job_id: JobId,
        image: &str,
    ) -> Result<Vec<String>> {
        self.deployments.lock().unwrap().push((
            site.to_string(),
            ssh_public_key.to_string(),
            image.to_string(),
        ));

        Ok(self
            .sites
            .get(site)
            .map(|(_, hostnames)| hostnames.clone())
            .unwrap_or_default())
    }

    async fn kill_job(&self, site: &str, job_id: JobId) -> Result<()> {
        self.killed
            .lock()
            .unwrap()
            .push((site.to_string(), job_id));
        Ok(())
    }
}
