//! Grid'5000 resource reservation
//!
//! Nodes are reserved through OAR jobs of type `deploy`, then the base image
//! is deployed on them with Kadeploy. Both are exposed per site by the REST
//! API.

pub mod api;
pub mod walltime;

pub use api::{ApiConfig, SiteApi};

use crate::error::{G5kError, Result};
use api::{DeploymentRequest, JobRequest};
use async_trait::async_trait;
use std::fmt;
use tracing::info;

/// OAR job identifier (unique within a site)
pub type JobId = u64;

/// Account credentials
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Reservation and deployment of nodes
#[async_trait]
pub trait ReservationClient: Send + Sync {
    /// Submit a job reserving `count` nodes on `site` and return its ID
    async fn reserve_nodes(
        &self,
        site: &str,
        count: usize,
        properties: &str,
        walltime: &str,
    ) -> Result<JobId>;

    /// Block until the job is running
    async fn wait_until_job_is_ready(&self, site: &str, job_id: JobId) -> Result<()>;

    /// Deploy `image` on the job's nodes, wait for it to finish and return the deployed hostnames
    async fn deploy_nodes(
        &self,
        site: &str,
        ssh_public_key: &str,
        job_id: JobId,
        image: &str,
    ) -> Result<Vec<String>>;

    async fn kill_job(&self, site: &str, job_id: JobId) -> Result<()>;
}

/// REST client covering every site
pub struct G5k {
    client: reqwest::Client,
    config: ApiConfig,
    credentials: Credentials,
}

impl G5k {
    pub fn new(credentials: Credentials, config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("docker-g5k/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    fn site<'a>(&'a self, site: &'a str) -> SiteApi<'a> {
        SiteApi::new(&self.client, &self.config, &self.credentials, site)
    }
}

#[async_trait]
impl ReservationClient for G5k {
    async fn reserve_nodes(
        &self,
        site: &str,
        count: usize,
        properties: &str,
        walltime: &str,
    ) -> Result<JobId> {
        let seconds = walltime::to_seconds(walltime)?;

        let request = JobRequest {
            resources: format!("nodes={},walltime={}", count, walltime),
            command: format!("sleep {}", seconds),
            properties: properties.to_string(),
            types: vec!["deploy".to_string()],
        };

        let job_id = self.site(site).submit_job(&request).await?;
        info!("Job '{}' submitted on site '{}' for {} node(s)", job_id, site, count);

        Ok(job_id)
    }

    async fn wait_until_job_is_ready(&self, site: &str, job_id: JobId) -> Result<()> {
        self.site(site).wait_until_job_is_ready(job_id).await?;
        Ok(())
    }

    async fn deploy_nodes(
        &self,
        site: &str,
        ssh_public_key: &str,
        job_id: JobId,
        image: &str,
    ) -> Result<Vec<String>> {
        let api = self.site(site);

        let job = api.get_job(job_id).await?;
        if job.assigned_nodes.is_empty() {
            return Err(G5kError::reservation(
                site,
                format!("job '{}' has no assigned nodes", job_id),
            ));
        }

        let request = DeploymentRequest {
            nodes: job.assigned_nodes,
            environment: image.to_string(),
            key: ssh_public_key.to_string(),
        };

        let deployment_id = api.submit_deployment(&request).await?;
        info!("Deployment '{}' submitted on site '{}'", deployment_id, site);

        let deployment = api.wait_until_deployment_is_finished(&deployment_id).await?;
        Ok(deployment.deployed_nodes())
    }

    async fn kill_job(&self, site: &str, job_id: JobId) -> Result<()> {
        self.site(site).kill_job(job_id).await
    }
}
