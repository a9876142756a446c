//! Grid'5000 REST API client for a single site

use super::{Credentials, JobId};
use crate::error::{G5kError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// API client configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the API (sites are below `{base_url}/sites/{site}`)
    pub base_url: String,
    /// Delay between two polls of a job or deployment
    pub poll_interval: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.grid5000.fr/stable".to_string(),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Job submission request
#[derive(Debug, Clone, Serialize)]
pub struct JobRequest {
    pub resources: String,
    pub command: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub properties: String,
    pub types: Vec<String>,
}

/// OAR job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Launching,
    Running,
    Hold,
    #[serde(rename = "tolaunch")]
    ToLaunch,
    #[serde(rename = "toerror")]
    ToError,
    Finishing,
    Terminated,
    Error,
    #[serde(other)]
    Unknown,
}

impl JobState {
    /// The job ended and its nodes will never become available
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            JobState::Terminated | JobState::Error | JobState::ToError | JobState::Finishing
        )
    }
}

/// Job as returned by the API
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub uid: JobId,
    pub state: JobState,
    #[serde(default)]
    pub assigned_nodes: Vec<String>,
}

/// Deployment submission request
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentRequest {
    pub nodes: Vec<String>,
    pub environment: String,
    pub key: String,
}

/// Kadeploy deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Waiting,
    Processing,
    Terminated,
    Canceled,
    Error,
    #[serde(other)]
    Unknown,
}

/// Per-node result of a deployment
#[derive(Debug, Clone, Deserialize)]
pub struct NodeDeploymentResult {
    pub state: String,
}

/// Deployment as returned by the API
#[derive(Debug, Clone, Deserialize)]
pub struct Deployment {
    pub uid: String,
    pub status: DeploymentStatus,
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub result: HashMap<String, NodeDeploymentResult>,
}

impl Deployment {
    /// Nodes the image was deployed on, in the order they were requested
    pub fn deployed_nodes(&self) -> Vec<String> {
        if self.result.is_empty() {
            return self.nodes.clone();
        }

        self.nodes
            .iter()
            .filter(|n| {
                self.result
                    .get(n.as_str())
                    .map(|r| r.state == "OK")
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct DeploymentSubmitted {
    uid: String,
}

/// API client bound to one site
pub struct SiteApi<'a> {
    client: &'a reqwest::Client,
    config: &'a ApiConfig,
    credentials: &'a Credentials,
    site: &'a str,
}

impl<'a> SiteApi<'a> {
    pub fn new(
        client: &'a reqwest::Client,
        config: &'a ApiConfig,
        credentials: &'a Credentials,
        site: &'a str,
    ) -> Self {
        Self {
            client,
            config,
            credentials,
            site,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/sites/{}/{}", self.config.base_url, self.site, path)
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(G5kError::reservation(
            self.site,
            format!("API returned {}: {}", status, body.trim()),
        ))
    }

    /// Submit a job and return its ID
    pub async fn submit_job(&self, request: &JobRequest) -> Result<JobId> {
        let response = self
            .client
            .post(self.url("jobs"))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .json(request)
            .send()
            .await?;

        let job: Job = self.check(response).await?.json().await?;
        Ok(job.uid)
    }

    pub async fn get_job(&self, job_id: JobId) -> Result<Job> {
        let response = self
            .client
            .get(self.url(&format!("jobs/{}", job_id)))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await?;

        Ok(self.check(response).await?.json().await?)
    }

    pub async fn kill_job(&self, job_id: JobId) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("jobs/{}", job_id)))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await?;

        self.check(response).await?;
        Ok(())
    }

    /// Poll the job until it is running
    pub async fn wait_until_job_is_ready(&self, job_id: JobId) -> Result<Job> {
        info!("Waiting for job '{}' on site '{}' to be running...", job_id, self.site);

        loop {
            let job = self.get_job(job_id).await?;
            debug!("Job '{}' on site '{}' is {:?}", job_id, self.site, job.state);

            if job.state == JobState::Running {
                return Ok(job);
            }
            if job.state.is_final() {
                return Err(G5kError::reservation(
                    self.site,
                    format!("job '{}' ended in state {:?}", job_id, job.state),
                ));
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Submit a deployment and return its ID
    pub async fn submit_deployment(&self, request: &DeploymentRequest) -> Result<String> {
        let response = self
            .client
            .post(self.url("deployments"))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .json(request)
            .send()
            .await?;

        let deployment: DeploymentSubmitted = self.check(response).await?.json().await?;
        Ok(deployment.uid)
    }

    pub async fn get_deployment(&self, deployment_id: &str) -> Result<Deployment> {
        let response = self
            .client
            .get(self.url(&format!("deployments/{}", deployment_id)))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await?;

        Ok(self.check(response).await?.json().await?)
    }

    /// Poll the deployment until it terminates
    pub async fn wait_until_deployment_is_finished(&self, deployment_id: &str) -> Result<Deployment> {
        info!(
            "Waiting for deployment '{}' on site '{}' to finish...",
            deployment_id, self.site
        );

        loop {
            let deployment = self.get_deployment(deployment_id).await?;

            match deployment.status {
                DeploymentStatus::Terminated => return Ok(deployment),
                DeploymentStatus::Error | DeploymentStatus::Canceled => {
                    return Err(G5kError::reservation(
                        self.site,
                        format!(
                            "deployment '{}' ended with status {:?}",
                            deployment_id, deployment.status
                        ),
                    ))
                }
                _ => tokio::time::sleep(self.config.poll_interval).await,
            }
        }
    }
}
