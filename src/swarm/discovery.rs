//! Hosted discovery token service for standalone swarm

use crate::error::{G5kError, Result};
use async_trait::async_trait;

/// Default endpoint issuing new cluster tokens
pub const DEFAULT_TOKEN_SERVICE_URL: &str = "https://discovery.hub.docker.com/v1/clusters";

/// Issues discovery tokens for new clusters
#[async_trait]
pub trait DiscoveryTokenService: Send + Sync {
    async fn create_token(&self) -> Result<String>;
}

/// Discovery string for a token
pub fn token_discovery(token: &str) -> String {
    format!("token://{}", token)
}

/// HTTP client of the hosted token service
pub struct HubTokenService {
    client: reqwest::Client,
    url: String,
}

impl HubTokenService {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl DiscoveryTokenService for HubTokenService {
    async fn create_token(&self) -> Result<String> {
        let response = self.client.post(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(G5kError::Bootstrap(format!(
                "Discovery token service returned {}",
                status
            )));
        }

        let token = response.text().await?.trim().to_string();
        if token.is_empty() {
            return Err(G5kError::Bootstrap(
                "Discovery token service returned an empty token".to_string(),
            ));
        }

        Ok(token)
    }
}
