//! Hostname resolution for deployed nodes

use crate::error::{G5kError, Result};
use async_trait::async_trait;
use std::net::IpAddr;

/// Resolves a deployed node hostname to the address written in the hosts table
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, hostname: &str) -> Result<IpAddr>;
}

/// Resolver backed by the system name service
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, hostname: &str) -> Result<IpAddr> {
        let mut addrs = tokio::net::lookup_host((hostname, 0))
            .await
            .map_err(|e| {
                G5kError::Allocation(format!(
                    "Unable to lookup IP address for '{}' node: {}",
                    hostname, e
                ))
            })?;

        addrs.next().map(|addr| addr.ip()).ok_or_else(|| {
            G5kError::Allocation(format!("No IP address found for '{}' node", hostname))
        })
    }
}
