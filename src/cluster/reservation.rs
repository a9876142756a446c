//! Reservation and deployment of the cluster's nodes, site by site

use super::cluster::Cluster;
use crate::error::Result;
use crate::g5k::{JobId, ReservationClient};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Reserve, deploy and allocate the nodes of each site in turn
///
/// The node placeholders must already exist. Sites are processed in name
/// order. On failure, every job reserved so far is killed before the error
/// is returned. Returns the reserved jobs.
pub async fn reserve_cluster(
    cluster: &mut Cluster,
    client: &dyn ReservationClient,
    sites: &BTreeMap<String, usize>,
) -> Result<Vec<(String, JobId)>> {
    cluster.check_masters()?;

    let mut jobs: Vec<(String, JobId)> = Vec::new();

    for (site, count) in sites {
        if let Err(e) = reserve_site(cluster, client, site, *count, &mut jobs).await {
            release_jobs(client, &jobs).await;
            return Err(e);
        }
    }

    Ok(jobs)
}

async fn reserve_site(
    cluster: &mut Cluster,
    client: &dyn ReservationClient,
    site: &str,
    count: usize,
    jobs: &mut Vec<(String, JobId)>,
) -> Result<()> {
    let config = cluster.config();

    info!("Reserving {} node(s) on site '{}'", count, site);
    let job_id = client
        .reserve_nodes(site, count, &config.resource_properties, &config.walltime)
        .await?;
    jobs.push((site.to_string(), job_id));

    client.wait_until_job_is_ready(site, job_id).await?;

    info!("Deploying '{}' on job '{}' nodes...", config.image, job_id);
    let deployed_nodes = client
        .deploy_nodes(site, &config.ssh_key.public_key, job_id, &config.image)
        .await?;

    if deployed_nodes.len() < count {
        warn!(
            "Only {} of {} node(s) were deployed on site '{}'",
            deployed_nodes.len(),
            count,
            site
        );
    }

    cluster
        .allocate_deployed_nodes_to_machines(site, job_id, &deployed_nodes)
        .await
}

/// Kill every given job, logging the failures
pub async fn release_jobs(client: &dyn ReservationClient, jobs: &[(String, JobId)]) {
    for (site, job_id) in jobs {
        match client.kill_job(site, *job_id).await {
            Ok(()) => info!("Job '{}' on site '{}' killed", job_id, site),
            Err(e) => warn!("Failed to kill job '{}' on site '{}': {}", job_id, site, e),
        }
    }
}
