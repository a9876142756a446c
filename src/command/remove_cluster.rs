//! `remove-cluster`: kill the reservations and forget their machines

use super::{ssh_backend, CredentialsArgs};
use crate::error::Result;
use crate::g5k::{ApiConfig, JobId, ReservationClient, G5k};
use crate::machine::ProvisioningBackend;
use clap::Args;
use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use tracing::{error, info, warn};

/// `remove-cluster` flags
#[derive(Args, Debug, Clone)]
pub struct RemoveClusterArgs {
    #[command(flatten)]
    pub credentials: CredentialsArgs,

    /// Jobs to remove (every recorded job when empty)
    pub job_ids: Vec<JobId>,

    /// Site of the given jobs that have no recorded machine
    #[arg(long = "g5k-site")]
    pub site: Option<String>,

    /// Do not ask for confirmation
    #[arg(long = "no-confirm")]
    pub no_confirm: bool,
}

/// Kill every selected job once and remove its machines
///
/// Selected jobs without any recorded machine are killed on `site` when one
/// is given. Failures are logged and do not stop the removal of the other
/// jobs and machines. Returns the `(site, job)` pairs that were killed.
pub async fn remove_cluster(
    backend: &dyn ProvisioningBackend,
    client: &dyn ReservationClient,
    job_ids: &[JobId],
    site: Option<&str>,
) -> Result<Vec<(String, JobId)>> {
    let records = backend.list_machines().await?;

    let mut killed: BTreeSet<(String, JobId)> = BTreeSet::new();

    for record in records
        .iter()
        .filter(|r| job_ids.is_empty() || job_ids.contains(&r.driver.job_id))
    {
        let job = (record.driver.site.clone(), record.driver.job_id);
        if !killed.contains(&job) {
            match client.kill_job(&job.0, job.1).await {
                Ok(()) => info!("Job '{}' on site '{}' killed", job.1, job.0),
                Err(e) => error!("Failed to kill job '{}' on site '{}': {}", job.1, job.0, e),
            }
            killed.insert(job);
        }

        match backend.remove_machine(&record.name).await {
            Ok(()) => info!("Node '{}' removed", record.name),
            Err(e) => error!("Cannot remove node '{}': {}", record.name, e),
        }
    }

    for job_id in job_ids {
        if killed.iter().any(|(_, killed_id)| killed_id == job_id) {
            continue;
        }

        let Some(site) = site else {
            warn!(
                "No machine recorded for job '{}', use --g5k-site to kill it anyway",
                job_id
            );
            continue;
        };

        match client.kill_job(site, *job_id).await {
            Ok(()) => info!("Job '{}' on site '{}' killed", job_id, site),
            Err(e) => error!("Failed to kill job '{}' on site '{}': {}", job_id, site, e),
        }
        killed.insert((site.to_string(), *job_id));
    }

    Ok(killed.into_iter().collect())
}

fn confirm(job_ids: &[JobId]) -> Result<bool> {
    let target = if job_ids.is_empty() {
        "ALL nodes from ALL jobs".to_string()
    } else {
        format!(
            "the nodes of job(s) {}",
            job_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    };

    print!("Do you really want to remove {}? [y/N]: ", target);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;

    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Run `remove-cluster`
pub async fn run(args: RemoveClusterArgs) -> Result<()> {
    if !args.no_confirm && !confirm(&args.job_ids)? {
        println!("Aborted");
        return Ok(());
    }

    let backend = ssh_backend()?;
    let client = G5k::new(args.credentials.credentials(), ApiConfig::default())?;

    let killed = remove_cluster(&backend, &client, &args.job_ids, args.site.as_deref()).await?;
    if killed.is_empty() {
        info!("No node to remove");
    }

    Ok(())
}
