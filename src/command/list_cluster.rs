//! `list-cluster`: recorded machines grouped by reservation

use super::ssh_backend;
use crate::error::Result;
use crate::g5k::JobId;
use crate::machine::{MachineRecord, ProvisioningBackend};
use std::collections::BTreeMap;

/// Machines of one reservation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub job_id: JobId,
    pub site: String,
    pub machines: Vec<String>,
}

/// Group machine records by `(site, job)`, ordered by site then job
pub fn summarize(records: &[MachineRecord]) -> Vec<JobSummary> {
    let mut jobs: BTreeMap<(String, JobId), Vec<String>> = BTreeMap::new();

    for record in records {
        jobs.entry((record.driver.site.clone(), record.driver.job_id))
            .or_default()
            .push(record.name.clone());
    }

    jobs.into_iter()
        .map(|((site, job_id), mut machines)| {
            machines.sort();
            JobSummary {
                job_id,
                site,
                machines,
            }
        })
        .collect()
}

/// Run `list-cluster`
pub async fn run() -> Result<()> {
    let backend = ssh_backend()?;
    let jobs = summarize(&backend.list_machines().await?);

    println!(
        "{:<10} {:<12} {:<22} {}",
        "JOB ID", "SITE", "NUMBER OF MACHINE(S)", "MACHINE(S) NAME"
    );
    for job in jobs {
        println!(
            "{:<10} {:<12} {:<22} {}",
            job.job_id,
            job.site,
            job.machines.len(),
            job.machines.join(", ")
        );
    }

    Ok(())
}
