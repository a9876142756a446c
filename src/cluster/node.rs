//! Cluster node

use crate::error::{G5kError, Result};
use crate::g5k::JobId;
use crate::swarm::NodeRole;

/// One physical machine of the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Machine name (`{site}-{id}`), stable for the whole run
    pub machine_name: String,
    pub site: String,
    pub role: NodeRole,
    /// Arbitrary engine flags, in the order they were given
    pub engine_opts: Vec<String>,
    /// Engine labels, in the order they were given
    pub engine_labels: Vec<String>,
    job_id: Option<JobId>,
    hostname: Option<String>,
}

impl Node {
    /// Create a placeholder for machine `{site}-{index}`
    pub fn new(site: &str, index: usize) -> Self {
        Self {
            machine_name: machine_name(site, index),
            site: site.to_string(),
            role: NodeRole::Worker,
            engine_opts: Vec::new(),
            engine_labels: Vec::new(),
            job_id: None,
            hostname: None,
        }
    }

    /// Hostname of the deployed node, once allocated
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.job_id
    }

    pub fn is_allocated(&self) -> bool {
        self.hostname.is_some()
    }

    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Manager
    }

    /// Bind the placeholder to a deployed node; a node is allocated only once
    pub fn allocate(&mut self, job_id: JobId, hostname: &str) -> Result<()> {
        if let Some(existing) = &self.hostname {
            return Err(G5kError::Allocation(format!(
                "Machine '{}' is already allocated to '{}'",
                self.machine_name, existing
            )));
        }

        self.job_id = Some(job_id);
        self.hostname = Some(hostname.to_string());
        Ok(())
    }

    /// Hostname and job of an allocated node
    pub fn deployment(&self) -> Result<(&str, JobId)> {
        match (&self.hostname, self.job_id) {
            (Some(hostname), Some(job_id)) => Ok((hostname.as_str(), job_id)),
            _ => Err(G5kError::provisioning(
                &self.machine_name,
                "node was not allocated to a deployed host",
            )),
        }
    }
}

/// Machine name of the `index`-th node reserved on `site`
pub fn machine_name(site: &str, index: usize) -> String {
    format!("{}-{}", site, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_placeholder() {
        let node = Node::new("lille", 3);
        assert_eq!(node.machine_name, "lille-3");
        assert_eq!(node.site, "lille");
        assert!(!node.is_allocated());
        assert!(!node.is_master());
        assert!(node.deployment().is_err());
    }

    #[test]
    fn test_allocate_once() {
        let mut node = Node::new("lille", 0);
        node.allocate(42, "chifflet-1.lille.grid5000.fr").unwrap();

        assert_eq!(node.hostname(), Some("chifflet-1.lille.grid5000.fr"));
        assert_eq!(node.job_id(), Some(42));
        assert_eq!(node.deployment().unwrap(), ("chifflet-1.lille.grid5000.fr", 42));

        let again = node.allocate(43, "chifflet-2.lille.grid5000.fr");
        assert!(matches!(again, Err(G5kError::Allocation(_))));
        assert_eq!(node.hostname(), Some("chifflet-1.lille.grid5000.fr"));
    }
}
