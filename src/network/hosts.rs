//! Static name resolution table shared by every node of a cluster

use std::collections::BTreeMap;
use std::net::IpAddr;

/// Header written before the cluster entries in the remote hosts file
const HOSTS_HEADER: &str = "# docker-g5k:";

/// Maps machine names (`{site}-{id}`) to the resolved address of the deployed node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostsTable {
    entries: BTreeMap<String, IpAddr>,
}

impl HostsTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the address of a machine, replacing any previous one
    pub fn insert(&mut self, machine_name: &str, ip: IpAddr) {
        self.entries.insert(machine_name.to_string(), ip);
    }

    /// Address of a machine
    pub fn get(&self, machine_name: &str) -> Option<IpAddr> {
        self.entries.get(machine_name).copied()
    }

    pub fn contains(&self, machine_name: &str) -> bool {
        self.entries.contains_key(machine_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(machine name, address)` pairs, ordered by machine name
    pub fn iter(&self) -> impl Iterator<Item = (&str, IpAddr)> {
        self.entries.iter().map(|(name, ip)| (name.as_str(), *ip))
    }

    /// Render the table as hosts file entries (`{ip}<tab>{name}`)
    pub fn entries(&self) -> String {
        let mut buffer = format!("\n{}\n", HOSTS_HEADER);
        for (name, ip) in self.iter() {
            buffer.push_str(&format!("{}\t{}\n", ip, name));
        }
        buffer
    }

    /// Remote command appending the table to the node's `/etc/hosts`
    pub fn append_command(&self) -> String {
        format!("echo '{}' >>/etc/hosts", self.entries())
    }
}
