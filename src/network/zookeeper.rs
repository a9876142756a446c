//! Zookeeper coordination service run on the management nodes

use super::hosts::HostsTable;

/// URL scheme understood by the swarm/engine discovery backends
pub const ZOOKEEPER_SCHEME: &str = "zk";

/// Container image of the coordination service
pub const ZOOKEEPER_IMAGE: &str = "zookeeper";

/// Container name of the coordination service on management nodes
pub const ZOOKEEPER_CONTAINER: &str = "docker-g5k-zookeeper";

/// Build `{scheme}://ip1,ip2,...` from the management nodes' addresses, keeping their order
///
/// Management nodes missing from the table are skipped; callers resolve the
/// table before building the URL.
pub fn coordination_service_url(scheme: &str, masters: &[String], hosts: &HostsTable) -> String {
    let ips: Vec<String> = masters
        .iter()
        .filter_map(|m| hosts.get(m))
        .map(|ip| ip.to_string())
        .collect();

    format!("{}://{}", scheme, ips.join(","))
}

/// Zookeeper ensemble description for the `ZOO_SERVERS` variable
pub fn server_list(masters: &[String]) -> String {
    masters
        .iter()
        .enumerate()
        .map(|(i, node)| format!("server.{}={}:2888:3888", i + 1, node))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Command starting the Zookeeper container on `machine_name`
///
/// Returns `None` when the machine is not a management node.
pub fn start_command(machine_name: &str, masters: &[String]) -> Option<String> {
    let index = masters.iter().position(|m| m == machine_name)?;

    Some(format!(
        "docker run -td --restart=always --net=host --name {} -e \"ZOO_MY_ID={}\" -e \"ZOO_SERVERS={}\" {}",
        ZOOKEEPER_CONTAINER,
        index + 1,
        server_list(masters),
        ZOOKEEPER_IMAGE
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_url_single_master() {
        let mut hosts = HostsTable::new();
        hosts.insert("lille-0", "10.0.0.0".parse().unwrap());

        let url = coordination_service_url("coord", &names(&["lille-0"]), &hosts);
        assert_eq!(url, "coord://10.0.0.0");
    }

    #[test]
    fn test_url_multi_master_keeps_order() {
        let mut hosts = HostsTable::new();
        hosts.insert("lille-0", "10.0.0.0".parse().unwrap());
        hosts.insert("sophia-1", "10.1.1.1".parse().unwrap());
        hosts.insert("lyon-2", "10.2.2.2".parse().unwrap());

        let url = coordination_service_url(
            ZOOKEEPER_SCHEME,
            &names(&["lille-0", "sophia-1", "lyon-2"]),
            &hosts,
        );
        assert_eq!(url, "zk://10.0.0.0,10.1.1.1,10.2.2.2");
    }

    #[test]
    fn test_server_list() {
        assert_eq!(server_list(&names(&["lille-0"])), "server.1=lille-0:2888:3888");
        assert_eq!(
            server_list(&names(&["lille-0", "sophia-1", "lyon-2"])),
            "server.1=lille-0:2888:3888 server.2=sophia-1:2888:3888 server.3=lyon-2:2888:3888"
        );
    }

    #[test]
    fn test_start_command() {
        let masters = names(&["lille-0", "lyon-2"]);

        let cmd = start_command("lyon-2", &masters).unwrap();
        assert!(cmd.contains("ZOO_MY_ID=2"));
        assert!(cmd.contains("server.1=lille-0:2888:3888 server.2=lyon-2:2888:3888"));

        assert!(start_command("nancy-0", &masters).is_none());
    }
}
