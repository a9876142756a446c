//! Weave overlay networking
//!
//! The router and the network plugin are launched through the `weaveexec`
//! image; the discovery agent watches the swarm discovery backend and
//! connects the routers of every node together.

const WEAVEEXEC: &str = "docker run --rm -v /var/run/docker.sock:/var/run/docker.sock -v /proc:/hostproc -e PROCFS=/hostproc --privileged --net=host weaveworks/weaveexec --local";

/// Port of the Weave proxy, advertised to swarm instead of the engine port
pub const WEAVE_PROXY_PORT: u16 = 12375;

/// Commands launching the Weave router then the Weave network plugin
pub fn net_commands() -> [String; 2] {
    [
        format!("{} launch-router", WEAVEEXEC),
        format!("{} launch-plugin", WEAVEEXEC),
    ]
}

/// Command launching Weave discovery against the given swarm discovery string
pub fn discovery_command(discovery: &str) -> String {
    format!(
        "docker run -d --name weavediscovery --net=host weaveworks/weavediscovery {}",
        discovery
    )
}
