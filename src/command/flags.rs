//! Parsers for the structured command-line flags

use crate::error::{G5kError, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// `site:count`, the site name being lowercase letters only
const RESERVE_NODES_FORMAT: &str = r"^(?P<site>[[:lower:]]+):(?P<count>[[:digit:]]+)$";

/// `{site}-{id}`
const NODE_NAME_FORMAT: &str = r"^(?P<node>[[:lower:]]+-[[:digit:]]+)$";

/// `{site}-{id}:key=value`
const NODE_FLAG_FORMAT: &str = r"^(?P<node>[[:lower:]]+-[[:digit:]]+):(?P<flag>[^=\s]+=.*)$";

fn compile(format: &str) -> Result<Regex> {
    Regex::new(format).map_err(|e| G5kError::Configuration(format!("Invalid flag format: {}", e)))
}

/// Match `value` against `re` and return its named capture groups
///
/// The whole match is stored under the empty name. Patterns without named
/// groups are rejected.
pub fn parse_cli_flag(re: &Regex, value: &str) -> Result<HashMap<String, String>> {
    let names: Vec<&str> = re.capture_names().flatten().collect();
    if names.is_empty() {
        return Err(G5kError::Configuration(
            "The use of named capturing groups is required".to_string(),
        ));
    }

    let captures = re.captures(value).ok_or_else(|| {
        G5kError::Configuration(format!("'{}' does not match the format '{}'", value, re))
    })?;

    let mut result = HashMap::new();
    result.insert(String::new(), captures[0].to_string());
    for name in names {
        let matched = captures.name(name).map(|m| m.as_str()).unwrap_or_default();
        result.insert(name.to_string(), matched.to_string());
    }

    Ok(result)
}

/// Parse `site:count` reservation requests
pub fn parse_reserve_nodes(values: &[String]) -> Result<BTreeMap<String, usize>> {
    let re = compile(RESERVE_NODES_FORMAT)?;
    let mut sites = BTreeMap::new();

    for value in values {
        let flag = parse_cli_flag(&re, value).map_err(|_| {
            G5kError::Configuration(format!(
                "Syntax error in nodes reservation parameter: '{}' (expected 'site:count')",
                value
            ))
        })?;

        let count: usize = flag["count"].parse().map_err(|_| {
            G5kError::Configuration(format!("Invalid number of nodes in '{}'", value))
        })?;
        if count == 0 {
            return Err(G5kError::Configuration(format!(
                "At least one node must be reserved on site '{}'",
                flag["site"]
            )));
        }

        if sites.insert(flag["site"].clone(), count).is_some() {
            return Err(G5kError::Configuration(format!(
                "Site '{}' is reserved more than once",
                flag["site"]
            )));
        }
    }

    Ok(sites)
}

/// Parse `{site}-{id}` machine names of the management nodes
pub fn parse_swarm_masters(values: &[String]) -> Result<BTreeSet<String>> {
    let re = compile(NODE_NAME_FORMAT)?;
    let mut masters = BTreeSet::new();

    for value in values {
        let flag = parse_cli_flag(&re, value).map_err(|_| {
            G5kError::Configuration(format!(
                "Syntax error in swarm master parameter: '{}' (expected 'site-id')",
                value
            ))
        })?;
        masters.insert(flag["node"].clone());
    }

    Ok(masters)
}

/// Parse `{site}-{id}:key=value` per-node engine options or labels
///
/// Values given for the same node accumulate in order.
pub fn parse_node_flags(values: &[String]) -> Result<HashMap<String, Vec<String>>> {
    let re = compile(NODE_FLAG_FORMAT)?;
    let mut flags: HashMap<String, Vec<String>> = HashMap::new();

    for value in values {
        let flag = parse_cli_flag(&re, value).map_err(|_| {
            G5kError::Configuration(format!(
                "Syntax error in node parameter: '{}' (expected 'site-id:key=value')",
                value
            ))
        })?;

        flags
            .entry(flag["node"].clone())
            .or_default()
            .push(flag["flag"].clone());
    }

    Ok(flags)
}
