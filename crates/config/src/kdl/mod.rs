//! KDL configuration parsing.

use ::kdl::{KdlDocument, KdlNode, KdlValue};
use tracing::{trace, warn};

use crate::errors::{parse_err, ConfigError, Result};
use crate::Config;

mod inventory;
mod sections;

use inventory::{parse_domain_settings, parse_hosts};
use sections::{
    parse_agent_config, parse_logging_config, parse_renewal_config, parse_storage_config,
};

/// Parse a complete configuration document
pub fn parse_document(content: &str) -> Result<Config> {
    let doc: KdlDocument = content
        .parse()
        .map_err(|e: ::kdl::KdlError| ConfigError::Syntax(e.to_string()))?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "agent" => config.agent = parse_agent_config(node)?,
            "renewal" => config.renewal = parse_renewal_config(node)?,
            "logging" => config.logging = parse_logging_config(node)?,
            "storage" => config.storage = parse_storage_config(node)?,
            "hosts" => config.hosts = parse_hosts(node)?,
            "domain-settings" => config.domain_settings = parse_domain_settings(node)?,
            other => warn!(block = %other, "Ignoring unknown configuration block"),
        }
    }

    trace!(hosts = config.hosts.len(), "Parsed configuration document");
    Ok(config)
}

/// First positional argument of the child node called `name`
fn child_arg<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlValue> {
    node.children()?
        .nodes()
        .iter()
        .find(|child| child.name().value() == name)
        .and_then(first_arg)
}

/// First positional argument of `node`
fn first_arg(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|entry| entry.name().is_none())
        .map(|entry| entry.value())
}

pub(crate) fn get_string_entry(node: &KdlNode, name: &str) -> Result<Option<String>> {
    match child_arg(node, name) {
        None => Ok(None),
        Some(value) => value
            .as_string()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| parse_err!("'{}' must be a string, got {}", name, value)),
    }
}

pub(crate) fn get_int_entry(node: &KdlNode, name: &str) -> Result<Option<i128>> {
    match child_arg(node, name) {
        None => Ok(None),
        Some(value) => value
            .as_integer()
            .map(Some)
            .ok_or_else(|| parse_err!("'{}' must be an integer, got {}", name, value)),
    }
}

pub(crate) fn get_bool_entry(node: &KdlNode, name: &str) -> Result<Option<bool>> {
    match child_arg(node, name) {
        None => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| parse_err!("'{}' must be #true or #false, got {}", name, value)),
    }
}

/// Integer entry converted to `T`, rejecting out-of-range values
pub(crate) fn get_uint_entry<T: TryFrom<i128>>(node: &KdlNode, name: &str) -> Result<Option<T>> {
    get_int_entry(node, name)?
        .map(|v| T::try_from(v).map_err(|_| parse_err!("'{}' is out of range: {}", name, v)))
        .transpose()
}

pub(crate) fn get_first_arg_string(node: &KdlNode) -> Option<String> {
    first_arg(node).and_then(|v| v.as_string()).map(str::to_string)
}

/// Named property (`key="value"`) of `node`
pub(crate) fn get_property_string(node: &KdlNode, key: &str) -> Option<String> {
    node.entries()
        .iter()
        .find(|entry| entry.name().is_some_and(|n| n.value() == key))
        .and_then(|entry| entry.value().as_string())
        .map(str::to_string)
}
