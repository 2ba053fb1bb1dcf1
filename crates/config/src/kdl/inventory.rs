//! Host inventory and domain setting blocks.

use ::kdl::KdlNode;
use tracing::trace;

use super::{
    get_bool_entry, get_first_arg_string, get_property_string, get_string_entry, get_uint_entry,
};
use crate::errors::{parse_err, Result};
use crate::{DomainSettingConfig, HostConfig};

/// Parse the `hosts` block
pub fn parse_hosts(node: &KdlNode) -> Result<Vec<HostConfig>> {
    trace!("Parsing hosts block");
    let mut hosts = Vec::new();

    let Some(children) = node.children() else {
        return Ok(hosts);
    };

    for child in children.nodes() {
        if child.name().value() != "host" {
            continue;
        }

        let guid = get_first_arg_string(child).ok_or_else(|| {
            parse_err!("Host requires a guid argument, e.g., host \"6f1c0e0a\" {{ ... }}")
        })?;

        let token = get_string_entry(child, "token")?
            .ok_or_else(|| parse_err!("Host '{}' requires a 'token' field", guid))?;

        let host = HostConfig {
            id: get_uint_entry(child, "id")?.unwrap_or(hosts.len() as u64 + 1),
            name: get_string_entry(child, "name")?.unwrap_or_else(|| guid.clone()),
            ipv4: get_string_entry(child, "ipv4")?,
            ipv6: get_string_entry(child, "ipv6")?,
            port: get_uint_entry(child, "port")?,
            active: get_bool_entry(child, "active")?.unwrap_or(true),
            token,
            guid,
        };

        trace!(guid = %host.guid, name = %host.name, "Parsed host");
        hosts.push(host);
    }

    Ok(hosts)
}

/// Parse the `domain-settings` block
pub fn parse_domain_settings(node: &KdlNode) -> Result<Vec<DomainSettingConfig>> {
    let mut settings = Vec::new();

    let Some(children) = node.children() else {
        return Ok(settings);
    };

    for child in children.nodes() {
        if child.name().value() != "setting" {
            continue;
        }

        let domain = get_first_arg_string(child)
            .ok_or_else(|| parse_err!("Setting requires a domain argument"))?;
        let host = get_property_string(child, "host")
            .ok_or_else(|| parse_err!("Setting for '{}' requires a 'host' property", domain))?;
        let name = get_property_string(child, "name")
            .ok_or_else(|| parse_err!("Setting for '{}' requires a 'name' property", domain))?;
        let value = get_property_string(child, "value").unwrap_or_default();

        settings.push(DomainSettingConfig {
            domain,
            host,
            name,
            value,
        });
    }

    trace!(count = settings.len(), "Parsed domain settings");
    Ok(settings)
}
