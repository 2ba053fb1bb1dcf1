//! Configuration validation.
//!
//! Field ranges come from the `validator` derives on the config types;
//! everything that spans more than one field is checked here.

use std::collections::HashSet;
use tracing::warn;
use validator::Validate;

use crate::errors::{ConfigError, Result};
use crate::Config;

pub fn validate_config(config: &Config) -> Result<()> {
    Validate::validate(config).map_err(|e| ConfigError::Validation(e.to_string()))?;

    config.logging.log_format()?;

    let mut problems = Vec::new();
    let mut guids = HashSet::new();

    for host in &config.hosts {
        if !guids.insert(host.guid.as_str()) {
            problems.push(format!("duplicate host guid '{}'", host.guid));
        }

        let has_address = [&host.ipv4, &host.ipv6]
            .into_iter()
            .flatten()
            .any(|addr| !addr.trim().is_empty());
        if !has_address {
            problems.push(format!(
                "host '{}' needs an ipv4 or ipv6 address",
                host.guid
            ));
        }

        if config.agent_port(host).unwrap_or(0) == 0 {
            problems.push(format!(
                "host '{}' has no agent port and no agent.default-port is set",
                host.guid
            ));
        }
    }

    for setting in &config.domain_settings {
        if !guids.contains(setting.host.as_str()) {
            warn!(
                domain = %setting.domain,
                host = %setting.host,
                "Domain setting refers to an unknown host"
            );
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(problems.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use crate::{Config, ConfigError, HostConfig};

    fn host(guid: &str) -> HostConfig {
        HostConfig {
            guid: guid.to_string(),
            id: 1,
            name: guid.to_string(),
            ipv4: Some("10.0.0.1".to_string()),
            ipv6: None,
            port: Some(6737),
            token: "token".to_string(),
            active: true,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_short_interval_rejected() {
        let mut config = Config::default();
        config.renewal.check_interval_secs = 5;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = Config::default();
        config.renewal.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_guid_rejected() {
        let mut config = Config::default();
        config.hosts = vec![host("a"), host("a")];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate host guid 'a'"));
    }

    #[test]
    fn test_host_without_address_rejected() {
        let mut config = Config::default();
        let mut h = host("a");
        h.ipv4 = Some("  ".to_string());
        config.hosts = vec![h];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ipv4 or ipv6"));
    }

    #[test]
    fn test_default_port_fills_in() {
        let mut config = Config::default();
        let mut h = host("a");
        h.port = None;
        config.hosts = vec![h];
        assert!(config.validate().is_err());

        config.agent.default_port = Some(6737);
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_token_rejected() {
        let mut config = Config::default();
        let mut h = host("a");
        h.token.clear();
        config.hosts = vec![h];
        assert!(config.validate().is_err());
    }
}
