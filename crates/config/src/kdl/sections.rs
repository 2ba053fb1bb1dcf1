//! Agent, renewal, logging and storage blocks.

use ::kdl::KdlNode;
use std::path::PathBuf;
use tracing::trace;

use super::{get_bool_entry, get_string_entry, get_uint_entry};
use crate::errors::Result;
use crate::{
    default_check_interval_secs, default_connect_timeout_secs, default_max_workers,
    default_renew_before_days, AgentConfig, LoggingConfig, RenewalConfig, StorageConfig,
};

/// Parse agent configuration block
pub fn parse_agent_config(node: &KdlNode) -> Result<AgentConfig> {
    trace!("Parsing agent configuration block");

    Ok(AgentConfig {
        connect_timeout_secs: get_uint_entry(node, "connect-timeout-secs")?
            .unwrap_or_else(default_connect_timeout_secs),
        default_port: get_uint_entry(node, "default-port")?,
    })
}

/// Parse renewal configuration block
pub fn parse_renewal_config(node: &KdlNode) -> Result<RenewalConfig> {
    trace!("Parsing renewal configuration block");

    let config = RenewalConfig {
        enabled: get_bool_entry(node, "enabled")?.unwrap_or(true),
        check_interval_secs: get_uint_entry(node, "check-interval-secs")?
            .unwrap_or_else(default_check_interval_secs),
        renew_before_days: get_uint_entry(node, "renew-before-days")?
            .unwrap_or_else(default_renew_before_days),
        max_workers: get_uint_entry(node, "max-workers")?.unwrap_or_else(default_max_workers),
    };

    trace!(
        enabled = config.enabled,
        check_interval_secs = config.check_interval_secs,
        renew_before_days = config.renew_before_days,
        max_workers = config.max_workers,
        "Parsed renewal configuration"
    );

    Ok(config)
}

pub fn parse_logging_config(node: &KdlNode) -> Result<LoggingConfig> {
    let defaults = LoggingConfig::default();
    Ok(LoggingConfig {
        level: get_string_entry(node, "level")?.unwrap_or(defaults.level),
        format: get_string_entry(node, "format")?.unwrap_or(defaults.format),
    })
}

pub fn parse_storage_config(node: &KdlNode) -> Result<StorageConfig> {
    Ok(StorageConfig {
        renewal_log: get_string_entry(node, "renewal-log")?.map(PathBuf::from),
    })
}

#[cfg(test)]
mod tests {
    use crate::Config;

    #[test]
    fn test_parse_all_sections() {
        let config = Config::from_kdl(
            r#"
            agent {
                connect-timeout-secs 3
                default-port 6737
            }
            renewal {
                enabled #false
                check-interval-secs 3600
                renew-before-days 14
                max-workers 4
            }
            logging {
                level "debug"
                format "json"
            }
            storage {
                renewal-log "/tmp/renewals.jsonl"
            }
            "#,
        )
        .unwrap();

        assert_eq!(config.agent.connect_timeout_secs, 3);
        assert_eq!(config.agent.default_port, Some(6737));
        assert!(!config.renewal.enabled);
        assert_eq!(config.renewal.check_interval_secs, 3600);
        assert_eq!(config.renewal.renew_before_days, 14);
        assert_eq!(config.renewal.max_workers, 4);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(
            config.storage.renewal_log.as_deref(),
            Some(std::path::Path::new("/tmp/renewals.jsonl"))
        );
    }

    #[test]
    fn test_partial_block_keeps_defaults() {
        let config = Config::from_kdl("renewal {\n max-workers 2\n}").unwrap();
        assert_eq!(config.renewal.max_workers, 2);
        assert_eq!(config.renewal.check_interval_secs, 43_200);
        assert!(config.renewal.enabled);
    }
}
