//! Configuration for the certfleet control plane.
//!
//! Configuration is written in KDL:
//!
//! ```kdl
//! agent {
//!     connect-timeout-secs 5
//!     default-port 6737
//! }
//!
//! renewal {
//!     enabled #true
//!     check-interval-secs 43200
//!     renew-before-days 30
//!     max-workers 10
//! }
//!
//! logging {
//!     level "info"
//!     format "json"
//! }
//!
//! storage {
//!     renewal-log "/var/lib/certfleet/renewals.jsonl"
//! }
//!
//! hosts {
//!     host "6f1c0e0a-web-1" {
//!         id 1
//!         name "web-1"
//!         ipv4 "10.0.0.11"
//!         token "s3cr3t"
//!     }
//! }
//!
//! domain-settings {
//!     setting "example.com" host="6f1c0e0a-web-1" name="renewal" value="true"
//! }
//! ```

use certfleet_common::LogFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use validator::Validate;

mod errors;
mod kdl;
mod validate;

pub use errors::{ConfigError, Result};

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub agent: AgentConfig,

    #[validate(nested)]
    pub renewal: RenewalConfig,

    pub logging: LoggingConfig,

    pub storage: StorageConfig,

    #[validate(nested)]
    pub hosts: Vec<HostConfig>,

    #[validate(nested)]
    pub domain_settings: Vec<DomainSettingConfig>,
}

/// How the control plane talks to host agents
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AgentConfig {
    #[validate(range(min = 1, max = 300))]
    pub connect_timeout_secs: u64,

    /// Port used for hosts that do not set one
    pub default_port: Option<u16>,
}

impl AgentConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            default_port: None,
        }
    }
}

/// Automatic renewal settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RenewalConfig {
    pub enabled: bool,

    #[validate(range(min = 60))]
    pub check_interval_secs: u64,

    /// Renew certificates expiring within this many days
    #[validate(range(min = 1, max = 365))]
    pub renew_before_days: u32,

    #[validate(range(min = 1, max = 256))]
    pub max_workers: usize,
}

impl RenewalConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn renew_before(&self) -> Duration {
        Duration::from_secs(u64::from(self.renew_before_days) * 24 * 60 * 60)
    }
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: default_check_interval_secs(),
            renew_before_days: default_renew_before_days(),
            max_workers: default_max_workers(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl LoggingConfig {
    /// Parsed output format
    pub fn log_format(&self) -> Result<LogFormat> {
        self.format
            .parse()
            .map_err(|e: certfleet_common::logging::UnknownLogFormat| {
                ConfigError::Validation(e.to_string())
            })
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Where renewal history is kept
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON-lines renewal log; log lines only when unset
    pub renewal_log: Option<PathBuf>,
}

/// A managed host
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HostConfig {
    #[validate(length(min = 1))]
    pub guid: String,

    pub id: u64,

    #[validate(length(min = 1))]
    pub name: String,

    pub ipv4: Option<String>,

    pub ipv6: Option<String>,

    pub port: Option<u16>,

    #[validate(length(min = 1))]
    pub token: String,

    pub active: bool,
}

/// A per-domain setting seeded from configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DomainSettingConfig {
    #[validate(length(min = 1))]
    pub domain: String,

    #[validate(length(min = 1))]
    pub host: String,

    #[validate(length(min = 1))]
    pub name: String,

    pub value: String,
}

pub(crate) fn default_connect_timeout_secs() -> u64 {
    5
}

pub(crate) fn default_check_interval_secs() -> u64 {
    12 * 60 * 60
}

pub(crate) fn default_renew_before_days() -> u32 {
    30
}

pub(crate) fn default_max_workers() -> usize {
    10
}

impl Config {
    /// Load configuration from a KDL file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration file");

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_kdl(&content)?;

        info!(
            path = %path.display(),
            hosts = config.hosts.len(),
            domain_settings = config.domain_settings.len(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Parse configuration from KDL text
    pub fn from_kdl(content: &str) -> Result<Self> {
        kdl::parse_document(content)
    }

    /// Validate field ranges and cross-references
    pub fn validate(&self) -> Result<()> {
        validate::validate_config(self)
    }

    /// Port to dial for `host`
    pub fn agent_port(&self, host: &HostConfig) -> Option<u16> {
        host.port.or(self.agent.default_port)
    }
}
