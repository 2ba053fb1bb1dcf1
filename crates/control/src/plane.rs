//! Wiring of stores, agents and renewal from configuration.

use certfleet_config::Config;
use std::sync::Arc;
use tracing::info;

use crate::domains::{AgentDomainProvider, DomainProvider};
use crate::hosts::{AgentOptions, HostStore, MemoryHostStore};
use crate::monitor::HostMonitor;
use crate::renewal::{
    FanoutLogWriter, FileLogWriter, RenewalLogWriter, RenewalManager, RenewalScheduler,
    TracingLogWriter,
};
use crate::service::CertificateService;
use crate::settings::{DomainSettingStore, MemoryDomainSettingStore};

/// Every control plane component, sharing one set of stores
pub struct ControlPlane {
    pub hosts: Arc<dyn HostStore>,
    pub settings: Arc<dyn DomainSettingStore>,
    pub domains: Arc<dyn DomainProvider>,
    pub manager: Arc<RenewalManager>,
    pub monitor: HostMonitor,
    pub certificates: CertificateService,
    options: AgentOptions,
    config: Config,
}

impl ControlPlane {
    /// Build in-memory stores seeded from `config`
    pub fn from_config(config: Config) -> Self {
        let hosts: Arc<dyn HostStore> = Arc::new(MemoryHostStore::from_config(&config));
        let settings: Arc<dyn DomainSettingStore> =
            Arc::new(MemoryDomainSettingStore::from_config(&config));
        Self::with_stores(config, hosts, settings)
    }

    pub fn with_stores(
        config: Config,
        hosts: Arc<dyn HostStore>,
        settings: Arc<dyn DomainSettingStore>,
    ) -> Self {
        let options = AgentOptions::from_config(&config);
        let domains: Arc<dyn DomainProvider> =
            Arc::new(AgentDomainProvider::new(Arc::clone(&hosts), options));

        let manager = RenewalManager::new(
            Arc::clone(&hosts),
            Arc::clone(&settings),
            Arc::clone(&domains),
            log_writer(&config),
        )
        .with_config(&config);

        Self {
            monitor: HostMonitor::new(Arc::clone(&hosts), options),
            certificates: CertificateService::new(
                Arc::clone(&hosts),
                Arc::clone(&settings),
                options,
            ),
            manager: Arc::new(manager),
            hosts,
            settings,
            domains,
            options,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn agent_options(&self) -> AgentOptions {
        self.options
    }

    /// Scheduler over this plane's manager at the configured interval
    pub fn scheduler(&self) -> RenewalScheduler<RenewalManager> {
        RenewalScheduler::new(Arc::clone(&self.manager))
            .with_interval(self.config.renewal.check_interval())
    }
}

fn log_writer(config: &Config) -> Arc<dyn RenewalLogWriter> {
    match &config.storage.renewal_log {
        Some(path) => {
            info!(path = %path.display(), "Recording renewals to file");
            Arc::new(FanoutLogWriter::new(vec![
                Box::new(TracingLogWriter),
                Box::new(FileLogWriter::new(path)),
            ]))
        }
        None => Arc::new(TracingLogWriter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certfleet_common::HostGuid;
    use std::time::Duration;

    #[tokio::test]
    async fn test_plane_from_config() {
        let config = Config::from_kdl(
            r#"
            agent {
                default-port 6737
            }
            renewal {
                check-interval-secs 3600
            }
            hosts {
                host "a" {
                    ipv4 "10.0.0.1"
                    token "t"
                }
            }
            domain-settings {
                setting "example.com" host="a" name="renewal" value="true"
            }
            "#,
        )
        .unwrap();

        let plane = ControlPlane::from_config(config);
        let guid = HostGuid::from("a");

        assert!(plane.hosts.find_by_guid(&guid).await.unwrap().is_some());
        let setting = plane
            .settings
            .find_setting("example.com", &guid, crate::settings::RENEWAL_SETTING)
            .await
            .unwrap();
        assert_eq!(setting.unwrap().value, "true");
        assert_eq!(plane.scheduler().check_interval(), Duration::from_secs(3600));
    }
}
