//! Host agent metadata refresh.

use certfleet_agent_protocol::ServerData;
use certfleet_common::HostGuid;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domains::Domain;
use crate::errors::{ControlError, Result};
use crate::hosts::{AgentOptions, Host, HostStore};

/// Result of a successful refresh
#[derive(Debug, Clone)]
pub struct HostDetails {
    /// Host as saved after the refresh
    pub host: Host,
    pub server: ServerData,
    pub domains: Vec<Domain>,
}

/// Pulls fresh metadata from host agents and keeps `is_active` current
pub struct HostMonitor {
    hosts: Arc<dyn HostStore>,
    options: AgentOptions,
}

impl HostMonitor {
    pub fn new(hosts: Arc<dyn HostStore>, options: AgentOptions) -> Self {
        Self { hosts, options }
    }

    /// Ask the agent of `guid` for its platform data and virtual hosts.
    ///
    /// An unreachable agent marks the host inactive and yields
    /// [`ControlError::AgentConnection`]. Any other agent failure leaves the
    /// host untouched.
    pub async fn refresh(&self, guid: &HostGuid) -> Result<HostDetails> {
        let mut host = self
            .hosts
            .find_by_guid(guid)
            .await?
            .ok_or_else(|| ControlError::HostNotFound(guid.clone()))?;

        let client = self.options.client(&host)?;

        let server = match client.refresh().await {
            Ok(server) => server,
            Err(e) if e.is_connection_error() => {
                warn!(
                    host = %host.name,
                    error = %e,
                    "Server agent unreachable, marking host inactive"
                );
                host.is_active = false;
                if let Err(save_err) = self.hosts.save(&host).await {
                    error!(host = %host.name, error = %save_err, "Could not mark host inactive");
                }
                return Err(ControlError::AgentConnection {
                    guid: host.guid,
                    source: e,
                });
            }
            Err(e) => return Err(e.into()),
        };

        host.os_code = server.platform.clone();
        host.os_version = server.platform_version.clone();
        host.agent_version = server.agent_version.clone();
        host.is_active = true;
        self.hosts.save(&host).await?;

        info!(
            host = %host.name,
            os = %host.os_code,
            os_version = %host.os_version,
            agent_version = %host.agent_version,
            "Host refreshed"
        );

        let domains = client
            .get_vhosts()
            .await?
            .into_iter()
            .filter_map(Domain::from_vhost)
            .collect();

        Ok(HostDetails {
            host,
            server,
            domains,
        })
    }
}
