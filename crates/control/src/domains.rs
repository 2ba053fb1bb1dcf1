//! Domains served by a host, derived from its virtual hosts.

use async_trait::async_trait;
use certfleet_agent_protocol::{Certificate, VirtualHost};
use certfleet_common::HostGuid;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::errors::{ControlError, Result};
use crate::hosts::{AgentOptions, HostStore};

/// Listen address of a domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainAddress {
    pub is_ipv6: bool,
    pub host: String,
    pub port: u16,
}

/// A domain served by a virtual host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub server_name: String,
    pub file_path: String,
    pub doc_root: String,
    pub web_server: String,
    pub aliases: Vec<String>,
    pub ssl: bool,
    pub addresses: Vec<DomainAddress>,
    pub certificate: Option<Certificate>,
}

impl Domain {
    /// Build a domain from a virtual host.
    ///
    /// Returns `None` for single-label names such as `localhost`. Addresses
    /// whose port is not numeric are dropped.
    pub fn from_vhost(vhost: VirtualHost) -> Option<Self> {
        let labels = vhost.server_name.trim_matches('.').split('.').count();
        if labels < 2 {
            return None;
        }

        let addresses = vhost
            .addresses
            .into_iter()
            .filter_map(|addr| {
                let port = addr.port.trim().parse().ok()?;
                Some(DomainAddress {
                    is_ipv6: addr.is_ipv6,
                    host: addr.host,
                    port,
                })
            })
            .collect();

        Some(Self {
            server_name: vhost.server_name,
            file_path: vhost.file_path,
            doc_root: vhost.doc_root,
            web_server: vhost.web_server,
            aliases: vhost.aliases,
            ssl: vhost.ssl,
            addresses,
            certificate: vhost.certificate,
        })
    }
}

/// Source of the domains of one host
#[async_trait]
pub trait DomainProvider: Send + Sync {
    async fn get_domains(&self, guid: &HostGuid) -> Result<Vec<Domain>>;
}

/// Domain provider that asks the host agent for its virtual hosts
pub struct AgentDomainProvider {
    hosts: Arc<dyn HostStore>,
    options: AgentOptions,
}

impl AgentDomainProvider {
    pub fn new(hosts: Arc<dyn HostStore>, options: AgentOptions) -> Self {
        Self { hosts, options }
    }
}

#[async_trait]
impl DomainProvider for AgentDomainProvider {
    async fn get_domains(&self, guid: &HostGuid) -> Result<Vec<Domain>> {
        let host = self
            .hosts
            .find_by_guid(guid)
            .await?
            .ok_or_else(|| ControlError::HostNotFound(guid.clone()))?;

        let client = self.options.client(&host)?;
        let vhosts = client.get_vhosts().await?;
        let vhost_count = vhosts.len();

        let domains: Vec<Domain> = vhosts.into_iter().filter_map(Domain::from_vhost).collect();

        debug!(
            host = %host.name,
            vhosts = vhost_count,
            domains = domains.len(),
            "Fetched host domains"
        );

        Ok(domains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosts::tests::host;
    use crate::hosts::MemoryHostStore;
    use certfleet_agent_protocol::{commands, AgentServer, StaticAgent, VirtualHostAddress};
    use serde_json::json;

    fn vhost(name: &str, ports: &[&str]) -> VirtualHost {
        VirtualHost {
            server_name: name.to_string(),
            web_server: "nginx".to_string(),
            addresses: ports
                .iter()
                .map(|p| VirtualHostAddress {
                    is_ipv6: false,
                    host: "0.0.0.0".to_string(),
                    port: p.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_single_label_names_dropped() {
        assert!(Domain::from_vhost(vhost("localhost", &[])).is_none());
        assert!(Domain::from_vhost(vhost(".localhost.", &[])).is_none());
        assert!(Domain::from_vhost(vhost("", &[])).is_none());
    }

    #[test]
    fn test_dotted_name_kept_verbatim() {
        let domain = Domain::from_vhost(vhost("example.com.", &[])).unwrap();
        assert_eq!(domain.server_name, "example.com.");
    }

    #[test]
    fn test_non_numeric_ports_dropped() {
        let domain = Domain::from_vhost(vhost("example.com", &["443", "${PORT}", "80"])).unwrap();
        let ports: Vec<u16> = domain.addresses.iter().map(|a| a.port).collect();
        assert_eq!(ports, vec![443, 80]);
    }

    #[tokio::test]
    async fn test_unknown_host() {
        let provider =
            AgentDomainProvider::new(Arc::new(MemoryHostStore::new()), AgentOptions::default());
        let err = provider.get_domains(&HostGuid::from("nope")).await.unwrap_err();
        assert!(matches!(err, ControlError::HostNotFound(_)));
    }

    #[tokio::test]
    async fn test_fetches_from_agent() {
        let agent = Arc::new(StaticAgent::new().with_ok(
            commands::GET_VHOSTS,
            json!([
                {
                    "ServerName": "example.com",
                    "WebServer": "apache",
                    "Addresses": [{"Host": "*", "Port": "443"}]
                },
                {"ServerName": "localhost", "WebServer": "apache", "Addresses": null}
            ]),
        ));
        let server = AgentServer::bind("a", "127.0.0.1:0", agent).await.unwrap();
        let port = server.local_addr().unwrap().port();
        server.spawn();

        let store = Arc::new(MemoryHostStore::with_hosts([host(1, "a", port)]));
        let provider = AgentDomainProvider::new(store, AgentOptions::default());

        let domains = provider.get_domains(&HostGuid::from("a")).await.unwrap();
        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0].web_server, "apache");
        assert_eq!(domains[0].addresses[0].port, 443);
        assert!(domains[0].certificate.is_none());
    }
}
