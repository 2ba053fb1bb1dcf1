//! Managed hosts and the store that owns them.

use async_trait::async_trait;
use certfleet_agent_protocol::{
    AgentClient, AgentEndpoint, AgentProtocolError, DEFAULT_CONNECT_TIMEOUT,
};
use certfleet_common::HostGuid;
use certfleet_config::{Config, HostConfig};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::StoreError;

/// A managed host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: u64,
    pub guid: HostGuid,
    pub name: String,
    pub ipv4_address: Option<String>,
    pub ipv6_address: Option<String>,
    /// Agent port, 0 when unset
    pub agent_port: u16,
    pub token: String,
    pub is_active: bool,
    pub os_code: String,
    pub os_version: String,
    pub agent_version: String,
}

impl Host {
    /// Build a host from its configuration entry
    pub fn from_config(host: &HostConfig, config: &Config) -> Self {
        Self {
            id: host.id,
            guid: HostGuid::new(&host.guid),
            name: host.name.clone(),
            ipv4_address: host.ipv4.clone(),
            ipv6_address: host.ipv6.clone(),
            agent_port: config.agent_port(host).unwrap_or(0),
            token: host.token.clone(),
            is_active: host.active,
            os_code: String::new(),
            os_version: String::new(),
            agent_version: String::new(),
        }
    }

    pub fn endpoint(&self) -> AgentEndpoint {
        AgentEndpoint {
            ipv4_address: self.ipv4_address.clone(),
            ipv6_address: self.ipv6_address.clone(),
            port: self.agent_port,
            token: self.token.clone(),
        }
    }
}

/// Settings applied to every agent client
#[derive(Debug, Clone, Copy)]
pub struct AgentOptions {
    pub connect_timeout: Duration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl AgentOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect_timeout: config.agent.connect_timeout(),
        }
    }

    /// Agent client for `host`; no network traffic
    pub fn client(&self, host: &Host) -> Result<AgentClient, AgentProtocolError> {
        Ok(AgentClient::new(&host.endpoint())?.with_connect_timeout(self.connect_timeout))
    }
}

/// Persistence of managed hosts.
///
/// The control plane only reads hosts, except for flipping `is_active` and
/// refreshing agent metadata through [`HostStore::save`].
#[async_trait]
pub trait HostStore: Send + Sync {
    /// All hosts, in a stable order
    async fn list_all(&self) -> Result<Vec<Host>, StoreError>;

    async fn find_by_guid(&self, guid: &HostGuid) -> Result<Option<Host>, StoreError>;

    /// Create or replace the host with the same guid
    async fn save(&self, host: &Host) -> Result<(), StoreError>;
}

/// In-memory host store
#[derive(Debug, Default)]
pub struct MemoryHostStore {
    hosts: DashMap<HostGuid, Host>,
}

impl MemoryHostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hosts(hosts: impl IntoIterator<Item = Host>) -> Self {
        let store = Self::new();
        for host in hosts {
            store.hosts.insert(host.guid.clone(), host);
        }
        store
    }

    /// Load every host from configuration
    pub fn from_config(config: &Config) -> Self {
        Self::with_hosts(config.hosts.iter().map(|h| Host::from_config(h, config)))
    }

    /// Synchronous lookup, mostly for tests
    pub fn get(&self, guid: &HostGuid) -> Option<Host> {
        self.hosts.get(guid).map(|h| h.value().clone())
    }
}

#[async_trait]
impl HostStore for MemoryHostStore {
    async fn list_all(&self) -> Result<Vec<Host>, StoreError> {
        let mut hosts: Vec<Host> = self.hosts.iter().map(|h| h.value().clone()).collect();
        hosts.sort_by_key(|h| h.id);
        Ok(hosts)
    }

    async fn find_by_guid(&self, guid: &HostGuid) -> Result<Option<Host>, StoreError> {
        Ok(self.get(guid))
    }

    async fn save(&self, host: &Host) -> Result<(), StoreError> {
        self.hosts.insert(host.guid.clone(), host.clone());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn host(id: u64, guid: &str, port: u16) -> Host {
        Host {
            id,
            guid: HostGuid::from(guid),
            name: format!("host-{id}"),
            ipv4_address: Some("127.0.0.1".to_string()),
            ipv6_address: None,
            agent_port: port,
            token: "token".to_string(),
            is_active: true,
            os_code: String::new(),
            os_version: String::new(),
            agent_version: String::new(),
        }
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_id() {
        let store =
            MemoryHostStore::with_hosts([host(3, "c", 1), host(1, "a", 1), host(2, "b", 1)]);
        let ids: Vec<u64> = store.list_all().await.unwrap().iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_save_replaces() {
        let store = MemoryHostStore::with_hosts([host(1, "a", 1)]);
        let mut h = store.find_by_guid(&HostGuid::from("a")).await.unwrap().unwrap();
        h.is_active = false;
        store.save(&h).await.unwrap();

        assert!(!store.get(&HostGuid::from("a")).unwrap().is_active);
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[test]
    fn test_from_config_applies_default_port() {
        let config = Config::from_kdl(
            r#"
            agent {
                default-port 6737
            }
            hosts {
                host "a" {
                    ipv4 "10.0.0.1"
                    token "t"
                }
            }
            "#,
        )
        .unwrap();

        let store = MemoryHostStore::from_config(&config);
        let host = store.get(&HostGuid::from("a")).unwrap();
        assert_eq!(host.agent_port, 6737);
        assert_eq!(host.name, "a");
        assert!(host.is_active);
    }

    #[test]
    fn test_client_requires_port() {
        let h = host(1, "a", 0);
        assert!(AgentOptions::default().client(&h).is_err());
    }
}
