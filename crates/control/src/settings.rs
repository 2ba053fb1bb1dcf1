//! Per-domain settings.

use async_trait::async_trait;
use certfleet_common::HostGuid;
use certfleet_config::Config;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

/// Enables automatic renewal when set to anything but `"false"`
pub const RENEWAL_SETTING: &str = "renewal";

/// ACME account email used when the certificate carries none
pub const EMAIL_SETTING: &str = "email";

/// One `(domain, host, name) -> value` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSetting {
    pub domain_name: String,
    pub host_guid: HostGuid,
    pub name: String,
    pub value: String,
}

impl DomainSetting {
    pub fn new(
        domain_name: impl Into<String>,
        host_guid: HostGuid,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            domain_name: domain_name.into(),
            host_guid,
            name: name.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
pub trait DomainSettingStore: Send + Sync {
    async fn find_setting(
        &self,
        domain_name: &str,
        host_guid: &HostGuid,
        name: &str,
    ) -> Result<Option<DomainSetting>, StoreError>;

    /// Create the setting or update its value
    async fn save(&self, setting: &DomainSetting) -> Result<(), StoreError>;
}

type SettingKey = (String, HostGuid, String);

/// In-memory domain setting store
#[derive(Debug, Default)]
pub struct MemoryDomainSettingStore {
    settings: DashMap<SettingKey, String>,
}

impl MemoryDomainSettingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: impl IntoIterator<Item = DomainSetting>) -> Self {
        let store = Self::new();
        for s in settings {
            store
                .settings
                .insert((s.domain_name, s.host_guid, s.name), s.value);
        }
        store
    }

    /// Seed settings from configuration
    pub fn from_config(config: &Config) -> Self {
        Self::with_settings(config.domain_settings.iter().map(|s| {
            DomainSetting::new(&s.domain, HostGuid::new(&s.host), &s.name, &s.value)
        }))
    }
}

#[async_trait]
impl DomainSettingStore for MemoryDomainSettingStore {
    async fn find_setting(
        &self,
        domain_name: &str,
        host_guid: &HostGuid,
        name: &str,
    ) -> Result<Option<DomainSetting>, StoreError> {
        let key = (domain_name.to_string(), host_guid.clone(), name.to_string());
        Ok(self.settings.get(&key).map(|value| {
            DomainSetting::new(domain_name, host_guid.clone(), name, value.value().clone())
        }))
    }

    async fn save(&self, setting: &DomainSetting) -> Result<(), StoreError> {
        self.settings.insert(
            (
                setting.domain_name.clone(),
                setting.host_guid.clone(),
                setting.name.clone(),
            ),
            setting.value.clone(),
        );
        Ok(())
    }
}
