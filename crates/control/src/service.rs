//! Certificate operations addressed by host guid.

use certfleet_agent_protocol::{
    Certificate, CertificateAssignRequest, CertificateCommands, CertificateDownloadRequest,
    CertificateDownloadResponse, CertificateIssueRequest, CertificateRemoveRequest,
    CertificateUploadRequest, CommonDirChangeStatusRequest, CommonDirStatusRequest,
};
use certfleet_common::HostGuid;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::certificates::{create_self_signed, CertificateError, SelfSignedRequest};
use crate::errors::{ControlError, Result};
use crate::hosts::{AgentOptions, HostStore};
use crate::settings::{DomainSetting, DomainSettingStore, EMAIL_SETTING};

/// Separator between storage type and certificate name in storage keys
const STORAGE_KEY_SEPARATOR: &str = "__";

/// One certificate held in a host's certificate storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageCertificateItem {
    pub storage: String,
    pub cert_name: String,
    pub certificate: Certificate,
}

impl StorageCertificateItem {
    /// Split a `<storage>__<name>` key
    fn from_entry(key: &str, certificate: Certificate) -> Result<Self> {
        let parts: Vec<&str> = key.split(STORAGE_KEY_SEPARATOR).collect();
        let [storage, cert_name] = parts.as_slice() else {
            return Err(ControlError::InvalidCertificateData(format!(
                "malformed storage key '{key}'"
            )));
        };

        Ok(Self {
            storage: storage.to_string(),
            cert_name: cert_name.to_string(),
            certificate,
        })
    }
}

pub struct CertificateService {
    hosts: Arc<dyn HostStore>,
    settings: Arc<dyn DomainSettingStore>,
    options: AgentOptions,
}

impl CertificateService {
    pub fn new(
        hosts: Arc<dyn HostStore>,
        settings: Arc<dyn DomainSettingStore>,
        options: AgentOptions,
    ) -> Self {
        Self {
            hosts,
            settings,
            options,
        }
    }

    /// Issue a certificate for `request.server_name`.
    ///
    /// The email is stored as the domain's `email` setting before the agent
    /// is asked, so later renewals can fall back to it.
    pub async fn issue(
        &self,
        guid: &HostGuid,
        request: &CertificateIssueRequest,
    ) -> Result<Option<Certificate>> {
        let commands = self.commands(guid).await?;

        self.settings
            .save(&DomainSetting::new(
                &request.server_name,
                guid.clone(),
                EMAIL_SETTING,
                &request.email,
            ))
            .await?;

        info!(host = %guid, domain = %request.server_name, "Issuing certificate");
        Ok(commands.issue(request).await?)
    }

    pub async fn assign(
        &self,
        guid: &HostGuid,
        request: &CertificateAssignRequest,
    ) -> Result<Option<Certificate>> {
        let commands = self.commands(guid).await?;
        Ok(commands.assign_to_domain(request).await?)
    }

    pub async fn upload(
        &self,
        guid: &HostGuid,
        request: &CertificateUploadRequest,
    ) -> Result<Option<Certificate>> {
        let commands = self.commands(guid).await?;
        Ok(commands.upload(request).await?)
    }

    pub async fn upload_to_storage(
        &self,
        guid: &HostGuid,
        cert_name: &str,
        pem_certificate: String,
    ) -> Result<Option<Certificate>> {
        let commands = self.commands(guid).await?;
        Self::store_pem(&commands, cert_name, pem_certificate).await
    }

    pub async fn download_from_storage(
        &self,
        guid: &HostGuid,
        request: &CertificateDownloadRequest,
    ) -> Result<CertificateDownloadResponse> {
        let commands = self.commands(guid).await?;
        Ok(commands.download_from_storage(request).await?)
    }

    /// Certificates in the host's storage, ordered by storage then name
    pub async fn storage_certificates(
        &self,
        guid: &HostGuid,
    ) -> Result<Vec<StorageCertificateItem>> {
        let commands = self.commands(guid).await?;

        let mut items = commands
            .list_storage()
            .await?
            .into_iter()
            .map(|(key, certificate)| StorageCertificateItem::from_entry(&key, certificate))
            .collect::<Result<Vec<_>>>()?;

        items.sort_by(|a, b| (&a.storage, &a.cert_name).cmp(&(&b.storage, &b.cert_name)));
        Ok(items)
    }

    pub async fn remove_from_storage(
        &self,
        guid: &HostGuid,
        request: &CertificateRemoveRequest,
    ) -> Result<()> {
        let commands = self.commands(guid).await?;
        Ok(commands.remove_from_storage(request).await?)
    }

    /// Whether the domain serves the shared challenge directory
    pub async fn common_dir_status(
        &self,
        guid: &HostGuid,
        request: &CommonDirStatusRequest,
    ) -> Result<bool> {
        let commands = self.commands(guid).await?;
        Ok(commands.get_common_dir_status(request).await?.status)
    }

    pub async fn change_common_dir_status(
        &self,
        guid: &HostGuid,
        request: &CommonDirChangeStatusRequest,
    ) -> Result<()> {
        let commands = self.commands(guid).await?;
        Ok(commands.change_common_dir_status(request).await?)
    }

    /// Generate a self-signed certificate and put it into the host's storage
    /// under `request.cert_name`.
    pub async fn create_self_signed(
        &self,
        guid: &HostGuid,
        request: SelfSignedRequest,
    ) -> Result<Option<Certificate>> {
        let commands = self.commands(guid).await?;
        let cert_name = request.cert_name.clone();

        let pem = generate_self_signed(request).await?;
        debug!(host = %guid, cert_name = %cert_name, "Self-signed certificate generated");

        Self::store_pem(&commands, &cert_name, pem).await
    }

    async fn store_pem(
        commands: &CertificateCommands,
        cert_name: &str,
        pem_certificate: String,
    ) -> Result<Option<Certificate>> {
        let request = CertificateUploadRequest {
            cert_name: cert_name.to_string(),
            pem_certificate,
            ..Default::default()
        };
        Ok(commands.upload_to_storage(&request).await?)
    }

    async fn commands(&self, guid: &HostGuid) -> Result<CertificateCommands> {
        let host = self
            .hosts
            .find_by_guid(guid)
            .await?
            .ok_or_else(|| ControlError::HostNotFound(guid.clone()))?;

        Ok(CertificateCommands::new(self.options.client(&host)?))
    }
}

/// Run [`create_self_signed`] off the async workers
pub async fn generate_self_signed(request: SelfSignedRequest) -> Result<String> {
    let pem = tokio::task::spawn_blocking(move || create_self_signed(&request))
        .await
        .map_err(|e| CertificateError::Task(e.to_string()))??;
    Ok(pem)
}
