//! Typed certificate commands.

use serde::de::DeserializeOwned;
use std::collections::HashMap;

use crate::client::AgentClient;
use crate::errors::AgentProtocolError;
use crate::protocol::commands;
use crate::types::{
    Certificate, CertificateAssignRequest, CertificateDownloadRequest, CertificateDownloadResponse,
    CertificateIssueRequest, CertificateRemoveRequest, CertificateUploadRequest,
    CommonDirChangeStatusRequest, CommonDirStatus, CommonDirStatusRequest, StorageCertificateNames,
    StorageCertificates,
};

/// Challenge type used for HTTP-01 validation
pub const HTTP_CHALLENGE: &str = "http";

/// Certificate commands of one host agent.
///
/// Every method maps to exactly one remote command. Shape mismatches in the
/// response surface as [`AgentProtocolError::InvalidData`], so callers can
/// tell a garbled answer from an unreachable agent.
#[derive(Debug, Clone)]
pub struct CertificateCommands {
    agent: AgentClient,
}

impl CertificateCommands {
    pub fn new(agent: AgentClient) -> Self {
        Self { agent }
    }

    /// Request a new certificate through the agent's ACME client
    pub async fn issue(
        &self,
        request: &CertificateIssueRequest,
    ) -> Result<Option<Certificate>, AgentProtocolError> {
        self.certificate(commands::CERTIFICATE_ISSUE, request).await
    }

    /// Install a PEM certificate on a vhost
    pub async fn upload(
        &self,
        request: &CertificateUploadRequest,
    ) -> Result<Option<Certificate>, AgentProtocolError> {
        self.certificate(commands::CERTIFICATE_UPLOAD, request).await
    }

    /// Install a stored certificate on a vhost
    pub async fn assign_to_domain(
        &self,
        request: &CertificateAssignRequest,
    ) -> Result<Option<Certificate>, AgentProtocolError> {
        self.certificate(commands::CERTIFICATE_DOMAIN_ASSIGN, request)
            .await
    }

    /// Put a PEM certificate into the agent's certificate storage
    pub async fn upload_to_storage(
        &self,
        request: &CertificateUploadRequest,
    ) -> Result<Option<Certificate>, AgentProtocolError> {
        self.certificate(commands::STORAGE_CERT_UPLOAD, request)
            .await
    }

    pub async fn remove_from_storage(
        &self,
        request: &CertificateRemoveRequest,
    ) -> Result<(), AgentProtocolError> {
        self.agent
            .request(commands::STORAGE_CERT_REMOVE, request)
            .await
            .map(|_| ())
    }

    /// List stored certificates keyed by `<storage>__<name>`.
    ///
    /// A `null` payload means the storage is empty.
    pub async fn list_storage(&self) -> Result<HashMap<String, Certificate>, AgentProtocolError> {
        let response: Option<StorageCertificates> = self
            .decode_nullable(commands::STORAGE_CERTIFICATES, (), "certificate list")
            .await?;
        Ok(response.map(|r| r.certificates).unwrap_or_default())
    }

    /// List stored certificate names (older agents)
    pub async fn list_storage_names(&self) -> Result<Vec<String>, AgentProtocolError> {
        let response: Option<StorageCertificateNames> = self
            .decode_nullable(commands::STORAGE_CERT_NAME_LIST, (), "certificate name list")
            .await?;
        Ok(response.map(|r| r.cert_name_list).unwrap_or_default())
    }

    /// Fetch one stored certificate by name
    pub async fn get_storage_certificate(
        &self,
        cert_name: &str,
    ) -> Result<Option<Certificate>, AgentProtocolError> {
        self.certificate(commands::STORAGE_CERT_DATA, cert_name)
            .await
    }

    pub async fn download_from_storage(
        &self,
        request: &CertificateDownloadRequest,
    ) -> Result<CertificateDownloadResponse, AgentProtocolError> {
        let response = self
            .decode_nullable(commands::STORAGE_CERT_DOWNLOAD, request, "certificate download")
            .await?;
        Ok(response.unwrap_or_default())
    }

    /// Whether the vhost serves the shared ACME challenge directory
    pub async fn get_common_dir_status(
        &self,
        request: &CommonDirStatusRequest,
    ) -> Result<CommonDirStatus, AgentProtocolError> {
        let response = self
            .decode_nullable(commands::COMMON_DIR_STATUS, request, "common dir status")
            .await?;
        Ok(response.unwrap_or_default())
    }

    pub async fn change_common_dir_status(
        &self,
        request: &CommonDirChangeStatusRequest,
    ) -> Result<(), AgentProtocolError> {
        self.agent
            .request(commands::CHANGE_COMMON_DIR_STATUS, request)
            .await
            .map(|_| ())
    }

    async fn certificate(
        &self,
        command: &str,
        data: impl serde::Serialize,
    ) -> Result<Option<Certificate>, AgentProtocolError> {
        self.decode_nullable(command, data, "certificate").await
    }

    async fn decode_nullable<T: DeserializeOwned>(
        &self,
        command: &str,
        data: impl serde::Serialize,
        what: &'static str,
    ) -> Result<Option<T>, AgentProtocolError> {
        let value = self.agent.request(command, data).await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| AgentProtocolError::invalid_data(what, e))
    }
}
