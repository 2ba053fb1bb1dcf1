//! Typed payloads exchanged with host agents.
//!
//! Agents are written in Go and emit exported struct field names verbatim
//! (`ServerName`, `DNSNames`, ...), with `null` for empty slices and maps.
//! Field names are matched exactly; lowercase aliases are accepted as well
//! because older agents decode and re-encode case-insensitively.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Treat a JSON `null` as the type's default value.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Host metadata returned by the `refresh` command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerData {
    #[serde(
        rename = "Hostname",
        alias = "HostName",
        alias = "hostname",
        default,
        deserialize_with = "nullable"
    )]
    pub hostname: String,
    #[serde(rename = "Os", alias = "os", default, deserialize_with = "nullable")]
    pub os: String,
    #[serde(rename = "Platform", alias = "platform", default, deserialize_with = "nullable")]
    pub platform: String,
    #[serde(
        rename = "PlatformFamily",
        alias = "platformfamily",
        default,
        deserialize_with = "nullable"
    )]
    pub platform_family: String,
    #[serde(
        rename = "PlatformVersion",
        alias = "platformversion",
        default,
        deserialize_with = "nullable"
    )]
    pub platform_version: String,
    #[serde(
        rename = "KernelVersion",
        alias = "kernelversion",
        default,
        deserialize_with = "nullable"
    )]
    pub kernel_version: String,
    #[serde(rename = "KernelArch", alias = "kernelarch", default, deserialize_with = "nullable")]
    pub kernel_arch: String,
    #[serde(
        rename = "Virtualization",
        alias = "virtualization",
        default,
        deserialize_with = "nullable"
    )]
    pub virtualization: String,
    #[serde(rename = "Uptime", alias = "uptime", default)]
    pub uptime: u64,
    #[serde(rename = "BootTime", alias = "boottime", default)]
    pub boot_time: u64,
    #[serde(
        rename = "AgentVersion",
        alias = "agentversion",
        default,
        deserialize_with = "nullable"
    )]
    pub agent_version: String,
}

/// Listen address of a virtual host, as reported by the agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualHostAddress {
    #[serde(rename = "IsIpv6", alias = "isIpv6", alias = "isipv6", default)]
    pub is_ipv6: bool,
    #[serde(rename = "Host", alias = "host", default, deserialize_with = "nullable")]
    pub host: String,
    /// Port as text; web server configs may contain non-numeric values
    #[serde(rename = "Port", alias = "port", default, deserialize_with = "nullable")]
    pub port: String,
}

/// Virtual host returned by the `getVhosts` command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualHost {
    #[serde(rename = "FilePath", alias = "filepath", default, deserialize_with = "nullable")]
    pub file_path: String,
    #[serde(rename = "ServerName", alias = "servername", default, deserialize_with = "nullable")]
    pub server_name: String,
    #[serde(rename = "DocRoot", alias = "docroot", default, deserialize_with = "nullable")]
    pub doc_root: String,
    #[serde(rename = "WebServer", alias = "webserver", default, deserialize_with = "nullable")]
    pub web_server: String,
    #[serde(rename = "Aliases", alias = "aliases", default, deserialize_with = "nullable")]
    pub aliases: Vec<String>,
    #[serde(rename = "Ssl", alias = "ssl", default)]
    pub ssl: bool,
    #[serde(rename = "Addresses", alias = "addresses", default, deserialize_with = "nullable")]
    pub addresses: Vec<VirtualHostAddress>,
    #[serde(rename = "Certificate", alias = "certificate", default)]
    pub certificate: Option<Certificate>,
}

/// Certificate issuer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    #[serde(rename = "CN", alias = "cn", default, deserialize_with = "nullable")]
    pub cn: String,
    #[serde(
        rename = "Organization",
        alias = "organization",
        default,
        deserialize_with = "nullable"
    )]
    pub organization: Vec<String>,
}

/// Certificate record as reported by an agent.
///
/// `valid_from` and `valid_to` use the fixed textual layout
/// `02 Jan 06 15:04 -0700`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    #[serde(rename = "CN", alias = "cn", default, deserialize_with = "nullable")]
    pub cn: String,
    #[serde(rename = "ValidFrom", alias = "validfrom", default, deserialize_with = "nullable")]
    pub valid_from: String,
    #[serde(rename = "ValidTo", alias = "validto", default, deserialize_with = "nullable")]
    pub valid_to: String,
    #[serde(rename = "DNSNames", alias = "dnsnames", default, deserialize_with = "nullable")]
    pub dns_names: Vec<String>,
    #[serde(
        rename = "EmailAddresses",
        alias = "emailaddresses",
        default,
        deserialize_with = "nullable"
    )]
    pub email_addresses: Vec<String>,
    #[serde(
        rename = "Organization",
        alias = "organization",
        default,
        deserialize_with = "nullable"
    )]
    pub organization: Vec<String>,
    #[serde(rename = "Province", alias = "province", default, deserialize_with = "nullable")]
    pub province: Vec<String>,
    #[serde(rename = "Country", alias = "country", default, deserialize_with = "nullable")]
    pub country: Vec<String>,
    #[serde(rename = "Locality", alias = "locality", default, deserialize_with = "nullable")]
    pub locality: Vec<String>,
    #[serde(rename = "IsCA", alias = "isca", default)]
    pub is_ca: bool,
    /// Chain verified by the agent
    #[serde(rename = "IsValid", alias = "isvalid", default)]
    pub is_valid: bool,
    #[serde(rename = "Issuer", alias = "issuer", default)]
    pub issuer: Issuer,
}

/// Payload of `certificates.issue`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateIssueRequest {
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "ServerName")]
    pub server_name: String,
    #[serde(rename = "WebServer")]
    pub web_server: String,
    #[serde(rename = "ChallengeType")]
    pub challenge_type: String,
    #[serde(rename = "Subjects")]
    pub subjects: Vec<String>,
    #[serde(rename = "AdditionalParams", default)]
    pub additional_params: HashMap<String, String>,
    /// Install the certificate on the vhost once issued
    #[serde(rename = "Assign")]
    pub assign: bool,
}

/// Payload of `certificates.upload` and `certificates.storagecertupload`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateUploadRequest {
    #[serde(rename = "ServerName", default)]
    pub server_name: String,
    #[serde(rename = "WebServer", default)]
    pub web_server: String,
    #[serde(rename = "CertName")]
    pub cert_name: String,
    #[serde(rename = "PemCertificate")]
    pub pem_certificate: String,
}

/// Payload of `certificates.domainassign`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateAssignRequest {
    #[serde(rename = "ServerName")]
    pub server_name: String,
    #[serde(rename = "WebServer")]
    pub web_server: String,
    #[serde(rename = "CertName")]
    pub cert_name: String,
    #[serde(rename = "StorageType")]
    pub storage_type: String,
}

/// Payload of `certificates.storagecertremove`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRemoveRequest {
    #[serde(rename = "CertName")]
    pub cert_name: String,
    #[serde(rename = "StorageType")]
    pub storage_type: String,
}

/// Payload of `certificates.storagecertdownload`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDownloadRequest {
    #[serde(rename = "CertName")]
    pub cert_name: String,
    #[serde(rename = "StorageType")]
    pub storage_type: String,
}

/// Result of `certificates.storagecertdownload`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDownloadResponse {
    #[serde(
        rename = "CertFileName",
        alias = "certfilename",
        default,
        deserialize_with = "nullable"
    )]
    pub cert_file_name: String,
    #[serde(rename = "CertContent", alias = "certcontent", default, deserialize_with = "nullable")]
    pub cert_content: String,
}

/// Result of `certificates.storagecertificates`.
///
/// Keys have the form `<storage>__<name>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageCertificates {
    #[serde(
        rename = "Certificates",
        alias = "certificates",
        default,
        deserialize_with = "nullable"
    )]
    pub certificates: HashMap<String, Certificate>,
}

/// Result of `certificates.storagecertnamelist`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageCertificateNames {
    #[serde(
        rename = "CertNameList",
        alias = "certnamelist",
        default,
        deserialize_with = "nullable"
    )]
    pub cert_name_list: Vec<String>,
}

/// Payload of `certificates.commondirstatus`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonDirStatusRequest {
    #[serde(rename = "ServerName")]
    pub server_name: String,
    #[serde(rename = "WebServer")]
    pub web_server: String,
}

/// Result of `certificates.commondirstatus`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonDirStatus {
    #[serde(rename = "Status", alias = "status", default)]
    pub status: bool,
}

/// Payload of `certificates.changecommondirstatus`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonDirChangeStatusRequest {
    #[serde(rename = "ServerName")]
    pub server_name: String,
    #[serde(rename = "WebServer")]
    pub web_server: String,
    #[serde(rename = "Status")]
    pub status: bool,
}
