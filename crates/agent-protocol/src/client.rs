//! Agent client for issuing commands to a host agent.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, trace};

use crate::errors::AgentProtocolError;
use crate::protocol::{commands, AgentRequest, AgentResponse};
use crate::transport::TcpTransport;
use crate::types::{Certificate, ServerData, VirtualHost};

/// Connection details of one host agent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentEndpoint {
    pub ipv4_address: Option<String>,
    pub ipv6_address: Option<String>,
    pub port: u16,
    pub token: String,
}

impl AgentEndpoint {
    /// Address to dial: IPv4 first, IPv6 otherwise
    pub fn address(&self) -> Option<&str> {
        [self.ipv4_address.as_deref(), self.ipv6_address.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|addr| !addr.is_empty())
    }
}

/// Agent client for one host.
///
/// Cheap to clone. Every call opens a fresh connection.
#[derive(Debug, Clone)]
pub struct AgentClient {
    token: String,
    transport: TcpTransport,
}

impl AgentClient {
    /// Create a client without touching the network.
    ///
    /// Fails with [`AgentProtocolError::InvalidConfig`] when the endpoint
    /// has no address, no port or no token.
    pub fn new(endpoint: &AgentEndpoint) -> Result<Self, AgentProtocolError> {
        let address = endpoint.address().ok_or_else(|| {
            AgentProtocolError::InvalidConfig("ipv4 or ipv6 address must be specified".to_string())
        })?;

        if endpoint.port == 0 {
            return Err(AgentProtocolError::InvalidConfig("invalid port".to_string()));
        }

        if endpoint.token.is_empty() {
            return Err(AgentProtocolError::InvalidConfig("invalid token".to_string()));
        }

        Ok(Self {
            token: endpoint.token.clone(),
            transport: TcpTransport::new(address, endpoint.port),
        })
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.transport = self.transport.with_connect_timeout(timeout);
        self
    }

    /// Send a command and return the raw `Data` of a successful response.
    pub async fn request(
        &self,
        command: &str,
        data: impl Serialize,
    ) -> Result<serde_json::Value, AgentProtocolError> {
        let request = AgentRequest {
            token: self.token.clone(),
            command: command.to_string(),
            data: serde_json::to_value(data)
                .map_err(|e| AgentProtocolError::Serialization(e.to_string()))?,
        };

        let request_bytes = serde_json::to_vec(&request)
            .map_err(|e| AgentProtocolError::Serialization(e.to_string()))?;

        let response_bytes = self.transport.request(&request_bytes).await?;

        trace!(
            command = %command,
            response = %String::from_utf8_lossy(&response_bytes),
            "Response from agent"
        );

        let response: AgentResponse = serde_json::from_slice(&response_bytes)
            .map_err(|e| AgentProtocolError::InvalidMessage(e.to_string()))?;

        let result = response.into_result(command);
        if let Err(ref e) = result {
            debug!(
                command = %command,
                host = %self.transport.host(),
                error = %e,
                "Agent rejected command"
            );
        }
        result
    }

    /// Send a command and decode the response payload as `T`.
    ///
    /// `what` names the payload in decoding errors ("invalid vhosts data").
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        command: &str,
        data: impl Serialize,
        what: &'static str,
    ) -> Result<T, AgentProtocolError> {
        let value = self.request(command, data).await?;
        serde_json::from_value(value).map_err(|e| AgentProtocolError::invalid_data(what, e))
    }

    /// Fetch host metadata (platform, versions, uptime)
    pub async fn refresh(&self) -> Result<ServerData, AgentProtocolError> {
        self.request_as(commands::REFRESH, (), "server agent").await
    }

    /// List the virtual hosts configured on the host
    pub async fn get_vhosts(&self) -> Result<Vec<VirtualHost>, AgentProtocolError> {
        let value = self.request(commands::GET_VHOSTS, ()).await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(value).map_err(|e| AgentProtocolError::invalid_data("vhosts", e))
    }

    /// Fetch the certificate installed on one virtual host
    pub async fn get_vhost_certificate(
        &self,
        vhost_name: &str,
    ) -> Result<Option<Certificate>, AgentProtocolError> {
        let value = self
            .request(
                commands::GET_VHOST_CERTIFICATE,
                serde_json::json!({ "vhostName": vhost_name }),
            )
            .await?;

        if value.is_null() {
            return Ok(None);
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| AgentProtocolError::invalid_data("certificate", e))
    }

    /// Remote host this client talks to
    pub fn host(&self) -> &str {
        self.transport.host()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> AgentEndpoint {
        AgentEndpoint {
            ipv4_address: Some("10.0.0.5".to_string()),
            ipv6_address: Some("fd00::5".to_string()),
            port: 6737,
            token: "token".to_string(),
        }
    }

    #[test]
    fn test_prefers_ipv4() {
        let client = AgentClient::new(&endpoint()).unwrap();
        assert_eq!(client.host(), "10.0.0.5");
    }

    #[test]
    fn test_falls_back_to_ipv6() {
        let mut endpoint = endpoint();
        endpoint.ipv4_address = Some(String::new());
        let client = AgentClient::new(&endpoint).unwrap();
        assert_eq!(client.host(), "fd00::5");
    }

    #[test]
    fn test_missing_address_rejected() {
        let mut endpoint = endpoint();
        endpoint.ipv4_address = None;
        endpoint.ipv6_address = None;
        let err = AgentClient::new(&endpoint).unwrap_err();
        assert!(matches!(err, AgentProtocolError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_port_rejected() {
        let mut endpoint = endpoint();
        endpoint.port = 0;
        assert!(AgentClient::new(&endpoint).is_err());
    }

    #[test]
    fn test_missing_token_rejected() {
        let mut endpoint = endpoint();
        endpoint.token.clear();
        let err = AgentClient::new(&endpoint).unwrap_err();
        assert_eq!(err.to_string(), "invalid token");
    }
}
