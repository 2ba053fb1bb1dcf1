//! Control plane error types.

use certfleet_agent_protocol::AgentProtocolError;
use certfleet_common::HostGuid;
use thiserror::Error;

use crate::certificates::{CertificateError, PolicyError};

/// Errors surfaced by control plane operations
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("host not found: {0}")]
    HostNotFound(HostGuid),

    /// The host agent could not be reached; the host was marked inactive
    #[error("could not connect to the server agent of host {guid}")]
    AgentConnection {
        guid: HostGuid,
        #[source]
        source: AgentProtocolError,
    },

    #[error(transparent)]
    Agent(#[from] AgentProtocolError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error("invalid certificate data: {0}")]
    InvalidCertificateData(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl ControlError {
    /// True if the failure means the host could not be reached at all
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::AgentConnection { .. } => true,
            Self::Agent(e) => e.is_connection_error(),
            _ => false,
        }
    }
}

/// Failures of host, setting and renewal log stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not encode record: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("{0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, ControlError>;
