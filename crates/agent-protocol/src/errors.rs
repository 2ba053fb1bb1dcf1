//! Agent protocol error types.

use thiserror::Error;

/// Coarse classification of an [`AgentProtocolError`].
///
/// Callers branch on this rather than on individual variants: a
/// [`ErrorKind::Connection`] failure means the host could not be reached at
/// all and should be treated as inactive, everything else means the agent
/// answered (or the request never left this process).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Address resolution or dial failure
    Connection,
    /// I/O failure on an established connection
    Io,
    /// The agent replied with a non-"ok" status
    Protocol,
    /// The agent replied with a payload of the wrong shape
    Decoding,
    /// The client was built from an incomplete host record
    Config,
}

/// Agent protocol errors
#[derive(Error, Debug)]
pub enum AgentProtocolError {
    #[error("{context}: {source}")]
    Connection {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("{message}")]
    Remote { command: String, message: String },

    #[error("could not decode response: {0}")]
    InvalidMessage(String),

    #[error("invalid {what} data: {reason}")]
    InvalidData { what: &'static str, reason: String },

    #[error("could not encode data: {0}")]
    Serialization(String),

    #[error("{0}")]
    InvalidConfig(String),
}

impl AgentProtocolError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Io { .. } | Self::MessageTooLarge { .. } => ErrorKind::Io,
            Self::Remote { .. } => ErrorKind::Protocol,
            Self::InvalidMessage(_) | Self::InvalidData { .. } => ErrorKind::Decoding,
            Self::Serialization(_) | Self::InvalidConfig(_) => ErrorKind::Config,
        }
    }

    /// True if the host could not be reached at all.
    pub fn is_connection_error(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }

    pub(crate) fn invalid_data(what: &'static str, err: impl std::fmt::Display) -> Self {
        Self::InvalidData {
            what,
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_connection_error_keeps_cause() {
        let err = AgentProtocolError::Connection {
            context: "could not connect to the server agent",
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };

        assert!(err.is_connection_error());
        assert_eq!(
            err.to_string(),
            "could not connect to the server agent: refused"
        );
        let cause = err.source().unwrap().downcast_ref::<io::Error>().unwrap();
        assert_eq!(cause.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn test_remote_error_is_not_connection_error() {
        let err = AgentProtocolError::Remote {
            command: "certificates.issue".to_string(),
            message: "acme order failed".to_string(),
        };

        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(!err.is_connection_error());
        assert_eq!(err.to_string(), "acme order failed");
    }

    #[test]
    fn test_write_failure_is_io_kind() {
        let err = AgentProtocolError::Io {
            context: "could not send request data",
            source: io::Error::from(io::ErrorKind::BrokenPipe),
        };
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
