//! TCP transport for the agent protocol.

use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tracing::trace;

use crate::errors::AgentProtocolError;
use crate::protocol::{read_frame, write_frame};

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens one TCP connection per request.
///
/// Only address resolution and dialing are bounded by a timeout. Once
/// connected, a peer that never answers keeps the caller waiting.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create a transport for `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Remote host (address or name)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Remote port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Send one frame and return the response frame.
    ///
    /// Resolution and dial failures are reported as
    /// [`AgentProtocolError::Connection`]; everything after the connection is
    /// established is an I/O error. The connection is dropped on return.
    pub async fn request(&self, data: &[u8]) -> Result<Bytes, AgentProtocolError> {
        let mut stream = self.connect().await?;

        trace!(
            host = %self.host,
            port = self.port,
            bytes = data.len(),
            "Sending agent request"
        );

        write_frame(&mut stream, data).await?;
        let response = read_frame(&mut stream).await?;

        trace!(
            host = %self.host,
            port = self.port,
            bytes = response.len(),
            "Received agent response"
        );

        Ok(response)
    }

    async fn connect(&self) -> Result<TcpStream, AgentProtocolError> {
        let addr = self.resolve().await?;

        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(AgentProtocolError::Connection {
                context: "could not connect to the server agent",
                source,
            }),
            Err(_) => Err(AgentProtocolError::Connection {
                context: "could not connect to the server agent",
                source: io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", self.connect_timeout),
                ),
            }),
        }
    }

    async fn resolve(&self) -> Result<SocketAddr, AgentProtocolError> {
        let lookup = tokio::time::timeout(
            self.connect_timeout,
            lookup_host((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| AgentProtocolError::Connection {
            context: "could not resolve TCP address",
            source: io::Error::new(io::ErrorKind::TimedOut, "address resolution timed out"),
        })?;

        lookup
            .map_err(|source| AgentProtocolError::Connection {
                context: "could not resolve TCP address",
                source,
            })?
            .next()
            .ok_or_else(|| AgentProtocolError::Connection {
                context: "could not resolve TCP address",
                source: io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no addresses found for {}", self.host),
                ),
            })
    }
}
