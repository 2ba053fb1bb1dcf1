//! Agent server for reference agents and tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::errors::AgentProtocolError;
use crate::protocol::{read_frame, write_frame, AgentRequest, AgentResponse};

/// Agent server speaking the host agent protocol over TCP.
///
/// Each accepted connection carries one request and one response.
pub struct AgentServer {
    /// Agent ID
    id: String,
    /// Bound listener
    listener: TcpListener,
    /// Token every request must carry, if set
    token: Option<String>,
    /// Request handler
    handler: Arc<dyn AgentHandler>,
}

/// Trait for implementing agent logic
#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// Handle one command
    async fn handle(&self, request: AgentRequest) -> AgentResponse;
}

impl AgentServer {
    /// Bind a new agent server
    pub async fn bind(
        id: impl Into<String>,
        addr: impl ToSocketAddrs,
        handler: Arc<dyn AgentHandler>,
    ) -> Result<Self, AgentProtocolError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AgentProtocolError::Io {
                context: "could not bind agent listener",
                source,
            })?;

        Ok(Self {
            id: id.into(),
            listener,
            token: None,
            handler,
        })
    }

    /// Reject requests that do not carry `token`
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> Result<SocketAddr, AgentProtocolError> {
        self.listener
            .local_addr()
            .map_err(|source| AgentProtocolError::Io {
                context: "could not read listener address",
                source,
            })
    }

    /// Serve connections until the task is dropped
    pub async fn run(self) {
        info!(agent = %self.id, addr = ?self.listener.local_addr().ok(), "Agent server listening");

        let token = self.token.map(Arc::new);

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let handler = Arc::clone(&self.handler);
                    let token = token.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            Self::handle_connection(stream, handler.as_ref(), token.as_deref())
                                .await
                        {
                            error!(peer = %peer, error = %e, "Error handling agent connection");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Run the server on a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn handle_connection(
        mut stream: TcpStream,
        handler: &dyn AgentHandler,
        token: Option<&String>,
    ) -> Result<(), AgentProtocolError> {
        let body = read_frame(&mut stream).await?;

        let response = match serde_json::from_slice::<AgentRequest>(&body) {
            Ok(request) if token.is_some_and(|t| *t != request.token) => {
                debug!(command = %request.command, "Rejecting request with bad token");
                AgentResponse::error("invalid token")
            }
            Ok(request) => {
                debug!(command = %request.command, "Agent command received");
                handler.handle(request).await
            }
            Err(e) => AgentResponse::error(format!("invalid request: {e}")),
        };

        let response_bytes = serde_json::to_vec(&response)
            .map_err(|e| AgentProtocolError::Serialization(e.to_string()))?;
        write_frame(&mut stream, &response_bytes).await
    }
}

/// Reference implementation: answers every command from a fixed table.
///
/// Unknown commands get an error response. Received requests are recorded
/// so tests can inspect what was sent.
#[derive(Default)]
pub struct StaticAgent {
    responses: HashMap<String, AgentResponse>,
    received: Mutex<Vec<AgentRequest>>,
}

impl StaticAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with a successful response carrying `data`
    pub fn with_ok(mut self, command: &str, data: serde_json::Value) -> Self {
        self.responses
            .insert(command.to_string(), AgentResponse::ok(data));
        self
    }

    /// Answer `command` with a failure
    pub fn with_error(mut self, command: &str, message: &str) -> Self {
        self.responses
            .insert(command.to_string(), AgentResponse::error(message));
        self
    }

    /// Requests received so far, oldest first
    pub fn received(&self) -> Vec<AgentRequest> {
        self.received.lock().clone()
    }

    /// Requests received for one command
    pub fn received_for(&self, command: &str) -> Vec<AgentRequest> {
        self.received
            .lock()
            .iter()
            .filter(|r| r.command == command)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AgentHandler for StaticAgent {
    async fn handle(&self, request: AgentRequest) -> AgentResponse {
        let response = self
            .responses
            .get(&request.command)
            .cloned()
            .unwrap_or_else(|| {
                AgentResponse::error(format!("unknown command: {}", request.command))
            });

        self.received.lock().push(request);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AgentClient, AgentEndpoint};
    use crate::protocol::commands;
    use serde_json::json;

    async fn start(agent: Arc<StaticAgent>, token: &str) -> u16 {
        let server = AgentServer::bind("test", "127.0.0.1:0", agent)
            .await
            .unwrap()
            .with_token(token);
        let port = server.local_addr().unwrap().port();
        server.spawn();
        port
    }

    fn client(port: u16, token: &str) -> AgentClient {
        AgentClient::new(&AgentEndpoint {
            ipv4_address: Some("127.0.0.1".to_string()),
            ipv6_address: None,
            port,
            token: token.to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_static_agent_answers_and_records() {
        let agent = Arc::new(StaticAgent::new().with_ok(commands::GET_VHOSTS, json!([])));
        let port = start(agent.clone(), "secret").await;

        let vhosts = client(port, "secret").get_vhosts().await.unwrap();
        assert!(vhosts.is_empty());

        let received = agent.received_for(commands::GET_VHOSTS);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].token, "secret");
    }

    #[tokio::test]
    async fn test_wrong_token_rejected() {
        let agent = Arc::new(StaticAgent::new().with_ok(commands::GET_VHOSTS, json!([])));
        let port = start(agent.clone(), "secret").await;

        let err = client(port, "guess").get_vhosts().await.unwrap_err();
        assert_eq!(err.to_string(), "invalid token");
        assert!(agent.received().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command_is_remote_error() {
        let agent = Arc::new(StaticAgent::new());
        let port = start(agent, "secret").await;

        let err = client(port, "secret").refresh().await.unwrap_err();
        assert!(matches!(err, AgentProtocolError::Remote { .. }));
        assert!(!err.is_connection_error());
    }
}
