//! Host agent protocol for certfleet.
//!
//! A host agent is a small daemon on each managed server. The control plane
//! talks to it over TCP with length-prefixed JSON messages, one request per
//! connection:
//!
//! ```text
//! +----------------+-----------------------------------------+
//! | length (u32 BE)| {"Token": ..., "Command": ..., "Data": ..}|
//! +----------------+-----------------------------------------+
//! ```
//!
//! [`AgentClient`] covers host-level commands (metadata, virtual hosts),
//! [`CertificateCommands`] covers certificate issuance and storage.
//! [`AgentServer`] is a reference agent used by tests and local tooling.

mod certificates;
mod client;
mod errors;
mod protocol;
mod server;
mod transport;
mod types;

pub use certificates::{CertificateCommands, HTTP_CHALLENGE};
pub use client::{AgentClient, AgentEndpoint};
pub use errors::{AgentProtocolError, ErrorKind};
pub use protocol::{
    commands, read_frame, write_frame, AgentRequest, AgentResponse, HEADER_LENGTH,
    MAX_MESSAGE_SIZE, STATUS_OK, UNKNOWN_ERROR,
};
pub use server::{AgentHandler, AgentServer, StaticAgent};
pub use transport::{TcpTransport, DEFAULT_CONNECT_TIMEOUT};
pub use types::*;
