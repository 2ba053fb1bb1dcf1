//! Agent protocol envelopes, command names and framing.
//!
//! Every message on the wire is a 4-byte big-endian length followed by a
//! JSON body. Requests carry `{"Token", "Command", "Data"}`, responses carry
//! `{"Status", "Error", "Data"}`. A connection carries exactly one request
//! and one response.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::errors::AgentProtocolError;
use crate::types::nullable;

/// Size of the length prefix in bytes
pub const HEADER_LENGTH: usize = 4;

/// Maximum message size (10MB)
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Response status reported by a successful command
pub const STATUS_OK: &str = "ok";

/// Message used when the agent fails without saying why
pub const UNKNOWN_ERROR: &str = "unknown error";

const READ_CHUNK_SIZE: usize = 256;

/// Remote command names. These strings are part of the wire contract.
pub mod commands {
    pub const REFRESH: &str = "refresh";
    pub const GET_VHOSTS: &str = "getVhosts";
    pub const GET_VHOST_CERTIFICATE: &str = "getVhostCertificate";

    pub const CERTIFICATE_ISSUE: &str = "certificates.issue";
    pub const CERTIFICATE_UPLOAD: &str = "certificates.upload";
    pub const CERTIFICATE_DOMAIN_ASSIGN: &str = "certificates.domainassign";
    pub const STORAGE_CERT_UPLOAD: &str = "certificates.storagecertupload";
    pub const STORAGE_CERT_REMOVE: &str = "certificates.storagecertremove";
    pub const STORAGE_CERTIFICATES: &str = "certificates.storagecertificates";
    pub const STORAGE_CERT_NAME_LIST: &str = "certificates.storagecertnamelist";
    pub const STORAGE_CERT_DOWNLOAD: &str = "certificates.storagecertdownload";
    pub const STORAGE_CERT_DATA: &str = "certificates.storagecertdata";
    pub const COMMON_DIR_STATUS: &str = "certificates.commondirstatus";
    pub const CHANGE_COMMON_DIR_STATUS: &str = "certificates.changecommondirstatus";
}

/// Request envelope sent to an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Shared secret of the host
    #[serde(rename = "Token")]
    pub token: String,
    /// Command name (see [`commands`])
    #[serde(rename = "Command")]
    pub command: String,
    /// Command payload
    #[serde(rename = "Data", default)]
    pub data: serde_json::Value,
}

/// Response envelope returned by an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// `"ok"` on success, anything else (including missing) is a failure
    #[serde(rename = "Status", default, deserialize_with = "nullable")]
    pub status: String,
    /// Human-readable failure message
    #[serde(rename = "Error", default, deserialize_with = "nullable")]
    pub error: String,
    /// Command result
    #[serde(rename = "Data", default)]
    pub data: serde_json::Value,
}

impl AgentResponse {
    /// Create a successful response
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            error: String::new(),
            data,
        }
    }

    /// Create a failed response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: message.into(),
            data: serde_json::Value::Null,
        }
    }

    /// Check the status, turning a failure into a protocol error
    pub fn into_result(self, command: &str) -> Result<serde_json::Value, AgentProtocolError> {
        if self.status == STATUS_OK {
            return Ok(self.data);
        }

        let message = if self.error.is_empty() {
            UNKNOWN_ERROR.to_string()
        } else {
            self.error
        };

        Err(AgentProtocolError::Remote {
            command: command.to_string(),
            message,
        })
    }
}

/// Write one length-prefixed frame
pub async fn write_frame<W>(writer: &mut W, data: &[u8]) -> Result<(), AgentProtocolError>
where
    W: AsyncWrite + Unpin,
{
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(AgentProtocolError::MessageTooLarge {
            size: data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let len_bytes = (data.len() as u32).to_be_bytes();
    writer
        .write_all(&len_bytes)
        .await
        .map_err(|source| AgentProtocolError::Io {
            context: "could not send request header",
            source,
        })?;
    writer
        .write_all(data)
        .await
        .map_err(|source| AgentProtocolError::Io {
            context: "could not send request data",
            source,
        })?;
    writer.flush().await.map_err(|source| AgentProtocolError::Io {
        context: "could not send request data",
        source,
    })?;

    Ok(())
}

/// Read one length-prefixed frame.
///
/// The body is accumulated chunk by chunk until the declared length is
/// reached or the peer closes the stream, whichever comes first.
pub async fn read_frame<R>(reader: &mut R) -> Result<Bytes, AgentProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; HEADER_LENGTH];
    reader
        .read_exact(&mut len_bytes)
        .await
        .map_err(|source| AgentProtocolError::Io {
            context: "could not read response data length",
            source,
        })?;
    let message_len = u32::from_be_bytes(len_bytes) as usize;

    if message_len > MAX_MESSAGE_SIZE {
        return Err(AgentProtocolError::MessageTooLarge {
            size: message_len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut buffer = BytesMut::with_capacity(message_len);
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    while buffer.len() < message_len {
        let want = READ_CHUNK_SIZE.min(message_len - buffer.len());
        let read = reader
            .read(&mut chunk[..want])
            .await
            .map_err(|source| AgentProtocolError::Io {
                context: "could not read response",
                source,
            })?;

        if read == 0 {
            trace!(
                expected = message_len,
                received = buffer.len(),
                "Peer closed stream before declared length"
            );
            break;
        }

        buffer.extend_from_slice(&chunk[..read]);
    }

    Ok(buffer.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_request_envelope_field_names() {
        let request = AgentRequest {
            token: "secret".to_string(),
            command: commands::GET_VHOSTS.to_string(),
            data: serde_json::Value::Null,
        };

        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(
            encoded,
            json!({"Token": "secret", "Command": "getVhosts", "Data": null})
        );
    }

    #[test]
    fn test_error_status_uses_message() {
        let response: AgentResponse =
            serde_json::from_str(r#"{"Status":"error","Error":"vhost not found","Data":null}"#)
                .unwrap();

        let err = response.into_result("getVhostCertificate").unwrap_err();
        match err {
            AgentProtocolError::Remote { command, message } => {
                assert_eq!(command, "getVhostCertificate");
                assert_eq!(message, "vhost not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_status_without_message() {
        let response: AgentResponse = serde_json::from_str(r#"{"Status":"failed"}"#).unwrap();
        let err = response.into_result("refresh").unwrap_err();
        assert_eq!(err.to_string(), UNKNOWN_ERROR);
    }

    #[test]
    fn test_missing_status_is_remote_error() {
        let response: AgentResponse = serde_json::from_str(r#"{"Error":"disk full"}"#).unwrap();
        assert!(response.status.is_empty());

        let err = response.into_result("certificates.issue").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        match err {
            AgentProtocolError::Remote { command, message } => {
                assert_eq!(command, "certificates.issue");
                assert_eq!(message, "disk full");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_null_status_is_unknown_error() {
        let response: AgentResponse =
            serde_json::from_str(r#"{"Status":null,"Error":null,"Data":null}"#).unwrap();

        let err = response.into_result("refresh").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.to_string(), UNKNOWN_ERROR);
    }

    #[test]
    fn test_ok_status_returns_data() {
        let response = AgentResponse::ok(json!({"Status": true}));
        let data = response.into_result("certificates.commondirstatus").unwrap();
        assert_eq!(data, json!({"Status": true}));
    }

    #[tokio::test]
    async fn test_frame_header_is_big_endian() {
        let mut out = Vec::new();
        write_frame(&mut out, b"hello").await.unwrap();
        assert_eq!(&out[..4], &[0, 0, 0, 5]);
        assert_eq!(&out[4..], b"hello");
    }

    #[tokio::test]
    async fn test_short_stream_returns_received_bytes() {
        let mut data = Vec::new();
        data.extend_from_slice(&10u32.to_be_bytes());
        data.extend_from_slice(b"abc");

        let mut reader = data.as_slice();
        let body = read_frame(&mut reader).await.unwrap();
        assert_eq!(&body[..], b"abc");
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let data = ((MAX_MESSAGE_SIZE + 1) as u32).to_be_bytes();
        let mut reader = &data[..];
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, AgentProtocolError::MessageTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_missing_header_is_io_error() {
        let mut reader: &[u8] = &[0, 1];
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, AgentProtocolError::Io { .. }));
    }

    async fn read_chunked(payload: Vec<u8>, chunk_sizes: Vec<usize>) -> Vec<u8> {
        let (mut client, mut server) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            let mut wire = (payload.len() as u32).to_be_bytes().to_vec();
            wire.extend_from_slice(&payload);

            let mut offset = 0;
            let mut sizes = chunk_sizes.into_iter().cycle();
            while offset < wire.len() {
                let size = sizes.next().unwrap_or(1).max(1);
                let end = (offset + size).min(wire.len());
                server.write_all(&wire[offset..end]).await.unwrap();
                server.flush().await.unwrap();
                offset = end;
                tokio::task::yield_now().await;
            }
        });

        let body = read_frame(&mut client).await.unwrap();
        writer.await.unwrap();
        body.to_vec()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_payload_survives_arbitrary_chunking(
            payload in proptest::collection::vec(any::<u8>(), 0..2048),
            chunk_sizes in proptest::collection::vec(1usize..300, 1..8),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let received = runtime.block_on(read_chunked(payload.clone(), chunk_sizes));
            prop_assert_eq!(received, payload);
        }
    }
}
