//! Renewal history writers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::errors::{ControlError, StoreError};

/// Receives the outcome of one host's renewals.
///
/// Called once per host that produced a result without a host-level error.
#[async_trait]
pub trait RenewalLogWriter: Send + Sync {
    async fn write_log(
        &self,
        host_id: u64,
        success_domains: &[String],
        failed_domains: &BTreeMap<String, ControlError>,
    ) -> Result<(), StoreError>;
}

/// Writes renewal outcomes as log lines
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogWriter;

#[async_trait]
impl RenewalLogWriter for TracingLogWriter {
    async fn write_log(
        &self,
        host_id: u64,
        success_domains: &[String],
        failed_domains: &BTreeMap<String, ControlError>,
    ) -> Result<(), StoreError> {
        for domain in success_domains {
            info!(host_id, domain = %domain, "Certificate successfully renewed");
        }

        for (domain, err) in failed_domains {
            error!(host_id, domain = %domain, error = %err, "Certificate renewal failed");
        }

        Ok(())
    }
}

/// One persisted renewal outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalLogRecord {
    pub host_id: u64,
    pub domain_name: String,
    /// Failure message, `None` for a successful renewal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Appends renewal outcomes to a JSON-lines file.
///
/// One record per domain. Batches without any domain are not written.
#[derive(Debug)]
pub struct FileLogWriter {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileLogWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Newest records first, at most `limit`
    pub async fn latest(&self, limit: usize) -> Result<Vec<RenewalLogRecord>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    context: format!("could not read renewal log {}", self.path.display()),
                    source,
                })
            }
        };

        let mut records = Vec::new();
        for line in content.lines().rev() {
            if records.len() == limit {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(line)?);
        }

        Ok(records)
    }

    async fn append(&self, records: &[RenewalLogRecord]) -> Result<(), StoreError> {
        let mut buffer = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }

        let io_err = |source| StoreError::Io {
            context: format!("could not write renewal log {}", self.path.display()),
            source,
        };

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;
        file.write_all(&buffer).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;

        debug!(path = %self.path.display(), records = records.len(), "Renewal log appended");
        Ok(())
    }
}

#[async_trait]
impl RenewalLogWriter for FileLogWriter {
    async fn write_log(
        &self,
        host_id: u64,
        success_domains: &[String],
        failed_domains: &BTreeMap<String, ControlError>,
    ) -> Result<(), StoreError> {
        let created_at = Utc::now();

        let records: Vec<RenewalLogRecord> = success_domains
            .iter()
            .map(|domain| RenewalLogRecord {
                host_id,
                domain_name: domain.clone(),
                error: None,
                created_at,
            })
            .chain(failed_domains.iter().map(|(domain, err)| RenewalLogRecord {
                host_id,
                domain_name: domain.clone(),
                error: Some(err.to_string()),
                created_at,
            }))
            .collect();

        if records.is_empty() {
            return Ok(());
        }

        self.append(&records).await
    }
}

/// Forwards to several writers; every writer runs even if one fails
pub struct FanoutLogWriter {
    writers: Vec<Box<dyn RenewalLogWriter>>,
}

impl FanoutLogWriter {
    pub fn new(writers: Vec<Box<dyn RenewalLogWriter>>) -> Self {
        Self { writers }
    }
}

#[async_trait]
impl RenewalLogWriter for FanoutLogWriter {
    async fn write_log(
        &self,
        host_id: u64,
        success_domains: &[String],
        failed_domains: &BTreeMap<String, ControlError>,
    ) -> Result<(), StoreError> {
        let mut first_error = None;
        for writer in &self.writers {
            if let Err(e) = writer
                .write_log(host_id, success_domains, failed_domains)
                .await
            {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certfleet_agent_protocol::AgentProtocolError;

    fn failure(message: &str) -> ControlError {
        ControlError::Agent(AgentProtocolError::Remote {
            command: "certificates.issue".to_string(),
            message: message.to_string(),
        })
    }

    #[tokio::test]
    async fn test_empty_batch_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileLogWriter::new(dir.path().join("renewals.jsonl"));

        writer.write_log(1, &[], &BTreeMap::new()).await.unwrap();

        assert!(!writer.path().exists());
        assert!(writer.latest(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_round_trip_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileLogWriter::new(dir.path().join("logs").join("renewals.jsonl"));

        writer
            .write_log(1, &["a.example.com".to_string()], &BTreeMap::new())
            .await
            .unwrap();

        let mut failed = BTreeMap::new();
        failed.insert("b.example.com".to_string(), failure("rate limited"));
        writer
            .write_log(2, &["c.example.com".to_string()], &failed)
            .await
            .unwrap();

        let records = writer.latest(10).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].domain_name, "b.example.com");
        assert_eq!(records[0].error.as_deref(), Some("rate limited"));
        assert_eq!(records[1].domain_name, "c.example.com");
        assert_eq!(records[2].host_id, 1);
        assert!(records[2].error.is_none());

        let limited = writer.latest(1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].domain_name, "b.example.com");
    }

    #[tokio::test]
    async fn test_tracing_writer_never_fails() {
        let mut failed = BTreeMap::new();
        failed.insert("b.example.com".to_string(), failure("boom"));
        TracingLogWriter
            .write_log(1, &["a.example.com".to_string()], &failed)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fanout_reaches_every_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renewals.jsonl");
        let fanout = FanoutLogWriter::new(vec![
            Box::new(TracingLogWriter),
            Box::new(FileLogWriter::new(&path)),
        ]);

        fanout
            .write_log(4, &["a.example.com".to_string()], &BTreeMap::new())
            .await
            .unwrap();

        let records = FileLogWriter::new(&path).latest(5).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].host_id, 4);
    }
}
