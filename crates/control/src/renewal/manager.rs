//! Fleet-wide certificate renewal sweep.
//!
//! One sweep walks every host with a bounded pool of workers. Each worker
//! takes a host, lists its domains and renews the Let's Encrypt
//! certificates that are close to expiry. Results are collected by the
//! caller and handed to the [`RenewalLogWriter`].

use certfleet_agent_protocol::{CertificateCommands, CertificateIssueRequest, HTTP_CHALLENGE};
use certfleet_common::{HostGuid, SweepId};
use certfleet_config::Config;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::log::RenewalLogWriter;
use crate::certificates::CertificatePolicy;
use crate::domains::{Domain, DomainProvider};
use crate::errors::{ControlError, Result};
use crate::hosts::{AgentOptions, Host, HostStore};
use crate::settings::{DomainSettingStore, EMAIL_SETTING, RENEWAL_SETTING};

/// Default upper bound on concurrently processed hosts
pub const DEFAULT_MAX_WORKERS: usize = 10;

/// Default renewal window before expiry (30 days)
pub const DEFAULT_RENEW_BEFORE: Duration = Duration::from_secs(30 * 24 * 3600);

/// Outcome of one host within a sweep
#[derive(Debug)]
pub struct RenewalResult {
    pub host_id: u64,
    pub host_guid: HostGuid,
    pub host_name: String,
    /// Domains renewed, in processing order
    pub success_domains: Vec<String>,
    /// Domain name to the error that stopped its renewal
    pub failed_domains: BTreeMap<String, ControlError>,
    /// Set when the host could not be processed at all
    pub error: Option<ControlError>,
}

impl RenewalResult {
    fn new(host: &Host) -> Self {
        Self {
            host_id: host.id,
            host_guid: host.guid.clone(),
            host_name: host.name.clone(),
            success_domains: Vec::new(),
            failed_domains: BTreeMap::new(),
            error: None,
        }
    }

    fn failed_host(host: &Host, error: ControlError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(host)
        }
    }

    /// True if the host was unreachable, either up front or while renewing
    pub fn lost_connection(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(ControlError::is_connection_error)
            || self
                .failed_domains
                .values()
                .any(ControlError::is_connection_error)
    }
}

/// Counters of a finished sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub hosts: usize,
    pub host_errors: usize,
    pub renewed: usize,
    pub failed: usize,
}

/// Why a domain was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    NoCertificate,
    RenewalDisabled,
    NotLetsEncrypt,
    NotExpiring,
}

impl Skip {
    fn reason(self) -> &'static str {
        match self {
            Self::NoCertificate => "no certificate installed",
            Self::RenewalDisabled => "auto renewal is disabled",
            Self::NotLetsEncrypt => "not a Let's Encrypt certificate",
            Self::NotExpiring => "certificate is not about to expire",
        }
    }
}

/// Runs renewal sweeps over every managed host.
///
/// Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct RenewalManager {
    hosts: Arc<dyn HostStore>,
    settings: Arc<dyn DomainSettingStore>,
    domains: Arc<dyn DomainProvider>,
    log_writer: Arc<dyn RenewalLogWriter>,
    agent_options: AgentOptions,
    renew_before: Duration,
    max_workers: usize,
}

impl RenewalManager {
    pub fn new(
        hosts: Arc<dyn HostStore>,
        settings: Arc<dyn DomainSettingStore>,
        domains: Arc<dyn DomainProvider>,
        log_writer: Arc<dyn RenewalLogWriter>,
    ) -> Self {
        Self {
            hosts,
            settings,
            domains,
            log_writer,
            agent_options: AgentOptions::default(),
            renew_before: DEFAULT_RENEW_BEFORE,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    /// Apply the `agent` and `renewal` configuration blocks
    pub fn with_config(self, config: &Config) -> Self {
        self.with_agent_options(AgentOptions::from_config(config))
            .with_renew_before(config.renewal.renew_before())
            .with_max_workers(config.renewal.max_workers)
    }

    pub fn with_agent_options(mut self, options: AgentOptions) -> Self {
        self.agent_options = options;
        self
    }

    pub fn with_renew_before(mut self, renew_before: Duration) -> Self {
        self.renew_before = renew_before;
        self
    }

    /// Set the worker bound; values below one are raised to one
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Run one sweep over every host.
    ///
    /// Only a failure to enumerate hosts is returned; host and domain
    /// failures are logged and recorded instead.
    pub async fn run(&self) -> Result<SweepSummary> {
        let sweep_id = SweepId::new();
        let span = info_span!("renewal_sweep", sweep = %sweep_id);
        self.sweep_hosts().instrument(span).await
    }

    async fn sweep_hosts(&self) -> Result<SweepSummary> {
        let started = Instant::now();

        let hosts = match self.hosts.list_all().await {
            Ok(hosts) => hosts,
            Err(e) => {
                error!(error = %e, "Could not list hosts, renewal sweep aborted");
                return Err(e.into());
            }
        };

        let host_count = hosts.len();
        if host_count == 0 {
            debug!("No hosts registered, nothing to renew");
            return Ok(SweepSummary::default());
        }

        let workers = host_count.min(self.max_workers);
        info!(hosts = host_count, workers, "Starting certificate renewal sweep");

        let (job_tx, job_rx) = mpsc::channel(host_count);
        for host in hosts {
            // Capacity equals the host count and the receiver is alive
            if job_tx.send(host).await.is_err() {
                break;
            }
        }
        drop(job_tx);

        let jobs = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel(host_count);

        for worker_id in 0..workers {
            let manager = self.clone();
            let jobs = Arc::clone(&jobs);
            let results = result_tx.clone();
            tokio::spawn(
                async move { manager.worker(worker_id, jobs, results).await }.in_current_span(),
            );
        }
        drop(result_tx);

        let mut summary = SweepSummary::default();
        while let Some(result) = result_rx.recv().await {
            self.record(&result, &mut summary).await;
            if summary.hosts == host_count {
                break;
            }
        }

        info!(
            hosts = summary.hosts,
            host_errors = summary.host_errors,
            renewed = summary.renewed,
            failed = summary.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Certificate renewal sweep finished"
        );

        Ok(summary)
    }

    async fn worker(
        &self,
        worker_id: usize,
        jobs: Arc<Mutex<mpsc::Receiver<Host>>>,
        results: mpsc::Sender<RenewalResult>,
    ) {
        loop {
            let next = { jobs.lock().await.recv().await };
            let Some(host) = next else {
                break;
            };

            debug!(worker = worker_id, host = %host.name, "Processing host");
            let result = self.renew_host(&host).await;

            if results.send(result).await.is_err() {
                break;
            }
        }
    }

    /// Renew every eligible domain of one host
    pub async fn renew_host(&self, host: &Host) -> RenewalResult {
        let domains = match self.domains.get_domains(&host.guid).await {
            Ok(domains) => domains,
            Err(e) => return RenewalResult::failed_host(host, e),
        };

        let client = match self.agent_options.client(host) {
            Ok(client) => client,
            Err(e) => return RenewalResult::failed_host(host, e.into()),
        };
        let commands = CertificateCommands::new(client);

        let mut result = RenewalResult::new(host);

        for domain in &domains {
            match self.renew_domain(host, &commands, domain).await {
                Ok(None) => {
                    info!(host = %host.name, domain = %domain.server_name, "Certificate renewed");
                    result.success_domains.push(domain.server_name.clone());
                }
                Ok(Some(skip)) => {
                    debug!(
                        host = %host.name,
                        domain = %domain.server_name,
                        reason = skip.reason(),
                        "Skipping domain"
                    );
                }
                Err(e) => {
                    warn!(
                        host = %host.name,
                        domain = %domain.server_name,
                        error = %e,
                        "Domain renewal failed"
                    );
                    result.failed_domains.insert(domain.server_name.clone(), e);
                }
            }
        }

        result
    }

    /// `Ok(None)` when renewed, `Ok(Some(_))` when skipped
    async fn renew_domain(
        &self,
        host: &Host,
        commands: &CertificateCommands,
        domain: &Domain,
    ) -> Result<Option<Skip>> {
        let Some(certificate) = &domain.certificate else {
            return Ok(Some(Skip::NoCertificate));
        };

        let renewal = self
            .settings
            .find_setting(&domain.server_name, &host.guid, RENEWAL_SETTING)
            .await?;
        if renewal.as_ref().is_none_or(|s| s.value == "false") {
            return Ok(Some(Skip::RenewalDisabled));
        }

        let email = match certificate.email_addresses.first() {
            Some(email) => email.clone(),
            None => self.fallback_email(host, domain).await,
        };

        if !certificate.is_lets_encrypt() {
            return Ok(Some(Skip::NotLetsEncrypt));
        }

        if !certificate.is_about_to_expire(self.renew_before)? {
            return Ok(Some(Skip::NotExpiring));
        }

        info!(
            host = %host.name,
            domain = %domain.server_name,
            valid_to = %certificate.valid_to,
            "Certificate is about to expire, renewing"
        );

        let request = CertificateIssueRequest {
            email,
            server_name: certificate.cn.clone(),
            web_server: domain.web_server.clone(),
            challenge_type: HTTP_CHALLENGE.to_string(),
            subjects: certificate.dns_names.clone(),
            additional_params: HashMap::new(),
            assign: true,
        };
        commands.issue(&request).await?;

        Ok(None)
    }

    /// The `email` setting of the domain; lookup failures yield an empty address
    async fn fallback_email(&self, host: &Host, domain: &Domain) -> String {
        match self
            .settings
            .find_setting(&domain.server_name, &host.guid, EMAIL_SETTING)
            .await
        {
            Ok(setting) => setting.map(|s| s.value).unwrap_or_default(),
            Err(e) => {
                debug!(domain = %domain.server_name, error = %e, "Email setting lookup failed");
                String::new()
            }
        }
    }

    async fn record(&self, result: &RenewalResult, summary: &mut SweepSummary) {
        summary.hosts += 1;

        match &result.error {
            Some(e) => {
                summary.host_errors += 1;
                error!(host = %result.host_name, error = %e, "Renewal failed for host");
            }
            None => {
                summary.renewed += result.success_domains.len();
                summary.failed += result.failed_domains.len();

                if let Err(e) = self
                    .log_writer
                    .write_log(result.host_id, &result.success_domains, &result.failed_domains)
                    .await
                {
                    error!(host = %result.host_name, error = %e, "Could not write renewal log");
                }
            }
        }

        if result.lost_connection() {
            self.mark_inactive(&result.host_guid).await;
        }
    }

    async fn mark_inactive(&self, guid: &HostGuid) {
        let host = match self.hosts.find_by_guid(guid).await {
            Ok(Some(host)) => host,
            Ok(None) => return,
            Err(e) => {
                error!(host = %guid, error = %e, "Could not load host to mark it inactive");
                return;
            }
        };

        if !host.is_active {
            return;
        }

        warn!(host = %host.name, "Server agent unreachable, marking host inactive");
        let host = Host {
            is_active: false,
            ..host
        };
        if let Err(e) = self.hosts.save(&host).await {
            error!(host = %host.name, error = %e, "Could not mark host inactive");
        }
    }
}
