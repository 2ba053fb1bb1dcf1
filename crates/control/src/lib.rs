//! Certificate renewal control plane.
//!
//! Keeps TLS certificates on a fleet of hosts current. Each host runs an
//! agent (see `certfleet-agent-protocol`) that reports its virtual hosts and
//! installs certificates on request. The control plane periodically sweeps
//! every host, renews Let's Encrypt certificates that are about to expire
//! and records the outcome.
//!
//! # Modules
//!
//! - [`hosts`], [`settings`]: stores for managed hosts and per-domain settings
//! - [`domains`]: domains derived from agent virtual hosts
//! - [`certificates`]: expiry policy, inspection and self-signed generation
//! - [`renewal`]: sweep manager, scheduler and renewal logs
//! - [`monitor`], [`service`]: host refresh and on-demand certificate operations

pub mod certificates;
pub mod domains;
pub mod errors;
pub mod hosts;
pub mod monitor;
pub mod plane;
pub mod renewal;
pub mod service;
pub mod settings;

pub use errors::{ControlError, Result, StoreError};
pub use hosts::{AgentOptions, Host, HostStore, MemoryHostStore};
pub use monitor::{HostDetails, HostMonitor};
pub use plane::ControlPlane;
pub use renewal::{RenewalManager, RenewalScheduler, SweepSummary};
pub use service::{CertificateService, StorageCertificateItem};
pub use settings::{DomainSetting, DomainSettingStore, MemoryDomainSettingStore};
