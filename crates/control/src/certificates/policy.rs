//! Issuer and expiry checks on certificate records.

use certfleet_agent_protocol::Certificate;
use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use std::time::Duration;
use thiserror::Error;

use super::inspect::VALIDITY_FORMAT;

const LETS_ENCRYPT_ORGANIZATIONS: [&str; 2] = ["Let's Encrypt", "good guys"];
const LETS_ENCRYPT_COMMON_NAMES: [&str; 2] = ["Let's Encrypt", "R3"];

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("could not parse certificate expiry '{value}': {source}")]
    InvalidExpiry {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Classification helpers for [`Certificate`] records.
///
/// The Let's Encrypt check is a case-sensitive substring heuristic on the
/// reported names; it does not validate the chain.
pub trait CertificatePolicy {
    /// Issued by Let's Encrypt (including its staging "good guys" CA)
    fn is_lets_encrypt(&self) -> bool;

    /// Subject CN equals issuer CN
    fn is_self_signed(&self) -> bool;

    /// Parsed `ValidTo`
    fn expires_at(&self) -> Result<DateTime<FixedOffset>, PolicyError>;

    /// Expires within `threshold` of `now` (or has already expired)
    fn is_about_to_expire_at(
        &self,
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, PolicyError> {
        let remaining = self.expires_at()?.with_timezone(&Utc) - now;
        let threshold = TimeDelta::from_std(threshold).unwrap_or(TimeDelta::MAX);
        Ok(remaining < threshold)
    }

    /// Expires within `threshold` from now
    fn is_about_to_expire(&self, threshold: Duration) -> Result<bool, PolicyError> {
        self.is_about_to_expire_at(threshold, Utc::now())
    }
}

impl CertificatePolicy for Certificate {
    fn is_lets_encrypt(&self) -> bool {
        let by_organization = self
            .organization
            .iter()
            .chain(&self.issuer.organization)
            .any(|org| LETS_ENCRYPT_ORGANIZATIONS.iter().any(|le| org.contains(le)));

        by_organization || LETS_ENCRYPT_COMMON_NAMES.iter().any(|le| self.cn.contains(le))
    }

    fn is_self_signed(&self) -> bool {
        self.cn == self.issuer.cn
    }

    fn expires_at(&self) -> Result<DateTime<FixedOffset>, PolicyError> {
        DateTime::parse_from_str(&self.valid_to, VALIDITY_FORMAT).map_err(|source| {
            PolicyError::InvalidExpiry {
                value: self.valid_to.clone(),
                source,
            }
        })
    }
}
