//! Type-safe identifier newtypes.
//!
//! A host is addressed by its guid everywhere outside the store; the
//! numeric id only appears in renewal logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identity of a managed host.
///
/// Guids are compared verbatim. They are usually UUIDs but any non-empty
/// string issued by the inventory is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostGuid(String);

impl HostGuid {
    pub fn new(guid: impl Into<String>) -> Self {
        Self(guid.into())
    }

    /// Create a new random guid
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for HostGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for HostGuid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for HostGuid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for HostGuid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of one renewal sweep.
///
/// Attached to every log line of a sweep so concurrent host workers can be
/// correlated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SweepId(String);

impl SweepId {
    /// Create a new random sweep ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SweepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SweepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_guid_serializes_as_string() {
        let guid = HostGuid::new("2f0c8a5e-host");
        assert_eq!(serde_json::to_string(&guid).unwrap(), "\"2f0c8a5e-host\"");

        let back: HostGuid = serde_json::from_str("\"2f0c8a5e-host\"").unwrap();
        assert_eq!(back, guid);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(HostGuid::generate(), HostGuid::generate());
        assert_ne!(SweepId::new(), SweepId::new());
    }

    #[test]
    fn test_display() {
        assert_eq!(HostGuid::from("abc").to_string(), "abc");
    }
}
