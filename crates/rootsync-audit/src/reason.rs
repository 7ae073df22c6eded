//! Skip reasons for audit entries
//!
//! Structured codes explaining why a log entry read during a poll produced
//! no change. Emitted as a `reason` field on scanner log events.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a log entry was dropped from a change summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The document no longer exists; a later deletion supersedes the entry
    NotFound,
    /// The principal may not read the document
    AccessDenied,
    /// The document exists but no adapter accepts it
    NotAdaptable,
    /// No synchronization root above the document could be resolved
    Rootless,
    /// The entry concerns another principal
    OtherPrincipal,
}

impl SkipReason {
    /// Returns true for reasons that may clear up on a later poll without a
    /// new log entry
    pub fn is_transient(&self) -> bool {
        matches!(self, SkipReason::Rootless)
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::NotFound => "not_found",
            SkipReason::AccessDenied => "access_denied",
            SkipReason::NotAdaptable => "not_adaptable",
            SkipReason::Rootless => "rootless",
            SkipReason::OtherPrincipal => "other_principal",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_reason_display() {
        assert_eq!(SkipReason::NotFound.to_string(), "not_found");
        assert_eq!(SkipReason::AccessDenied.to_string(), "access_denied");
        assert_eq!(SkipReason::NotAdaptable.to_string(), "not_adaptable");
        assert_eq!(SkipReason::Rootless.to_string(), "rootless");
        assert_eq!(SkipReason::OtherPrincipal.to_string(), "other_principal");
    }

    #[test]
    fn skip_reason_serialization() {
        let json = serde_json::to_string(&SkipReason::OtherPrincipal).unwrap();
        assert_eq!(json, "\"other_principal\"");

        let deserialized: SkipReason = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, SkipReason::OtherPrincipal);
    }

    #[test]
    fn only_rootless_is_transient() {
        assert!(SkipReason::Rootless.is_transient());
        assert!(!SkipReason::NotFound.is_transient());
    }
}
