//! Persisted record shapes and their storage keys.

use serde::{Deserialize, Serialize};

/// Key of the consent decision record.
pub const DECISION_KEY: &str = "consent-decision";
/// Key of the cached region classification.
pub const CLASSIFICATION_KEY: &str = "eu-detection-cache";
/// Key used by the previous site build, holding a bare status string.
pub const LEGACY_DECISION_KEY: &str = "analytics-consent";

/// Provenance of a consent decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionReason {
    UserAccept,
    UserDecline,
    AutoNonRestrictedRegion,
    Restored,
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserAccept => write!(f, "user-accept"),
            Self::UserDecline => write!(f, "user-decline"),
            Self::AutoNonRestrictedRegion => write!(f, "auto-non-restricted-region"),
            Self::Restored => write!(f, "restored"),
        }
    }
}

/// Whether monitoring is approved, why, and when it was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentDecision {
    pub granted: bool,
    pub reason: DecisionReason,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl ConsentDecision {
    pub fn new(granted: bool, reason: DecisionReason, timestamp: i64) -> Self {
        Self {
            granted,
            reason,
            timestamp,
        }
    }
}

/// Independent heuristic votes behind a classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSignals {
    #[serde(rename = "timezone")]
    pub timezone_matched: bool,
    #[serde(rename = "language")]
    pub language_matched: bool,
    #[serde(rename = "dateFormat")]
    pub date_format_matched: bool,
}

impl RegionSignals {
    /// Conservative merge: any matching vote marks the region restricted.
    pub fn any(&self) -> bool {
        self.timezone_matched || self.language_matched || self.date_format_matched
    }

    pub fn uniform(matched: bool) -> Self {
        Self {
            timezone_matched: matched,
            language_matched: matched,
            date_format_matched: matched,
        }
    }
}

/// Cached answer to "does this visitor need an explicit opt-in prompt".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionClassification {
    #[serde(rename = "isEU")]
    pub is_restricted_region: bool,
    pub timestamp: i64,
    #[serde(rename = "methods")]
    pub signals: RegionSignals,
}

impl RegionClassification {
    /// Build a classification whose verdict is derived from its signals.
    pub fn from_signals(signals: RegionSignals, timestamp: i64) -> Self {
        Self {
            is_restricted_region: signals.any(),
            timestamp,
            signals,
        }
    }
}
