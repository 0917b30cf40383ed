//! Composite health status.

use serde::{Deserialize, Serialize};

/// Aggregated availability across all probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HealthStatus {
    /// Every probe passed.
    #[default]
    #[serde(rename = "OK")]
    Ok,
    /// Only probes marked `skip_on_err` failed.
    #[serde(rename = "Partially Available")]
    PartiallyAvailable,
    /// At least one probe without `skip_on_err` failed.
    #[serde(rename = "Unavailable")]
    Unavailable,
}

impl HealthStatus {
    /// Fold one probe failure into the current status.
    ///
    /// `Unavailable` is sticky: a later skippable failure never lifts it back to partial.
    pub fn degrade(self, skip_on_err: bool) -> Self {
        if skip_on_err && self != HealthStatus::Unavailable {
            HealthStatus::PartiallyAvailable
        } else {
            HealthStatus::Unavailable
        }
    }

    /// Whether the service should still report itself as serving.
    pub fn is_available(self) -> bool {
        matches!(self, HealthStatus::Ok | HealthStatus::PartiallyAvailable)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Ok => write!(f, "OK"),
            HealthStatus::PartiallyAvailable => write!(f, "Partially Available"),
            HealthStatus::Unavailable => write!(f, "Unavailable"),
        }
    }
}
