//! Audit trail for per-recipient outcomes.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::outcome::{DeliveryStatus, SendOutcome};

/// Coarse audit status, matching what downstream log consumers filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    SuccessPush,
    FailPush,
}

impl AuditStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditStatus::SuccessPush => "success_push",
            AuditStatus::FailPush => "fail_push",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit line: what happened to one recipient in one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub status: AuditStatus,
    pub recipient: String,
    pub notification_id: String,
    pub platform: String,
    /// Round the outcome belongs to.
    pub round: u32,
    pub error: Option<String>,
}

impl AuditRecord {
    /// Build a record from an outcome.
    pub fn from_outcome(
        outcome: &SendOutcome,
        notification_id: &str,
        platform: &str,
        round: u32,
    ) -> Self {
        let status = if outcome.status == DeliveryStatus::Sent {
            AuditStatus::SuccessPush
        } else {
            AuditStatus::FailPush
        };
        Self {
            status,
            recipient: outcome.recipient.clone(),
            notification_id: notification_id.to_string(),
            platform: platform.to_string(),
            round,
            error: outcome
                .detail
                .clone()
                .filter(|_| status == AuditStatus::FailPush),
        }
    }
}

/// Fire-and-forget sink invoked once per outcome.
///
/// Implementations must not block for long; the engine calls them inline while it
/// collects a round.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Default sink writing audit records through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        match record.status {
            AuditStatus::SuccessPush => info!(
                target: "herald::audit",
                status = %record.status,
                notification_id = %record.notification_id,
                recipient = %record.recipient,
                platform = %record.platform,
                round = record.round,
                "Push delivered"
            ),
            AuditStatus::FailPush => warn!(
                target: "herald::audit",
                status = %record.status,
                notification_id = %record.notification_id,
                recipient = %record.recipient,
                platform = %record.platform,
                round = record.round,
                error = record.error.as_deref().unwrap_or(""),
                "Push failed"
            ),
        }
    }
}
