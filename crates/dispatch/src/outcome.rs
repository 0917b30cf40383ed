//! Per-recipient delivery outcomes and the aggregated dispatch result.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Classification of a single provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// The provider accepted the notification.
    Sent,
    /// The provider rejected the recipient and will keep doing so (bad token, unregistered).
    RejectedPermanent,
    /// The provider rejected the notification for a reason that may clear up (5xx, throttling).
    RejectedRetryable,
    /// The call never produced a provider verdict (network failure, panic, aborted task).
    TransportError,
}

impl DeliveryStatus {
    /// Whether a recipient with this status takes part in the next round.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RejectedRetryable | Self::TransportError)
    }

    /// Whether the recipient is settled and never re-enters a round.
    pub fn is_terminal(self) -> bool {
        !self.is_retryable()
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::RejectedPermanent => write!(f, "rejected_permanent"),
            DeliveryStatus::RejectedRetryable => write!(f, "rejected_retryable"),
            DeliveryStatus::TransportError => write!(f, "transport_error"),
        }
    }
}

/// Result of sending to one recipient in one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    /// Recipient identifier the call was addressed to.
    pub recipient: String,
    /// Classified result.
    pub status: DeliveryStatus,
    /// Provider reason, kept for logging only.
    pub detail: Option<String>,
}

impl SendOutcome {
    /// A successful delivery.
    pub fn sent(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            status: DeliveryStatus::Sent,
            detail: None,
        }
    }

    /// A permanent rejection.
    pub fn rejected_permanent(recipient: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            status: DeliveryStatus::RejectedPermanent,
            detail: Some(detail.into()),
        }
    }

    /// A rejection worth retrying.
    pub fn rejected_retryable(recipient: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            status: DeliveryStatus::RejectedRetryable,
            detail: Some(detail.into()),
        }
    }

    /// A transport level failure.
    pub fn transport_error(recipient: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            status: DeliveryStatus::TransportError,
            detail: Some(detail.into()),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.status == DeliveryStatus::Sent
    }
}

/// One synchronized wave of sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// Zero-based round index.
    pub index: u32,
    /// Outcomes in the order of the round's recipient list.
    pub outcomes: Vec<SendOutcome>,
}

impl Round {
    /// Recipients of this round that are eligible for the next one.
    pub fn retry_set(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.status.is_retryable())
            .map(|o| o.recipient.clone())
            .collect()
    }

    /// Recipients attempted in this round.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.outcomes.iter().map(|o| o.recipient.as_str())
    }
}

/// Output of one `DispatchEngine::send` call. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    /// Notification identifier used for auditing.
    pub notification_id: String,
    /// Rounds in execution order.
    pub rounds: Vec<Round>,
    /// Recipients still unresolved after the retry budget ran out.
    pub final_failed: BTreeSet<String>,
}

impl DispatchResult {
    /// Number of rounds that ran.
    pub fn rounds_used(&self) -> usize {
        self.rounds.len()
    }

    /// Recipients that ended up delivered, across all rounds.
    pub fn delivered(&self) -> BTreeSet<String> {
        self.rounds
            .iter()
            .flat_map(|r| r.outcomes.iter())
            .filter(|o| o.is_sent())
            .map(|o| o.recipient.clone())
            .collect()
    }

    /// Recipients the provider refused for good.
    pub fn permanently_rejected(&self) -> BTreeSet<String> {
        self.rounds
            .iter()
            .flat_map(|r| r.outcomes.iter())
            .filter(|o| o.status == DeliveryStatus::RejectedPermanent)
            .map(|o| o.recipient.clone())
            .collect()
    }

    /// True when nothing is left unresolved.
    pub fn is_complete(&self) -> bool {
        self.final_failed.is_empty()
    }
}
