//! Dispatch requests and their validation.

use std::collections::HashSet;

use crate::error::{DispatchError, Result};

/// Who a notification is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchTarget {
    /// Individual device tokens, fanned out one call per token.
    Recipients(Vec<String>),
    /// A topic or condition: one logical target, no per-recipient fan-out.
    Topic(String),
}

impl DispatchTarget {
    /// Normalize into the recipient list of round 0.
    ///
    /// Duplicate identifiers are collapsed keeping the first occurrence.
    pub(crate) fn into_recipients(self) -> Result<Vec<String>> {
        match self {
            DispatchTarget::Topic(topic) => {
                if topic.trim().is_empty() {
                    return Err(DispatchError::validation("topic must not be empty"));
                }
                Ok(vec![topic])
            }
            DispatchTarget::Recipients(recipients) => {
                if recipients.is_empty() {
                    return Err(DispatchError::validation(
                        "the message must specify at least one recipient",
                    ));
                }
                let mut seen = HashSet::with_capacity(recipients.len());
                let mut unique = Vec::with_capacity(recipients.len());
                for recipient in recipients {
                    if recipient.trim().is_empty() {
                        return Err(DispatchError::validation(
                            "recipient identifiers must not be empty",
                        ));
                    }
                    if seen.insert(recipient.clone()) {
                        unique.push(recipient);
                    }
                }
                Ok(unique)
            }
        }
    }

    pub fn is_topic(&self) -> bool {
        matches!(self, DispatchTarget::Topic(_))
    }
}

/// A notification addressed to a set of recipients.
#[derive(Debug, Clone)]
pub struct DispatchRequest<P> {
    /// Identifier carried into audit records. Generated when absent.
    pub notification_id: Option<String>,
    pub target: DispatchTarget,
    pub payload: P,
    /// Extra rounds after the first. `None`, zero, or anything above the engine ceiling
    /// means the ceiling.
    pub retry_budget: Option<u32>,
}

impl<P> DispatchRequest<P> {
    pub fn new(target: DispatchTarget, payload: P) -> Self {
        Self {
            notification_id: None,
            target,
            payload,
            retry_budget: None,
        }
    }

    /// Convenience constructor for a token fan-out.
    pub fn to_recipients<I, S>(recipients: I, payload: P) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            DispatchTarget::Recipients(recipients.into_iter().map(Into::into).collect()),
            payload,
        )
    }

    /// Convenience constructor for a topic broadcast.
    pub fn to_topic(topic: impl Into<String>, payload: P) -> Self {
        Self::new(DispatchTarget::Topic(topic.into()), payload)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.notification_id = Some(id.into());
        self
    }

    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = Some(budget);
        self
    }
}

/// Resolve a caller-supplied budget against the engine ceiling.
pub fn effective_retry_budget(requested: Option<u32>, ceiling: u32) -> u32 {
    match requested {
        Some(budget) if budget > 0 && budget <= ceiling => budget,
        _ => ceiling,
    }
}
