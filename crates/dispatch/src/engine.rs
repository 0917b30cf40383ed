//! Round-based fan-out engine.
//!
//! A `send` call runs the recipient list through synchronized rounds. Every round fans
//! out one task per recipient, each task waits for an admission slot before calling the
//! provider, and the round only ends once all of its tasks have reported. Recipients
//! classified as retryable form the next round, until nothing is left or the retry budget
//! is spent.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditRecord, AuditSink, TracingAuditSink};
use crate::error::Result;
use crate::outcome::{DispatchResult, Round, SendOutcome};
use crate::provider::ProviderClient;
use crate::request::{DispatchRequest, effective_retry_budget};

/// Default number of simultaneous provider calls per engine.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Default ceiling for extra rounds after the first.
pub const DEFAULT_MAX_RETRY: u32 = 5;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Size of the admission semaphore.
    pub max_concurrency: usize,
    /// Retry ceiling applied to every request.
    pub max_retry: u32,
    /// Pause before the first retry round. Zero disables back-off.
    pub initial_retry_delay: Duration,
    /// Upper bound for the back-off pause.
    pub max_retry_delay: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_retry: DEFAULT_MAX_RETRY,
            initial_retry_delay: Duration::ZERO,
            max_retry_delay: Duration::from_secs(5),
        }
    }
}

/// Fan-out sender bound to one provider client.
pub struct DispatchEngine<C: ProviderClient> {
    client: Arc<C>,
    admission: Arc<Semaphore>,
    audit: Arc<dyn AuditSink>,
    config: DispatchConfig,
}

impl<C: ProviderClient> DispatchEngine<C> {
    /// Create an engine with the default configuration.
    pub fn new(client: C) -> Self {
        Self::with_config(client, DispatchConfig::default())
    }

    /// Create an engine with a custom configuration.
    pub fn with_config(client: C, config: DispatchConfig) -> Self {
        Self::from_shared(Arc::new(client), config)
    }

    /// Create an engine around an already shared client.
    pub fn from_shared(client: Arc<C>, config: DispatchConfig) -> Self {
        Self {
            client,
            admission: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            audit: Arc::new(TracingAuditSink),
            config,
        }
    }

    /// Replace the audit sink.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Share an admission semaphore with other engines.
    pub fn with_admission(mut self, admission: Arc<Semaphore>) -> Self {
        self.admission = admission;
        self
    }

    /// The admission semaphore used by this engine.
    pub fn admission(&self) -> Arc<Semaphore> {
        self.admission.clone()
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn platform(&self) -> &'static str {
        self.client.platform()
    }

    /// Deliver `request` to all of its recipients.
    ///
    /// Fails only when the request is malformed; per-recipient failures are reported
    /// in the returned `DispatchResult`.
    pub async fn send(&self, request: DispatchRequest<C::Payload>) -> Result<DispatchResult> {
        let DispatchRequest {
            notification_id,
            target,
            payload,
            retry_budget,
        } = request;

        let mut recipients = target.into_recipients()?;
        let notification_id = notification_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let budget = effective_retry_budget(retry_budget, self.config.max_retry);
        let payload = Arc::new(payload);
        let platform = self.client.platform();

        debug!(
            notification_id = %notification_id,
            platform,
            recipients = recipients.len(),
            retry_budget = budget,
            "Starting dispatch"
        );

        let mut rounds = Vec::new();
        let mut round_index = 0u32;
        let final_failed: BTreeSet<String> = loop {
            let outcomes = self
                .run_round(&notification_id, round_index, &recipients, &payload)
                .await;
            let round = Round {
                index: round_index,
                outcomes,
            };
            let retry_set = round.retry_set();

            debug!(
                notification_id = %notification_id,
                round = round_index,
                attempted = round.outcomes.len(),
                retryable = retry_set.len(),
                "Round finished"
            );
            rounds.push(round);

            if retry_set.is_empty() || round_index >= budget {
                break retry_set.into_iter().collect();
            }

            let delay = self.retry_delay(round_index);
            if !delay.is_zero() {
                debug!(
                    notification_id = %notification_id,
                    "Retrying {} recipients in {:?}",
                    retry_set.len(),
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            recipients = retry_set;
            round_index += 1;
        };

        if final_failed.is_empty() {
            info!(
                notification_id = %notification_id,
                platform,
                rounds = rounds.len(),
                "Dispatch finished"
            );
        } else {
            warn!(
                notification_id = %notification_id,
                platform,
                rounds = rounds.len(),
                failed = final_failed.len(),
                "Dispatch finished with unresolved recipients"
            );
        }

        Ok(DispatchResult {
            notification_id,
            rounds,
            final_failed,
        })
    }

    /// Run one round and return outcomes in recipient order.
    async fn run_round(
        &self,
        notification_id: &str,
        round: u32,
        recipients: &[String],
        payload: &Arc<C::Payload>,
    ) -> Vec<SendOutcome> {
        let mut tasks = JoinSet::new();
        for (idx, recipient) in recipients.iter().enumerate() {
            let client = self.client.clone();
            let admission = self.admission.clone();
            let payload = payload.clone();
            let recipient = recipient.clone();
            tasks.spawn(async move {
                let outcome = send_one(client, admission, recipient, payload).await;
                (idx, outcome)
            });
        }

        let mut slots: Vec<Option<SendOutcome>> = vec![None; recipients.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome)) => {
                    self.record(&outcome, notification_id, round);
                    slots[idx] = Some(outcome);
                }
                Err(e) => {
                    warn!(notification_id, round, error = %e, "Send task did not complete");
                }
            }
        }

        slots
            .into_iter()
            .zip(recipients)
            .map(|(slot, recipient)| {
                slot.unwrap_or_else(|| {
                    let outcome = SendOutcome::transport_error(recipient.clone(), "send task aborted");
                    self.record(&outcome, notification_id, round);
                    outcome
                })
            })
            .collect()
    }

    fn record(&self, outcome: &SendOutcome, notification_id: &str, round: u32) {
        let record =
            AuditRecord::from_outcome(outcome, notification_id, self.client.platform(), round);
        let audit = &self.audit;
        if std::panic::catch_unwind(AssertUnwindSafe(|| audit.record(&record))).is_err() {
            warn!(notification_id, recipient = %record.recipient, "Audit sink panicked");
        }
    }

    /// Exponential back-off with ±25% jitter.
    fn retry_delay(&self, completed_round: u32) -> Duration {
        let base_ms = self.config.initial_retry_delay.as_millis() as u64;
        if base_ms == 0 {
            return Duration::ZERO;
        }
        let max_ms = self.config.max_retry_delay.as_millis() as u64;

        let delay_ms = base_ms
            .saturating_mul(2u64.saturating_pow(completed_round))
            .min(max_ms);

        let jitter_range = delay_ms / 4;
        let delay_ms = if jitter_range > 0 {
            let offset = rand::random::<u64>() % (jitter_range * 2 + 1);
            (delay_ms - jitter_range).saturating_add(offset)
        } else {
            delay_ms
        };

        Duration::from_millis(delay_ms)
    }
}

/// Send to one recipient while holding an admission slot.
///
/// The permit is owned by this future, so it is released on every exit path,
/// including a panic inside the provider call.
async fn send_one<C: ProviderClient>(
    client: Arc<C>,
    admission: Arc<Semaphore>,
    recipient: String,
    payload: Arc<C::Payload>,
) -> SendOutcome {
    let _permit = match admission.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return SendOutcome::transport_error(recipient, "admission control closed"),
    };

    let call = AssertUnwindSafe(client.send(&recipient, &payload))
        .catch_unwind()
        .await;

    match call {
        Ok(mut outcome) => {
            outcome.recipient = recipient;
            outcome
        }
        Err(panic) => SendOutcome::transport_error(
            recipient,
            format!("provider panicked: {}", panic_message(panic.as_ref())),
        ),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    if let Some(s) = panic.downcast_ref::<String>() {
        return s.clone();
    }
    "<non-string panic payload>".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct AlwaysSent;

    #[async_trait]
    impl ProviderClient for AlwaysSent {
        type Payload = ();

        fn platform(&self) -> &'static str {
            "test"
        }

        async fn send(&self, recipient: &str, _payload: &()) -> SendOutcome {
            SendOutcome::sent(recipient)
        }
    }

    #[test]
    fn test_dispatch_config_default() {
        let config = DispatchConfig::default();
        assert_eq!(config.max_concurrency, 5);
        assert_eq!(config.max_retry, 5);
        assert!(config.initial_retry_delay.is_zero());
    }

    #[test]
    fn test_retry_delay_disabled_by_default() {
        let engine = DispatchEngine::new(AlwaysSent);
        assert_eq!(engine.retry_delay(0), Duration::ZERO);
        assert_eq!(engine.retry_delay(3), Duration::ZERO);
    }

    #[test]
    fn test_retry_delay_exponential_with_cap() {
        let engine = DispatchEngine::with_config(
            AlwaysSent,
            DispatchConfig {
                initial_retry_delay: Duration::from_millis(100),
                max_retry_delay: Duration::from_millis(1000),
                ..Default::default()
            },
        );

        let first = engine.retry_delay(0);
        assert!(first >= Duration::from_millis(75) && first <= Duration::from_millis(125));

        let third = engine.retry_delay(2);
        assert!(third >= Duration::from_millis(300) && third <= Duration::from_millis(500));

        let capped = engine.retry_delay(10);
        assert!(capped >= Duration::from_millis(750) && capped <= Duration::from_millis(1250));
    }

    #[test]
    fn test_zero_concurrency_still_admits() {
        let engine = DispatchEngine::with_config(
            AlwaysSent,
            DispatchConfig {
                max_concurrency: 0,
                ..Default::default()
            },
        );
        assert_eq!(engine.admission().available_permits(), 1);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "<non-string panic payload>");
    }

    #[tokio::test]
    async fn test_generated_notification_id() {
        let engine = DispatchEngine::new(AlwaysSent);
        let result = engine
            .send(DispatchRequest::to_recipients(["a"], ()))
            .await
            .unwrap();
        assert!(!result.notification_id.is_empty());
        assert_eq!(result.rounds_used(), 1);
    }
}
