//! Concurrent probe runner.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{HealthError, Result};
use crate::probe::ProbeSpec;
use crate::snapshot::{ComponentInfo, HealthSnapshot, SystemSampler};
use crate::status::HealthStatus;

/// Failure reason recorded when a probe exceeds its timeout.
pub const TIMEOUT_REASON: &str = "Timeout during health check";

/// Failure reason recorded for probes still outstanding when a measurement is cancelled.
pub const CANCELLED_REASON: &str = "Health check cancelled";

/// Prefix of the failure reason recorded when a check panics.
pub const PANICKED_REASON: &str = "Health check panicked";

/// Runs registered probes in parallel and folds their results into one snapshot.
pub struct ProbeOrchestrator {
    probes: Mutex<BTreeMap<String, ProbeSpec>>,
    max_concurrent: usize,
    component: ComponentInfo,
    sampler: Option<SystemSampler>,
}

impl ProbeOrchestrator {
    /// An empty orchestrator with default settings.
    pub fn new() -> Self {
        Self::builder().build_empty()
    }

    pub fn builder() -> ProbeOrchestratorBuilder {
        ProbeOrchestratorBuilder::default()
    }

    /// Add a probe. Empty and duplicate names are rejected.
    pub fn register(&self, mut probe: ProbeSpec) -> Result<()> {
        if probe.name.trim().is_empty() {
            return Err(HealthError::EmptyName);
        }
        probe.timeout = probe.effective_timeout();

        let mut probes = self.probes.lock();
        if probes.contains_key(&probe.name) {
            return Err(HealthError::Duplicate(probe.name));
        }
        debug!(probe = %probe.name, timeout = ?probe.timeout, "Registered health check");
        probes.insert(probe.name.clone(), probe);
        Ok(())
    }

    /// Remove a probe. Returns false if it was not registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.probes.lock().remove(name).is_some()
    }

    /// Registered probe names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.probes.lock().keys().cloned().collect()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn component(&self) -> &ComponentInfo {
        &self.component
    }

    /// Run every registered probe once and aggregate the results.
    ///
    /// Probes run in parallel, at most `max_concurrent` at a time. Each probe's timeout
    /// starts when it is admitted, not when it is scheduled. A probe that times out is
    /// abandoned: its token is cancelled and the measurement does not wait for it.
    /// Cancelling `cancel` marks every outstanding probe as cancelled and returns
    /// promptly.
    pub async fn measure(&self, cancel: &CancellationToken) -> HealthSnapshot {
        // Snapshot the registry so registration never blocks on a running measurement.
        let probes: Vec<ProbeSpec> = self.probes.lock().values().cloned().collect();
        let admission = Arc::new(Semaphore::new(self.max_concurrent.max(1)));

        let mut tasks = JoinSet::new();
        let mut pending = HashMap::with_capacity(probes.len());
        for probe in probes {
            let admission = admission.clone();
            let cancel = cancel.clone();
            let name = probe.name.clone();
            let skip_on_err = probe.skip_on_err;
            let handle = tasks.spawn(async move { run_probe(probe, admission, cancel).await });
            pending.insert(handle.id(), (name, skip_on_err));
        }

        let mut status = HealthStatus::Ok;
        let mut failures = BTreeMap::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, verdict) = match joined {
                Ok((id, verdict)) => (id, verdict),
                Err(e) => {
                    let id = e.id();
                    let reason = if e.is_panic() {
                        format!("{PANICKED_REASON}: {}", panic_message(e.into_panic()))
                    } else {
                        CANCELLED_REASON.to_string()
                    };
                    (id, Err(reason))
                }
            };
            let Some((name, skip_on_err)) = pending.remove(&id) else {
                continue;
            };

            if let Err(reason) = verdict {
                let next = status.degrade(skip_on_err);
                if next != status {
                    warn!(probe = %name, %reason, "Health degraded to {}", next);
                } else {
                    debug!(probe = %name, %reason, "Health check failed");
                }
                status = next;
                failures.insert(name, reason);
            }
        }

        HealthSnapshot {
            status,
            timestamp: chrono::Utc::now(),
            failures,
            system: self.sampler.as_ref().map(SystemSampler::sample),
            component: self.component.clone(),
        }
    }
}

impl Default for ProbeOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one probe: wait for admission, then race the check against its timeout.
async fn run_probe(
    probe: ProbeSpec,
    admission: Arc<Semaphore>,
    cancel: CancellationToken,
) -> std::result::Result<(), String> {
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(CANCELLED_REASON.to_string()),
        permit = admission.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return Err(CANCELLED_REASON.to_string()),
        },
    };

    let token = cancel.child_token();
    let mut check = tokio::spawn((probe.check)(token.clone()));

    let verdict = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CANCELLED_REASON.to_string()),
        finished = tokio::time::timeout(probe.effective_timeout(), &mut check) => match finished {
            Err(_) => Err(TIMEOUT_REASON.to_string()),
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(e)) if e.is_panic() => Err(format!(
                "{PANICKED_REASON}: {}",
                panic_message(e.into_panic())
            )),
            Ok(Err(_)) => Err(CANCELLED_REASON.to_string()),
        },
    };

    // Tell a straggler to stop; its task is left detached.
    token.cancel();
    verdict
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(s) => *s,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(s) => (*s).to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}

/// Builder for [`ProbeOrchestrator`].
pub struct ProbeOrchestratorBuilder {
    probes: Vec<ProbeSpec>,
    component: ComponentInfo,
    max_concurrent: usize,
    system_info: bool,
}

impl Default for ProbeOrchestratorBuilder {
    fn default() -> Self {
        Self {
            probes: Vec::new(),
            component: ComponentInfo::default(),
            max_concurrent: default_max_concurrent(),
            system_info: false,
        }
    }
}

impl ProbeOrchestratorBuilder {
    pub fn probe(mut self, probe: ProbeSpec) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn with_probes(mut self, probes: impl IntoIterator<Item = ProbeSpec>) -> Self {
        self.probes.extend(probes);
        self
    }

    pub fn component(mut self, component: ComponentInfo) -> Self {
        self.component = component;
        self
    }

    /// Cap on simultaneously running probes. 1 runs them one after another; 0 means
    /// host parallelism.
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = if max_concurrent == 0 {
            default_max_concurrent()
        } else {
            max_concurrent
        };
        self
    }

    /// Attach process figures to every snapshot.
    pub fn system_info(mut self, enabled: bool) -> Self {
        self.system_info = enabled;
        self
    }

    /// Build and register all probes; the first failing one is reported by name.
    pub fn build(mut self) -> Result<ProbeOrchestrator> {
        let probes = std::mem::take(&mut self.probes);
        let orchestrator = self.build_empty();
        for probe in probes {
            let name = probe.name.clone();
            orchestrator
                .register(probe)
                .map_err(|e| HealthError::registration(name, e))?;
        }
        Ok(orchestrator)
    }

    fn build_empty(self) -> ProbeOrchestrator {
        ProbeOrchestrator {
            probes: Mutex::new(BTreeMap::new()),
            max_concurrent: self.max_concurrent.max(1),
            component: self.component,
            sampler: self.system_info.then(SystemSampler::new),
        }
    }
}

fn default_max_concurrent() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_register_rejects_empty_and_duplicate() {
        let orchestrator = ProbeOrchestrator::new();
        assert_eq!(
            orchestrator.register(ProbeSpec::new("", |_| async { Ok(()) })),
            Err(HealthError::EmptyName)
        );
        orchestrator
            .register(ProbeSpec::new("db", |_| async { Ok(()) }))
            .unwrap();
        assert_eq!(
            orchestrator.register(ProbeSpec::new("db", |_| async { Ok(()) })),
            Err(HealthError::Duplicate("db".to_string()))
        );
        assert_eq!(orchestrator.names(), vec!["db".to_string()]);
    }

    #[test]
    fn test_unregister() {
        let orchestrator = ProbeOrchestrator::new();
        orchestrator
            .register(ProbeSpec::new("db", |_| async { Ok(()) }))
            .unwrap();
        assert!(orchestrator.unregister("db"));
        assert!(!orchestrator.unregister("db"));
        assert!(orchestrator.names().is_empty());
    }

    #[test]
    fn test_default_timeout_stored_on_register() {
        let orchestrator = ProbeOrchestrator::new();
        orchestrator
            .register(ProbeSpec::new("db", |_| async { Ok(()) }))
            .unwrap();
        let timeout = orchestrator.probes.lock()["db"].timeout;
        assert_eq!(timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_builder_reports_offending_probe() {
        let err = ProbeOrchestrator::builder()
            .probe(ProbeSpec::new("a", |_| async { Ok(()) }))
            .probe(ProbeSpec::new("a", |_| async { Ok(()) }))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, HealthError::Registration { ref name, .. } if name == "a"));
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_builder_max_concurrent() {
        let orchestrator = ProbeOrchestrator::builder().max_concurrent(3).build().unwrap();
        assert_eq!(orchestrator.max_concurrent(), 3);
        let orchestrator = ProbeOrchestrator::builder().max_concurrent(0).build().unwrap();
        assert!(orchestrator.max_concurrent() >= 1);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("oops")), "oops");
        assert_eq!(panic_message(Box::new("oops".to_string())), "oops");
        assert_eq!(panic_message(Box::new(7)), "unknown panic");
    }

    #[tokio::test]
    async fn test_empty_registry_is_ok() {
        let snapshot = ProbeOrchestrator::new()
            .measure(&CancellationToken::new())
            .await;
        assert_eq!(snapshot.status, HealthStatus::Ok);
        assert!(snapshot.failures.is_empty());
        assert!(snapshot.system.is_none());
    }
}
