//! Probe definitions.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Timeout applied to probes registered without one.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// A check function. The token is cancelled when the probe times out or the
/// surrounding measurement is cancelled; long-running checks should watch it.
pub type ProbeFn =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A named health check with its own timeout and failure policy.
#[derive(Clone)]
pub struct ProbeSpec {
    pub name: String,
    /// Zero means [`DEFAULT_PROBE_TIMEOUT`].
    pub timeout: Duration,
    /// A failure degrades the composite status to partial instead of unavailable.
    pub skip_on_err: bool,
    pub check: ProbeFn,
}

impl ProbeSpec {
    pub fn new<F, Fut>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            timeout: Duration::ZERO,
            skip_on_err: false,
            check: Arc::new(move |token| check(token).boxed()),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn skip_on_err(mut self, skip: bool) -> Self {
        self.skip_on_err = skip;
        self
    }

    pub(crate) fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_PROBE_TIMEOUT
        } else {
            self.timeout
        }
    }
}

impl std::fmt::Debug for ProbeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeSpec")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("skip_on_err", &self.skip_on_err)
            .finish_non_exhaustive()
    }
}
