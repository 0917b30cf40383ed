//! Health probes run concurrently under per-probe timeouts.
//!
//! A [`ProbeOrchestrator`] holds named [`ProbeSpec`]s. [`ProbeOrchestrator::measure`] runs
//! them all in parallel, bounded by a concurrency cap, and folds the results into a
//! [`HealthSnapshot`] whose status is `OK`, `Partially Available` or `Unavailable`.

pub mod checks;
pub mod error;
pub mod orchestrator;
pub mod probe;
pub mod snapshot;
pub mod status;

pub use checks::{http_probe, tcp_probe};
pub use error::{HealthError, Result};
pub use orchestrator::{
    CANCELLED_REASON, PANICKED_REASON, ProbeOrchestrator, ProbeOrchestratorBuilder,
    TIMEOUT_REASON,
};
pub use probe::{DEFAULT_PROBE_TIMEOUT, ProbeFn, ProbeSpec};
pub use snapshot::{ComponentInfo, HealthSnapshot, SystemInfo};
pub use status::HealthStatus;
