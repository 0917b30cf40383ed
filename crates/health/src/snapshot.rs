//! Measurement output.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

use crate::status::HealthStatus;

/// Identity of the service being measured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub name: String,
    pub version: String,
}

/// Process resource figures. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Version of the health crate.
    pub version: String,
    /// Tasks alive on the current tokio runtime.
    pub tasks_alive: usize,
    /// Runtime worker threads.
    pub workers: usize,
    /// Resident set size in bytes.
    pub memory_rss_bytes: u64,
    /// Virtual memory size in bytes.
    pub memory_virtual_bytes: u64,
}

/// Result of one `measure` call. Built fresh every time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    /// Probe name to failure reason.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemInfo>,
    pub component: ComponentInfo,
}

impl HealthSnapshot {
    pub fn is_available(&self) -> bool {
        self.status.is_available()
    }
}

/// Collects process figures through `sysinfo`.
pub(crate) struct SystemSampler {
    system: Mutex<System>,
}

impl SystemSampler {
    pub(crate) fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    pub(crate) fn sample(&self) -> SystemInfo {
        let (tasks_alive, workers) = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let metrics = handle.metrics();
                (metrics.num_alive_tasks(), metrics.num_workers())
            }
            Err(_) => (0, 0),
        };

        let (memory_rss_bytes, memory_virtual_bytes) = match sysinfo::get_current_pid() {
            Ok(pid) => {
                let mut system = self.system.lock();
                system.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[pid]),
                    true,
                    ProcessRefreshKind::nothing().with_memory(),
                );
                system
                    .process(pid)
                    .map(|p| (p.memory(), p.virtual_memory()))
                    .unwrap_or_default()
            }
            Err(_) => (0, 0),
        };

        SystemInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            tasks_alive,
            workers,
            memory_rss_bytes,
            memory_virtual_bytes,
        }
    }
}
