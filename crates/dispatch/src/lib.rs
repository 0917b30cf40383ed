//! # Herald Dispatch
//!
//! Bounded-concurrency fan-out of one notification to many recipients.
//!
//! ## Features
//!
//! - `ProviderClient` trait implemented by each push backend
//! - `DispatchEngine` running synchronized send rounds behind a shared admission semaphore
//! - Per-recipient outcome classification and a retry budget enforced by the engine
//! - `AuditSink` called exactly once per outcome
//!
//! ```no_run
//! # use herald_dispatch::{DispatchEngine, DispatchRequest, ProviderClient, SendOutcome};
//! # struct Echo;
//! # #[async_trait::async_trait]
//! # impl ProviderClient for Echo {
//! #     type Payload = String;
//! #     fn platform(&self) -> &'static str { "echo" }
//! #     async fn send(&self, r: &str, _p: &String) -> SendOutcome { SendOutcome::sent(r) }
//! # }
//! # async fn run() -> herald_dispatch::Result<()> {
//! let engine = DispatchEngine::new(Echo);
//! let result = engine
//!     .send(DispatchRequest::to_recipients(["t1", "t2"], "hello".to_string()))
//!     .await?;
//! assert!(result.final_failed.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod engine;
pub mod error;
pub mod outcome;
pub mod provider;
pub mod request;

pub use audit::{AuditRecord, AuditSink, AuditStatus, TracingAuditSink};
pub use engine::{DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_RETRY, DispatchConfig, DispatchEngine};
pub use error::{DispatchError, Result};
pub use outcome::{DeliveryStatus, DispatchResult, Round, SendOutcome};
pub use provider::ProviderClient;
pub use request::{DispatchRequest, DispatchTarget, effective_retry_budget};
