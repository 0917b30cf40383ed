//! # Herald
//!
//! Notification relay: accepts push, email and SMS requests over HTTP, queues them
//! in process and forwards each one to its provider.
//!
//! Push notifications fan out through [`herald_dispatch::DispatchEngine`] with
//! per-recipient retry. Email and SMS are single-recipient calls. `/health` is answered
//! by a [`herald_health::ProbeOrchestrator`].

pub mod api;
pub mod app;
pub mod channels;
pub mod config;
pub mod domain;
pub mod error;
pub mod handler;
pub mod http_client;
pub mod logging;
pub mod providers;
pub mod queue;

pub use config::Config;
pub use error::{Error, Result};
pub use handler::{HandleOutcome, NotifierHandler};
