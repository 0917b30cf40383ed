//! Single-recipient delivery channels.
//!
//! Email and SMS go to exactly one address, so they skip the fan-out engine and are
//! sent with one call per request.

pub mod sms;
pub mod smtp;

pub use sms::SmsClient;
pub use smtp::SmtpClient;

use async_trait::async_trait;

use crate::error::Result;

/// A backend that delivers one message of type `M`.
#[async_trait]
pub trait NotificationChannel<M>: Send + Sync
where
    M: Sync,
{
    /// Short name used in logs.
    fn channel_type(&self) -> &'static str;

    /// Deliver the message. Any error means it was not accepted.
    async fn send(&self, message: &M) -> Result<()>;
}
