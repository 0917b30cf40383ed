//! Provider boundary.

use async_trait::async_trait;

use crate::outcome::SendOutcome;

/// A push backend able to deliver one notification to one recipient.
///
/// Implementations must be safe to call concurrently on the same instance and must not
/// retry on their own: the engine owns retry. They are expected to classify their own
/// failures into permanent and retryable rejections.
#[async_trait]
pub trait ProviderClient: Send + Sync + 'static {
    /// Provider-specific payload sent to every recipient.
    type Payload: Send + Sync + 'static;

    /// Short platform name used in audit records (e.g. `ios`, `android`).
    fn platform(&self) -> &'static str;

    /// Send `payload` to `recipient`.
    async fn send(&self, recipient: &str, payload: &Self::Payload) -> SendOutcome;
}
