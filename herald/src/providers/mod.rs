//! Push provider adapters.
//!
//! Each adapter is a [`ProviderClient`] driven by a [`DispatchEngine`]. The handler only
//! sees [`PushDispatcher`], so the engines for both platforms can sit behind one trait
//! object each.

pub mod apns;
pub mod fcm;

pub use apns::{ApnsClient, ApnsHeaders, ApnsMessage};
pub use fcm::{FcmClient, FcmMessage};

use async_trait::async_trait;
use herald_dispatch::{DispatchEngine, DispatchRequest, DispatchResult, ProviderClient};

use crate::domain::PushNotification;
use crate::error::Result;

/// A provider that knows how to turn a [`PushNotification`] into its wire payload.
pub trait PushProvider: ProviderClient {
    /// Build the payload once; the engine reuses it for every recipient and round.
    fn prepare(&self, notification: &PushNotification) -> Result<Self::Payload>;
}

/// Object-safe entry point for sending a push notification.
#[async_trait]
pub trait PushDispatcher: Send + Sync {
    async fn dispatch(&self, notification: &PushNotification) -> Result<DispatchResult>;
}

#[async_trait]
impl<C> PushDispatcher for DispatchEngine<C>
where
    C: PushProvider,
{
    async fn dispatch(&self, notification: &PushNotification) -> Result<DispatchResult> {
        notification.validate()?;
        let payload = self.client().prepare(notification)?;

        let mut request = DispatchRequest::new(notification.dispatch_target(), payload);
        request.notification_id = notification.notification_id().map(str::to_string);
        request.retry_budget = notification.retry;

        Ok(self.send(request).await?)
    }
}
