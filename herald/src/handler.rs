//! Routes inbound notification requests to their channel.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::channels::NotificationChannel;
use crate::domain::{
    EmailNotification, Notification, NotifierRequest, Platform, PushNotification,
    SmsNotification,
};
use crate::error::Error;
use crate::providers::PushDispatcher;

/// What happened to one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Accepted by the backend (for push: by at least one recipient).
    Delivered,
    /// The request itself is unusable, or the backend refused it for good.
    Rejected(String),
    /// The backend could not be reached or gave up; sending again may succeed.
    Failed(String),
}

impl HandleOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Turns raw request bytes into deliveries.
///
/// Channels that are not configured stay `None`; requests for them are rejected.
#[derive(Default, Clone)]
pub struct NotifierHandler {
    email: Option<Arc<dyn NotificationChannel<EmailNotification>>>,
    sms: Option<Arc<dyn NotificationChannel<SmsNotification>>>,
    ios: Option<Arc<dyn PushDispatcher>>,
    android: Option<Arc<dyn PushDispatcher>>,
}

impl NotifierHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email(mut self, channel: Arc<dyn NotificationChannel<EmailNotification>>) -> Self {
        self.email = Some(channel);
        self
    }

    pub fn with_sms(mut self, channel: Arc<dyn NotificationChannel<SmsNotification>>) -> Self {
        self.sms = Some(channel);
        self
    }

    pub fn with_ios(mut self, dispatcher: Arc<dyn PushDispatcher>) -> Self {
        self.ios = Some(dispatcher);
        self
    }

    pub fn with_android(mut self, dispatcher: Arc<dyn PushDispatcher>) -> Self {
        self.android = Some(dispatcher);
        self
    }

    /// Names of the configured channels, for startup logging.
    pub fn channels(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.email.is_some() {
            names.push("email");
        }
        if self.sms.is_some() {
            names.push("sms");
        }
        if self.ios.is_some() {
            names.push("ios");
        }
        if self.android.is_some() {
            names.push("android");
        }
        names
    }

    /// Parse, validate and deliver one raw request.
    pub async fn handle(&self, payload: &[u8]) -> HandleOutcome {
        let started = Instant::now();
        let notification = match NotifierRequest::from_slice(payload)
            .and_then(NotifierRequest::into_notification)
        {
            Ok(notification) => notification,
            Err(e) => {
                warn!(error = %e, "Dropping invalid notification request");
                return HandleOutcome::Rejected(e.to_string());
            }
        };

        let outcome = self.deliver(notification).await;
        match &outcome {
            HandleOutcome::Delivered => {
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Request handled")
            }
            HandleOutcome::Rejected(reason) => warn!(%reason, "Notification rejected"),
            HandleOutcome::Failed(reason) => error!(%reason, "Notification failed"),
        }
        outcome
    }

    /// Deliver an already validated notification.
    pub async fn deliver(&self, notification: Notification) -> HandleOutcome {
        match notification {
            Notification::Email(email) => match &self.email {
                Some(channel) => send_single(channel.as_ref(), &email).await,
                None => HandleOutcome::Rejected("Email channel is not configured".to_string()),
            },
            Notification::Sms(sms) => match &self.sms {
                Some(channel) => send_single(channel.as_ref(), &sms).await,
                None => HandleOutcome::Rejected("SMS channel is not configured".to_string()),
            },
            Notification::Push(push) => self.push(&push).await,
        }
    }

    async fn push(&self, push: &PushNotification) -> HandleOutcome {
        let dispatcher = match push.platform {
            Platform::Ios => &self.ios,
            Platform::Android => &self.android,
        };
        let Some(dispatcher) = dispatcher else {
            return HandleOutcome::Rejected(format!(
                "No push provider configured for {}",
                push.platform
            ));
        };

        let result = match dispatcher.dispatch(push).await {
            Ok(result) => result,
            Err(e) => return failure(e),
        };

        let delivered = result.delivered();
        if !result.is_complete() {
            warn!(
                notification_id = %result.notification_id,
                rounds = result.rounds_used(),
                failed = ?result.final_failed,
                "Push left recipients unresolved"
            );
        }
        if !delivered.is_empty() {
            info!(
                notification_id = %result.notification_id,
                platform = %push.platform,
                delivered = delivered.len(),
                "Push delivered"
            );
            return HandleOutcome::Delivered;
        }

        if result.is_complete() {
            HandleOutcome::Rejected(format!(
                "Push rejected by provider for {} recipient(s)",
                result.permanently_rejected().len()
            ))
        } else {
            HandleOutcome::Failed(format!(
                "Push undelivered after {} round(s)",
                result.rounds_used()
            ))
        }
    }
}

async fn send_single<M: Sync>(channel: &dyn NotificationChannel<M>, message: &M) -> HandleOutcome {
    match channel.send(message).await {
        Ok(()) => HandleOutcome::Delivered,
        Err(e) => {
            debug!(channel = channel.channel_type(), error = %e, "Channel send failed");
            failure(e)
        }
    }
}

fn failure(e: Error) -> HandleOutcome {
    if e.is_validation() {
        HandleOutcome::Rejected(e.to_string())
    } else {
        HandleOutcome::Failed(e.to_string())
    }
}
