//! SMS delivery through an HTTP gateway.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::NotificationChannel;
use crate::config::SmsConfig;
use crate::domain::SmsNotification;
use crate::error::{Error, Result};
use crate::http_client;

const PROVIDER: &str = "sms";

/// Body posted to the gateway.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct GatewayMessage<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub text: &'a str,
}

pub struct SmsClient {
    http: reqwest::Client,
    config: SmsConfig,
}

impl SmsClient {
    pub fn new(config: SmsConfig) -> Result<Self> {
        let http = http_client::builder(http_client::DEFAULT_REQUEST_TIMEOUT).build()?;
        Ok(Self::with_http(config, http))
    }

    pub fn with_http(config: SmsConfig, http: reqwest::Client) -> Self {
        Self { http, config }
    }

    pub async fn send_sms(&self, sms: &SmsNotification) -> Result<()> {
        let message = GatewayMessage {
            from: self.config.sender.as_deref().unwrap_or_default(),
            to: sms.normalized_phone().unwrap_or(&sms.phone),
            text: &sms.message,
        };

        let mut request = self.http.post(&self.config.gateway_url).json(&message);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(
                PROVIDER,
                format!("gateway answered {status}: {}", body.trim()),
            ));
        }

        info!(recipient = %message.to, "SMS accepted by gateway");
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel<SmsNotification> for SmsClient {
    fn channel_type(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, message: &SmsNotification) -> Result<()> {
        self.send_sms(message).await
    }
}
