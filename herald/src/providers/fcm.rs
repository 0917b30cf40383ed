//! Firebase Cloud Messaging, legacy HTTP JSON API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use herald_dispatch::{ProviderClient, SendOutcome};

use super::PushProvider;
use crate::config::FcmConfig;
use crate::domain::{Platform, PushNotification, Sound};
use crate::error::{Error, Result};
use crate::http_client;

/// Per-result errors that will not go away by sending again.
const PERMANENT_ERRORS: &[&str] = &[
    "NotRegistered",
    "InvalidRegistration",
    "MissingRegistration",
    "MismatchSenderId",
    "InvalidPackageName",
    "MessageTooBig",
    "InvalidDataKey",
    "InvalidTtl",
    "InvalidParameters",
];

/// Prepared FCM message without its addressee.
#[derive(Debug, Clone, PartialEq)]
pub struct FcmMessage {
    pub body: Map<String, Value>,
    /// Topic condition; a recipient equal to it is sent as `condition` instead of `to`.
    pub condition: Option<String>,
}

fn put_str(body: &mut Map<String, Value>, key: &str, value: &str) {
    if !value.is_empty() {
        body.insert(key.to_string(), json!(value));
    }
}

impl FcmMessage {
    pub fn from_notification(notification: &PushNotification) -> Self {
        let n = notification;
        let mut body = Map::new();

        put_str(&mut body, "collapse_key", &n.collapse_key);
        put_str(&mut body, "restricted_package_name", &n.restricted_package_name);
        if n.priority == "high" || n.priority == "normal" {
            put_str(&mut body, "priority", &n.priority);
        }
        for (key, flag) in [
            ("content_available", n.content_available),
            ("mutable_content", n.mutable_content),
            ("delay_while_idle", n.delay_while_idle),
            ("dry_run", n.dry_run),
        ] {
            if flag {
                body.insert(key.to_string(), json!(true));
            }
        }
        if let Some(ttl) = n.time_to_live {
            body.insert("time_to_live".into(), json!(ttl));
        }
        if !n.data.is_empty() {
            body.insert("data".into(), Value::Object(n.data.clone()));
        }

        let mut notification = Map::new();
        put_str(&mut notification, "body", &n.message);
        put_str(&mut notification, "title", &n.title);
        put_str(&mut notification, "image", &n.image);
        if let Some(Sound::Named(sound)) = &n.sound {
            put_str(&mut notification, "sound", sound);
        }
        if !notification.is_empty() {
            body.insert("notification".into(), Value::Object(notification));
        }

        let condition = Some(n.condition.clone()).filter(|c| !c.is_empty());
        Self { body, condition }
    }

    /// Full request body for one addressee.
    pub fn addressed_to(&self, recipient: &str) -> Value {
        let mut body = self.body.clone();
        if self.condition.as_deref() == Some(recipient) {
            body.insert("condition".into(), json!(recipient));
        } else {
            body.insert("to".into(), json!(recipient));
        }
        Value::Object(body)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    message_id: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    results: Vec<FcmResult>,
}

#[derive(Debug, Default, Deserialize)]
struct FcmResult {
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn classify_error(recipient: &str, error: String) -> SendOutcome {
    if PERMANENT_ERRORS.contains(&error.as_str()) {
        SendOutcome::rejected_permanent(recipient, error)
    } else {
        SendOutcome::rejected_retryable(recipient, error)
    }
}

/// Classify a 2xx answer.
fn classify_response(recipient: &str, response: FcmResponse) -> SendOutcome {
    if let Some(result) = response.results.into_iter().next() {
        return match (result.error, result.message_id) {
            (Some(error), _) => classify_error(recipient, error),
            (None, Some(_)) => SendOutcome::sent(recipient),
            (None, None) => SendOutcome::rejected_retryable(recipient, "result without message_id"),
        };
    }
    match (response.error, response.message_id) {
        (Some(error), _) => classify_error(recipient, error),
        (None, Some(_)) => SendOutcome::sent(recipient),
        (None, None) => SendOutcome::rejected_retryable(recipient, "empty FCM response"),
    }
}

/// Client for one FCM server key.
pub struct FcmClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl FcmClient {
    pub fn new(config: &FcmConfig) -> Result<Self> {
        let http = http_client::builder(http_client::DEFAULT_REQUEST_TIMEOUT).build()?;
        Ok(Self::with_http(config, http))
    }

    pub fn with_http(config: &FcmConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
        }
    }
}

#[async_trait]
impl ProviderClient for FcmClient {
    type Payload = FcmMessage;

    fn platform(&self) -> &'static str {
        Platform::Android.as_str()
    }

    async fn send(&self, recipient: &str, message: &FcmMessage) -> SendOutcome {
        let response = match self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, format!("key={}", self.api_key))
            .json(&message.addressed_to(recipient))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return SendOutcome::transport_error(recipient, e.to_string()),
        };

        let status = response.status();
        if status.is_server_error() {
            return SendOutcome::rejected_retryable(recipient, status.to_string());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = format!("{status} {body}");
            return SendOutcome::rejected_permanent(recipient, detail.trim_end());
        }

        match response.json::<FcmResponse>().await {
            Ok(body) => classify_response(recipient, body),
            Err(e) => {
                SendOutcome::transport_error(recipient, format!("unreadable FCM response: {e}"))
            }
        }
    }
}

impl PushProvider for FcmClient {
    fn prepare(&self, notification: &PushNotification) -> Result<FcmMessage> {
        if notification.platform != Platform::Android {
            return Err(Error::validation("FCM only delivers Android notifications"));
        }
        Ok(FcmMessage::from_notification(notification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_dispatch::DeliveryStatus;
    use rstest::rstest;

    fn android() -> PushNotification {
        let mut push = PushNotification::new(Platform::Android);
        push.tokens = vec!["token".to_string()];
        push
    }

    #[test]
    fn test_message_mapping() {
        let mut push = android();
        push.title = "Title".to_string();
        push.message = "Body".to_string();
        push.priority = "high".to_string();
        push.collapse_key = "updates".to_string();
        push.time_to_live = Some(60);
        push.dry_run = true;
        push.sound = Some(Sound::Named("default".to_string()));
        push.data.insert("k".to_string(), json!("v"));

        let body = FcmMessage::from_notification(&push).addressed_to("device-1");
        assert_eq!(body["to"], "device-1");
        assert_eq!(body["priority"], "high");
        assert_eq!(body["collapse_key"], "updates");
        assert_eq!(body["time_to_live"], 60);
        assert_eq!(body["dry_run"], true);
        assert_eq!(body["data"]["k"], "v");
        assert_eq!(
            body["notification"],
            json!({"body": "Body", "title": "Title", "sound": "default"})
        );
        assert!(body.get("mutable_content").is_none());
    }

    #[test]
    fn test_notification_block_only_when_needed() {
        let mut push = android();
        push.priority = "urgent".to_string();
        push.data.insert("silent".to_string(), json!(true));
        let body = FcmMessage::from_notification(&push).addressed_to("device-1");
        assert!(body.get("notification").is_none());
        assert!(body.get("priority").is_none());
    }

    #[test]
    fn test_topic_and_condition_addressing() {
        let message = FcmMessage::from_notification(&android());
        assert_eq!(message.addressed_to("/topics/news")["to"], "/topics/news");

        let mut push = PushNotification::new(Platform::Android);
        push.condition = "'a' in topics && 'b' in topics".to_string();
        let message = FcmMessage::from_notification(&push);
        let body = message.addressed_to("'a' in topics && 'b' in topics");
        assert_eq!(body["condition"], "'a' in topics && 'b' in topics");
        assert!(body.get("to").is_none());
    }

    #[rstest]
    #[case("NotRegistered", DeliveryStatus::RejectedPermanent)]
    #[case("InvalidRegistration", DeliveryStatus::RejectedPermanent)]
    #[case("MismatchSenderId", DeliveryStatus::RejectedPermanent)]
    #[case("MessageTooBig", DeliveryStatus::RejectedPermanent)]
    #[case("Unavailable", DeliveryStatus::RejectedRetryable)]
    #[case("InternalServerError", DeliveryStatus::RejectedRetryable)]
    #[case("DeviceMessageRateExceeded", DeliveryStatus::RejectedRetryable)]
    fn test_result_error_classification(#[case] error: &str, #[case] expected: DeliveryStatus) {
        let response = FcmResponse {
            results: vec![FcmResult {
                message_id: None,
                error: Some(error.to_string()),
            }],
            ..FcmResponse::default()
        };
        let outcome = classify_response("t", response);
        assert_eq!(outcome.status, expected);
        assert_eq!(outcome.detail.as_deref(), Some(error));
    }

    #[test]
    fn test_success_responses() {
        let device: FcmResponse = serde_json::from_value(json!({
            "multicast_id": 1, "success": 1, "failure": 0,
            "results": [{"message_id": "0:123"}]
        }))
        .unwrap();
        assert!(classify_response("t", device).is_sent());

        let topic: FcmResponse = serde_json::from_value(json!({"message_id": 5_555_555})).unwrap();
        assert!(classify_response("/topics/news", topic).is_sent());

        let topic_error: FcmResponse =
            serde_json::from_value(json!({"error": "TopicsMessageRateExceeded"})).unwrap();
        assert_eq!(
            classify_response("/topics/news", topic_error).status,
            DeliveryStatus::RejectedRetryable
        );

        assert_eq!(
            classify_response("t", FcmResponse::default()).status,
            DeliveryStatus::RejectedRetryable
        );
    }

    #[test]
    fn test_prepare_rejects_ios() {
        http_client::install_rustls_provider();
        let client = FcmClient::new(&FcmConfig {
            api_key: "key".to_string(),
            endpoint: crate::config::DEFAULT_FCM_ENDPOINT.to_string(),
            max_retry: None,
        })
        .unwrap();
        assert!(client.prepare(&PushNotification::new(Platform::Ios)).is_err());
        assert!(client.prepare(&android()).is_ok());
    }
}
