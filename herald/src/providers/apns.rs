//! Apple Push Notification service over HTTP/2 with provider-token auth.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use herald_dispatch::{ProviderClient, SendOutcome};

use super::PushProvider;
use crate::config::ApnsConfig;
use crate::domain::{Platform, PushNotification, Sound};
use crate::error::{Error, Result};
use crate::http_client;

pub const PRODUCTION_ENDPOINT: &str = "https://api.push.apple.com";
pub const DEVELOPMENT_ENDPOINT: &str = "https://api.sandbox.push.apple.com";

/// APNs accepts a provider token for up to an hour; refresh well before that.
const TOKEN_REFRESH_SECS: i64 = 50 * 60;

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    iat: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    jwt: String,
    issued_at: i64,
}

/// ES256 provider token, re-signed every 50 minutes.
struct ProviderToken {
    key: EncodingKey,
    key_id: String,
    team_id: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ProviderToken {
    fn new(key_pem: &str, key_id: &str, team_id: &str) -> Result<Self> {
        let key = EncodingKey::from_ec_pem(key_pem.as_bytes())
            .map_err(|e| Error::config(format!("invalid APNs signing key: {e}")))?;
        Ok(Self {
            key,
            key_id: key_id.to_string(),
            team_id: team_id.to_string(),
            cached: Mutex::new(None),
        })
    }

    fn bearer(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        let mut cached = self.cached.lock();
        if let Some(token) = cached.as_ref()
            && now - token.issued_at < TOKEN_REFRESH_SECS
        {
            return Ok(token.jwt.clone());
        }

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());
        let claims = Claims {
            iss: &self.team_id,
            iat: now,
        };
        let jwt = encode(&header, &claims, &self.key)
            .map_err(|e| Error::provider("apns", format!("failed to sign provider token: {e}")))?;
        debug!(key_id = %self.key_id, "Signed new APNs provider token");

        *cached = Some(CachedToken {
            jwt: jwt.clone(),
            issued_at: now,
        });
        Ok(jwt)
    }

    fn invalidate(&self) {
        *self.cached.lock() = None;
    }
}

/// Request headers derived from the notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApnsHeaders {
    pub apns_id: Option<String>,
    /// Overrides the configured bundle id.
    pub topic: Option<String>,
    pub collapse_id: Option<String>,
    pub expiration: Option<i64>,
    pub priority: Option<u8>,
    pub push_type: Option<String>,
}

/// Prepared APNs request, shared by every recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct ApnsMessage {
    pub headers: ApnsHeaders,
    pub body: Value,
    /// Per-request environment; `None` uses the configured one.
    pub production: Option<bool>,
}

impl ApnsMessage {
    pub fn from_notification(notification: &PushNotification) -> Self {
        let non_empty = |s: &str| Some(s.to_string()).filter(|s| !s.is_empty());
        let priority = match notification.priority.as_str() {
            "normal" => Some(5),
            "high" => Some(10),
            _ => None,
        };
        let production = if notification.production {
            Some(true)
        } else if notification.development {
            Some(false)
        } else {
            None
        };

        Self {
            headers: ApnsHeaders {
                apns_id: non_empty(&notification.apns_id),
                topic: non_empty(&notification.topic),
                collapse_id: non_empty(&notification.collapse_id),
                expiration: notification.expiration,
                priority,
                push_type: non_empty(&notification.push_type),
            },
            body: build_payload(notification),
            production,
        }
    }
}

/// Build the JSON body: the `aps` dictionary plus custom keys at the root.
pub fn build_payload(notification: &PushNotification) -> Value {
    let n = notification;
    let mut aps = Map::new();

    if !n.message.is_empty() && n.title.is_empty() {
        aps.insert("alert".into(), json!(n.message));
    }
    if let Some(badge) = n.badge.filter(|badge| *badge >= 0) {
        aps.insert("badge".into(), json!(badge));
    }
    if n.mutable_content {
        aps.insert("mutable-content".into(), json!(1));
    }
    if let Some(sound) = build_sound(n) {
        aps.insert("sound".into(), sound);
    }
    if n.content_available {
        aps.insert("content-available".into(), json!(1));
    }
    if !n.url_args.is_empty() {
        aps.insert("url-args".into(), json!(n.url_args));
    }
    if !n.thread_id.is_empty() {
        aps.insert("thread-id".into(), json!(n.thread_id));
    }
    if !n.category.is_empty() {
        aps.insert("category".into(), json!(n.category));
    }
    if !n.interruption_level.is_empty() {
        aps.insert("interruption-level".into(), json!(n.interruption_level));
    }

    let alert = build_alert(n);
    if !alert.is_empty() {
        aps.insert("alert".into(), Value::Object(alert));
    }

    let mut root = Map::new();
    for (key, value) in n.data.iter().chain(n.apns.iter()) {
        root.insert(key.clone(), value.clone());
    }
    root.insert("aps".into(), Value::Object(aps));
    Value::Object(root)
}

fn build_alert(n: &PushNotification) -> Map<String, Value> {
    let a = &n.alert;
    let mut alert = Map::new();
    let mut put = |key: &str, value: &str| {
        if !value.is_empty() {
            alert.insert(key.to_string(), json!(value));
        }
    };

    put("title", &n.title);
    if !n.title.is_empty() {
        put("body", &n.message);
    }
    put("title", &a.title);
    put("subtitle", &a.subtitle);
    put("title-loc-key", &a.title_loc_key);
    put("body", &a.body);
    put("launch-image", &a.launch_image);
    put("loc-key", &a.loc_key);
    put("action", &a.action);
    put("action-loc-key", &a.action_loc_key);
    put("summary-arg", &a.summary_arg);

    if !a.loc_args.is_empty() {
        alert.insert("loc-args".into(), json!(a.loc_args));
    }
    if !a.title_loc_args.is_empty() {
        alert.insert("title-loc-args".into(), json!(a.title_loc_args));
    }
    if let Some(count) = a.summary_arg_count.filter(|c| *c > 0) {
        alert.insert("summary-arg-count".into(), json!(count));
    }

    // A dictionary replaces the plain-string alert, so keep its text as the body.
    if !alert.is_empty() && !alert.contains_key("body") && !n.message.is_empty() {
        alert.insert("body".into(), json!(n.message));
    }
    alert
}

fn build_sound(n: &PushNotification) -> Option<Value> {
    let mut sound = match &n.sound {
        Some(Sound::Named(name)) if !name.is_empty() => Some(json!(name)),
        Some(Sound::Critical(critical)) => serde_json::to_value(critical).ok(),
        _ => None,
    };

    let volume = n.sound_volume.filter(|v| *v > 0.0);
    if n.sound_name.is_empty() && volume.is_none() {
        return sound;
    }

    let mut dict = match sound.take() {
        Some(Value::Object(map)) => map,
        Some(Value::String(name)) => {
            let mut map = Map::new();
            map.insert("name".into(), json!(name));
            map
        }
        _ => Map::new(),
    };
    if !n.sound_name.is_empty() {
        dict.insert("name".into(), json!(n.sound_name));
    }
    if let Some(volume) = volume {
        dict.insert("volume".into(), json!(volume));
    }
    Some(Value::Object(dict))
}

#[derive(Deserialize)]
struct ApnsErrorBody {
    reason: String,
}

/// Client for one APNs key.
pub struct ApnsClient {
    http: reqwest::Client,
    token: ProviderToken,
    topic: String,
    production: bool,
    production_endpoint: String,
    development_endpoint: String,
}

impl ApnsClient {
    pub fn new(config: &ApnsConfig) -> Result<Self> {
        let http = http_client::builder(http_client::DEFAULT_REQUEST_TIMEOUT).build()?;
        Self::with_http(config, http)
    }

    pub fn with_http(config: &ApnsConfig, http: reqwest::Client) -> Result<Self> {
        Ok(Self {
            http,
            token: ProviderToken::new(&config.key_pem, &config.key_id, &config.team_id)?,
            topic: config.topic.clone(),
            production: config.production,
            production_endpoint: PRODUCTION_ENDPOINT.to_string(),
            development_endpoint: DEVELOPMENT_ENDPOINT.to_string(),
        })
    }

    /// Point the client at other hosts, e.g. a local stub.
    pub fn with_endpoints(
        mut self,
        production: impl Into<String>,
        development: impl Into<String>,
    ) -> Self {
        self.production_endpoint = production.into();
        self.development_endpoint = development.into();
        self
    }

    fn endpoint(&self, production: Option<bool>) -> &str {
        if production.unwrap_or(self.production) {
            &self.production_endpoint
        } else {
            &self.development_endpoint
        }
    }

    fn classify(&self, recipient: &str, status: StatusCode, reason: String) -> SendOutcome {
        if status == StatusCode::FORBIDDEN && reason == "ExpiredProviderToken" {
            self.token.invalidate();
            return SendOutcome::rejected_retryable(recipient, reason);
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            SendOutcome::rejected_retryable(recipient, reason)
        } else {
            SendOutcome::rejected_permanent(recipient, reason)
        }
    }
}

#[async_trait]
impl ProviderClient for ApnsClient {
    type Payload = ApnsMessage;

    fn platform(&self) -> &'static str {
        Platform::Ios.as_str()
    }

    async fn send(&self, recipient: &str, message: &ApnsMessage) -> SendOutcome {
        let bearer = match self.token.bearer() {
            Ok(bearer) => bearer,
            Err(e) => return SendOutcome::rejected_permanent(recipient, e.to_string()),
        };

        let url = format!("{}/3/device/{}", self.endpoint(message.production), recipient);
        let headers = &message.headers;
        let mut request = self
            .http
            .post(url)
            .bearer_auth(bearer)
            .header("apns-topic", headers.topic.as_deref().unwrap_or(&self.topic))
            .json(&message.body);
        if let Some(id) = &headers.apns_id {
            request = request.header("apns-id", id);
        }
        if let Some(collapse_id) = &headers.collapse_id {
            request = request.header("apns-collapse-id", collapse_id);
        }
        if let Some(expiration) = headers.expiration {
            request = request.header("apns-expiration", expiration.to_string());
        }
        if let Some(priority) = headers.priority {
            request = request.header("apns-priority", priority.to_string());
        }
        if let Some(push_type) = &headers.push_type {
            request = request.header("apns-push-type", push_type);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return SendOutcome::transport_error(recipient, e.to_string()),
        };

        let status = response.status();
        if status == StatusCode::OK {
            return SendOutcome::sent(recipient);
        }
        let reason = match response.json::<ApnsErrorBody>().await {
            Ok(body) => body.reason,
            Err(_) => status.to_string(),
        };
        self.classify(recipient, status, reason)
    }
}

impl PushProvider for ApnsClient {
    fn prepare(&self, notification: &PushNotification) -> Result<ApnsMessage> {
        if notification.platform != Platform::Ios {
            return Err(Error::validation("APNs only delivers iOS notifications"));
        }
        Ok(ApnsMessage::from_notification(notification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Alert, CriticalSound};
    use jsonwebtoken::{DecodingKey, Validation, decode};

    const TEST_KEY: &str = include_str!("../../tests/fixtures/AuthKey_TEST.p8");
    const TEST_PUBLIC_KEY: &str = include_str!("../../tests/fixtures/AuthKey_TEST.pub.pem");

    fn ios() -> PushNotification {
        let mut push = PushNotification::new(Platform::Ios);
        push.tokens = vec!["token".to_string()];
        push
    }

    fn config() -> ApnsConfig {
        ApnsConfig {
            key_pem: TEST_KEY.to_string(),
            key_id: "KEY123".to_string(),
            team_id: "TEAM456".to_string(),
            topic: "com.herald.test".to_string(),
            production: false,
        }
    }

    #[test]
    fn test_message_only_is_plain_alert() {
        let mut push = ios();
        push.message = "Hello".to_string();
        let body = build_payload(&push);
        assert_eq!(body["aps"]["alert"], "Hello");
    }

    #[test]
    fn test_title_moves_message_into_body() {
        let mut push = ios();
        push.title = "Greeting".to_string();
        push.message = "Hello".to_string();
        let body = build_payload(&push);
        assert_eq!(body["aps"]["alert"]["title"], "Greeting");
        assert_eq!(body["aps"]["alert"]["body"], "Hello");
    }

    #[test]
    fn test_alert_dictionary_fields() {
        let mut push = ios();
        push.message = "fallback".to_string();
        push.alert = Alert {
            subtitle: "Sub".to_string(),
            loc_key: "GAME_PLAY".to_string(),
            loc_args: vec!["Jenna".to_string()],
            summary_arg_count: Some(3),
            ..Alert::default()
        };
        let body = build_payload(&push);
        let alert = &body["aps"]["alert"];
        assert_eq!(alert["subtitle"], "Sub");
        assert_eq!(alert["loc-key"], "GAME_PLAY");
        assert_eq!(alert["loc-args"], json!(["Jenna"]));
        assert_eq!(alert["summary-arg-count"], 3);
        assert_eq!(alert["body"], "fallback");
    }

    #[test]
    fn test_aps_flags_and_custom_data() {
        let mut push = ios();
        push.badge = Some(0);
        push.mutable_content = true;
        push.content_available = true;
        push.thread_id = "t1".to_string();
        push.category = "NEWS".to_string();
        push.interruption_level = "time-sensitive".to_string();
        push.url_args = vec!["a".to_string()];
        push.data.insert("order".to_string(), json!(42));

        let body = build_payload(&push);
        let aps = &body["aps"];
        assert_eq!(aps["badge"], 0);
        assert_eq!(aps["mutable-content"], 1);
        assert_eq!(aps["content-available"], 1);
        assert_eq!(aps["thread-id"], "t1");
        assert_eq!(aps["category"], "NEWS");
        assert_eq!(aps["interruption-level"], "time-sensitive");
        assert_eq!(aps["url-args"], json!(["a"]));
        assert_eq!(body["order"], 42);
        assert!(aps.get("alert").is_none());
    }

    #[test]
    fn test_negative_badge_dropped() {
        let mut push = ios();
        push.badge = Some(-1);
        assert!(build_payload(&push)["aps"].get("badge").is_none());
    }

    #[test]
    fn test_sound_shapes() {
        let mut push = ios();
        push.sound = Some(Sound::Named("ping.caf".to_string()));
        assert_eq!(build_payload(&push)["aps"]["sound"], "ping.caf");

        push.sound_volume = Some(0.5);
        assert_eq!(
            build_payload(&push)["aps"]["sound"],
            json!({"name": "ping.caf", "volume": 0.5})
        );

        let mut push = ios();
        push.sound = Some(Sound::Critical(CriticalSound {
            critical: 1,
            name: Some("alarm.caf".to_string()),
            volume: Some(1.0),
        }));
        push.sound_name = "siren.caf".to_string();
        assert_eq!(
            build_payload(&push)["aps"]["sound"],
            json!({"critical": 1, "name": "siren.caf", "volume": 1.0})
        );
    }

    #[test]
    fn test_headers_and_environment() {
        let mut push = ios();
        push.priority = "normal".to_string();
        push.apns_id = "id-1".to_string();
        push.push_type = "background".to_string();
        push.expiration = Some(1_700_000_000);
        push.development = true;

        let message = ApnsMessage::from_notification(&push);
        assert_eq!(message.headers.priority, Some(5));
        assert_eq!(message.headers.apns_id.as_deref(), Some("id-1"));
        assert_eq!(message.headers.push_type.as_deref(), Some("background"));
        assert_eq!(message.headers.expiration, Some(1_700_000_000));
        assert!(message.headers.topic.is_none());
        assert_eq!(message.production, Some(false));

        push.priority = "high".to_string();
        push.production = true;
        let message = ApnsMessage::from_notification(&push);
        assert_eq!(message.headers.priority, Some(10));
        assert_eq!(message.production, Some(true));
    }

    #[test]
    fn test_provider_token_is_signed_and_cached() {
        let token = ProviderToken::new(TEST_KEY, "KEY123", "TEAM456").unwrap();
        let first = token.bearer().unwrap();
        assert_eq!(first, token.bearer().unwrap());

        let mut validation = Validation::new(Algorithm::ES256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        let key = DecodingKey::from_ec_pem(TEST_PUBLIC_KEY.as_bytes()).unwrap();
        let decoded = decode::<serde_json::Value>(&first, &key, &validation).unwrap();
        assert_eq!(decoded.header.kid.as_deref(), Some("KEY123"));
        assert_eq!(decoded.claims["iss"], "TEAM456");

        token.invalidate();
        assert!(token.cached.lock().is_none());
    }

    #[test]
    fn test_invalid_key_is_config_error() {
        let err = ProviderToken::new("not a key", "k", "t").err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_endpoint_selection() {
        http_client::install_rustls_provider();
        let client = ApnsClient::new(&config()).unwrap();
        assert_eq!(client.endpoint(None), DEVELOPMENT_ENDPOINT);
        assert_eq!(client.endpoint(Some(true)), PRODUCTION_ENDPOINT);
    }

    #[test]
    fn test_prepare_rejects_android() {
        http_client::install_rustls_provider();
        let client = ApnsClient::new(&config()).unwrap();
        assert!(client.prepare(&PushNotification::new(Platform::Android)).is_err());
        assert!(client.prepare(&ios()).is_ok());
    }

    #[test]
    fn test_classification() {
        http_client::install_rustls_provider();
        let client = ApnsClient::new(&config()).unwrap();
        let outcome = client.classify("t", StatusCode::BAD_REQUEST, "BadDeviceToken".into());
        assert_eq!(outcome.status, herald_dispatch::DeliveryStatus::RejectedPermanent);
        let outcome = client.classify("t", StatusCode::GONE, "Unregistered".into());
        assert_eq!(outcome.status, herald_dispatch::DeliveryStatus::RejectedPermanent);
        let outcome = client.classify("t", StatusCode::SERVICE_UNAVAILABLE, "Shutdown".into());
        assert_eq!(outcome.status, herald_dispatch::DeliveryStatus::RejectedRetryable);
        let outcome = client.classify("t", StatusCode::TOO_MANY_REQUESTS, "TooManyRequests".into());
        assert_eq!(outcome.status, herald_dispatch::DeliveryStatus::RejectedRetryable);

        client.token.bearer().unwrap();
        let outcome = client.classify("t", StatusCode::FORBIDDEN, "ExpiredProviderToken".into());
        assert_eq!(outcome.status, herald_dispatch::DeliveryStatus::RejectedRetryable);
        assert!(client.token.cached.lock().is_none());
    }
}
