//! Push notification payload shared by the APNs and FCM adapters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use herald_dispatch::DispatchTarget;

use crate::error::{Error, Result};

/// FCM rejects more registration ids per message than this.
pub const MAX_ANDROID_TOKENS: usize = 1000;

/// Largest FCM `time_to_live`, four weeks in seconds.
pub const MAX_TIME_TO_LIVE: u32 = 2_419_200;

/// Target platform. Encoded on the wire as `1` (iOS) or `2` (Android).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }
}

impl TryFrom<u8> for Platform {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Platform::Ios),
            2 => Ok(Platform::Android),
            other => Err(format!("unknown platform {other}")),
        }
    }
}

impl From<Platform> for u8 {
    fn from(platform: Platform) -> Self {
        match platform {
            Platform::Ios => 1,
            Platform::Android => 2,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification sound, either a file name or an APNs critical-alert dictionary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sound {
    Named(String),
    Critical(CriticalSound),
}

impl Sound {
    /// Sound file name, whichever shape was sent.
    pub fn name(&self) -> Option<&str> {
        match self {
            Sound::Named(name) => Some(name.as_str()).filter(|n| !n.is_empty()),
            Sound::Critical(sound) => sound.name.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriticalSound {
    #[serde(default)]
    pub critical: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
}

/// APNs alert dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Alert {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub action: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub action_loc_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub launch_image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub loc_args: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub loc_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subtitle: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub title_loc_args: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title_loc_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary_arg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_arg_count: Option<u32>,
}

impl Alert {
    pub fn is_empty(&self) -> bool {
        *self == Alert::default()
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// One push request, addressed to device tokens or an FCM topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushNotification {
    #[serde(rename = "notif_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub tokens: Vec<String>,
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub priority: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub content_available: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub mutable_content: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<Sound>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
    /// Extra rounds requested by the caller. Zero means the engine default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,

    // Android
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub collapse_key: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub delay_while_idle: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<u32>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub restricted_package_name: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub condition: String,

    // iOS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<i64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub apns_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub collapse_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub topic: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub push_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<i64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(rename = "thread-id", default, skip_serializing_if = "String::is_empty")]
    pub thread_id: String,
    #[serde(rename = "url-args", default, skip_serializing_if = "Vec::is_empty")]
    pub url_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Alert::is_empty")]
    pub alert: Alert,
    #[serde(default, skip_serializing_if = "is_false")]
    pub production: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub development: bool,
    #[serde(rename = "name", default, skip_serializing_if = "String::is_empty")]
    pub sound_name: String,
    #[serde(rename = "volume", default, skip_serializing_if = "Option::is_none")]
    pub sound_volume: Option<f32>,
    /// Raw keys merged into the APNs payload root.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub apns: Map<String, Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interruption_level: String,
}

impl PushNotification {
    /// A bare notification with every optional field unset.
    pub fn new(platform: Platform) -> Self {
        Self {
            id: String::new(),
            tokens: Vec::new(),
            platform,
            message: String::new(),
            title: String::new(),
            image: String::new(),
            priority: String::new(),
            content_available: false,
            mutable_content: false,
            sound: None,
            data: Map::new(),
            retry: None,
            to: String::new(),
            collapse_key: String::new(),
            delay_while_idle: false,
            time_to_live: None,
            restricted_package_name: String::new(),
            dry_run: false,
            condition: String::new(),
            expiration: None,
            apns_id: String::new(),
            collapse_id: String::new(),
            topic: String::new(),
            push_type: String::new(),
            badge: None,
            category: String::new(),
            thread_id: String::new(),
            url_args: Vec::new(),
            alert: Alert::default(),
            production: false,
            development: false,
            sound_name: String::new(),
            sound_volume: None,
            apns: Map::new(),
            interruption_level: String::new(),
        }
    }

    /// FCM topic or condition message.
    pub fn is_topic(&self) -> bool {
        self.platform == Platform::Android
            && (self.to.starts_with("/topics/") || !self.condition.is_empty())
    }

    /// Check the request before anything is sent.
    pub fn validate(&self) -> Result<()> {
        if !self.is_topic() && self.tokens.is_empty() && self.to.is_empty() {
            return Err(Error::validation(
                "The message must specify at least one registration ID",
            ));
        }

        if self.tokens.len() == 1 && self.tokens[0].trim().is_empty() {
            return Err(Error::validation("The token must not be empty"));
        }

        if self.platform == Platform::Android && self.tokens.len() > MAX_ANDROID_TOKENS {
            return Err(Error::validation(format!(
                "The message may specify at most {MAX_ANDROID_TOKENS} registration IDs"
            )));
        }

        if self.platform == Platform::Android
            && self.time_to_live.is_some_and(|ttl| ttl > MAX_TIME_TO_LIVE)
        {
            return Err(Error::validation(format!(
                "The message's TimeToLive field must be an integer between 0 and {MAX_TIME_TO_LIVE} (4 weeks)"
            )));
        }

        Ok(())
    }

    /// Who the engine should fan out to.
    pub fn dispatch_target(&self) -> DispatchTarget {
        if self.is_topic() {
            let topic = if self.to.starts_with("/topics/") {
                self.to.clone()
            } else {
                self.condition.clone()
            };
            return DispatchTarget::Topic(topic);
        }
        if self.tokens.is_empty() {
            return DispatchTarget::Recipients(vec![self.to.clone()]);
        }
        DispatchTarget::Recipients(self.tokens.clone())
    }

    /// The notification id, when one was supplied.
    pub fn notification_id(&self) -> Option<&str> {
        Some(self.id.as_str()).filter(|id| !id.is_empty())
    }
}
