//! Notification payloads and the inbound request format.

pub mod message;
pub mod push;
pub mod request;

pub use message::{EmailNotification, SmsNotification};
pub use push::{
    Alert, CriticalSound, MAX_ANDROID_TOKENS, MAX_TIME_TO_LIVE, Platform, PushNotification, Sound,
};
pub use request::{
    EmailSetting, Notification, NotificationKind, NotifierRequest, PhoneSetting, PushSetting,
};
