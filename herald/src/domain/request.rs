//! Inbound notification request, as published on the queue or posted over HTTP.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::{EmailNotification, SmsNotification};
use super::push::{Platform, PushNotification};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSetting {
    pub email: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneSetting {
    pub number: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushSetting {
    /// Device token, or `/topics/<name>` for an Android topic.
    pub to: String,
    /// `ANDROID` or `IOS`.
    pub platform: String,
    pub image: String,
    pub title: String,
    pub message: String,
}

/// Channel a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Email,
    Sms,
    Push,
}

/// Raw request as it arrives. Use [`NotifierRequest::into_notification`] to validate it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub email_setting: EmailSetting,
    pub phone_setting: PhoneSetting,
    pub push_settings: PushSetting,
    /// Free-form data forwarded with push notifications when it is an object.
    pub data: Value,
}

/// A validated request, ready for its channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Email(EmailNotification),
    Sms(SmsNotification),
    Push(PushNotification),
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::Email(_) => NotificationKind::Email,
            Notification::Sms(_) => NotificationKind::Sms,
            Notification::Push(_) => NotificationKind::Push,
        }
    }
}

impl NotifierRequest {
    /// Parse a queue message.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn kind(&self) -> Result<NotificationKind> {
        match self.kind.as_str() {
            "email" => Ok(NotificationKind::Email),
            "sms" => Ok(NotificationKind::Sms),
            "push" => Ok(NotificationKind::Push),
            other => Err(Error::validation(format!("Error type - {other}"))),
        }
    }

    /// Validate the request and convert it into the message for its channel.
    pub fn into_notification(self) -> Result<Notification> {
        let notification = match self.kind()? {
            NotificationKind::Email => {
                let setting = self.email_setting;
                if setting.email.is_empty() {
                    return Err(Error::validation("Error pass email param"));
                }
                if setting.subject.is_empty() {
                    return Err(Error::validation("Error pass subject param"));
                }
                let email = EmailNotification {
                    email: setting.email,
                    subject: setting.subject,
                    message: setting.text,
                };
                email.validate()?;
                Notification::Email(email)
            }
            NotificationKind::Sms => {
                let setting = self.phone_setting;
                if setting.number.is_empty() || setting.text.is_empty() {
                    return Err(Error::validation("Error pass sms params"));
                }
                let sms = SmsNotification {
                    phone: setting.number,
                    message: setting.text,
                };
                sms.validate()?;
                Notification::Sms(sms)
            }
            NotificationKind::Push => {
                let push = build_push(self.push_settings, self.data)?;
                push.validate()?;
                Notification::Push(push)
            }
        };
        Ok(notification)
    }
}

fn build_push(setting: PushSetting, data: Value) -> Result<PushNotification> {
    if setting.to.is_empty() {
        return Err(Error::validation("Empty param in PushSetting"));
    }
    let platform = match setting.platform.to_ascii_uppercase().as_str() {
        "ANDROID" => Platform::Android,
        "IOS" => Platform::Ios,
        other => return Err(Error::validation(format!("Unknown push platform - {other}"))),
    };

    let mut push = PushNotification::new(platform);
    push.title = setting.title;
    push.message = setting.message;
    push.image = setting.image;
    if let Value::Object(map) = data {
        push.data = map;
    }
    if platform == Platform::Android && setting.to.starts_with("/topics/") {
        push.to = setting.to;
    } else {
        push.tokens = vec![setting.to];
    }
    Ok(push)
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_dispatch::DispatchTarget;
    use serde_json::json;

    fn parse(value: Value) -> NotifierRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_unknown_type() {
        let err = parse(json!({"type": "fax"})).into_notification().unwrap_err();
        assert!(err.to_string().contains("Error type - fax"));
        assert!(parse(json!({})).into_notification().is_err());
    }

    #[test]
    fn test_email_request() {
        let request = parse(json!({
            "type": "email",
            "email_setting": {"email": "user@example.com", "subject": "Hi", "text": "Body"}
        }));
        assert_eq!(
            request.into_notification().unwrap(),
            Notification::Email(EmailNotification {
                email: "user@example.com".to_string(),
                subject: "Hi".to_string(),
                message: "Body".to_string(),
            })
        );
    }

    #[test]
    fn test_email_request_errors() {
        let err = parse(json!({"type": "email", "email_setting": {"subject": "Hi"}}))
            .into_notification()
            .unwrap_err();
        assert!(err.to_string().contains("Error pass email param"));

        let err = parse(json!({"type": "email", "email_setting": {"email": "a@b.co"}}))
            .into_notification()
            .unwrap_err();
        assert!(err.to_string().contains("Error pass subject param"));

        let err = parse(json!({
            "type": "email",
            "email_setting": {"email": "nope", "subject": "Hi", "text": "Body"}
        }))
        .into_notification()
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_sms_request() {
        let notification = parse(json!({
            "type": "sms",
            "phone_setting": {"number": "13812345678", "text": "code 42"}
        }))
        .into_notification()
        .unwrap();
        assert_eq!(notification.kind(), NotificationKind::Sms);

        let err = parse(json!({"type": "sms", "phone_setting": {"number": "13812345678"}}))
            .into_notification()
            .unwrap_err();
        assert!(err.to_string().contains("Error pass sms params"));
    }

    #[test]
    fn test_push_request_to_device() {
        let notification = parse(json!({
            "type": "push",
            "push_settings": {"to": "device-1", "platform": "IOS", "title": "T", "message": "M"},
            "data": {"order": 7}
        }))
        .into_notification()
        .unwrap();
        let Notification::Push(push) = notification else {
            panic!("expected push");
        };
        assert_eq!(push.platform, Platform::Ios);
        assert_eq!(push.tokens, vec!["device-1"]);
        assert_eq!(push.title, "T");
        assert_eq!(push.data["order"], 7);
    }

    #[test]
    fn test_push_request_to_android_topic() {
        let notification = parse(json!({
            "type": "push",
            "push_settings": {"to": "/topics/news", "platform": "ANDROID", "message": "M"},
            "data": ["not", "an", "object"]
        }))
        .into_notification()
        .unwrap();
        let Notification::Push(push) = notification else {
            panic!("expected push");
        };
        assert!(push.is_topic());
        assert!(push.data.is_empty());
        assert_eq!(
            push.dispatch_target(),
            DispatchTarget::Topic("/topics/news".to_string())
        );
    }

    #[test]
    fn test_push_request_errors() {
        let err = parse(json!({"type": "push", "push_settings": {"platform": "IOS"}}))
            .into_notification()
            .unwrap_err();
        assert!(err.to_string().contains("Empty param in PushSetting"));

        let err = parse(json!({"type": "push", "push_settings": {"to": "x", "platform": "WEB"}}))
            .into_notification()
            .unwrap_err();
        assert!(err.to_string().contains("Unknown push platform"));
    }

    #[test]
    fn test_from_slice_rejects_garbage() {
        assert!(NotifierRequest::from_slice(b"{not json").is_err());
        let request = NotifierRequest::from_slice(br#"{"type":"sms"}"#).unwrap();
        assert_eq!(request.kind().unwrap(), NotificationKind::Sms);
    }
}
