//! Single-recipient email and SMS messages.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,4}$").unwrap());

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^0-9])(1[34578][0-9]{9})(?:$|[^0-9])").unwrap());

/// One email to one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailNotification {
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl EmailNotification {
    pub fn validate(&self) -> Result<()> {
        if self.email.is_empty() {
            return Err(Error::validation("Email must be defined"));
        }
        if !EMAIL_RE.is_match(&self.email.to_ascii_lowercase()) {
            return Err(Error::validation("Email has an incorrect format"));
        }
        if self.subject.is_empty() || self.message.is_empty() {
            return Err(Error::validation("Provide subject and message"));
        }
        Ok(())
    }
}

/// One text message to one phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsNotification {
    pub phone: String,
    pub message: String,
}

impl SmsNotification {
    pub fn validate(&self) -> Result<()> {
        if self.phone.is_empty() {
            return Err(Error::validation("Phone number must be defined"));
        }
        if !PHONE_RE.is_match(&self.phone) {
            return Err(Error::validation("Phone number has an incorrect format"));
        }
        Ok(())
    }

    /// The mobile number found in `phone`, stripped of any prefix or separators around it.
    pub fn normalized_phone(&self) -> Option<&str> {
        PHONE_RE
            .captures(&self.phone)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn email(address: &str) -> EmailNotification {
        EmailNotification {
            email: address.to_string(),
            subject: "Welcome".to_string(),
            message: "Hello".to_string(),
        }
    }

    #[rstest]
    #[case("user@example.com", true)]
    #[case("First.Last+tag@Mail.Example.org", true)]
    #[case("user@example", false)]
    #[case("not-an-email", false)]
    #[case("", false)]
    fn test_email_format(#[case] address: &str, #[case] valid: bool) {
        assert_eq!(email(address).validate().is_ok(), valid);
    }

    #[test]
    fn test_email_requires_subject_and_message() {
        let mut notification = email("user@example.com");
        notification.subject.clear();
        assert!(notification.validate().is_err());

        let mut notification = email("user@example.com");
        notification.message.clear();
        assert!(notification.validate().is_err());
    }

    #[rstest]
    #[case("13812345678", true)]
    #[case("+86 13812345678", true)]
    #[case("12812345678", false)]
    #[case("1381234567", false)]
    #[case("138123456789", false)]
    #[case("", false)]
    fn test_phone_format(#[case] phone: &str, #[case] valid: bool) {
        let sms = SmsNotification {
            phone: phone.to_string(),
            message: "code 1234".to_string(),
        };
        assert_eq!(sms.validate().is_ok(), valid);
    }

    #[test]
    fn test_normalized_phone() {
        let sms = SmsNotification {
            phone: "+86 13812345678".to_string(),
            message: String::new(),
        };
        assert_eq!(sms.normalized_phone(), Some("13812345678"));
    }
}
