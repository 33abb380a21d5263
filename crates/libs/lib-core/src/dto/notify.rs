//! # Notification Payloads
//!
//! Payloads published on the notification bus.

use serde::{Deserialize, Serialize};

/// Topic consumed by the email relay.
pub const TOPIC_SEND_MAIL: &str = "send_mail";

/// A single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecipient {
    pub name: String,
    pub email_addr: String,
}

/// A templated email request, published on [`TOPIC_SEND_MAIL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendingEmail {
    pub sender: String,
    pub subject: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub footer: String,
    pub emails: Vec<EmailRecipient>,
}

impl SendingEmail {
    /// Field-level validation for the publish endpoint.
    pub fn validate(&self) -> Result<(), String> {
        lib_utils::validate_not_empty(&self.sender, "sender")?;
        lib_utils::validate_not_empty(&self.subject, "subject")?;
        if self.emails.is_empty() {
            return Err("emails cannot be empty".to_string());
        }
        for recipient in &self.emails {
            lib_utils::validate_not_empty(&recipient.email_addr, "email_addr")?;
        }
        Ok(())
    }
}
