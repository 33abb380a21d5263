use super::BusHandler;
use crate::dto::SendingEmail;
use async_trait::async_trait;
use std::time::Duration;

/// Forwards `send_mail` messages to the email service's `/send-email` endpoint.
///
/// Without a configured service URL the message is logged and dropped.
pub struct EmailRelay {
    client: reqwest::Client,
    service_url: Option<String>,
}

impl EmailRelay {
    pub fn new(client: reqwest::Client, service_url: Option<String>) -> Self {
        Self {
            client,
            service_url,
        }
    }
}

#[async_trait]
impl BusHandler<SendingEmail> for EmailRelay {
    async fn handle(&self, message: SendingEmail) -> Result<(), String> {
        let Some(base) = self.service_url.as_deref() else {
            tracing::info!(
                recipients = message.emails.len(),
                subject = %message.subject,
                "[BUS] EMAIL_SERVICE_URL not set, email not relayed"
            );
            return Ok(());
        };

        let url = format!("{}/send-email", base.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(10))
            .json(&message)
            .send()
            .await
            .map_err(|e| format!("email service unreachable: {e}"))?;

        if !resp.status().is_success() {
            return Err(format!("email service returned {}", resp.status()));
        }

        tracing::info!(recipients = message.emails.len(), "[BUS] Email relayed");
        Ok(())
    }
}
