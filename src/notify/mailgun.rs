//! Mailgun HTTP API notifier

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{EmailMessage, NotifyError, Notifier};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends mail through `POST {api_base}/v3/{domain}/messages`
#[derive(Clone)]
pub struct MailgunNotifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl MailgunNotifier {
    pub fn new(api_base: &str, domain: &str, api_key: String) -> Result<Self, NotifyError> {
        if api_key.is_empty() {
            return Err(NotifyError::Config("Mailgun API key is empty".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: messages_endpoint(api_base, domain),
            api_key,
        })
    }
}

fn messages_endpoint(api_base: &str, domain: &str) -> String {
    format!("{}/v3/{}/messages", api_base.trim_end_matches('/'), domain)
}

#[async_trait]
impl Notifier for MailgunNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        let form = [
            ("from", message.from.as_str()),
            ("to", message.to.as_str()),
            ("subject", message.subject.as_str()),
            ("text", message.body.as_str()),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Mailgun accepted message to {}", message.to);
        Ok(())
    }
}
