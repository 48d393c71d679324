//! Twilio SMS paging sink
//!
//! Sends each page as an SMS through the Twilio Messages REST endpoint.

use async_trait::async_trait;
use tracing::debug;

use crate::notifier::{PagingError, PagingSink};

/// Twilio REST API base URL
pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Credentials and phone numbers for SMS delivery
#[derive(Clone, PartialEq, Eq)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    /// Twilio-owned sender number
    pub from_number: String,
    /// Number that receives the alerts
    pub to_number: String,
}

impl std::fmt::Debug for TwilioCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioCredentials")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("from_number", &self.from_number)
            .field("to_number", &self.to_number)
            .finish()
    }
}

/// Paging sink that posts SMS messages to Twilio
pub struct TwilioSink {
    client: reqwest::Client,
    credentials: TwilioCredentials,
    base_url: String,
}

impl TwilioSink {
    pub fn new(credentials: TwilioCredentials) -> Self {
        Self::with_base_url(credentials, TWILIO_API_BASE)
    }

    /// Point the sink at a different API host
    pub fn with_base_url(credentials: TwilioCredentials, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// URL of the Messages resource for the configured account
    pub fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.credentials.account_sid
        )
    }
}

#[async_trait]
impl PagingSink for TwilioSink {
    async fn send(&self, body: &str) -> Result<(), PagingError> {
        let creds = &self.credentials;
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&creds.account_sid, Some(&creds.auth_token))
            .form(&[
                ("Body", body),
                ("From", creds.from_number.as_str()),
                ("To", creds.to_number.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PagingError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        debug!("SMS accepted by Twilio ({})", status);
        Ok(())
    }
}
