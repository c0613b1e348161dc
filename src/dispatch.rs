//! Outbound Message Dispatch
//!
//! Delivery of gateway replies over the Twilio WhatsApp API.
//! The seam is a trait so the webhook logic can be exercised without
//! touching the network.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Mutex;
use tracing::debug;

/// Error types for outbound dispatch
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Provider acknowledgement for a sent message
#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    /// Provider-assigned message id
    pub id: String,
    /// Delivery status as reported on submit (e.g. "queued", "sent")
    pub status: String,
}

/// Outbound delivery capability
#[async_trait]
pub trait MessageDispatcher: Send + Sync {
    /// Send a text message to a phone number
    async fn send_message(&self, to: &str, body: &str) -> Result<DispatchReceipt, DispatchError>;

    /// Number the gateway sends from (logged on outbound rows)
    fn sender_number(&self) -> &str;
}

/// Twilio WhatsApp configuration
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Twilio WhatsApp number (with country code)
    pub whatsapp_number: String,
}

/// Twilio-backed dispatcher
pub struct TwilioDispatcher {
    config: TwilioConfig,
    client: reqwest::Client,
}

impl TwilioDispatcher {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

/// Ensure the transport prefix Twilio expects on WhatsApp numbers
fn whatsapp_address(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{}", number)
    }
}

#[async_trait]
impl MessageDispatcher for TwilioDispatcher {
    async fn send_message(&self, to: &str, body: &str) -> Result<DispatchReceipt, DispatchError> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.config.account_sid
        );

        let to_formatted = whatsapp_address(to);
        let from_formatted = whatsapp_address(&self.config.whatsapp_number);

        let form = [
            ("From", from_formatted.as_str()),
            ("To", to_formatted.as_str()),
            ("Body", body),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| DispatchError::SendFailed(e.to_string()))?;

        if response.status().is_success() {
            let result: TwilioMessageResponse = response
                .json()
                .await
                .map_err(|e| DispatchError::Internal(e.to_string()))?;

            debug!("Twilio accepted message {} ({})", result.sid, result.status);
            Ok(DispatchReceipt {
                id: result.sid,
                status: result.status,
            })
        } else {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                Err(DispatchError::RateLimited(60))
            } else {
                Err(DispatchError::SendFailed(format!(
                    "Twilio error {}: {}",
                    status, error_text
                )))
            }
        }
    }

    fn sender_number(&self) -> &str {
        &self.config.whatsapp_number
    }
}

/// Twilio API response
#[derive(Debug, Deserialize)]
struct TwilioMessageResponse {
    sid: String,
    status: String,
}

/// In-memory dispatcher for tests. Records sent messages and can be
/// told to fail to exercise the 500 path.
pub struct MockDispatcher {
    from_number: String,
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl MockDispatcher {
    pub fn new(from_number: &str) -> Self {
        Self {
            from_number: from_number.to_string(),
            sent: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing(from_number: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(from_number)
        }
    }

    /// (to, body) pairs in send order
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageDispatcher for MockDispatcher {
    async fn send_message(&self, to: &str, body: &str) -> Result<DispatchReceipt, DispatchError> {
        if self.fail {
            return Err(DispatchError::SendFailed("mock failure".to_string()));
        }

        let mut sent = self.sent.lock().unwrap();
        sent.push((to.to_string(), body.to_string()));
        Ok(DispatchReceipt {
            id: format!("MM{:08}", sent.len()),
            status: "sent".to_string(),
        })
    }

    fn sender_number(&self) -> &str {
        &self.from_number
    }
}
