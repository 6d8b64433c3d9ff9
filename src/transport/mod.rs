//! # Message Transport
//!
//! Outbound delivery seam: send a text to a destination address, get back
//! the provider-assigned message identifier used for inbound dedup. The
//! HTTP implementation posts to a Twilio-compatible messages endpoint with
//! basic auth.
//!
//! Destination addresses are stored bare (`+E164`) and channel-prefixed on
//! the wire (`whatsapp:+E164`); [`normalize_address`] and
//! [`channel_address`] convert between the two.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::TransportConfig;
use crate::error::{MeshError, Result};

const CHANNEL_PREFIX: &str = "whatsapp:";

/// Strip the channel prefix from an inbound sender address.
pub fn normalize_address(address: &str) -> String {
    address.strip_prefix(CHANNEL_PREFIX).unwrap_or(address).to_string()
}

/// Re-add the channel prefix for the wire.
pub fn channel_address(phone: &str) -> String {
    if phone.starts_with(CHANNEL_PREFIX) {
        phone.to_string()
    } else {
        format!("{CHANNEL_PREFIX}{phone}")
    }
}

/// The send-message capability consumed by dispatch and inbound replies.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Deliver `text` to `destination` (bare address); returns the
    /// transport's message identifier.
    async fn send(&self, destination: &str, text: &str) -> Result<String>;
}

pub struct HttpMessageTransport {
    client: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_address: String,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    sid: String,
}

impl HttpMessageTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| MeshError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl MessageTransport for HttpMessageTransport {
    async fn send(&self, destination: &str, text: &str) -> Result<String> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );

        let params = [
            ("From", self.from_address.clone()),
            ("To", channel_address(destination)),
            ("Body", text.to_string()),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MeshError::Transport(format!(
                "transport returned {}",
                response.status()
            )));
        }

        let body: SendMessageResponse = response
            .json()
            .await
            .map_err(|e| MeshError::Transport(format!("malformed transport response: {e}")))?;

        Ok(body.sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_channel_prefix() {
        assert_eq!(normalize_address("whatsapp:+14155550100"), "+14155550100");
        assert_eq!(normalize_address("+14155550100"), "+14155550100");
    }

    #[test]
    fn test_channel_address_is_idempotent() {
        assert_eq!(channel_address("+14155550100"), "whatsapp:+14155550100");
        assert_eq!(
            channel_address("whatsapp:+14155550100"),
            "whatsapp:+14155550100"
        );
    }
}
