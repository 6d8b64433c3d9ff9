//! HTTP client for the conversational response service.

use async_trait::async_trait;
use std::time::Duration;

use super::{AgentReply, AgentRequest, ConversationAgent};
use crate::config::AgentConfig;
use crate::error::{MeshError, Result};

pub struct HttpConversationAgent {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpConversationAgent {
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| MeshError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ConversationAgent for HttpConversationAgent {
    async fn respond(&self, request: AgentRequest) -> Result<AgentReply> {
        let url = format!("{}/v1/respond", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MeshError::Agent(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MeshError::Agent(format!(
                "provider returned {}",
                response.status()
            )));
        }

        let reply: AgentReply = response
            .json()
            .await
            .map_err(|e| MeshError::Agent(format!("malformed provider response: {e}")))?;

        if reply.message.trim().is_empty() {
            return Err(MeshError::Agent("provider returned an empty message".to_string()));
        }

        Ok(reply)
    }
}
