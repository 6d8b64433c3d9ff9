//! # Conversational Response Provider
//!
//! Narrow request/response contract for the external service that writes
//! the next outgoing message and extracts structured updates from the
//! exchange. The orchestration core only depends on the [`ConversationAgent`]
//! trait; the HTTP client in [`http`] is the production implementation.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::HistoryEntry;

/// Which prompt context the provider should respond under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    Onboarding,
    Campaign,
    Bounty,
    General,
}

/// Everything the provider needs to produce the next message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub mode: AgentMode,
    /// Full ordered history, oldest first. Empty for opening messages.
    pub conversation_history: Vec<HistoryEntry>,
    pub user_demographics: serde_json::Map<String, serde_json::Value>,
    // Campaign/bounty context; absent in onboarding and general modes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research_brief: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

impl AgentRequest {
    /// Context-free request for the given mode; campaign fields are filled
    /// by the caller when relevant.
    pub fn new(mode: AgentMode) -> Self {
        Self {
            mode,
            conversation_history: Vec::new(),
            user_demographics: serde_json::Map::new(),
            research_brief: None,
            extraction_schema: None,
            extracted_data: None,
            reward_text: None,
            reward_link: None,
            system_prompt_override: None,
        }
    }
}

/// The provider's structured output for one exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply {
    /// Next outgoing message text. Never empty on a successful call.
    pub message: String,
    /// Newly observed extraction-schema values.
    #[serde(default)]
    pub extracted_data_update: serde_json::Map<String, serde_json::Value>,
    /// Newly observed demographic values.
    #[serde(default)]
    pub user_demographics_update: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub conversation_complete: bool,
    /// Tri-state bounty signal; absent means the reply was ambiguous.
    #[serde(default)]
    pub bounty_accepted: Option<bool>,
}

impl AgentReply {
    pub fn bounty_decision(&self) -> BountyDecision {
        BountyDecision::from_flag(self.bounty_accepted)
    }
}

/// Interpretation of a reply to a bounty notification. Modeled as three
/// variants so an unset wire flag is never read as a decline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BountyDecision {
    Accepted,
    Declined,
    Ambiguous,
}

impl BountyDecision {
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Self::Accepted,
            Some(false) => Self::Declined,
            None => Self::Ambiguous,
        }
    }
}

/// The seam between the orchestration core and the generation service.
#[async_trait]
pub trait ConversationAgent: Send + Sync {
    async fn respond(&self, request: AgentRequest) -> Result<AgentReply>;
}

#[cfg(test)]
pub mod testing {
    //! In-memory agent for handler and concurrency tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns a canned reply and tracks concurrent callers.
    pub struct StaticAgent {
        pub reply: AgentReply,
        pub in_flight: Arc<AtomicUsize>,
        pub max_in_flight: Arc<AtomicUsize>,
        pub delay: std::time::Duration,
    }

    impl StaticAgent {
        pub fn new(reply: AgentReply) -> Self {
            Self {
                reply,
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_in_flight: Arc::new(AtomicUsize::new(0)),
                delay: std::time::Duration::from_millis(10),
            }
        }
    }

    #[async_trait]
    impl ConversationAgent for StaticAgent {
        async fn respond(&self, _request: AgentRequest) -> Result<AgentReply> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounty_decision_is_tri_state() {
        assert_eq!(BountyDecision::from_flag(Some(true)), BountyDecision::Accepted);
        assert_eq!(BountyDecision::from_flag(Some(false)), BountyDecision::Declined);
        assert_eq!(BountyDecision::from_flag(None), BountyDecision::Ambiguous);
    }

    #[test]
    fn test_reply_defaults_tolerate_sparse_payloads() {
        // A minimal provider payload decodes with empty updates and an
        // ambiguous bounty flag
        let reply: AgentReply = serde_json::from_str(r#"{"message": "Hey!"}"#).unwrap();
        assert_eq!(reply.message, "Hey!");
        assert!(reply.extracted_data_update.is_empty());
        assert!(reply.user_demographics_update.is_empty());
        assert!(!reply.conversation_complete);
        assert_eq!(reply.bounty_decision(), BountyDecision::Ambiguous);
    }

    #[test]
    fn test_request_omits_absent_campaign_context() {
        let request = AgentRequest::new(AgentMode::Onboarding);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["mode"], "onboarding");
        assert!(json.get("research_brief").is_none());
        assert!(json.get("reward_text").is_none());
    }
}
