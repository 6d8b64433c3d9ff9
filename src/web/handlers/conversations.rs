//! Conversation read handlers.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Conversation, Message};
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub phone_number: String,
    pub status: String,
    pub extracted_data: serde_json::Value,
    pub message_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub sender: String,
    pub content: String,
    pub transport_sid: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    pub id: String,
    pub campaign_id: Option<String>,
    pub phone_number: String,
    pub status: String,
    pub extracted_data: serde_json::Value,
    pub message_count: i32,
    pub messages: Vec<MessageView>,
}

impl From<Conversation> for ConversationSummary {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id.to_string(),
            phone_number: c.phone_number,
            status: c.status,
            extracted_data: c.extracted_data,
            message_count: c.message_count,
            created_at: c.created_at,
            updated_at: c.updated_at,
            completed_at: c.completed_at,
        }
    }
}

/// Campaign's conversations: GET /campaigns/{id}/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let conversations = Conversation::list_for_campaign(&state.pool, campaign_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(
        conversations.into_iter().map(ConversationSummary::from).collect(),
    ))
}

/// Conversation with full message history: GET /conversations/{id}
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<ConversationDetail>> {
    let conversation = Conversation::find_by_id(&state.pool, conversation_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Conversation not found"))?;

    let messages = Message::list_for_conversation(&state.pool, conversation_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(ConversationDetail {
        id: conversation.id.to_string(),
        campaign_id: conversation.campaign_id.map(|id| id.to_string()),
        phone_number: conversation.phone_number,
        status: conversation.status,
        extracted_data: conversation.extracted_data,
        message_count: conversation.message_count,
        messages: messages
            .into_iter()
            .map(|m| MessageView {
                sender: m.sender,
                content: m.content,
                transport_sid: m.transport_sid,
                created_at: m.created_at,
            })
            .collect(),
    }))
}
