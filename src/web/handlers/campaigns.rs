//! # Campaign Management Handlers
//!
//! Synchronous request/response operations over the durable store. Only
//! launch has side effects beyond the row it touches, and launch only
//! enqueues — the dispatcher does the sending.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use crate::models::{Campaign, Conversation, NewCampaign};
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

/// One extraction-schema field definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionField {
    #[serde(rename = "type")]
    pub field_type: String,
    pub description: String,
}

/// Request body for campaign creation.
#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub research_brief: String,
    /// Ordered mapping of field name to definition.
    pub extraction_schema: BTreeMap<String, ExtractionField>,
    pub phone_numbers: Vec<String>,
    #[serde(default)]
    pub system_prompt_override: Option<String>,
    #[serde(default)]
    pub reward_text: Option<String>,
    #[serde(default)]
    pub reward_link: Option<String>,
    #[serde(default)]
    pub targeting: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct CreateCampaignResponse {
    pub ok: bool,
    pub campaign_id: String,
    pub created_at: DateTime<Utc>,
}

/// Summary row for the campaign list.
#[derive(Debug, Serialize)]
pub struct CampaignSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    pub total_conversations: i32,
    pub completed_conversations: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CampaignDetail {
    pub id: String,
    pub name: String,
    pub research_brief: String,
    pub extraction_schema: serde_json::Value,
    pub system_prompt_override: Option<String>,
    pub reward_text: Option<String>,
    pub reward_link: Option<String>,
    pub phone_numbers: Vec<String>,
    pub targeting: Option<serde_json::Value>,
    pub status: String,
    pub total_conversations: i32,
    pub completed_conversations: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LaunchResponse {
    pub ok: bool,
    pub conversations_created: i32,
    pub entries_reactivated: i32,
    pub estimated_completion_minutes: i64,
    pub outreach_rate_per_minute: u32,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct ExtractionRow {
    pub phone_number: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct ExtractionsResponse {
    pub campaign_id: String,
    pub total_completed: usize,
    pub extractions: Vec<ExtractionRow>,
}

impl From<&Campaign> for CampaignDetail {
    fn from(campaign: &Campaign) -> Self {
        Self {
            id: campaign.id.to_string(),
            name: campaign.name.clone(),
            research_brief: campaign.research_brief.clone(),
            extraction_schema: campaign.extraction_schema.clone(),
            system_prompt_override: campaign.system_prompt_override.clone(),
            reward_text: campaign.reward_text.clone(),
            reward_link: campaign.reward_link.clone(),
            phone_numbers: campaign.phone_numbers.clone().unwrap_or_default(),
            targeting: campaign.targeting.clone(),
            status: campaign.status.clone(),
            total_conversations: campaign.total_conversations,
            completed_conversations: campaign.completed_conversations,
            created_at: campaign.created_at,
            updated_at: campaign.updated_at,
        }
    }
}

/// Create a campaign: POST /campaigns
pub async fn create_campaign(
    State(state): State<AppState>,
    Json(request): Json<CreateCampaignRequest>,
) -> ApiResult<Json<CreateCampaignResponse>> {
    if request.extraction_schema.is_empty() {
        return Err(ApiError::bad_request("extraction schema cannot be empty"));
    }

    let extraction_schema = serde_json::to_value(&request.extraction_schema)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let campaign = state
        .lifecycle
        .create(NewCampaign {
            name: request.name,
            research_brief: request.research_brief,
            extraction_schema,
            system_prompt_override: request.system_prompt_override,
            reward_text: request.reward_text,
            reward_link: request.reward_link,
            phone_numbers: request.phone_numbers,
            targeting: request.targeting,
        })
        .await?;

    info!(campaign_id = %campaign.id, name = %campaign.name, "campaign created");

    Ok(Json(CreateCampaignResponse {
        ok: true,
        campaign_id: campaign.id.to_string(),
        created_at: campaign.created_at,
    }))
}

/// List campaigns: GET /campaigns
pub async fn list_campaigns(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<CampaignSummary>>> {
    let campaigns = Campaign::list_all(&state.pool)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(
        campaigns
            .iter()
            .map(|c| CampaignSummary {
                id: c.id.to_string(),
                name: c.name.clone(),
                status: c.status.clone(),
                total_conversations: c.total_conversations,
                completed_conversations: c.completed_conversations,
                created_at: c.created_at,
            })
            .collect(),
    ))
}

/// Campaign detail: GET /campaigns/{id}
pub async fn get_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<CampaignDetail>> {
    let campaign = Campaign::find_by_id(&state.pool, campaign_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Campaign not found"))?;

    Ok(Json(CampaignDetail::from(&campaign)))
}

/// Launch a campaign: POST /campaigns/{id}/launch
pub async fn launch_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<LaunchResponse>> {
    let rate = state.config.outreach.rate_per_minute;
    let result = state.lifecycle.launch(campaign_id, rate).await?;

    Ok(Json(LaunchResponse {
        ok: true,
        conversations_created: result.conversations_created,
        entries_reactivated: result.entries_reactivated,
        estimated_completion_minutes: result.estimated_completion_minutes,
        outreach_rate_per_minute: result.outreach_rate_per_minute,
    }))
}

/// Pause a campaign: POST /campaigns/{id}/pause
pub async fn pause_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<OkResponse>> {
    state.lifecycle.pause(campaign_id).await?;
    Ok(Json(OkResponse { ok: true }))
}

/// Completed extractions: GET /campaigns/{id}/extractions
pub async fn get_extractions(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<ExtractionsResponse>> {
    Campaign::find_by_id(&state.pool, campaign_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Campaign not found"))?;

    let completed = Conversation::list_completed_for_campaign(&state.pool, campaign_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let extractions: Vec<ExtractionRow> = completed
        .into_iter()
        .map(|c| ExtractionRow {
            phone_number: c.phone_number,
            data: c.extracted_data,
        })
        .collect();

    Ok(Json(ExtractionsResponse {
        campaign_id: campaign_id.to_string(),
        total_completed: extractions.len(),
        extractions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_decodes_with_optional_fields_absent() {
        let body = r#"{
            "name": "Coffee habits",
            "research_brief": "How do people buy specialty coffee?",
            "extraction_schema": {
                "favorite_cafe": {"type": "string", "description": "Go-to cafe"}
            },
            "phone_numbers": ["+14155550100"]
        }"#;
        let request: CreateCampaignRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.name, "Coffee habits");
        assert!(request.reward_text.is_none());
        assert_eq!(
            request.extraction_schema["favorite_cafe"].field_type,
            "string"
        );
    }

    #[test]
    fn test_extraction_field_round_trips_type_key() {
        let field = ExtractionField {
            field_type: "number(1-10)".to_string(),
            description: "Satisfaction".to_string(),
        };
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["type"], "number(1-10)");
    }
}
