//! # Campaign Model
//!
//! A campaign is a unit of outreach work: a research brief, an extraction
//! schema describing what must be collected, an optional reward, and a
//! target recipient list. Counters are maintained incrementally by the
//! handlers; the completion check recounts from the conversations table
//! rather than trusting them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::state_machine::CampaignStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub research_brief: String,
    pub extraction_schema: serde_json::Value,
    pub system_prompt_override: Option<String>,
    pub reward_text: Option<String>,
    pub reward_link: Option<String>,
    pub phone_numbers: Option<Vec<String>>,
    pub targeting: Option<serde_json::Value>,
    pub status: String,
    pub total_conversations: i32,
    pub completed_conversations: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New campaign for creation (without generated fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCampaign {
    pub name: String,
    pub research_brief: String,
    pub extraction_schema: serde_json::Value,
    pub system_prompt_override: Option<String>,
    pub reward_text: Option<String>,
    pub reward_link: Option<String>,
    pub phone_numbers: Vec<String>,
    pub targeting: Option<serde_json::Value>,
}

impl Campaign {
    pub fn status(&self) -> CampaignStatus {
        self.status.parse().unwrap_or_default()
    }

    /// Campaigns with a reward dispatch as bounties: templated notification
    /// first, accept/decline interpretation on the first reply.
    pub fn is_bounty(&self) -> bool {
        self.reward_text.is_some()
    }

    pub async fn create(pool: &PgPool, new_campaign: NewCampaign) -> Result<Campaign, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (name, research_brief, extraction_schema,
                                   system_prompt_override, reward_text, reward_link,
                                   phone_numbers, targeting, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'draft')
            RETURNING id, name, research_brief, extraction_schema, system_prompt_override,
                      reward_text, reward_link, phone_numbers, targeting, status,
                      total_conversations, completed_conversations, created_at, updated_at
            "#,
        )
        .bind(&new_campaign.name)
        .bind(&new_campaign.research_brief)
        .bind(&new_campaign.extraction_schema)
        .bind(&new_campaign.system_prompt_override)
        .bind(&new_campaign.reward_text)
        .bind(&new_campaign.reward_link)
        .bind(&new_campaign.phone_numbers)
        .bind(&new_campaign.targeting)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT id, name, research_brief, extraction_schema, system_prompt_override,
                   reward_text, reward_link, phone_numbers, targeting, status,
                   total_conversations, completed_conversations, created_at, updated_at
            FROM campaigns
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT id, name, research_brief, extraction_schema, system_prompt_override,
                   reward_text, reward_link, phone_numbers, targeting, status,
                   total_conversations, completed_conversations, created_at, updated_at
            FROM campaigns
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await
    }

    /// Increment the completed counter after a provider-signalled
    /// completion.
    pub async fn increment_completed(
        executor: impl sqlx::PgExecutor<'_>,
        id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE campaigns
            SET completed_conversations = completed_conversations + 1, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign(reward_text: Option<&str>) -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            name: "Coffee habits".to_string(),
            research_brief: "How do people in Dubai buy specialty coffee?".to_string(),
            extraction_schema: serde_json::json!({
                "favorite_cafe": {"type": "string", "description": "Their go-to cafe"}
            }),
            system_prompt_override: None,
            reward_text: reward_text.map(String::from),
            reward_link: None,
            phone_numbers: Some(vec!["+14155550100".to_string()]),
            targeting: None,
            status: "draft".to_string(),
            total_conversations: 0,
            completed_conversations: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_bounty_detection() {
        assert!(campaign(Some("AED 20 voucher")).is_bounty());
        assert!(!campaign(None).is_bounty());
    }

    #[test]
    fn test_status_accessor_parses_text_column() {
        let c = campaign(None);
        assert_eq!(c.status(), CampaignStatus::Draft);
    }
}
