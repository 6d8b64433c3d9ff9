//! # User Model
//!
//! A user is identified by a stable destination address (phone number) and
//! created on first inbound contact. Lifecycle status only moves forward
//! (new → onboarding → onboarded); `onboarded` is reached exactly when all
//! required demographic fields are present after a merge.
//!
//! Demographic updates go through [`DemographicsUpdate`], a closed set of
//! named optional fields: unknown keys are dropped at the boundary and
//! absent values never overwrite collected ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::state_machine::UserStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub phone_number: String,
    pub status: String,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub age_range: Option<String>,
    pub gender: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Closed-set demographic update. Only these four fields may ever be
/// written; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemographicsUpdate {
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub age_range: Option<String>,
    pub gender: Option<String>,
}

/// Outcome of merging a [`DemographicsUpdate`] into a user row.
#[derive(Debug, Clone, PartialEq)]
pub struct DemographicsMerge {
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub age_range: Option<String>,
    pub gender: Option<String>,
    pub status: UserStatus,
    /// True when this merge is the one that crossed into onboarded.
    pub newly_onboarded: bool,
}

impl DemographicsUpdate {
    /// Decode from a loose JSON map, dropping unknown keys and non-string
    /// or empty values.
    pub fn from_map(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        let field = |key: &str| {
            map.get(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            city: field("city"),
            neighborhood: field("neighborhood"),
            age_range: field("age_range"),
            gender: field("gender"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.city.is_none()
            && self.neighborhood.is_none()
            && self.age_range.is_none()
            && self.gender.is_none()
    }

    /// Merge into the user's current fields. Update values win where
    /// present; stored values are never cleared. The onboarded transition
    /// fires exactly once, when all required fields become non-null for a
    /// user not already onboarded.
    pub fn merge_into(&self, user: &User) -> DemographicsMerge {
        let city = self.city.clone().or_else(|| user.city.clone());
        let neighborhood = self.neighborhood.clone().or_else(|| user.neighborhood.clone());
        let age_range = self.age_range.clone().or_else(|| user.age_range.clone());
        let gender = self.gender.clone().or_else(|| user.gender.clone());

        let current_status = user.status();
        // Required set per REQUIRED_DEMOGRAPHIC_FIELDS; neighborhood never gates
        let required_complete = city.is_some() && age_range.is_some() && gender.is_some();

        let newly_onboarded = required_complete && !current_status.is_onboarded();
        let status = if required_complete {
            UserStatus::Onboarded
        } else {
            current_status
        };

        DemographicsMerge {
            city,
            neighborhood,
            age_range,
            gender,
            status,
            newly_onboarded,
        }
    }
}

impl User {
    pub fn status(&self) -> UserStatus {
        self.status.parse().unwrap_or_default()
    }

    /// Resolve the user for an address, creating one in status `new` when
    /// absent. Returns the row plus whether this call created it.
    pub async fn find_or_create_by_phone(
        pool: &PgPool,
        phone_number: &str,
    ) -> Result<(User, bool), sqlx::Error> {
        let inserted = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (phone_number, status)
            VALUES ($1, 'new')
            ON CONFLICT (phone_number) DO NOTHING
            RETURNING id, phone_number, status, city, neighborhood, age_range, gender, created_at
            "#,
        )
        .bind(phone_number)
        .fetch_optional(pool)
        .await?;

        if let Some(user) = inserted {
            return Ok((user, true));
        }

        let existing = sqlx::query_as::<_, User>(
            r#"
            SELECT id, phone_number, status, city, neighborhood, age_range, gender, created_at
            FROM users
            WHERE phone_number = $1
            "#,
        )
        .bind(phone_number)
        .fetch_one(pool)
        .await?;

        Ok((existing, false))
    }

    /// Upsert for campaign launch: the row is created if missing and left
    /// untouched (status included) if present.
    pub async fn upsert_for_launch(
        tx: &mut Transaction<'_, Postgres>,
        phone_number: &str,
    ) -> Result<Uuid, sqlx::Error> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO users (phone_number, status)
            VALUES ($1, 'new')
            ON CONFLICT (phone_number) DO UPDATE SET phone_number = EXCLUDED.phone_number
            RETURNING id
            "#,
        )
        .bind(phone_number)
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, phone_number, status, city, neighborhood, age_range, gender, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Mark a `new` user as onboarding. Forward-only: rows already past
    /// `new` are untouched.
    pub async fn begin_onboarding(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET status = 'onboarding' WHERE id = $1 AND status = 'new'")
            .bind(user_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Apply a demographic merge atomically: the row is re-read under
    /// `FOR UPDATE`, merged, and written in one transaction so the
    /// onboarded transition cannot fire twice.
    pub async fn apply_demographics(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        update: &DemographicsUpdate,
    ) -> Result<DemographicsMerge, sqlx::Error> {
        let current = sqlx::query_as::<_, User>(
            r#"
            SELECT id, phone_number, status, city, neighborhood, age_range, gender, created_at
            FROM users
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await?;

        let merge = update.merge_into(&current);

        sqlx::query(
            r#"
            UPDATE users
            SET city = $2, neighborhood = $3, age_range = $4, gender = $5, status = $6
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(&merge.city)
        .bind(&merge.neighborhood)
        .bind(&merge.age_range)
        .bind(&merge.gender)
        .bind(merge.status.to_string())
        .execute(&mut **tx)
        .await?;

        Ok(merge)
    }

    /// Demographic fields as a map for provider requests.
    pub fn demographics_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        let mut put = |key: &str, value: &Option<String>| {
            if let Some(v) = value {
                map.insert(key.to_string(), serde_json::Value::String(v.clone()));
            }
        };
        put("city", &self.city);
        put("neighborhood", &self.neighborhood);
        put("age_range", &self.age_range);
        put("gender", &self.gender);
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(
        status: &str,
        city: Option<&str>,
        age_range: Option<&str>,
        gender: Option<&str>,
    ) -> User {
        User {
            id: Uuid::new_v4(),
            phone_number: "+14155550100".to_string(),
            status: status.to_string(),
            city: city.map(String::from),
            neighborhood: None,
            age_range: age_range.map(String::from),
            gender: gender.map(String::from),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_from_map_drops_unknown_keys_and_blanks() {
        let map = serde_json::json!({
            "city": "Dubai",
            "shoe_size": "44",
            "gender": "",
            "age_range": "  25-34  "
        });
        let update = DemographicsUpdate::from_map(map.as_object().unwrap());
        assert_eq!(update.city.as_deref(), Some("Dubai"));
        assert_eq!(update.age_range.as_deref(), Some("25-34"));
        assert!(update.gender.is_none());
        assert!(update.neighborhood.is_none());
    }

    #[test]
    fn test_merge_never_clears_collected_values() {
        let user = user_with("onboarding", Some("Dubai"), None, None);
        let update = DemographicsUpdate::default();
        let merge = update.merge_into(&user);
        assert_eq!(merge.city.as_deref(), Some("Dubai"));
        assert!(!merge.newly_onboarded);
        assert_eq!(merge.status, UserStatus::Onboarding);
    }

    #[test]
    fn test_onboarded_transition_fires_once() {
        let user = user_with("onboarding", Some("Dubai"), Some("25-34"), None);
        let update = DemographicsUpdate {
            gender: Some("Female".to_string()),
            ..Default::default()
        };
        let merge = update.merge_into(&user);
        assert!(merge.newly_onboarded);
        assert_eq!(merge.status, UserStatus::Onboarded);

        // The same update against an already-onboarded row does not re-fire
        let onboarded = user_with("onboarded", Some("Dubai"), Some("25-34"), Some("Female"));
        let merge = update.merge_into(&onboarded);
        assert!(!merge.newly_onboarded);
        assert_eq!(merge.status, UserStatus::Onboarded);
    }

    #[test]
    fn test_onboarded_requires_all_required_fields() {
        // Neighborhood is optional and must not gate the transition
        let user = user_with("onboarding", Some("Dubai"), Some("25-34"), None);
        let update = DemographicsUpdate {
            neighborhood: Some("Marina".to_string()),
            ..Default::default()
        };
        let merge = update.merge_into(&user);
        assert!(!merge.newly_onboarded);
        assert_eq!(merge.status, UserStatus::Onboarding);
    }

    #[test]
    fn test_demographics_map_skips_nulls() {
        let user = user_with("onboarding", Some("Dubai"), None, None);
        let map = user.demographics_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map["city"], "Dubai");
    }
}
