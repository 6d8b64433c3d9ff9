//! # Database Migration System
//!
//! Embedded, version-tracked schema migrations applied under a PostgreSQL
//! advisory lock so concurrent process starts cannot race the DDL.
//!
//! Migrations are ordered by version timestamp and idempotent: applied
//! versions are recorded in `mesh_schema_migrations` and skipped on
//! subsequent runs.

use sqlx::PgPool;
use tracing::{debug, info};

/// Deterministic lock key for schema initialization.
const MIGRATION_LOCK_KEY: i64 = 727_454_312_882_001;

/// Ordered (version, ddl) pairs. Versions use the `YYYYMMDDHHMMSS_name`
/// convention.
const MIGRATIONS: &[(&str, &str)] = &[(
    "20250301000000_create_core_tables",
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        phone_number TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'new',
        city TEXT,
        neighborhood TEXT,
        age_range TEXT,
        gender TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    CREATE UNIQUE INDEX IF NOT EXISTS uq_users_phone ON users (phone_number);

    CREATE TABLE IF NOT EXISTS campaigns (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        name TEXT NOT NULL,
        research_brief TEXT NOT NULL,
        extraction_schema JSONB NOT NULL,
        system_prompt_override TEXT,
        reward_text TEXT,
        reward_link TEXT,
        phone_numbers TEXT[],
        targeting JSONB,
        status TEXT NOT NULL DEFAULT 'draft',
        total_conversations INTEGER NOT NULL DEFAULT 0,
        completed_conversations INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE TABLE IF NOT EXISTS conversations (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        campaign_id UUID REFERENCES campaigns(id) ON DELETE CASCADE,
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        phone_number TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        extracted_data JSONB NOT NULL DEFAULT '{}',
        message_count INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        completed_at TIMESTAMPTZ
    );
    -- One conversation ever per (campaign, recipient): launch idempotency
    CREATE UNIQUE INDEX IF NOT EXISTS uq_campaign_phone
        ON conversations (campaign_id, phone_number)
        WHERE campaign_id IS NOT NULL;
    -- One live campaign-less thread (onboarding or ad hoc) per user
    CREATE UNIQUE INDEX IF NOT EXISTS uq_conversations_live_uncampaigned
        ON conversations (user_id)
        WHERE campaign_id IS NULL
          AND status NOT IN ('completed', 'declined', 'abandoned', 'failed', 'expired');
    CREATE INDEX IF NOT EXISTS idx_conversations_phone ON conversations (phone_number);
    CREATE INDEX IF NOT EXISTS idx_conversations_status ON conversations (campaign_id, status);

    CREATE TABLE IF NOT EXISTS messages (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        conversation_id UUID NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        sender TEXT NOT NULL,
        content TEXT NOT NULL,
        transport_sid TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    CREATE INDEX IF NOT EXISTS idx_messages_conversation
        ON messages (conversation_id, created_at);
    -- Transport delivery id is the inbound idempotency key
    CREATE UNIQUE INDEX IF NOT EXISTS uq_messages_transport_sid
        ON messages (transport_sid)
        WHERE transport_sid IS NOT NULL;

    CREATE TABLE IF NOT EXISTS outreach_queue (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        conversation_id UUID NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        scheduled_at TIMESTAMPTZ NOT NULL,
        claimed_at TIMESTAMPTZ,
        sent_at TIMESTAMPTZ,
        status TEXT NOT NULL DEFAULT 'pending',
        error TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    CREATE INDEX IF NOT EXISTS idx_outreach_pending
        ON outreach_queue (status, scheduled_at);
    "#,
)];

/// Manages database schema migrations with concurrency safety.
pub struct DatabaseMigrations;

impl DatabaseMigrations {
    /// Apply all outstanding migrations, serialized across processes.
    pub async fn run_all(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(pool)
            .await?;

        let result = Self::run_outstanding(pool).await;

        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(pool)
            .await?;

        result
    }

    async fn run_outstanding(pool: &PgPool) -> Result<(), sqlx::Error> {
        Self::ensure_migration_table(pool).await?;

        for (version, ddl) in MIGRATIONS {
            let applied: Option<String> = sqlx::query_scalar(
                "SELECT version FROM mesh_schema_migrations WHERE version = $1",
            )
            .bind(version)
            .fetch_optional(pool)
            .await?;

            if applied.is_some() {
                debug!(version = version, "migration already applied");
                continue;
            }

            let mut tx = pool.begin().await?;
            sqlx::raw_sql(ddl).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO mesh_schema_migrations (version) VALUES ($1)")
                .bind(version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            info!(version = version, "applied migration");
        }

        Ok(())
    }

    async fn ensure_migration_table(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mesh_schema_migrations (
                version TEXT PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_version_ordered() {
        let versions: Vec<&str> = MIGRATIONS.iter().map(|(v, _)| *v).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn test_migration_ddl_covers_core_tables() {
        let ddl = MIGRATIONS[0].1;
        for table in ["users", "campaigns", "conversations", "messages", "outreach_queue"] {
            assert!(ddl.contains(table), "missing table: {table}");
        }
    }
}
