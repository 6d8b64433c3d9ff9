//! # Advisory Lock Helpers
//!
//! Transaction-scoped advisory locks keyed by entity identifier. All
//! conversation mutation happens under `conversation_lock`; the bounty
//! dispatcher's one-live-thread-per-user check happens under `user_lock`.
//! The two key spaces are prefixed so a conversation and a user with the
//! same UUID text never contend.
//!
//! Locks are `pg_advisory_xact_lock`, released automatically at commit or
//! rollback, so a lock can never leak past its transaction.

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

/// Acquire the exclusive per-conversation lock for the duration of `tx`.
pub async fn conversation_lock(
    tx: &mut Transaction<'_, Postgres>,
    conversation_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("conversation:{conversation_id}"))
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Acquire the exclusive per-user lock for the duration of `tx`.
pub async fn user_lock(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("user:{user_id}"))
        .execute(&mut **tx)
        .await?;
    Ok(())
}
