//! Database repository for partial form drafts.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{errors::Result, models::drafts::Draft},
    types::{abbrev_uuid, RecipientId},
};

pub struct Drafts<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Drafts<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Save or replace the draft for a link token.
    #[instrument(skip(self, link_token, payload), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    pub async fn upsert(&mut self, link_token: &str, recipient_id: RecipientId, payload: &serde_json::Value) -> Result<Draft> {
        let draft = sqlx::query_as::<_, Draft>(
            "INSERT INTO drafts (link_token, recipient_id, payload, updated_at) VALUES ($1, $2, $3, now()) \
             ON CONFLICT (link_token) DO UPDATE SET payload = EXCLUDED.payload, updated_at = now() \
             RETURNING link_token, recipient_id, payload, updated_at",
        )
        .bind(link_token)
        .bind(recipient_id)
        .bind(payload)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(draft)
    }

    #[instrument(skip(self, link_token), err)]
    pub async fn get(&mut self, link_token: &str) -> Result<Option<Draft>> {
        let draft = sqlx::query_as::<_, Draft>(
            "SELECT link_token, recipient_id, payload, updated_at FROM drafts WHERE link_token = $1",
        )
        .bind(link_token)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(draft)
    }

    #[instrument(skip(self, link_token), err)]
    pub async fn delete(&mut self, link_token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM drafts WHERE link_token = $1")
            .bind(link_token)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drop every draft the recipient has, across all their links.
    #[instrument(skip(self), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    pub async fn delete_for_recipient(&mut self, recipient_id: RecipientId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM drafts WHERE recipient_id = $1")
            .bind(recipient_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// Retention: drafts untouched since the cutoff.
    #[instrument(skip(self, cutoff), err)]
    pub async fn delete_stale(&mut self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM drafts WHERE updated_at < $1")
            .bind(cutoff)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
