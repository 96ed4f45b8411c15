//! Database repository for the email token store.
//!
//! Every mutation here is a conditional update keyed on the current row
//! state (`used_at IS NULL`, `activated_at IS NULL`, ...) so concurrent
//! request handlers and sweeps converge instead of clobbering each other.

use std::collections::HashMap;

use base64::{engine::general_purpose, Engine};
use chrono::{DateTime, Utc};
use rand::{rng, Rng};
use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::Result,
        handlers::repository::Repository,
        models::email_tokens::{EmailToken, EmailTokenCreateRequest, EmailTokenFilter, EmailType, TokenStatus},
    },
    types::{abbrev_uuid, RecipientId, TokenId},
};

const TOKEN_COLUMNS: &str = "id, recipient_id, link_token, email_type, status, sent_at, activated_at, used_at, \
                             verified_phone, phone_verified_at, oauth_in_progress, created_at";

/// Mint a fresh opaque link token: 32 bytes of CSPRNG output, base64url
/// without padding.
pub fn generate_link_token() -> String {
    let mut token_bytes = [0u8; 32];
    rng().fill(&mut token_bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(token_bytes)
}

pub struct EmailTokens<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for EmailTokens<'c> {
    type CreateRequest = EmailTokenCreateRequest;
    type UpdateRequest = TokenStatus;
    type Response = EmailToken;
    type Id = TokenId;
    type Filter = EmailTokenFilter;

    #[instrument(skip(self, request), fields(recipient_id = %abbrev_uuid(&request.recipient_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let token = sqlx::query_as::<_, EmailToken>(&format!(
            "INSERT INTO email_tokens (recipient_id, link_token, email_type) VALUES ($1, $2, $3) RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(request.recipient_id)
        .bind(&request.link_token)
        .bind(request.email_type)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(token)
    }

    #[instrument(skip(self, id), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let token = sqlx::query_as::<_, EmailToken>(&format!("SELECT {TOKEN_COLUMNS} FROM email_tokens WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(token)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let tokens = sqlx::query_as::<_, EmailToken>(&format!("SELECT {TOKEN_COLUMNS} FROM email_tokens WHERE id = ANY($1)"))
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(tokens.into_iter().map(|t| (t.id, t)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = format!("SELECT {TOKEN_COLUMNS} FROM email_tokens WHERE 1=1");
        let mut conditions = Vec::new();

        if filter.recipient_id.is_some() {
            conditions.push(format!("recipient_id = ${}", conditions.len() + 1));
        }
        if filter.email_type.is_some() {
            conditions.push(format!("email_type = ${}", conditions.len() + 1));
        }

        if !conditions.is_empty() {
            query.push_str(" AND ");
            query.push_str(&conditions.join(" AND "));
        }

        query.push_str(&format!(" ORDER BY sent_at DESC LIMIT {} OFFSET {}", filter.limit, filter.skip));

        let mut sql_query = sqlx::query_as::<_, EmailToken>(&query);

        if let Some(recipient_id) = filter.recipient_id {
            sql_query = sql_query.bind(recipient_id);
        }
        if let Some(email_type) = filter.email_type {
            sql_query = sql_query.bind(email_type);
        }

        let tokens = sql_query.fetch_all(&mut *self.db).await?;
        Ok(tokens)
    }

    /// Update is status-only bookkeeping; lifecycle transitions go through
    /// the dedicated conditional methods below.
    #[instrument(skip(self, id, status), err)]
    async fn update(&mut self, id: Self::Id, status: &Self::UpdateRequest) -> Result<Self::Response> {
        let token = sqlx::query_as::<_, EmailToken>(&format!(
            "UPDATE email_tokens SET status = $2 WHERE id = $1 RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(token)
    }

    #[instrument(skip(self, id), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM email_tokens WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl<'c> EmailTokens<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Mint a token for a recipient: fresh secret, `sent` status.
    ///
    /// The partial unique index on open tokens rejects a second open link of
    /// the same email type for one recipient.
    #[instrument(skip(self), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    pub async fn mint_for_recipient(&mut self, recipient_id: RecipientId, email_type: EmailType) -> Result<(String, EmailToken)> {
        let raw_token = generate_link_token();
        let token = self
            .create(&EmailTokenCreateRequest {
                recipient_id,
                link_token: raw_token.clone(),
                email_type,
            })
            .await?;
        Ok((raw_token, token))
    }

    #[instrument(skip(self, link_token), err)]
    pub async fn find_by_link_token(&mut self, link_token: &str) -> Result<Option<EmailToken>> {
        let token = sqlx::query_as::<_, EmailToken>(&format!("SELECT {TOKEN_COLUMNS} FROM email_tokens WHERE link_token = $1"))
            .bind(link_token)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(token)
    }

    /// First open wins: sets `activated_at` only when previously unset.
    /// Re-invocation before submission does not reset the timer.
    #[instrument(skip(self, id), err)]
    pub async fn mark_activated(&mut self, id: TokenId) -> Result<EmailToken> {
        let token = sqlx::query_as::<_, EmailToken>(&format!(
            "UPDATE email_tokens SET activated_at = COALESCE(activated_at, now()) WHERE id = $1 RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(token)
    }

    /// Reopen a used token within its grace window: clears `used_at` and
    /// restarts the form timer. Only applies to rows that are actually used.
    #[instrument(skip(self, id), err)]
    pub async fn reopen(&mut self, id: TokenId) -> Result<Option<EmailToken>> {
        let token = sqlx::query_as::<_, EmailToken>(&format!(
            "UPDATE email_tokens SET used_at = NULL, activated_at = now(), status = 'sent' \
             WHERE id = $1 AND used_at IS NOT NULL RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(token)
    }

    /// Close a token with the given terminal status. Idempotent: a row that
    /// is already closed is left untouched.
    #[instrument(skip(self, id), err)]
    pub async fn mark_used(&mut self, id: TokenId, status: TokenStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE email_tokens SET used_at = now(), status = $2 WHERE id = $1 AND used_at IS NULL")
            .bind(id)
            .bind(status)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Close every open token for a recipient.
    #[instrument(skip(self), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    pub async fn close_open_for_recipient(&mut self, recipient_id: RecipientId, status: TokenStatus) -> Result<u64> {
        let result = sqlx::query("UPDATE email_tokens SET used_at = now(), status = $2 WHERE recipient_id = $1 AND used_at IS NULL")
            .bind(recipient_id)
            .bind(status)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// Close the recipient's open reminder links. A fresh reminder link
    /// supersedes the previous one.
    #[instrument(skip(self), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    pub async fn close_open_reminders(&mut self, recipient_id: RecipientId) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE email_tokens SET used_at = now(), status = 'expired' \
             WHERE recipient_id = $1 AND used_at IS NULL AND email_type = 'reminder'",
        )
        .bind(recipient_id)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected())
    }

    /// Stamp the provider-verified phone on an open token. Returns `None`
    /// when the token was closed in the meantime.
    #[instrument(skip(self, id, phone), err)]
    pub async fn set_verified_phone(&mut self, id: TokenId, phone: &str) -> Result<Option<EmailToken>> {
        let token = sqlx::query_as::<_, EmailToken>(&format!(
            "UPDATE email_tokens SET verified_phone = $2, phone_verified_at = now() \
             WHERE id = $1 AND used_at IS NULL RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(id)
        .bind(phone)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(token)
    }

    /// Flag or clear an in-flight OAuth redirect on an open token.
    #[instrument(skip(self, id), err)]
    pub async fn set_oauth_in_progress(&mut self, id: TokenId, in_progress: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE email_tokens SET oauth_in_progress = $2 WHERE id = $1 AND used_at IS NULL")
            .bind(id)
            .bind(in_progress)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Reminder history for the hard cap: counted from the token store
    /// itself, never from the deferral record.
    #[instrument(skip(self), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    pub async fn reminder_count(&mut self, recipient_id: RecipientId) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM email_tokens WHERE recipient_id = $1 AND email_type = 'reminder'")
            .bind(recipient_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// Tokens that were never opened and whose activation window has passed.
    #[instrument(skip(self, cutoff), err)]
    pub async fn list_never_opened(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<EmailToken>> {
        let tokens = sqlx::query_as::<_, EmailToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM email_tokens \
             WHERE activated_at IS NULL AND used_at IS NULL AND sent_at < $1 ORDER BY sent_at"
        ))
        .bind(cutoff)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(tokens)
    }

    /// Tokens activated before the cutoff, still open, with no OAuth
    /// round-trip in flight. An in-flight OAuth redirect must never be
    /// expired out from under the user.
    #[instrument(skip(self, cutoff), err)]
    pub async fn list_stale_activations(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<EmailToken>> {
        let tokens = sqlx::query_as::<_, EmailToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM email_tokens \
             WHERE activated_at IS NOT NULL AND activated_at <= $1 AND used_at IS NULL AND NOT oauth_in_progress \
             ORDER BY activated_at"
        ))
        .bind(cutoff)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(tokens)
    }

    /// Retention: drop terminal tokens older than the cutoff.
    #[instrument(skip(self, cutoff), err)]
    pub async fn delete_terminal_before(&mut self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM email_tokens WHERE used_at IS NOT NULL AND sent_at < $1")
            .bind(cutoff)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
