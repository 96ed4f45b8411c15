//! Database models for the email token store.
//!
//! One row per outbound call-to-action email. The row carries the full
//! lifecycle of its link: activation, phone verification, use, expiry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{RecipientId, TokenId};

/// Terminal/bookkeeping status of a token. Correctness checks always use the
/// timestamps (`used_at`, `activated_at`, `sent_at`); status is what the
/// sweep and retention queries key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Sent,
    Expired,
    Used,
    Failed,
}

/// Which kind of email this token was sent in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EmailType {
    Initial,
    Reminder,
}

/// Database entity model
#[derive(Debug, Clone, FromRow)]
pub struct EmailToken {
    pub id: TokenId,
    pub recipient_id: RecipientId,
    pub link_token: String,
    pub email_type: EmailType,
    pub status: TokenStatus,
    pub sent_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub used_at: Option<DateTime<Utc>>,
    pub verified_phone: Option<String>,
    pub phone_verified_at: Option<DateTime<Utc>>,
    pub oauth_in_progress: bool,
    pub created_at: DateTime<Utc>,
}

impl EmailToken {
    /// An open token has not been used (or reopened after use).
    pub fn is_open(&self) -> bool {
        self.used_at.is_none()
    }
}

/// Request for minting a token
#[derive(Debug, Clone)]
pub struct EmailTokenCreateRequest {
    pub recipient_id: RecipientId,
    pub link_token: String,
    pub email_type: EmailType,
}

/// Filter for listing tokens
#[derive(Debug, Clone, Default)]
pub struct EmailTokenFilter {
    pub recipient_id: Option<RecipientId>,
    pub email_type: Option<EmailType>,
    pub skip: i64,
    pub limit: i64,
}
