//! Database models for partial form drafts.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::RecipientId;

/// A saved-but-unsubmitted form payload, keyed by the link token that was
/// open when the user saved.
#[derive(Debug, Clone, FromRow)]
pub struct Draft {
    pub link_token: String,
    pub recipient_id: RecipientId,
    pub payload: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}
