//! Database models for the opt-out registry.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::RecipientId;

/// Permanent suppression record. Presence blocks token reopening and
/// deferral re-enrollment.
#[derive(Debug, Clone, FromRow)]
pub struct OptOut {
    pub recipient_id: RecipientId,
    pub reason: Option<String>,
    pub link_token: String,
    pub opted_out_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OptOutCreateRequest {
    pub recipient_id: RecipientId,
    pub reason: Option<String>,
    pub link_token: String,
}
