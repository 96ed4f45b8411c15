//! Database models for the recipient mirror.
//!
//! Recipient rows are synced in from the external notification-recipient
//! store; this service only reads them.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::RecipientId;

#[derive(Debug, Clone, FromRow)]
pub struct Recipient {
    pub id: RecipientId,
    pub email: String,
    pub full_name: Option<String>,
    pub created_at: DateTime<Utc>,
}
