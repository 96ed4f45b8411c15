//! Database models for deferral tracking.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::RecipientId;

/// Hard cap on reminder attempts. Reaching it removes the recipient from
/// future reminder cycles permanently.
pub const REMINDER_CAP: i32 = 3;

/// At most one per recipient, upserted.
#[derive(Debug, Clone, FromRow)]
pub struct Deferral {
    pub recipient_id: RecipientId,
    pub attempts: i32,
    pub deferred_at: DateTime<Utc>,
}

impl Deferral {
    pub fn at_cap(&self) -> bool {
        self.attempts >= REMINDER_CAP
    }
}

/// A deferral joined to its recipient for the resend sweep. The owner row
/// lives in an externally-synced mirror and may be gone.
#[derive(Debug, Clone, FromRow)]
pub struct DeferralWithRecipient {
    pub recipient_id: RecipientId,
    pub attempts: i32,
    pub deferred_at: DateTime<Utc>,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

/// Outcome of the shared deferral creation/update routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferralOutcome {
    /// A deferral now exists with the returned attempt count
    Deferred(i32),
    /// The recipient was already at the reminder cap; no deferral written
    AtCap,
}
