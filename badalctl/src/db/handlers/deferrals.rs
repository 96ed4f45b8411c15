//! Database repository for deferral tracking.
//!
//! The attempt counter only ever moves through guarded writes: the upsert
//! and the increment both carry `attempts < cap` in the statement itself,
//! so concurrent sweeps converge on the cap instead of racing past it.

use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::Result,
        models::deferrals::{Deferral, DeferralOutcome, DeferralWithRecipient, REMINDER_CAP},
    },
    types::{abbrev_uuid, RecipientId},
};

pub struct Deferrals<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Deferrals<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    pub async fn get(&mut self, recipient_id: RecipientId) -> Result<Option<Deferral>> {
        let deferral =
            sqlx::query_as::<_, Deferral>("SELECT recipient_id, attempts, deferred_at FROM deferrals WHERE recipient_id = $1")
                .bind(recipient_id)
                .fetch_optional(&mut *self.db)
                .await?;

        Ok(deferral)
    }

    /// The shared deferral creation/update routine: create with one attempt,
    /// or bump an existing record while it is still below the cap.
    ///
    /// A single guarded upsert; the `WHERE` clause makes the at-cap case
    /// return no row instead of overshooting.
    #[instrument(skip(self), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    pub async fn defer(&mut self, recipient_id: RecipientId) -> Result<DeferralOutcome> {
        let attempts = sqlx::query_scalar::<_, i32>(
            "INSERT INTO deferrals (recipient_id, attempts, deferred_at) VALUES ($1, 1, now()) \
             ON CONFLICT (recipient_id) DO UPDATE SET attempts = deferrals.attempts + 1, deferred_at = now() \
             WHERE deferrals.attempts < $2 \
             RETURNING attempts",
        )
        .bind(recipient_id)
        .bind(REMINDER_CAP)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(match attempts {
            Some(n) => DeferralOutcome::Deferred(n),
            None => DeferralOutcome::AtCap,
        })
    }

    /// Compare-and-increment for the resend sweep: bump only while still
    /// below the cap at write time.
    #[instrument(skip(self), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    pub async fn increment_if_below_cap(&mut self, recipient_id: RecipientId) -> Result<Option<i32>> {
        let attempts = sqlx::query_scalar::<_, i32>(
            "UPDATE deferrals SET attempts = attempts + 1, deferred_at = now() \
             WHERE recipient_id = $1 AND attempts < $2 RETURNING attempts",
        )
        .bind(recipient_id)
        .bind(REMINDER_CAP)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(attempts)
    }

    #[instrument(skip(self), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    pub async fn delete(&mut self, recipient_id: RecipientId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM deferrals WHERE recipient_id = $1")
            .bind(recipient_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deferrals still below the cap, joined to their recipient. The owner
    /// row may be gone (weak reference) - callers must handle the `None`
    /// email.
    #[instrument(skip(self), err)]
    pub async fn list_below_cap(&mut self) -> Result<Vec<DeferralWithRecipient>> {
        let deferrals = sqlx::query_as::<_, DeferralWithRecipient>(
            "SELECT d.recipient_id, d.attempts, d.deferred_at, r.email, r.full_name \
             FROM deferrals d LEFT JOIN recipients r ON r.id = d.recipient_id \
             WHERE d.attempts < $1 ORDER BY d.deferred_at",
        )
        .bind(REMINDER_CAP)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(deferrals)
    }

    /// Deferrals at or above the cap (cleanup pass of the resend sweep).
    #[instrument(skip(self), err)]
    pub async fn list_at_cap(&mut self) -> Result<Vec<Deferral>> {
        let deferrals = sqlx::query_as::<_, Deferral>(
            "SELECT recipient_id, attempts, deferred_at FROM deferrals WHERE attempts >= $1 ORDER BY deferred_at",
        )
        .bind(REMINDER_CAP)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(deferrals)
    }

    /// Cleanup pass: recipients who completed their submission no longer
    /// need reminders.
    #[instrument(skip(self), err)]
    pub async fn delete_for_completed_submissions(&mut self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM deferrals d USING submissions s \
             WHERE s.recipient_id = d.recipient_id AND s.status = 'completed'",
        )
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected())
    }
}
