//! Deferred-resend sweep.
//!
//! Walks deferrals still below the reminder cap, mints a fresh reminder
//! link per recipient, and sends it. The token row records the attempt
//! whether or not the send succeeded; the attempt counter moves through a
//! compare-and-increment so concurrent sweeps cannot race past the cap.
//! Two cleanup passes follow the sends.

use sqlx::PgPool;
use tracing::instrument;

use crate::{
    db::{
        handlers::{Deferrals, EmailTokens, OptOuts, Submissions},
        models::{
            deferrals::{DeferralWithRecipient, REMINDER_CAP},
            email_tokens::{EmailType, TokenStatus},
        },
    },
    email::EmailService,
    types::abbrev_uuid,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct ResendStats {
    pub examined: usize,
    pub sent: usize,
    pub send_failed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cleaned_completed: u64,
    pub cleaned_capped: usize,
}

enum Outcome {
    Sent,
    SendFailed,
    Skipped,
}

#[instrument(skip_all, fields(sweep = "resend"))]
pub async fn run(pool: &PgPool, email: &EmailService) -> anyhow::Result<ResendStats> {
    // Snapshot both worklists up front. The cap cleanup must only absorb
    // deferrals that entered this sweep already at the cap - a recipient
    // whose final reminder goes out in this very run keeps that link open
    // until the next sweep.
    let (deferrals, capped) = {
        let mut conn = pool.acquire().await?;
        let below = Deferrals::new(&mut conn).list_below_cap().await?;
        let capped = Deferrals::new(&mut conn).list_at_cap().await?;
        (below, capped)
    };

    let mut stats = ResendStats {
        examined: deferrals.len(),
        ..Default::default()
    };

    for deferral in deferrals {
        match process_deferral(pool, email, &deferral).await {
            Ok(Outcome::Sent) => stats.sent += 1,
            Ok(Outcome::SendFailed) => stats.send_failed += 1,
            Ok(Outcome::Skipped) => stats.skipped += 1,
            Err(e) => {
                stats.failed += 1;
                tracing::warn!(
                    "resend sweep failed on deferral for recipient {}: {e:#}",
                    abbrev_uuid(&deferral.recipient_id)
                );
            }
        }
    }

    // Cleanup pass 1: recipients who completed in the meantime.
    match cleanup_completed(pool).await {
        Ok(n) => stats.cleaned_completed = n,
        Err(e) => tracing::warn!("resend sweep completed-submission cleanup failed: {e:#}"),
    }

    // Cleanup pass 2: capped recipients leave the reminder cycle for good.
    match cleanup_capped(pool, capped).await {
        Ok(n) => stats.cleaned_capped = n,
        Err(e) => tracing::warn!("resend sweep cap cleanup failed: {e:#}"),
    }

    tracing::info!(
        examined = stats.examined,
        sent = stats.sent,
        send_failed = stats.send_failed,
        skipped = stats.skipped,
        failed = stats.failed,
        cleaned_completed = stats.cleaned_completed,
        cleaned_capped = stats.cleaned_capped,
        "resend sweep complete"
    );
    Ok(stats)
}

async fn process_deferral(pool: &PgPool, email: &EmailService, deferral: &DeferralWithRecipient) -> anyhow::Result<Outcome> {
    let recipient_id = deferral.recipient_id;

    let minted = {
        let mut tx = pool.begin().await?;

        // Owner gone from the mirror: nothing to remind.
        let Some(to_email) = deferral.email.clone() else {
            Deferrals::new(&mut tx).delete(recipient_id).await?;
            tx.commit().await?;
            return Ok(Outcome::Skipped);
        };

        if OptOuts::new(&mut tx).get(recipient_id).await?.is_some() {
            Deferrals::new(&mut tx).delete(recipient_id).await?;
            tx.commit().await?;
            return Ok(Outcome::Skipped);
        }

        if Submissions::new(&mut tx).completed_for_recipient(recipient_id).await?.is_some() {
            Deferrals::new(&mut tx).delete(recipient_id).await?;
            tx.commit().await?;
            return Ok(Outcome::Skipped);
        }

        if EmailTokens::new(&mut tx).reminder_count(recipient_id).await? >= REMINDER_CAP as i64 {
            EmailTokens::new(&mut tx)
                .close_open_for_recipient(recipient_id, TokenStatus::Expired)
                .await?;
            Deferrals::new(&mut tx).delete(recipient_id).await?;
            tx.commit().await?;
            return Ok(Outcome::Skipped);
        }

        // A fresh reminder link supersedes the previous one.
        EmailTokens::new(&mut tx).close_open_reminders(recipient_id).await?;
        let (raw_token, token) = EmailTokens::new(&mut tx).mint_for_recipient(recipient_id, EmailType::Reminder).await?;
        tx.commit().await?;

        Some((to_email, raw_token, token))
    };

    let Some((to_email, raw_token, token)) = minted else {
        return Ok(Outcome::Skipped);
    };

    // Send outside any transaction; the token row is already committed so
    // the attempt is recorded either way.
    let send_result = email
        .send_reminder(&to_email, deferral.full_name.as_deref(), &raw_token, deferral.attempts + 1)
        .await;

    let mut tx = pool.begin().await?;
    if send_result.is_err() {
        EmailTokens::new(&mut tx).mark_used(token.id, TokenStatus::Failed).await?;
    }
    Deferrals::new(&mut tx).increment_if_below_cap(recipient_id).await?;
    tx.commit().await?;

    match send_result {
        Ok(()) => Ok(Outcome::Sent),
        Err(e) => {
            tracing::warn!("reminder send failed for recipient {}: {e:#}", abbrev_uuid(&recipient_id));
            Ok(Outcome::SendFailed)
        }
    }
}

async fn cleanup_completed(pool: &PgPool) -> anyhow::Result<u64> {
    let mut conn = pool.acquire().await?;
    Ok(Deferrals::new(&mut conn).delete_for_completed_submissions().await?)
}

async fn cleanup_capped(pool: &PgPool, capped: Vec<crate::db::models::deferrals::Deferral>) -> anyhow::Result<usize> {
    let mut cleaned = 0;
    for deferral in capped {
        let mut tx = pool.begin().await?;
        EmailTokens::new(&mut tx)
            .close_open_for_recipient(deferral.recipient_id, TokenStatus::Expired)
            .await?;
        Deferrals::new(&mut tx).delete(deferral.recipient_id).await?;
        tx.commit().await?;
        cleaned += 1;
    }
    Ok(cleaned)
}
