//! Never-opened expiry sweep.
//!
//! Tokens whose activation window passed without a single open are closed
//! here. Recipients who neither opted out nor exhausted their reminders are
//! enrolled in (or bumped within) the deferral cycle and immediately sent a
//! fresh reminder link - the closed token is never revived, so without the
//! new link they would have nothing to come back to.

use sqlx::PgPool;
use tracing::instrument;

use crate::{
    db::{
        handlers::{Deferrals, EmailTokens, OptOuts, Recipients},
        models::{
            deferrals::{DeferralOutcome, REMINDER_CAP},
            email_tokens::{EmailToken, EmailType, TokenStatus},
        },
    },
    email::EmailService,
    lifecycle::Windows,
    types::abbrev_uuid,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct NeverOpenedStats {
    pub examined: usize,
    pub deferred: usize,
    pub absorbed: usize,
    pub send_failed: usize,
    pub failed: usize,
}

enum Outcome {
    Deferred,
    Absorbed,
    SendFailed,
}

/// Run one pass. Each token gets its own error boundary: a poisoned record
/// is logged and skipped, never halting the batch.
#[instrument(skip_all, fields(sweep = "never_opened"))]
pub async fn run(pool: &PgPool, email: &EmailService, windows: &Windows) -> anyhow::Result<NeverOpenedStats> {
    let cutoff = chrono::Utc::now() - windows.activation();

    let tokens = {
        let mut conn = pool.acquire().await?;
        EmailTokens::new(&mut conn).list_never_opened(cutoff).await?
    };

    let mut stats = NeverOpenedStats {
        examined: tokens.len(),
        ..Default::default()
    };

    for token in tokens {
        match process_token(pool, email, &token).await {
            Ok(Outcome::Deferred) => stats.deferred += 1,
            Ok(Outcome::Absorbed) => stats.absorbed += 1,
            Ok(Outcome::SendFailed) => stats.send_failed += 1,
            Err(e) => {
                stats.failed += 1;
                tracing::warn!("never-opened sweep failed on token {}: {e:#}", abbrev_uuid(&token.id));
            }
        }
    }

    tracing::info!(
        examined = stats.examined,
        deferred = stats.deferred,
        absorbed = stats.absorbed,
        send_failed = stats.send_failed,
        failed = stats.failed,
        "never-opened sweep complete"
    );
    Ok(stats)
}

async fn process_token(pool: &PgPool, email: &EmailService, token: &EmailToken) -> anyhow::Result<Outcome> {
    let minted = {
        let mut tx = pool.begin().await?;

        // Opted-out recipients are silently absorbed - no further reminders.
        if OptOuts::new(&mut tx).get(token.recipient_id).await?.is_some() {
            EmailTokens::new(&mut tx).mark_used(token.id, TokenStatus::Expired).await?;
            tx.commit().await?;
            return Ok(Outcome::Absorbed);
        }

        // The hard cap counts from notification history, not from the
        // deferral record, so a reset deferral cannot restart the loop.
        if EmailTokens::new(&mut tx).reminder_count(token.recipient_id).await? >= REMINDER_CAP as i64 {
            EmailTokens::new(&mut tx).mark_used(token.id, TokenStatus::Expired).await?;
            tx.commit().await?;
            return Ok(Outcome::Absorbed);
        }

        let recipient = Recipients::new(&mut tx).get(token.recipient_id).await?;

        // The recipient never engaged; this link closes for good.
        EmailTokens::new(&mut tx).mark_used(token.id, TokenStatus::Expired).await?;

        let outcome = Deferrals::new(&mut tx).defer(token.recipient_id).await?;
        if matches!(outcome, DeferralOutcome::AtCap) {
            tx.commit().await?;
            return Ok(Outcome::Absorbed);
        }

        // Owner gone from the mirror: deferral stays, but there is nobody to
        // mail a fresh link to.
        let Some(recipient) = recipient else {
            tx.commit().await?;
            return Ok(Outcome::Deferred);
        };

        // A fresh link replaces the dead one right away.
        EmailTokens::new(&mut tx).close_open_reminders(token.recipient_id).await?;
        let (raw_token, reminder) = EmailTokens::new(&mut tx)
            .mint_for_recipient(token.recipient_id, EmailType::Reminder)
            .await?;
        tx.commit().await?;

        let attempts = match outcome {
            DeferralOutcome::Deferred(n) => n,
            DeferralOutcome::AtCap => unreachable!("handled above"),
        };
        (recipient, raw_token, reminder, attempts)
    };
    let (recipient, raw_token, reminder, attempts) = minted;

    let send_result = email
        .send_reminder(&recipient.email, recipient.full_name.as_deref(), &raw_token, attempts)
        .await;

    if let Err(e) = send_result {
        tracing::warn!("reminder send failed for recipient {}: {e:#}", abbrev_uuid(&token.recipient_id));
        let mut conn = pool.acquire().await?;
        EmailTokens::new(&mut conn).mark_used(reminder.id, TokenStatus::Failed).await?;
        return Ok(Outcome::SendFailed);
    }

    Ok(Outcome::Deferred)
}
