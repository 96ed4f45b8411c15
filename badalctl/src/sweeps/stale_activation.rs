//! Stale-activation sweep.
//!
//! Catches users who opened the form but abandoned it mid-way. Unlike the
//! never-opened sweep, the original token is left open: a user who comes
//! back before the true expiry window may still reopen the same link.
//! Tokens with an OAuth round-trip in flight are excluded at the query.

use sqlx::PgPool;
use tracing::instrument;

use crate::{
    db::{
        handlers::{Deferrals, EmailTokens, OptOuts},
        models::{
            deferrals::{DeferralOutcome, REMINDER_CAP},
            email_tokens::{EmailToken, TokenStatus},
        },
    },
    lifecycle::Windows,
    types::abbrev_uuid,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct StaleActivationStats {
    pub examined: usize,
    pub deferred: usize,
    pub absorbed: usize,
    pub failed: usize,
}

enum Outcome {
    Deferred,
    Absorbed,
}

#[instrument(skip_all, fields(sweep = "stale_activation"))]
pub async fn run(pool: &PgPool, windows: &Windows) -> anyhow::Result<StaleActivationStats> {
    let cutoff = chrono::Utc::now() - windows.form();

    let tokens = {
        let mut conn = pool.acquire().await?;
        EmailTokens::new(&mut conn).list_stale_activations(cutoff).await?
    };

    let mut stats = StaleActivationStats {
        examined: tokens.len(),
        ..Default::default()
    };

    for token in tokens {
        match process_token(pool, &token).await {
            Ok(Outcome::Deferred) => stats.deferred += 1,
            Ok(Outcome::Absorbed) => stats.absorbed += 1,
            Err(e) => {
                stats.failed += 1;
                tracing::warn!("stale-activation sweep failed on token {}: {e:#}", abbrev_uuid(&token.id));
            }
        }
    }

    tracing::info!(
        examined = stats.examined,
        deferred = stats.deferred,
        absorbed = stats.absorbed,
        failed = stats.failed,
        "stale-activation sweep complete"
    );
    Ok(stats)
}

async fn process_token(pool: &PgPool, token: &EmailToken) -> anyhow::Result<Outcome> {
    let mut tx = pool.begin().await?;

    if OptOuts::new(&mut tx).get(token.recipient_id).await?.is_some() {
        EmailTokens::new(&mut tx).mark_used(token.id, TokenStatus::Expired).await?;
        tx.commit().await?;
        return Ok(Outcome::Absorbed);
    }

    if EmailTokens::new(&mut tx).reminder_count(token.recipient_id).await? >= REMINDER_CAP as i64 {
        Deferrals::new(&mut tx).delete(token.recipient_id).await?;
        EmailTokens::new(&mut tx).mark_used(token.id, TokenStatus::Expired).await?;
        tx.commit().await?;
        return Ok(Outcome::Absorbed);
    }

    let outcome = Deferrals::new(&mut tx).defer(token.recipient_id).await?;
    let outcome = match outcome {
        // Token stays open so the abandoned form can be reopened until its
        // real expiry.
        DeferralOutcome::Deferred(_) => Outcome::Deferred,
        DeferralOutcome::AtCap => {
            EmailTokens::new(&mut tx).mark_used(token.id, TokenStatus::Expired).await?;
            Outcome::Absorbed
        }
    };
    tx.commit().await?;

    Ok(outcome)
}
