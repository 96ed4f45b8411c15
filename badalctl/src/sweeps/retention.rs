//! Retention sweep: terminal tokens and stale drafts past the retention age
//! are deleted for good.

use sqlx::PgPool;
use std::time::Duration;
use tracing::instrument;

use crate::db::handlers::{Drafts, EmailTokens};

#[derive(Debug, Default, Clone, Copy)]
pub struct RetentionStats {
    pub tokens_deleted: u64,
    pub drafts_deleted: u64,
}

#[instrument(skip_all, fields(sweep = "retention"))]
pub async fn run(pool: &PgPool, retention_age: Duration) -> anyhow::Result<RetentionStats> {
    let age = chrono::Duration::from_std(retention_age).unwrap_or_else(|_| chrono::Duration::days(90));
    let cutoff = chrono::Utc::now() - age;

    let mut conn = pool.acquire().await?;
    let tokens_deleted = EmailTokens::new(&mut conn).delete_terminal_before(cutoff).await?;
    let drafts_deleted = Drafts::new(&mut conn).delete_stale(cutoff).await?;

    tracing::info!(tokens_deleted, drafts_deleted, "retention sweep complete");
    Ok(RetentionStats {
        tokens_deleted,
        drafts_deleted,
    })
}
