//! Database repository for the opt-out registry.

use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::Result,
        models::optouts::{OptOut, OptOutCreateRequest},
    },
    types::{abbrev_uuid, RecipientId},
};

pub struct OptOuts<'c> {
    db: &'c mut PgConnection,
}

impl<'c> OptOuts<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    pub async fn get(&mut self, recipient_id: RecipientId) -> Result<Option<OptOut>> {
        let optout = sqlx::query_as::<_, OptOut>(
            "SELECT recipient_id, reason, link_token, opted_out_at FROM optouts WHERE recipient_id = $1",
        )
        .bind(recipient_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(optout)
    }

    /// Record an opt-out. Idempotent: repeated opt-outs keep the original
    /// record and timestamp.
    #[instrument(skip(self, request), fields(recipient_id = %abbrev_uuid(&request.recipient_id)), err)]
    pub async fn create(&mut self, request: &OptOutCreateRequest) -> Result<()> {
        sqlx::query(
            "INSERT INTO optouts (recipient_id, reason, link_token) VALUES ($1, $2, $3) \
             ON CONFLICT (recipient_id) DO NOTHING",
        )
        .bind(request.recipient_id)
        .bind(&request.reason)
        .bind(&request.link_token)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }
}
