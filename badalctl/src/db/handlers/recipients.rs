//! Read-only access to the recipient mirror.
//!
//! Recipient rows are owned by the external notification-recipient store;
//! this repository never creates or mutates them.

use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{errors::Result, models::recipients::Recipient},
    types::{abbrev_uuid, RecipientId},
};

pub struct Recipients<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Recipients<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    pub async fn get(&mut self, recipient_id: RecipientId) -> Result<Option<Recipient>> {
        let recipient = sqlx::query_as::<_, Recipient>("SELECT id, email, full_name, created_at FROM recipients WHERE id = $1")
            .bind(recipient_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(recipient)
    }

    #[instrument(skip(self, email), err)]
    pub async fn get_by_email(&mut self, email: &str) -> Result<Option<Recipient>> {
        let recipient = sqlx::query_as::<_, Recipient>("SELECT id, email, full_name, created_at FROM recipients WHERE email = $1")
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(recipient)
    }
}
