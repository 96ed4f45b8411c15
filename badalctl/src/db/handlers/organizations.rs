//! Database repository for the two organization directories.
//!
//! "Registered" organizations are self-service records; "seed"
//! organizations are the default list shipped with the program. Submission
//! resolution looks a reference up in exactly one of the two.

use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{errors::Result, models::organizations::Organization},
    types::OrgId,
};

const ORG_COLUMNS: &str = "id, name, org_type, website, created_at";

pub struct Organizations<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Organizations<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, id), err)]
    pub async fn find_registered(&mut self, id: OrgId) -> Result<Option<Organization>> {
        let org = sqlx::query_as::<_, Organization>(&format!("SELECT {ORG_COLUMNS} FROM organizations WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(org)
    }

    #[instrument(skip(self, id), err)]
    pub async fn find_seed(&mut self, id: OrgId) -> Result<Option<Organization>> {
        let org = sqlx::query_as::<_, Organization>(&format!("SELECT {ORG_COLUMNS} FROM seed_organizations WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(org)
    }
}
