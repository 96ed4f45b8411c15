//! Database repository for submissions.

use std::collections::HashMap;

use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::Result,
        handlers::repository::Repository,
        models::submissions::{Submission, SubmissionCreateRequest, SubmissionFilter, SubmissionStatus},
    },
    types::{abbrev_uuid, DirectoryUserId, RecipientId, SubmissionId},
};

const SUBMISSION_COLUMNS: &str = "id, recipient_id, full_name, email, phone, github_url, city, org_name, org_type, \
                                  org_ref_id, tech_stack, status, submitted_at, external_user_id";

pub struct Submissions<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Submissions<'c> {
    type CreateRequest = SubmissionCreateRequest;
    type UpdateRequest = SubmissionStatus;
    type Response = Submission;
    type Id = SubmissionId;
    type Filter = SubmissionFilter;

    /// Creates a `pending` submission; promotion to `completed` happens only
    /// through [`Submissions::complete`].
    #[instrument(skip(self, request), fields(recipient_id = %abbrev_uuid(&request.recipient_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let submission = sqlx::query_as::<_, Submission>(&format!(
            "INSERT INTO submissions (recipient_id, full_name, email, phone, github_url, city, org_name, org_type, org_ref_id, tech_stack) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(request.recipient_id)
        .bind(&request.full_name)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(&request.github_url)
        .bind(&request.city)
        .bind(&request.org_name)
        .bind(&request.org_type)
        .bind(request.org_ref_id)
        .bind(&request.tech_stack)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(submission)
    }

    #[instrument(skip(self, id), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let submission = sqlx::query_as::<_, Submission>(&format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(submission)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let submissions = sqlx::query_as::<_, Submission>(&format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ANY($1)"))
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(submissions.into_iter().map(|s| (s.id, s)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE 1=1");
        let mut conditions = Vec::new();

        if filter.recipient_id.is_some() {
            conditions.push(format!("recipient_id = ${}", conditions.len() + 1));
        }
        if filter.status.is_some() {
            conditions.push(format!("status = ${}", conditions.len() + 1));
        }

        if !conditions.is_empty() {
            query.push_str(" AND ");
            query.push_str(&conditions.join(" AND "));
        }

        query.push_str(&format!(" ORDER BY submitted_at DESC LIMIT {} OFFSET {}", filter.limit, filter.skip));

        let mut sql_query = sqlx::query_as::<_, Submission>(&query);

        if let Some(recipient_id) = filter.recipient_id {
            sql_query = sql_query.bind(recipient_id);
        }
        if let Some(status) = filter.status {
            sql_query = sql_query.bind(status);
        }

        let submissions = sql_query.fetch_all(&mut *self.db).await?;
        Ok(submissions)
    }

    #[instrument(skip(self, id, status), err)]
    async fn update(&mut self, id: Self::Id, status: &Self::UpdateRequest) -> Result<Self::Response> {
        let submission = sqlx::query_as::<_, Submission>(&format!(
            "UPDATE submissions SET status = $2 WHERE id = $1 RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(submission)
    }

    #[instrument(skip(self, id), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM submissions WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl<'c> Submissions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Promote a pending submission, attaching the mirrored directory id.
    ///
    /// Conditional on `status = 'pending'` so a concurrent writer cannot
    /// double-promote or resurrect a compensated row. Returns `None` when
    /// the row was not pending anymore.
    #[instrument(skip(self, id), err)]
    pub async fn complete(&mut self, id: SubmissionId, external_user_id: DirectoryUserId) -> Result<Option<Submission>> {
        let submission = sqlx::query_as::<_, Submission>(&format!(
            "UPDATE submissions SET status = 'completed', external_user_id = $2 \
             WHERE id = $1 AND status = 'pending' RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(id)
        .bind(external_user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(submission)
    }

    /// A completed submission is final and blocks every future lifecycle
    /// operation for the recipient. Pending rows are deliberately ignored.
    #[instrument(skip(self), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    pub async fn completed_for_recipient(&mut self, recipient_id: RecipientId) -> Result<Option<Submission>> {
        let submission = sqlx::query_as::<_, Submission>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE recipient_id = $1 AND status = 'completed'"
        ))
        .bind(recipient_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(submission)
    }

    /// Drop stale pending rows left behind by earlier failed attempts for
    /// this recipient, so the retry path starts clean.
    #[instrument(skip(self), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    pub async fn delete_stale_pending(&mut self, recipient_id: RecipientId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM submissions WHERE recipient_id = $1 AND status = 'pending'")
            .bind(recipient_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
