//! The production user directory.
//!
//! Finalized submissions are mirrored here; the rest of the platform reads
//! contributors from this store, never from the engagement database. The
//! directory runs in one of two modes, declared in configuration:
//!
//! - **colocated**: the `directory_users` table lives in the engagement
//!   database, so the mirror write can join the submission transaction.
//! - **remote**: the directory is a separate database reached through its
//!   own pool. No co-located transaction exists; the submission path uses
//!   compensating writes instead.
//!
//! [`UserDirectory::supports_transactions`] is the capability probe. It is
//! decided here, from configuration, once - not inferred from error
//! signatures at runtime.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use thiserror::Error;
use tracing::instrument;

use crate::db::errors::DbError;
use crate::types::DirectoryUserId;

const DIRECTORY_COLUMNS: &str = "id, full_name, email, phone, github_url, city, org_name, org_type, tech_stack, created_at";

/// A contributor record in the production directory.
#[derive(Debug, Clone, FromRow)]
pub struct DirectoryUser {
    pub id: DirectoryUserId,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub github_url: Option<String>,
    pub city: Option<String>,
    pub org_name: String,
    pub org_type: String,
    pub tech_stack: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Cleaned submission data headed for the directory.
#[derive(Debug, Clone)]
pub struct DirectoryUserCreate {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub github_url: Option<String>,
    pub city: Option<String>,
    pub org_name: String,
    pub org_type: String,
    pub tech_stack: Vec<String>,
}

#[derive(Error, Debug)]
pub enum DirectoryError {
    /// The directory already holds a user with one of the unique fields
    #[error("duplicate directory user")]
    Duplicate { existing_id: DirectoryUserId },

    #[error(transparent)]
    Db(#[from] DbError),
}

pub struct UserDirectory {
    backend: DirectoryBackend,
}

enum DirectoryBackend {
    Colocated(PgPool),
    Remote(PgPool),
}

impl UserDirectory {
    /// Directory tables share the engagement database.
    pub fn colocated(pool: PgPool) -> Self {
        Self {
            backend: DirectoryBackend::Colocated(pool),
        }
    }

    /// Directory lives in its own database.
    pub fn remote(pool: PgPool) -> Self {
        Self {
            backend: DirectoryBackend::Remote(pool),
        }
    }

    /// Whether mirror writes can join an engagement-store transaction.
    pub fn supports_transactions(&self) -> bool {
        matches!(self.backend, DirectoryBackend::Colocated(_))
    }

    fn pool(&self) -> &PgPool {
        match &self.backend {
            DirectoryBackend::Colocated(pool) | DirectoryBackend::Remote(pool) => pool,
        }
    }

    #[instrument(skip(self, email), err)]
    pub async fn find_by_email(&self, email: &str) -> Result<Option<DirectoryUser>, DbError> {
        let user = sqlx::query_as::<_, DirectoryUser>(&format!("SELECT {DIRECTORY_COLUMNS} FROM directory_users WHERE email = $1"))
            .bind(email)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    #[instrument(skip(self, phone), err)]
    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<DirectoryUser>, DbError> {
        let user = sqlx::query_as::<_, DirectoryUser>(&format!("SELECT {DIRECTORY_COLUMNS} FROM directory_users WHERE phone = $1"))
            .bind(phone)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    #[instrument(skip(self, github_url), err)]
    pub async fn find_by_github_url(&self, github_url: &str) -> Result<Option<DirectoryUser>, DbError> {
        let user =
            sqlx::query_as::<_, DirectoryUser>(&format!("SELECT {DIRECTORY_COLUMNS} FROM directory_users WHERE github_url = $1"))
                .bind(github_url)
                .fetch_optional(self.pool())
                .await?;
        Ok(user)
    }

    /// Find whichever existing record conflicts with the given identifiers.
    #[instrument(skip_all, err)]
    pub async fn find_conflicting(
        &self,
        email: &str,
        phone: &str,
        github_url: Option<&str>,
    ) -> Result<Option<DirectoryUser>, DbError> {
        let user = sqlx::query_as::<_, DirectoryUser>(&format!(
            "SELECT {DIRECTORY_COLUMNS} FROM directory_users \
             WHERE email = $1 OR phone = $2 OR (github_url IS NOT NULL AND github_url = $3) LIMIT 1"
        ))
        .bind(email)
        .bind(phone)
        .bind(github_url)
        .fetch_optional(self.pool())
        .await?;
        Ok(user)
    }

    /// Create a directory user through the directory's own pool (remote
    /// mode, or colocated writes outside a submission transaction).
    ///
    /// A unique violation is resolved to the conflicting record's id so the
    /// caller can surface an actionable duplicate.
    #[instrument(skip(self, request), err)]
    pub async fn create_user(&self, request: &DirectoryUserCreate) -> Result<DirectoryUser, DirectoryError> {
        let mut conn = self.pool().acquire().await.map_err(DbError::from)?;
        match insert_user(&mut conn, request).await {
            Ok(user) => Ok(user),
            Err(DbError::UniqueViolation { .. }) => {
                let existing = self
                    .find_conflicting(&request.email, &request.phone, request.github_url.as_deref())
                    .await?;
                match existing {
                    Some(user) => Err(DirectoryError::Duplicate { existing_id: user.id }),
                    // The conflicting row vanished between insert and lookup
                    None => Err(DirectoryError::Db(DbError::Other(anyhow::anyhow!(
                        "directory insert conflicted but no conflicting row found"
                    )))),
                }
            }
            Err(e) => Err(DirectoryError::Db(e)),
        }
    }

    /// Create a directory user on a borrowed connection, joining the
    /// caller's transaction. Only valid in colocated mode; the caller owns
    /// rollback on failure.
    #[instrument(skip(self, conn, request), err)]
    pub async fn create_user_on(&self, conn: &mut PgConnection, request: &DirectoryUserCreate) -> Result<DirectoryUser, DbError> {
        debug_assert!(self.supports_transactions(), "create_user_on requires a colocated directory");
        insert_user(conn, request).await
    }
}

async fn insert_user(conn: &mut PgConnection, request: &DirectoryUserCreate) -> Result<DirectoryUser, DbError> {
    let user = sqlx::query_as::<_, DirectoryUser>(&format!(
        "INSERT INTO directory_users (full_name, email, phone, github_url, city, org_name, org_type, tech_stack) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {DIRECTORY_COLUMNS}"
    ))
    .bind(&request.full_name)
    .bind(&request.email)
    .bind(&request.phone)
    .bind(&request.github_url)
    .bind(&request.city)
    .bind(&request.org_name)
    .bind(&request.org_type)
    .bind(&request.tech_stack)
    .fetch_one(&mut *conn)
    .await?;

    Ok(user)
}
