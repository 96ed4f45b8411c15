//! Database models for submissions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{DirectoryUserId, OrgId, RecipientId, SubmissionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Completed,
}

/// Database entity model.
///
/// `pending` rows exist only between the submission insert and the directory
/// mirror write; they never block a retry. `completed` is final.
#[derive(Debug, Clone, FromRow)]
pub struct Submission {
    pub id: SubmissionId,
    pub recipient_id: RecipientId,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub github_url: Option<String>,
    pub city: Option<String>,
    pub org_name: String,
    pub org_type: String,
    pub org_ref_id: Option<OrgId>,
    pub tech_stack: Vec<String>,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
    pub external_user_id: Option<DirectoryUserId>,
}

/// Request for creating a pending submission
#[derive(Debug, Clone)]
pub struct SubmissionCreateRequest {
    pub recipient_id: RecipientId,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub github_url: Option<String>,
    pub city: Option<String>,
    pub org_name: String,
    pub org_type: String,
    pub org_ref_id: Option<OrgId>,
    pub tech_stack: Vec<String>,
}

/// Filter for listing submissions
#[derive(Debug, Clone, Default)]
pub struct SubmissionFilter {
    pub recipient_id: Option<RecipientId>,
    pub status: Option<SubmissionStatus>,
    pub skip: i64,
    pub limit: i64,
}
