//! Request/response DTOs for the form lifecycle endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ActivateRequest {
    /// Opaque link token from the email
    pub token: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActivateResponse {
    pub activated_at: DateTime<Utc>,
    /// When the open form will expire
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,
    /// Why the token is invalid: `not_found`, `already_used`, `expired`,
    /// or `already_submitted`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VerifyPhoneRequest {
    pub token: String,
    /// The phone number the user claims, in any common format
    pub phone: String,
    /// Identity-provider ID token produced by the client-side OTP step
    pub id_token: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VerifyPhoneResponse {
    pub verified: bool,
    /// The canonical (E.164) phone number that was stamped on the token
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OrgReferenceRequest {
    /// `orgs` (registered directory), `default` (seed directory), or `custom`
    #[serde(rename = "type")]
    pub ref_type: String,
    /// Directory id; required for `orgs` and `default`
    pub id: Option<Uuid>,
    /// Organization name; required for `custom`
    pub name: Option<String>,
    /// Organization type; trusted as-is for `custom`
    pub org_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubmitRequest {
    pub token: String,
    pub id_token: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub github_url: Option<String>,
    pub city: Option<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    pub organization: OrgReferenceRequest,
    /// Optional tag naming where the organization reference came from; must
    /// agree with `organization.type` when present
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmitResponse {
    pub message: String,
    pub submission_id: Uuid,
    /// Identifier of the mirrored record in the user directory
    pub external_user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OAuthStateRequest {
    pub token: String,
    /// Whether a Discord OAuth round-trip is currently in flight
    pub in_progress: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SavePartialRequest {
    pub token: String,
    /// Free-form saved form state
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PartialResponse {
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}
