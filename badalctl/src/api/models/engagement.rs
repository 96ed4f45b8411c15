//! Request/response DTOs for deferral, opt-out and invitation endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DeferRequest {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OptOutRequest {
    pub token: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct InviteRequest {
    /// Recipient from the notification-recipient mirror
    pub recipient_id: Uuid,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InviteResponse {
    pub message: String,
    pub token_id: Uuid,
}
