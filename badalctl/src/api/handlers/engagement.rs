//! HTTP handlers for invitations, deferrals and opt-outs.

use axum::{extract::State, Json};

use crate::{
    api::models::engagement::{DeferRequest, InviteRequest, InviteResponse, MessageResponse, OptOutRequest},
    errors::Error,
    AppState,
};

/// Mint and send an initial invitation link for a recipient
#[utoipa::path(
    post,
    path = "/invitations",
    request_body = InviteRequest,
    tag = "engagement",
    responses(
        (status = 200, description = "Invitation sent", body = InviteResponse),
        (status = 400, description = "Recipient opted out or already submitted"),
        (status = 404, description = "Unknown recipient"),
        (status = 409, description = "An invitation is already pending"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn invite(State(state): State<AppState>, Json(request): Json<InviteRequest>) -> Result<Json<InviteResponse>, Error> {
    let token_id = state.engine.invite(request.recipient_id).await?;
    Ok(Json(InviteResponse {
        message: "Invitation sent.".to_string(),
        token_id,
    }))
}

/// User-initiated "remind me later"
#[utoipa::path(
    post,
    path = "/defer",
    request_body = DeferRequest,
    tag = "engagement",
    responses(
        (status = 200, description = "Deferred", body = MessageResponse),
        (status = 400, description = "Token closed or recipient opted out"),
        (status = 404, description = "Unknown token"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn defer(State(state): State<AppState>, Json(request): Json<DeferRequest>) -> Result<Json<MessageResponse>, Error> {
    state.engine.defer(&request.token).await?;
    Ok(Json(MessageResponse {
        message: "We will send you a reminder with a fresh link.".to_string(),
    }))
}

/// Permanently unsubscribe the recipient behind a link
#[utoipa::path(
    post,
    path = "/optout",
    request_body = OptOutRequest,
    tag = "engagement",
    responses(
        (status = 200, description = "Opted out", body = MessageResponse),
        (status = 404, description = "Unknown token"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn optout(State(state): State<AppState>, Json(request): Json<OptOutRequest>) -> Result<Json<MessageResponse>, Error> {
    state.engine.opt_out(&request.token, request.reason).await?;
    Ok(Json(MessageResponse {
        message: "You have been unsubscribed and will receive no further reminders.".to_string(),
    }))
}
