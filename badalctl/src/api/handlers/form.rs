//! HTTP handlers for the form lifecycle surface.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    api::models::form::{
        ActivateRequest, ActivateResponse, OAuthStateRequest, PartialResponse, SavePartialRequest, SubmitRequest, SubmitResponse,
        ValidateResponse, VerifyPhoneRequest, VerifyPhoneResponse,
    },
    api::models::engagement::MessageResponse,
    errors::Error,
    lifecycle::engine::{FormSubmission, OrgReference},
    AppState,
};

/// Open the form behind an emailed link
#[utoipa::path(
    post,
    path = "/activate",
    request_body = ActivateRequest,
    tag = "form",
    responses(
        (status = 200, description = "Form activated", body = ActivateResponse),
        (status = 400, description = "Expired, used, or already submitted"),
        (status = 404, description = "Unknown token"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn activate(State(state): State<AppState>, Json(request): Json<ActivateRequest>) -> Result<Json<ActivateResponse>, Error> {
    let activation = state.engine.activate(&request.token).await?;
    Ok(Json(ActivateResponse {
        activated_at: activation.activated_at,
        expires_at: activation.expires_at,
    }))
}

/// Read-only token validity check
#[utoipa::path(
    get,
    path = "/validate/{token}",
    tag = "form",
    responses(
        (status = 200, description = "Validity result", body = ValidateResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn validate(State(state): State<AppState>, Path(token): Path<String>) -> Result<Json<ValidateResponse>, Error> {
    let validity = state.engine.validate(&token).await?;
    Ok(Json(ValidateResponse {
        valid: validity.valid,
        reason: validity.reason.map(|r| r.to_string()),
    }))
}

/// Verify the user's phone via the identity provider OTP token
#[utoipa::path(
    post,
    path = "/verify-phone",
    request_body = VerifyPhoneRequest,
    tag = "form",
    responses(
        (status = 200, description = "Phone verified", body = VerifyPhoneResponse),
        (status = 400, description = "Mismatch or invalid token"),
        (status = 503, description = "Verification disabled"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn verify_phone(
    State(state): State<AppState>,
    Json(request): Json<VerifyPhoneRequest>,
) -> Result<Json<VerifyPhoneResponse>, Error> {
    let phone = state.engine.verify_phone(&request.token, &request.phone, &request.id_token).await?;
    Ok(Json(VerifyPhoneResponse { verified: true, phone }))
}

/// Submit the completed form
#[utoipa::path(
    post,
    path = "/submit",
    request_body = SubmitRequest,
    tag = "form",
    responses(
        (status = 200, description = "Submission completed", body = SubmitResponse),
        (status = 400, description = "Validation or state conflict"),
        (status = 404, description = "Unknown token"),
        (status = 409, description = "Duplicate user in the directory"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn submit(State(state): State<AppState>, Json(request): Json<SubmitRequest>) -> Result<Json<SubmitResponse>, Error> {
    let form = FormSubmission {
        full_name: request.full_name,
        email: request.email,
        phone: request.phone,
        github_url: request.github_url,
        city: request.city,
        tech_stack: request.tech_stack,
        organization: OrgReference {
            ref_type: request.organization.ref_type,
            id: request.organization.id,
            name: request.organization.name,
            org_type: request.organization.org_type,
        },
        source: request.source,
    };

    let receipt = state.engine.submit(&request.token, &request.id_token, form).await?;
    Ok(Json(SubmitResponse {
        message: "Your profile has been submitted.".to_string(),
        submission_id: receipt.submission_id,
        external_user_id: receipt.external_user_id,
    }))
}

/// Flag or clear an in-flight Discord OAuth round-trip
#[utoipa::path(
    post,
    path = "/oauth-state",
    request_body = OAuthStateRequest,
    tag = "form",
    responses(
        (status = 200, description = "OAuth state updated", body = MessageResponse),
        (status = 400, description = "Token closed"),
        (status = 404, description = "Unknown token"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn oauth_state(State(state): State<AppState>, Json(request): Json<OAuthStateRequest>) -> Result<Json<MessageResponse>, Error> {
    state.engine.set_oauth_in_progress(&request.token, request.in_progress).await?;
    Ok(Json(MessageResponse {
        message: "OAuth state updated.".to_string(),
    }))
}

/// Save a partial draft of the form
#[utoipa::path(
    post,
    path = "/save-partial",
    request_body = SavePartialRequest,
    tag = "form",
    responses(
        (status = 200, description = "Draft saved", body = PartialResponse),
        (status = 400, description = "Token closed or expired"),
        (status = 404, description = "Unknown token"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn save_partial(
    State(state): State<AppState>,
    Json(request): Json<SavePartialRequest>,
) -> Result<Json<PartialResponse>, Error> {
    let draft = state.engine.save_partial(&request.token, request.payload).await?;
    Ok(Json(PartialResponse {
        payload: draft.payload,
        updated_at: draft.updated_at,
    }))
}

/// Fetch the saved draft for a link
#[utoipa::path(
    get,
    path = "/partial/{token}",
    tag = "form",
    responses(
        (status = 200, description = "Saved draft", body = PartialResponse),
        (status = 404, description = "No draft saved"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_partial(State(state): State<AppState>, Path(token): Path<String>) -> Result<Json<PartialResponse>, Error> {
    let draft = state.engine.get_partial(&token).await?;
    Ok(Json(PartialResponse {
        payload: draft.payload,
        updated_at: draft.updated_at,
    }))
}

/// Delete the saved draft for a link
#[utoipa::path(
    delete,
    path = "/partial/{token}",
    tag = "form",
    responses(
        (status = 200, description = "Draft deleted", body = MessageResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_partial(State(state): State<AppState>, Path(token): Path<String>) -> Result<Json<MessageResponse>, Error> {
    state.engine.delete_partial(&token).await?;
    Ok(Json(MessageResponse {
        message: "Draft deleted.".to_string(),
    }))
}
