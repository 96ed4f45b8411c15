//! OpenAPI documentation for the onboarding API.

use utoipa::OpenApi;

use crate::api::models::{
    engagement::{DeferRequest, InviteRequest, InviteResponse, MessageResponse, OptOutRequest},
    form::{
        ActivateRequest, ActivateResponse, OAuthStateRequest, OrgReferenceRequest, PartialResponse, SavePartialRequest, SubmitRequest,
        SubmitResponse, ValidateResponse, VerifyPhoneRequest, VerifyPhoneResponse,
    },
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Badal Onboarding API",
        description = "Token-gated contributor onboarding: link activation, phone verification, submission, and engagement management."
    ),
    paths(
        crate::api::handlers::form::activate,
        crate::api::handlers::form::validate,
        crate::api::handlers::form::verify_phone,
        crate::api::handlers::form::submit,
        crate::api::handlers::form::oauth_state,
        crate::api::handlers::form::save_partial,
        crate::api::handlers::form::get_partial,
        crate::api::handlers::form::delete_partial,
        crate::api::handlers::engagement::invite,
        crate::api::handlers::engagement::defer,
        crate::api::handlers::engagement::optout,
    ),
    components(schemas(
        ActivateRequest,
        ActivateResponse,
        ValidateResponse,
        VerifyPhoneRequest,
        VerifyPhoneResponse,
        OrgReferenceRequest,
        SubmitRequest,
        SubmitResponse,
        OAuthStateRequest,
        SavePartialRequest,
        PartialResponse,
        MessageResponse,
        DeferRequest,
        OptOutRequest,
        InviteRequest,
        InviteResponse,
    )),
    tags(
        (name = "form", description = "Token-gated form lifecycle"),
        (name = "engagement", description = "Invitations, deferrals and opt-outs")
    )
)]
pub struct ApiDoc;
