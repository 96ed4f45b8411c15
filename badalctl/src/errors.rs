use crate::db::errors::DbError;
use crate::types::DirectoryUserId;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

/// Service-level error taxonomy for the onboarding form lifecycle.
///
/// Every user-facing operation maps internal failures to one of these kinds
/// with a stable HTTP status. Raw storage error detail is never returned to
/// the caller.
#[derive(ThisError, Debug)]
pub enum Error {
    /// The link token does not exist
    #[error("Token not found")]
    TokenNotFound,

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// The activation or form window has elapsed
    #[error("Link expired")]
    Expired,

    /// The token has already been used and is not eligible for reopening
    #[error("Link already used")]
    AlreadyUsed,

    /// A completed submission exists for this recipient
    #[error("Form already submitted")]
    AlreadySubmitted,

    /// The recipient has opted out of the program
    #[error("Recipient has opted out")]
    OptedOut,

    /// A field failed length or shape validation
    #[error("Invalid value for {field}: {message}")]
    Validation { field: String, message: String },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// The claimed phone number does not match the provider-asserted one
    #[error("Phone number mismatch")]
    PhoneMismatch,

    /// Submission phone differs from the verified phone on the token
    #[error("Phone not verified")]
    PhoneNotVerified,

    /// Phone verification is older than the OTP freshness window
    #[error("OTP verification expired")]
    OtpExpired,

    /// The identity provider rejected the supplied token
    #[error("Invalid identity token")]
    InvalidIdToken,

    /// Phone verification is disabled in this deployment
    #[error("Phone verification unavailable")]
    VerificationUnavailable,

    /// Referenced organization does not exist in the named directory
    #[error("Organization {id} not found")]
    OrgNotFound { id: String },

    /// Unknown organization reference type
    #[error("Invalid organization reference: {value}")]
    InvalidReference { value: String },

    /// Caller-supplied source tag disagrees with the reference type
    #[error("Source tag does not match organization reference")]
    SourceMismatch,

    /// Conflict with an existing record in the external user directory
    #[error("Duplicate user")]
    DuplicateUser { existing_id: DirectoryUserId },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::TokenNotFound | Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Expired
            | Error::AlreadyUsed
            | Error::AlreadySubmitted
            | Error::OptedOut
            | Error::Validation { .. }
            | Error::BadRequest { .. }
            | Error::PhoneMismatch
            | Error::PhoneNotVerified
            | Error::OtpExpired
            | Error::InvalidIdToken
            | Error::OrgNotFound { .. }
            | Error::InvalidReference { .. }
            | Error::SourceMismatch => StatusCode::BAD_REQUEST,
            Error::VerificationUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Error::DuplicateUser { .. } => StatusCode::CONFLICT,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details.
    ///
    /// Expired, used, opted-out and already-submitted states get distinct
    /// messages because they require different remediation from the user.
    pub fn user_message(&self) -> String {
        match self {
            Error::TokenNotFound => "This link is not valid. Please check the link in your email.".to_string(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::Expired => "This link has expired. Please request a new link.".to_string(),
            Error::AlreadyUsed => "This link has been closed. A new link will be sent if a reminder is due.".to_string(),
            Error::AlreadySubmitted => "You have already submitted this form. No further action is needed.".to_string(),
            Error::OptedOut => "You have unsubscribed from this program. Resubscribe to continue.".to_string(),
            Error::Validation { field, message } => format!("Invalid value for {field}: {message}"),
            Error::BadRequest { message } => message.clone(),
            Error::PhoneMismatch => "The phone number does not match the verified number.".to_string(),
            Error::PhoneNotVerified => "Please verify your phone number before submitting.".to_string(),
            Error::OtpExpired => "Your phone verification has expired. Please verify again.".to_string(),
            Error::InvalidIdToken => "Phone verification failed. Please verify again.".to_string(),
            Error::VerificationUnavailable => "Phone verification is currently unavailable.".to_string(),
            Error::OrgNotFound { id } => format!("Organization {id} was not found."),
            Error::InvalidReference { value } => format!("Unknown organization reference type: {value}"),
            Error::SourceMismatch => "The organization source does not match the selected organization.".to_string(),
            Error::DuplicateUser { .. } => "An account with these details already exists.".to_string(),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { table, .. } => match table.as_deref() {
                    Some("email_tokens") => "An invitation is already pending for this recipient.".to_string(),
                    Some("submissions") => "You have already submitted this form. No further action is needed.".to_string(),
                    _ => "Resource already exists".to_string(),
                },
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) | Error::DuplicateUser { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();

        // Every error body is JSON with a `message` field; duplicates also
        // carry the conflicting directory id so the caller can act on it.
        let body = match &self {
            Error::DuplicateUser { existing_id } => serde_json::json!({
                "message": self.user_message(),
                "existing_id": existing_id,
            }),
            _ => serde_json::json!({ "message": self.user_message() }),
        };

        (status, axum::response::Json(body)).into_response()
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
