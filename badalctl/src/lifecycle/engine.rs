//! The token lifecycle engine.
//!
//! Orchestrates activation, validation, phone verification, submission,
//! deferral and opt-out over the shared stores. All collaborators are
//! injected at construction; nothing here reaches for module-level state.
//!
//! Serialization is the storage layer's job: every mutation that matters is
//! a conditional update, and no lock is held across a database or external
//! call.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use crate::{
    db::{
        errors::DbError,
        handlers::{Deferrals, Drafts, EmailTokens, OptOuts, Organizations, Recipients, Repository, Submissions},
        models::{
            deferrals::DeferralOutcome,
            drafts::Draft,
            email_tokens::{EmailToken, EmailType, TokenStatus},
            organizations::OrgType,
            submissions::SubmissionCreateRequest,
        },
    },
    directory::{DirectoryError, DirectoryUserCreate, UserDirectory},
    email::EmailService,
    errors::{Error, Result},
    identity::{PhoneVerifier, ID_TOKEN_PREFIX},
    lifecycle::windows::Windows,
    phone,
    types::{abbrev_uuid, OrgId, RecipientId, SubmissionId, TokenId},
};

const MAX_FULL_NAME: usize = 100;
const MAX_EMAIL: usize = 255;
const MAX_ORG_NAME: usize = 200;
const MAX_URL: usize = 255;
const MAX_CITY: usize = 100;

/// Result of a successful activation (or reopen).
#[derive(Debug, Clone, Copy)]
pub struct ActivationState {
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Read-only validity check result. Never signals through errors so the
/// endpoint can stay 200 for "checked and found invalid".
#[derive(Debug, Clone, Copy)]
pub struct Validity {
    pub valid: bool,
    pub reason: Option<Invalidity>,
}

impl Validity {
    fn ok() -> Self {
        Self { valid: true, reason: None }
    }

    fn invalid(reason: Invalidity) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

/// Why a token failed the read-only validity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidity {
    NotFound,
    AlreadyUsed,
    Expired,
    AlreadySubmitted,
}

impl fmt::Display for Invalidity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Invalidity::NotFound => "not_found",
            Invalidity::AlreadyUsed => "already_used",
            Invalidity::Expired => "expired",
            Invalidity::AlreadySubmitted => "already_submitted",
        };
        write!(f, "{s}")
    }
}

/// Caller-typed organization reference.
#[derive(Debug, Clone)]
pub struct OrgReference {
    pub ref_type: String,
    pub id: Option<OrgId>,
    pub name: Option<String>,
    pub org_type: Option<String>,
}

#[derive(Debug, Clone)]
struct ResolvedOrg {
    name: String,
    org_type: OrgType,
    ref_id: Option<OrgId>,
}

/// The cleaned-up form payload as submitted.
#[derive(Debug, Clone)]
pub struct FormSubmission {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub github_url: Option<String>,
    pub city: Option<String>,
    pub tech_stack: Vec<String>,
    pub organization: OrgReference,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct SubmissionReceipt {
    pub submission_id: SubmissionId,
    pub external_user_id: uuid::Uuid,
}

pub struct LifecycleEngine {
    db: PgPool,
    directory: UserDirectory,
    verifier: PhoneVerifier,
    email: Arc<EmailService>,
    windows: Windows,
    country_code: String,
}

impl LifecycleEngine {
    pub fn new(
        db: PgPool,
        directory: UserDirectory,
        verifier: PhoneVerifier,
        email: Arc<EmailService>,
        windows: Windows,
        country_code: String,
    ) -> Self {
        Self {
            db,
            directory,
            verifier,
            email,
            windows,
            country_code,
        }
    }

    pub fn windows(&self) -> &Windows {
        &self.windows
    }

    /// Mint an initial link for a recipient and send the invitation email.
    ///
    /// The token row is committed before the send so a crashed send leaves
    /// an auditable `failed` token instead of nothing.
    #[instrument(skip(self), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    pub async fn invite(&self, recipient_id: RecipientId) -> Result<TokenId> {
        let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;

        let recipient = Recipients::new(&mut tx)
            .get(recipient_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                resource: "recipient".to_string(),
                id: abbrev_uuid(&recipient_id),
            })?;

        if OptOuts::new(&mut tx).get(recipient_id).await?.is_some() {
            return Err(Error::OptedOut);
        }
        if Submissions::new(&mut tx).completed_for_recipient(recipient_id).await?.is_some() {
            return Err(Error::AlreadySubmitted);
        }

        let (raw_token, token) = EmailTokens::new(&mut tx).mint_for_recipient(recipient_id, EmailType::Initial).await?;
        tx.commit().await.map_err(|e| Error::Database(e.into()))?;

        if let Err(e) = self
            .email
            .send_invitation(&recipient.email, recipient.full_name.as_deref(), &raw_token)
            .await
        {
            tracing::warn!("invitation send failed for token {}: {e}", abbrev_uuid(&token.id));
            let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            EmailTokens::new(&mut conn).mark_used(token.id, TokenStatus::Failed).await?;
            return Err(Error::Internal {
                operation: "send invitation email".to_string(),
            });
        }

        Ok(token.id)
    }

    /// Open the form behind a link.
    ///
    /// First open stamps `activated_at`; later opens before submission keep
    /// the original timer. A used token may be reopened once-off within its
    /// grace window provided the recipient has no completed submission,
    /// no deferral, and no opt-out.
    #[instrument(skip_all, err)]
    pub async fn activate(&self, raw_token: &str) -> Result<ActivationState> {
        let now = Utc::now();
        let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;

        let token = EmailTokens::new(&mut tx)
            .find_by_link_token(raw_token)
            .await?
            .ok_or(Error::TokenNotFound)?;

        if Submissions::new(&mut tx).completed_for_recipient(token.recipient_id).await?.is_some() {
            return Err(Error::AlreadySubmitted);
        }

        let token = if token.used_at.is_some() {
            // Reopen attempt ("accidental close"). Permitted only while the
            // grace window is still open and the recipient has not moved on.
            if OptOuts::new(&mut tx).get(token.recipient_id).await?.is_some() {
                return Err(Error::OptedOut);
            }
            if Deferrals::new(&mut tx).get(token.recipient_id).await?.is_some() {
                return Err(Error::AlreadyUsed);
            }
            if self.windows.is_expired(&token, now) {
                return Err(Error::Expired);
            }
            match EmailTokens::new(&mut tx).reopen(token.id).await? {
                Some(reopened) => reopened,
                // A concurrent reopen beat us; the token is open again
                None => EmailTokens::new(&mut tx).get_by_id(token.id).await?.ok_or(Error::TokenNotFound)?,
            }
        } else {
            if self.windows.is_expired(&token, now) {
                return Err(Error::Expired);
            }
            EmailTokens::new(&mut tx).mark_activated(token.id).await?
        };

        tx.commit().await.map_err(|e| Error::Database(e.into()))?;

        let activated_at = token.activated_at.ok_or_else(|| Error::Internal {
            operation: "read activation timestamp".to_string(),
        })?;
        Ok(ActivationState {
            activated_at,
            expires_at: activated_at + self.windows.form_window(token.oauth_in_progress),
        })
    }

    /// Read-only validity check. Never mutates state.
    #[instrument(skip_all, err)]
    pub async fn validate(&self, raw_token: &str) -> Result<Validity> {
        let now = Utc::now();
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

        let token = match EmailTokens::new(&mut conn).find_by_link_token(raw_token).await? {
            Some(token) => token,
            None => return Ok(Validity::invalid(Invalidity::NotFound)),
        };

        if token.used_at.is_some() {
            return Ok(Validity::invalid(Invalidity::AlreadyUsed));
        }
        if self.windows.is_expired(&token, now) {
            return Ok(Validity::invalid(Invalidity::Expired));
        }
        if Submissions::new(&mut conn).completed_for_recipient(token.recipient_id).await?.is_some() {
            return Ok(Validity::invalid(Invalidity::AlreadySubmitted));
        }

        Ok(Validity::ok())
    }

    /// Verify the user's claimed phone against the identity provider and
    /// stamp it on the token. Decoupled from activation and submission; may
    /// run at any point while the token is open.
    #[instrument(skip_all, err)]
    pub async fn verify_phone(&self, raw_token: &str, claimed_phone: &str, provider_token: &str) -> Result<String> {
        let now = Utc::now();

        let token = {
            let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            EmailTokens::new(&mut conn)
                .find_by_link_token(raw_token)
                .await?
                .ok_or(Error::TokenNotFound)?
        };
        if token.used_at.is_some() {
            return Err(Error::AlreadyUsed);
        }
        if self.windows.is_expired(&token, now) {
            return Err(Error::Expired);
        }

        // The connection is back in the pool before the provider round-trip.
        let verified = self.verifier.verify_id_token(provider_token).await?;

        let claimed = phone::normalize(claimed_phone, &self.country_code).ok_or(Error::PhoneMismatch)?;
        let asserted = phone::normalize(&verified.phone_number, &self.country_code).ok_or(Error::PhoneMismatch)?;
        if claimed != asserted {
            return Err(Error::PhoneMismatch);
        }

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        EmailTokens::new(&mut conn)
            .set_verified_phone(token.id, &asserted)
            .await?
            .ok_or(Error::AlreadyUsed)?;

        Ok(asserted)
    }

    /// Flag or clear an in-flight OAuth redirect, extending the form window.
    #[instrument(skip_all, err)]
    pub async fn set_oauth_in_progress(&self, raw_token: &str, in_progress: bool) -> Result<()> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let token = EmailTokens::new(&mut conn)
            .find_by_link_token(raw_token)
            .await?
            .ok_or(Error::TokenNotFound)?;
        if token.used_at.is_some() {
            return Err(Error::AlreadyUsed);
        }
        EmailTokens::new(&mut conn).set_oauth_in_progress(token.id, in_progress).await?;
        Ok(())
    }

    /// Finalize the form: validate, mirror into the user directory, and
    /// close the token.
    #[instrument(skip_all, err)]
    pub async fn submit(&self, raw_token: &str, provider_token: &str, form: FormSubmission) -> Result<SubmissionReceipt> {
        // Presence and shape of the tokens themselves
        if raw_token.trim().is_empty() {
            return Err(Error::BadRequest {
                message: "token is required".to_string(),
            });
        }
        if provider_token.trim().is_empty() {
            return Err(Error::BadRequest {
                message: "id_token is required".to_string(),
            });
        }
        if !provider_token.starts_with(ID_TOKEN_PREFIX) {
            return Err(Error::BadRequest {
                message: "id_token is malformed".to_string(),
            });
        }

        validate_field_lengths(&form)?;

        let now = Utc::now();
        let email_norm = form.email.trim().to_lowercase();

        // State checks and organization resolution on a pooled connection
        let (token, resolved_org) = {
            let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

            let token = EmailTokens::new(&mut conn)
                .find_by_link_token(raw_token)
                .await?
                .ok_or(Error::TokenNotFound)?;
            if token.used_at.is_some() {
                return Err(Error::AlreadyUsed);
            }
            if self.windows.is_expired(&token, now) {
                return Err(Error::Expired);
            }
            // Only a completed submission blocks; pending rows from earlier
            // failed attempts must not prevent the retry.
            if Submissions::new(&mut conn).completed_for_recipient(token.recipient_id).await?.is_some() {
                return Err(Error::AlreadySubmitted);
            }

            let resolved_org = self
                .resolve_organization(&mut conn, &form.organization, form.source.as_deref())
                .await?;
            (token, resolved_org)
        };

        let submitted_phone = phone::normalize(&form.phone, &self.country_code).ok_or_else(|| Error::Validation {
            field: "phone".to_string(),
            message: "not a valid phone number".to_string(),
        })?;

        // OTP freshness, then exact match against the verified number
        let verified_at = token.phone_verified_at.ok_or(Error::PhoneNotVerified)?;
        if !self.windows.otp_fresh(verified_at, now) {
            return Err(Error::OtpExpired);
        }
        if token.verified_phone.as_deref() != Some(submitted_phone.as_str()) {
            return Err(Error::PhoneNotVerified);
        }

        let tech_stack = dedup_tech_stack(form.tech_stack);

        // Duplicate checks against the directory before any write
        if let Some(existing) = self.directory.find_by_email(&email_norm).await? {
            return Err(Error::DuplicateUser { existing_id: existing.id });
        }
        if let Some(existing) = self.directory.find_by_phone(&submitted_phone).await? {
            return Err(Error::DuplicateUser { existing_id: existing.id });
        }
        if let Some(github_url) = form.github_url.as_deref() {
            if let Some(existing) = self.directory.find_by_github_url(github_url).await? {
                return Err(Error::DuplicateUser { existing_id: existing.id });
            }
        }

        let create = SubmissionCreateRequest {
            recipient_id: token.recipient_id,
            full_name: form.full_name.trim().to_string(),
            email: email_norm.clone(),
            phone: submitted_phone.clone(),
            github_url: form.github_url.clone(),
            city: form.city.clone(),
            org_name: resolved_org.name.clone(),
            org_type: resolved_org.org_type.to_string(),
            org_ref_id: resolved_org.ref_id,
            tech_stack: tech_stack.clone(),
        };
        let mirror = DirectoryUserCreate {
            full_name: create.full_name.clone(),
            email: email_norm,
            phone: submitted_phone,
            github_url: form.github_url,
            city: form.city,
            org_name: resolved_org.name,
            org_type: resolved_org.org_type.to_string(),
            tech_stack,
        };

        // Capability probe: one transaction when the directory is colocated,
        // compensating writes when it is not.
        if self.directory.supports_transactions() {
            self.submit_transactional(&token, create, mirror).await
        } else {
            self.submit_compensating(&token, create, mirror).await
        }
    }

    /// Colocated directory: pending insert, mirror write, promotion and
    /// token close all commit or roll back together.
    async fn submit_transactional(
        &self,
        token: &EmailToken,
        create: SubmissionCreateRequest,
        mirror: DirectoryUserCreate,
    ) -> Result<SubmissionReceipt> {
        let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;

        Submissions::new(&mut tx).delete_stale_pending(token.recipient_id).await?;
        let pending = Submissions::new(&mut tx).create(&create).await?;

        let directory_user = match self.directory.create_user_on(&mut tx, &mirror).await {
            Ok(user) => user,
            Err(DbError::UniqueViolation { .. }) => {
                // The aborted transaction takes the pending row with it;
                // resolve the conflict on a fresh connection.
                tx.rollback().await.map_err(|e| Error::Database(e.into()))?;
                let existing = self
                    .directory
                    .find_conflicting(&mirror.email, &mirror.phone, mirror.github_url.as_deref())
                    .await?;
                return Err(match existing {
                    Some(user) => Error::DuplicateUser { existing_id: user.id },
                    None => Error::Internal {
                        operation: "resolve conflicting directory user".to_string(),
                    },
                });
            }
            Err(e) => return Err(e.into()),
        };

        let completed = Submissions::new(&mut tx)
            .complete(pending.id, directory_user.id)
            .await?
            .ok_or_else(|| Error::Internal {
                operation: "promote pending submission".to_string(),
            })?;
        EmailTokens::new(&mut tx).mark_used(token.id, TokenStatus::Used).await?;
        Deferrals::new(&mut tx).delete(token.recipient_id).await?;
        Drafts::new(&mut tx).delete_for_recipient(token.recipient_id).await?;

        tx.commit().await.map_err(|e| Error::Database(e.into()))?;

        Ok(SubmissionReceipt {
            submission_id: completed.id,
            external_user_id: directory_user.id,
        })
    }

    /// Remote directory: sequential writes with manual compensation. A
    /// failed mirror write deletes the pending submission; a duplicate
    /// aborts with the existing directory id.
    async fn submit_compensating(
        &self,
        token: &EmailToken,
        create: SubmissionCreateRequest,
        mirror: DirectoryUserCreate,
    ) -> Result<SubmissionReceipt> {
        let pending = {
            let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;
            Submissions::new(&mut tx).delete_stale_pending(token.recipient_id).await?;
            let pending = Submissions::new(&mut tx).create(&create).await?;
            tx.commit().await.map_err(|e| Error::Database(e.into()))?;
            pending
        };

        match self.directory.create_user(&mirror).await {
            Ok(directory_user) => {
                let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;
                let completed = Submissions::new(&mut tx)
                    .complete(pending.id, directory_user.id)
                    .await?
                    .ok_or_else(|| Error::Internal {
                        operation: "promote pending submission".to_string(),
                    })?;
                EmailTokens::new(&mut tx).mark_used(token.id, TokenStatus::Used).await?;
                Deferrals::new(&mut tx).delete(token.recipient_id).await?;
                Drafts::new(&mut tx).delete_for_recipient(token.recipient_id).await?;
                tx.commit().await.map_err(|e| Error::Database(e.into()))?;

                Ok(SubmissionReceipt {
                    submission_id: completed.id,
                    external_user_id: directory_user.id,
                })
            }
            Err(DirectoryError::Duplicate { existing_id }) => {
                self.compensate_pending(pending.id).await;
                Err(Error::DuplicateUser { existing_id })
            }
            Err(DirectoryError::Db(e)) => {
                tracing::error!("directory mirror write failed: {e:#}");
                self.compensate_pending(pending.id).await;
                Err(Error::Internal {
                    operation: "mirror submission to user directory".to_string(),
                })
            }
        }
    }

    /// Best-effort compensation delete. An orphaned pending row is tolerated
    /// (it never reads as completed and the next attempt clears it).
    async fn compensate_pending(&self, submission_id: SubmissionId) {
        let result = async {
            let mut conn = self.db.acquire().await.map_err(DbError::from)?;
            Submissions::new(&mut conn).delete(submission_id).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!("failed to compensate pending submission {}: {e:#}", abbrev_uuid(&submission_id));
        }
    }

    /// User-initiated "remind me later": close the link and enroll (or bump)
    /// the deferral.
    #[instrument(skip_all, err)]
    pub async fn defer(&self, raw_token: &str) -> Result<DeferralOutcome> {
        let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;

        let token = EmailTokens::new(&mut tx)
            .find_by_link_token(raw_token)
            .await?
            .ok_or(Error::TokenNotFound)?;
        if token.used_at.is_some() {
            return Err(Error::AlreadyUsed);
        }
        if OptOuts::new(&mut tx).get(token.recipient_id).await?.is_some() {
            return Err(Error::OptedOut);
        }

        EmailTokens::new(&mut tx).mark_used(token.id, TokenStatus::Expired).await?;
        let outcome = Deferrals::new(&mut tx).defer(token.recipient_id).await?;

        tx.commit().await.map_err(|e| Error::Database(e.into()))?;
        Ok(outcome)
    }

    /// Permanent suppression: record the opt-out, drop the deferral, close
    /// every open link the recipient still has.
    #[instrument(skip_all, err)]
    pub async fn opt_out(&self, raw_token: &str, reason: Option<String>) -> Result<()> {
        let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;

        let token = EmailTokens::new(&mut tx)
            .find_by_link_token(raw_token)
            .await?
            .ok_or(Error::TokenNotFound)?;

        OptOuts::new(&mut tx)
            .create(&crate::db::models::optouts::OptOutCreateRequest {
                recipient_id: token.recipient_id,
                reason,
                link_token: raw_token.to_string(),
            })
            .await?;
        Deferrals::new(&mut tx).delete(token.recipient_id).await?;
        EmailTokens::new(&mut tx)
            .close_open_for_recipient(token.recipient_id, TokenStatus::Expired)
            .await?;

        tx.commit().await.map_err(|e| Error::Database(e.into()))?;
        Ok(())
    }

    /// Save a partial draft against an open, unexpired link.
    #[instrument(skip_all, err)]
    pub async fn save_partial(&self, raw_token: &str, payload: serde_json::Value) -> Result<Draft> {
        let now = Utc::now();
        let mut tx = self.db.begin().await.map_err(|e| Error::Database(e.into()))?;

        let token = EmailTokens::new(&mut tx)
            .find_by_link_token(raw_token)
            .await?
            .ok_or(Error::TokenNotFound)?;
        if token.used_at.is_some() {
            return Err(Error::AlreadyUsed);
        }
        if self.windows.is_expired(&token, now) {
            return Err(Error::Expired);
        }

        let draft = Drafts::new(&mut tx).upsert(raw_token, token.recipient_id, &payload).await?;
        tx.commit().await.map_err(|e| Error::Database(e.into()))?;
        Ok(draft)
    }

    #[instrument(skip_all, err)]
    pub async fn get_partial(&self, raw_token: &str) -> Result<Draft> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Drafts::new(&mut conn).get(raw_token).await?.ok_or_else(|| Error::NotFound {
            resource: "draft".to_string(),
            id: raw_token.chars().take(8).collect(),
        })
    }

    #[instrument(skip_all, err)]
    pub async fn delete_partial(&self, raw_token: &str) -> Result<bool> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let deleted = Drafts::new(&mut conn).delete(raw_token).await?;
        Ok(deleted)
    }

    /// Resolve the caller's organization reference against the two
    /// directories. The directory record's classification is authoritative
    /// for `orgs`/`default`; `custom` trusts the caller.
    async fn resolve_organization(
        &self,
        conn: &mut sqlx::PgConnection,
        reference: &OrgReference,
        source: Option<&str>,
    ) -> Result<ResolvedOrg> {
        let ref_type = reference.ref_type.trim();

        if let Some(source) = source {
            if source != ref_type {
                return Err(Error::SourceMismatch);
            }
        }

        match ref_type {
            "orgs" | "default" => {
                let id = reference.id.ok_or_else(|| Error::Validation {
                    field: "organization.id".to_string(),
                    message: "required for this reference type".to_string(),
                })?;
                let mut orgs = Organizations::new(conn);
                let org = if ref_type == "orgs" {
                    orgs.find_registered(id).await?
                } else {
                    orgs.find_seed(id).await?
                }
                .ok_or_else(|| Error::OrgNotFound { id: id.to_string() })?;

                Ok(ResolvedOrg {
                    name: org.name,
                    org_type: org.org_type,
                    ref_id: Some(id),
                })
            }
            "custom" => {
                let name = reference
                    .name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| Error::Validation {
                        field: "organization.name".to_string(),
                        message: "required for custom organizations".to_string(),
                    })?;
                let org_type: OrgType = reference
                    .org_type
                    .as_deref()
                    .unwrap_or("other")
                    .parse()
                    .map_err(|message| Error::Validation {
                        field: "organization.org_type".to_string(),
                        message,
                    })?;

                Ok(ResolvedOrg {
                    name: name.to_string(),
                    org_type,
                    ref_id: None,
                })
            }
            other => Err(Error::InvalidReference { value: other.to_string() }),
        }
    }
}

/// Per-field length limits; failures name the offending field.
fn validate_field_lengths(form: &FormSubmission) -> Result<()> {
    let checks: [(&str, Option<usize>, usize); 5] = [
        ("full_name", Some(form.full_name.trim().len()), MAX_FULL_NAME),
        ("email", Some(form.email.trim().len()), MAX_EMAIL),
        ("github_url", form.github_url.as_deref().map(|s| s.len()), MAX_URL),
        ("city", form.city.as_deref().map(|s| s.len()), MAX_CITY),
        ("organization.name", form.organization.name.as_deref().map(|s| s.len()), MAX_ORG_NAME),
    ];

    for (field, len, max) in checks {
        if let Some(len) = len {
            if len > max {
                return Err(Error::Validation {
                    field: field.to_string(),
                    message: format!("must be at most {max} characters"),
                });
            }
        }
    }

    if form.full_name.trim().is_empty() {
        return Err(Error::Validation {
            field: "full_name".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    if form.email.trim().is_empty() || !form.email.contains('@') {
        return Err(Error::Validation {
            field: "email".to_string(),
            message: "must be a valid email address".to_string(),
        });
    }

    Ok(())
}

/// Trimmed, case-sensitive set union preserving first occurrence.
fn dedup_tech_stack(stack: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(stack.len());
    for item in stack {
        let trimmed = item.trim().to_string();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.clone()) {
            out.push(trimmed);
        }
    }
    out
}
