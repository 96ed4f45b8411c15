//! Integration tests for the token lifecycle, submission hand-off, and the
//! scheduled sweeps. Each test gets its own database via `#[sqlx::test]`.

pub mod utils;

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    db::models::email_tokens::{EmailType, TokenStatus},
    errors::Error,
    lifecycle::engine::OrgReference,
    sweeps::{never_opened, resend, retention, stale_activation},
    types::DirectoryUserId,
};
use utils::*;

fn test_windows() -> crate::lifecycle::Windows {
    crate::lifecycle::Windows::from_config(&crate::config::WindowsConfig::default())
}

fn test_email_service() -> crate::email::EmailService {
    crate::email::EmailService::new(&create_test_config()).expect("email service")
}

// --- Activation & validation -------------------------------------------------

#[sqlx::test]
#[test_log::test]
async fn test_activate_within_activation_window(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let recipient = insert_recipient(&pool, "a@example.org").await;
    let (raw, token) = mint_token(&pool, recipient, EmailType::Initial).await;
    set_sent_at(&pool, token.id, hours_ago(23)).await;

    let activation = engine.activate(&raw).await.expect("activation inside the window succeeds");
    assert_eq!(activation.expires_at, activation.activated_at + chrono::Duration::minutes(10));

    let stored = fetch_token(&pool, token.id).await;
    assert!(stored.activated_at.is_some());
    assert!(stored.used_at.is_none());
}

#[sqlx::test]
#[test_log::test]
async fn test_activate_after_activation_window_fails(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let recipient = insert_recipient(&pool, "a@example.org").await;
    let (raw, token) = mint_token(&pool, recipient, EmailType::Initial).await;
    set_sent_at(&pool, token.id, hours_ago(25)).await;

    assert!(matches!(engine.activate(&raw).await, Err(Error::Expired)));
    assert!(fetch_token(&pool, token.id).await.activated_at.is_none());
}

#[sqlx::test]
#[test_log::test]
async fn test_first_open_wins(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let recipient = insert_recipient(&pool, "a@example.org").await;
    let (raw, _token) = mint_token(&pool, recipient, EmailType::Initial).await;

    let first = engine.activate(&raw).await.unwrap();
    let second = engine.activate(&raw).await.unwrap();

    // Re-invocation before submission does not reset the timer
    assert_eq!(first.activated_at, second.activated_at);
    assert_eq!(first.expires_at, second.expires_at);
}

#[sqlx::test]
#[test_log::test]
async fn test_oauth_flag_extends_expiry(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let recipient = insert_recipient(&pool, "a@example.org").await;
    let (raw, token) = mint_token(&pool, recipient, EmailType::Initial).await;

    engine.set_oauth_in_progress(&raw, true).await.unwrap();
    let activation = engine.activate(&raw).await.unwrap();
    assert_eq!(activation.expires_at, activation.activated_at + chrono::Duration::minutes(30));

    // An activated token 11 minutes in is still valid while OAuth is flagged
    set_activated_at(&pool, token.id, minutes_ago(11)).await;
    let validity = engine.validate(&raw).await.unwrap();
    assert!(validity.valid);
}

#[sqlx::test]
#[test_log::test]
async fn test_validate_windows_and_reasons(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let recipient = insert_recipient(&pool, "a@example.org").await;
    let (raw, token) = mint_token(&pool, recipient, EmailType::Initial).await;

    assert!(engine.validate("no-such-token").await.unwrap().reason.map(|r| r.to_string()) == Some("not_found".into()));

    engine.activate(&raw).await.unwrap();

    set_activated_at(&pool, token.id, minutes_ago(9)).await;
    assert!(engine.validate(&raw).await.unwrap().valid);

    set_activated_at(&pool, token.id, minutes_ago(11)).await;
    let validity = engine.validate(&raw).await.unwrap();
    assert!(!validity.valid);
    assert_eq!(validity.reason.unwrap().to_string(), "expired");

    close_token(&pool, token.id).await;
    let validity = engine.validate(&raw).await.unwrap();
    assert_eq!(validity.reason.unwrap().to_string(), "already_used");

    // validate never mutates: the token is exactly as we left it
    let stored = fetch_token(&pool, token.id).await;
    assert!(stored.used_at.is_some());
}

// --- Reopen ("accidental close") --------------------------------------------

#[sqlx::test]
#[test_log::test]
async fn test_reopen_within_grace_window(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let recipient = insert_recipient(&pool, "a@example.org").await;
    let (raw, token) = mint_token(&pool, recipient, EmailType::Initial).await;

    engine.activate(&raw).await.unwrap();
    close_token(&pool, token.id).await;

    let reopened = engine.activate(&raw).await.expect("reopen inside grace window");
    let stored = fetch_token(&pool, token.id).await;
    assert!(stored.used_at.is_none(), "reopen clears used_at");
    assert_eq!(stored.activated_at.unwrap(), reopened.activated_at, "reopen restarts the timer");
}

#[sqlx::test]
#[test_log::test]
async fn test_reopen_blocked_after_grace_window(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let recipient = insert_recipient(&pool, "a@example.org").await;
    let (raw, token) = mint_token(&pool, recipient, EmailType::Initial).await;

    engine.activate(&raw).await.unwrap();
    set_activated_at(&pool, token.id, minutes_ago(11)).await;
    close_token(&pool, token.id).await;

    assert!(matches!(engine.activate(&raw).await, Err(Error::Expired)));
}

#[sqlx::test]
#[test_log::test]
async fn test_reopen_blocked_by_deferral_and_optout(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let recipient = insert_recipient(&pool, "a@example.org").await;
    let (raw, _token) = mint_token(&pool, recipient, EmailType::Initial).await;

    engine.activate(&raw).await.unwrap();
    engine.defer(&raw).await.unwrap();

    // Deferral blocks reopening the link
    assert!(matches!(engine.activate(&raw).await, Err(Error::AlreadyUsed)));

    engine.opt_out(&raw, Some("not interested".to_string())).await.unwrap();
    assert!(matches!(engine.activate(&raw).await, Err(Error::OptedOut)));
}

// --- Phone verification ------------------------------------------------------

#[sqlx::test]
#[test_log::test]
async fn test_verify_phone_disabled_provider_fails_closed(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let recipient = insert_recipient(&pool, "a@example.org").await;
    let (raw, _token) = mint_token(&pool, recipient, EmailType::Initial).await;
    engine.activate(&raw).await.unwrap();

    let result = engine.verify_phone(&raw, "+919876543210", FAKE_ID_TOKEN).await;
    assert!(matches!(result, Err(Error::VerificationUnavailable)));
}

// --- Submission --------------------------------------------------------------

async fn submit_ready_token(pool: &PgPool, engine: &crate::lifecycle::LifecycleEngine, email: &str) -> (String, crate::db::models::email_tokens::EmailToken) {
    let recipient = insert_recipient(pool, email).await;
    let (raw, token) = mint_token(pool, recipient, EmailType::Initial).await;
    engine.activate(&raw).await.unwrap();
    set_phone_verified(pool, token.id, VERIFIED_PHONE, chrono::Utc::now()).await;
    (raw, fetch_token(pool, token.id).await)
}

#[sqlx::test]
#[test_log::test]
async fn test_submit_happy_path_colocated(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let (raw, token) = submit_ready_token(&pool, &engine, "asha@example.org").await;

    // A saved draft should disappear on submission
    engine.save_partial(&raw, serde_json::json!({"full_name": "A"})).await.unwrap();

    let receipt = engine.submit(&raw, FAKE_ID_TOKEN, valid_form()).await.expect("submission succeeds");

    let status: String = sqlx::query_scalar("SELECT status FROM submissions WHERE id = $1")
        .bind(receipt.submission_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "completed");

    let mirrored: Option<DirectoryUserId> = sqlx::query_scalar("SELECT id FROM directory_users WHERE email = $1")
        .bind("asha@example.org")
        .fetch_optional(&pool)
        .await
        .unwrap();
    assert_eq!(mirrored, Some(receipt.external_user_id));

    let stored = fetch_token(&pool, token.id).await;
    assert!(stored.used_at.is_some());
    assert_eq!(stored.status, TokenStatus::Used);

    assert!(engine.get_partial(&raw).await.is_err(), "draft cleared on submission");

    // Not idempotent on the happy path
    assert!(matches!(engine.submit(&raw, FAKE_ID_TOKEN, valid_form()).await, Err(Error::AlreadyUsed)));
}

#[sqlx::test]
#[test_log::test]
async fn test_submit_happy_path_remote_directory(pool: PgPool) {
    let engine = create_test_engine_remote_directory(&pool);
    let (raw, _token) = submit_ready_token(&pool, &engine, "asha@example.org").await;

    let receipt = engine.submit(&raw, FAKE_ID_TOKEN, valid_form()).await.expect("submission succeeds");

    let status: String = sqlx::query_scalar("SELECT status FROM submissions WHERE id = $1")
        .bind(receipt.submission_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "completed");
}

#[sqlx::test]
#[test_log::test]
async fn test_submit_compensates_failed_mirror_write_and_stays_retryable(pool: PgPool) {
    let engine = create_test_engine_remote_directory(&pool);
    let (raw, token) = submit_ready_token(&pool, &engine, "asha@example.org").await;

    // Make the mirror write fail while the duplicate-check reads still work
    sqlx::query(
        "CREATE FUNCTION directory_down() RETURNS trigger AS \
         $$ BEGIN RAISE EXCEPTION 'directory unavailable'; END $$ LANGUAGE plpgsql",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("CREATE TRIGGER directory_down BEFORE INSERT ON directory_users FOR EACH ROW EXECUTE FUNCTION directory_down()")
        .execute(&pool)
        .await
        .unwrap();

    let result = engine.submit(&raw, FAKE_ID_TOKEN, valid_form()).await;
    assert!(matches!(result, Err(Error::Internal { .. })), "mirror failure surfaces as internal: {result:?}");

    // Compensation removed the pending row and left the token open
    assert_eq!(count_submissions(&pool, token.recipient_id).await, 0);
    assert!(fetch_token(&pool, token.id).await.used_at.is_none());

    // With the directory back, the same token submits cleanly
    sqlx::query("DROP TRIGGER directory_down ON directory_users").execute(&pool).await.unwrap();
    let receipt = engine.submit(&raw, FAKE_ID_TOKEN, valid_form()).await.expect("retry succeeds");

    let status: String = sqlx::query_scalar("SELECT status FROM submissions WHERE id = $1")
        .bind(receipt.submission_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "completed");
}

#[sqlx::test]
#[test_log::test]
async fn test_submit_otp_freshness(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let recipient = insert_recipient(&pool, "asha@example.org").await;
    let (raw, token) = mint_token(&pool, recipient, EmailType::Initial).await;
    engine.activate(&raw).await.unwrap();

    // Verified 59 minutes ago: accepted
    set_phone_verified(&pool, token.id, VERIFIED_PHONE, minutes_ago(59)).await;
    let early = engine.submit(&raw, FAKE_ID_TOKEN, valid_form()).await;
    assert!(early.is_ok(), "OTP at 59 minutes should still be fresh: {early:?}");
}

#[sqlx::test]
#[test_log::test]
async fn test_submit_otp_expired(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let recipient = insert_recipient(&pool, "asha@example.org").await;
    let (raw, token) = mint_token(&pool, recipient, EmailType::Initial).await;
    engine.activate(&raw).await.unwrap();

    set_phone_verified(&pool, token.id, VERIFIED_PHONE, minutes_ago(61)).await;
    assert!(matches!(engine.submit(&raw, FAKE_ID_TOKEN, valid_form()).await, Err(Error::OtpExpired)));
}

#[sqlx::test]
#[test_log::test]
async fn test_submit_requires_matching_verified_phone(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let recipient = insert_recipient(&pool, "asha@example.org").await;
    let (raw, token) = mint_token(&pool, recipient, EmailType::Initial).await;
    engine.activate(&raw).await.unwrap();

    // No verification at all
    assert!(matches!(engine.submit(&raw, FAKE_ID_TOKEN, valid_form()).await, Err(Error::PhoneNotVerified)));

    // Verified a different number than the one submitted
    set_phone_verified(&pool, token.id, "+919999999999", chrono::Utc::now()).await;
    assert!(matches!(engine.submit(&raw, FAKE_ID_TOKEN, valid_form()).await, Err(Error::PhoneNotVerified)));
}

#[sqlx::test]
#[test_log::test]
async fn test_submit_org_resolution(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let (raw, _token) = submit_ready_token(&pool, &engine, "asha@example.org").await;

    // Unknown registered org: no submission row may be left behind
    let mut form = valid_form();
    form.organization = OrgReference {
        ref_type: "orgs".to_string(),
        id: Some(Uuid::new_v4()),
        name: None,
        org_type: None,
    };
    assert!(matches!(engine.submit(&raw, FAKE_ID_TOKEN, form).await, Err(Error::OrgNotFound { .. })));
    let recipient_id = fetch_token(&pool, _token.id).await.recipient_id;
    assert_eq!(count_submissions(&pool, recipient_id).await, 0);

    // Unknown reference type
    let mut form = valid_form();
    form.organization.ref_type = "partners".to_string();
    assert!(matches!(engine.submit(&raw, FAKE_ID_TOKEN, form).await, Err(Error::InvalidReference { .. })));

    // Source tag disagreeing with the reference type
    let mut form = valid_form();
    form.source = Some("orgs".to_string());
    assert!(matches!(engine.submit(&raw, FAKE_ID_TOKEN, form).await, Err(Error::SourceMismatch)));

    // Seed org reference: the record's classification wins
    let seed_id = insert_seed_org(&pool, "Seed Org", "government").await;
    let mut form = valid_form();
    form.organization = OrgReference {
        ref_type: "default".to_string(),
        id: Some(seed_id),
        name: None,
        org_type: None,
    };
    let receipt = engine.submit(&raw, FAKE_ID_TOKEN, form).await.expect("seed org resolves");

    let (org_name, org_type): (String, String) = sqlx::query_as("SELECT org_name, org_type FROM submissions WHERE id = $1")
        .bind(receipt.submission_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(org_name, "Seed Org");
    assert_eq!(org_type, "government");

    // Registered org reference resolves against the other directory
    let (raw_b, token_b) = submit_ready_token(&pool, &engine, "ravi@example.org").await;
    let org_id = insert_registered_org(&pool, "Registered Org", "ngo").await;
    let mut form = valid_form();
    form.email = "ravi@example.org".to_string();
    form.phone = "+918765432109".to_string();
    form.github_url = None;
    form.organization = OrgReference {
        ref_type: "orgs".to_string(),
        id: Some(org_id),
        name: None,
        org_type: None,
    };
    set_phone_verified(&pool, token_b.id, "+918765432109", chrono::Utc::now()).await;
    let receipt = engine.submit(&raw_b, FAKE_ID_TOKEN, form).await.expect("registered org resolves");

    let org_type: String = sqlx::query_scalar("SELECT org_type FROM submissions WHERE id = $1")
        .bind(receipt.submission_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(org_type, "ngo");
}

#[sqlx::test]
#[test_log::test]
async fn test_submit_duplicate_user_conflict(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let (raw, token) = submit_ready_token(&pool, &engine, "asha@example.org").await;

    let existing: DirectoryUserId = sqlx::query_scalar(
        "INSERT INTO directory_users (full_name, email, phone, org_name, org_type) \
         VALUES ('Existing', 'asha@example.org', '+918888888888', 'Org', 'other') RETURNING id",
    )
    .fetch_one(&pool)
    .await
    .unwrap();

    match engine.submit(&raw, FAKE_ID_TOKEN, valid_form()).await {
        Err(Error::DuplicateUser { existing_id }) => assert_eq!(existing_id, existing),
        other => panic!("expected duplicate conflict, got {other:?}"),
    }

    // Nothing was committed and the token can still be retried
    assert_eq!(count_submissions(&pool, token.recipient_id).await, 0);
    assert!(fetch_token(&pool, token.id).await.used_at.is_none());
}

#[sqlx::test]
#[test_log::test]
async fn test_submit_field_length_limit(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let (raw, _token) = submit_ready_token(&pool, &engine, "asha@example.org").await;

    let mut form = valid_form();
    form.full_name = "x".repeat(101);
    match engine.submit(&raw, FAKE_ID_TOKEN, form).await {
        Err(Error::Validation { field, .. }) => assert_eq!(field, "full_name"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

// --- Deferral & opt-out ------------------------------------------------------

#[sqlx::test]
#[test_log::test]
async fn test_defer_closes_link_and_counts_attempts(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let recipient = insert_recipient(&pool, "a@example.org").await;

    for expected_attempts in 1..=3 {
        let (raw, token) = mint_token(&pool, recipient, EmailType::Initial).await;
        engine.defer(&raw).await.unwrap();
        assert_eq!(deferral_attempts(&pool, recipient).await, Some(expected_attempts));
        assert!(fetch_token(&pool, token.id).await.used_at.is_some());
    }

    // At the cap the deferral stops moving
    let (raw, _token) = mint_token(&pool, recipient, EmailType::Initial).await;
    engine.defer(&raw).await.unwrap();
    assert_eq!(deferral_attempts(&pool, recipient).await, Some(3), "attempts never exceed the cap");
}

#[sqlx::test]
#[test_log::test]
async fn test_optout_closes_everything(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let recipient = insert_recipient(&pool, "a@example.org").await;
    let (raw, token) = mint_token(&pool, recipient, EmailType::Initial).await;

    engine.opt_out(&raw, None).await.unwrap();

    assert!(fetch_token(&pool, token.id).await.used_at.is_some());
    assert_eq!(deferral_attempts(&pool, recipient).await, None);

    // Opted-out recipients cannot be re-invited
    assert!(matches!(engine.invite(recipient).await, Err(Error::OptedOut)));
}

#[sqlx::test]
#[test_log::test]
async fn test_invite_sends_and_rejects_double_invite(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let recipient = insert_recipient(&pool, "a@example.org").await;

    let token_id = engine.invite(recipient).await.expect("first invite succeeds");
    assert!(fetch_token(&pool, token_id).await.used_at.is_none());

    // The open-token uniqueness constraint rejects a second open invitation
    let second = engine.invite(recipient).await;
    assert!(matches!(second, Err(Error::Database(crate::db::errors::DbError::UniqueViolation { .. }))));
}

// --- Drafts ------------------------------------------------------------------

#[sqlx::test]
#[test_log::test]
async fn test_draft_lifecycle(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let recipient = insert_recipient(&pool, "a@example.org").await;
    let (raw, token) = mint_token(&pool, recipient, EmailType::Initial).await;
    engine.activate(&raw).await.unwrap();

    let payload = serde_json::json!({"full_name": "Asha", "city": "Pune"});
    engine.save_partial(&raw, payload.clone()).await.unwrap();

    let draft = engine.get_partial(&raw).await.unwrap();
    assert_eq!(draft.payload, payload);

    assert!(engine.delete_partial(&raw).await.unwrap());
    assert!(engine.get_partial(&raw).await.is_err());

    // Saving against an expired link is rejected
    set_activated_at(&pool, token.id, minutes_ago(11)).await;
    assert!(matches!(engine.save_partial(&raw, payload).await, Err(Error::Expired)));
}

// --- Sweeps ------------------------------------------------------------------

#[sqlx::test]
#[test_log::test]
async fn test_never_opened_sweep_defers_and_sends_fresh_link(pool: PgPool) {
    let email = test_email_service();
    let windows = test_windows();
    let recipient = insert_recipient(&pool, "a@example.org").await;
    let (_raw, token) = mint_token(&pool, recipient, EmailType::Initial).await;
    set_sent_at(&pool, token.id, hours_ago(25)).await;

    let stats = never_opened::run(&pool, &email, &windows).await.unwrap();
    assert_eq!(stats.examined, 1);
    assert_eq!(stats.deferred, 1);

    assert!(fetch_token(&pool, token.id).await.used_at.is_some(), "dead link is closed");
    assert_eq!(deferral_attempts(&pool, recipient).await, Some(1));
    assert_eq!(count_tokens(&pool, recipient, "reminder").await, 1, "fresh reminder link minted");
}

#[sqlx::test]
#[test_log::test]
async fn test_never_opened_sweep_skips_recent_tokens(pool: PgPool) {
    let email = test_email_service();
    let windows = test_windows();
    let recipient = insert_recipient(&pool, "a@example.org").await;
    let (_raw, token) = mint_token(&pool, recipient, EmailType::Initial).await;
    set_sent_at(&pool, token.id, hours_ago(23)).await;

    let stats = never_opened::run(&pool, &email, &windows).await.unwrap();
    assert_eq!(stats.examined, 0);
    assert!(fetch_token(&pool, token.id).await.used_at.is_none());
}

#[sqlx::test]
#[test_log::test]
async fn test_never_opened_sweep_absorbs_optouts_and_capped(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let email = test_email_service();
    let windows = test_windows();

    // Opted-out recipient
    let opted = insert_recipient(&pool, "opted@example.org").await;
    let (raw_opted, opted_token) = mint_token(&pool, opted, EmailType::Initial).await;
    engine.opt_out(&raw_opted, None).await.unwrap();
    // opt_out closes the token; reopen the scenario with a fresh one
    let (_raw2, opted_token2) = mint_token(&pool, opted, EmailType::Initial).await;
    set_sent_at(&pool, opted_token2.id, hours_ago(25)).await;
    let _ = opted_token;

    // Recipient with exhausted reminder history but a missing deferral row
    let capped = insert_recipient(&pool, "capped@example.org").await;
    for _ in 0..3 {
        let (_r, t) = mint_token(&pool, capped, EmailType::Reminder).await;
        close_token(&pool, t.id).await;
    }
    let (_raw3, capped_token) = mint_token(&pool, capped, EmailType::Initial).await;
    set_sent_at(&pool, capped_token.id, hours_ago(25)).await;

    let stats = never_opened::run(&pool, &email, &windows).await.unwrap();
    assert_eq!(stats.absorbed, 2);

    assert!(fetch_token(&pool, opted_token2.id).await.used_at.is_some());
    assert!(fetch_token(&pool, capped_token.id).await.used_at.is_some());
    assert_eq!(deferral_attempts(&pool, opted).await, None);
    assert_eq!(deferral_attempts(&pool, capped).await, None);
    // No new reminder beyond the historical three
    assert_eq!(count_tokens(&pool, capped, "reminder").await, 3);
}

#[sqlx::test]
#[test_log::test]
async fn test_stale_activation_sweep_defers_but_leaves_token_open(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let windows = test_windows();
    let recipient = insert_recipient(&pool, "a@example.org").await;
    let (raw, token) = mint_token(&pool, recipient, EmailType::Initial).await;
    engine.activate(&raw).await.unwrap();
    set_activated_at(&pool, token.id, minutes_ago(15)).await;

    let stats = stale_activation::run(&pool, &windows).await.unwrap();
    assert_eq!(stats.deferred, 1);

    // Contrast with the never-opened sweep: the token stays open for reopen
    assert!(fetch_token(&pool, token.id).await.used_at.is_none());
    assert_eq!(deferral_attempts(&pool, recipient).await, Some(1));
}

#[sqlx::test]
#[test_log::test]
async fn test_stale_activation_sweep_never_touches_inflight_oauth(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let windows = test_windows();
    let recipient = insert_recipient(&pool, "a@example.org").await;
    let (raw, token) = mint_token(&pool, recipient, EmailType::Initial).await;
    engine.activate(&raw).await.unwrap();
    set_activated_at(&pool, token.id, minutes_ago(15)).await;
    set_oauth_flag(&pool, token.id, true).await;

    let stats = stale_activation::run(&pool, &windows).await.unwrap();
    assert_eq!(stats.examined, 0);
    assert_eq!(deferral_attempts(&pool, recipient).await, None);
}

#[sqlx::test]
#[test_log::test]
async fn test_resend_sweep_issues_fresh_reminder_and_increments(pool: PgPool) {
    let email = test_email_service();
    let recipient = insert_recipient(&pool, "a@example.org").await;

    // Seed a deferral with one recorded attempt and an open reminder link
    sqlx::query("INSERT INTO deferrals (recipient_id, attempts) VALUES ($1, 1)")
        .bind(recipient)
        .execute(&pool)
        .await
        .unwrap();
    let (_raw, old_reminder) = mint_token(&pool, recipient, EmailType::Reminder).await;

    let stats = resend::run(&pool, &email).await.unwrap();
    assert_eq!(stats.sent, 1);

    assert_eq!(deferral_attempts(&pool, recipient).await, Some(2));
    assert_eq!(count_tokens(&pool, recipient, "reminder").await, 2);
    // The superseded reminder link is closed
    assert!(fetch_token(&pool, old_reminder.id).await.used_at.is_some());
}

#[sqlx::test]
#[test_log::test]
async fn test_resend_sweep_cleans_up_completed_and_missing_owners(pool: PgPool) {
    let engine = create_test_engine(&pool);
    let email = test_email_service();

    // Recipient who completed their submission after being deferred
    let done = insert_recipient(&pool, "done@example.org").await;
    sqlx::query("INSERT INTO deferrals (recipient_id, attempts) VALUES ($1, 1)")
        .bind(done)
        .execute(&pool)
        .await
        .unwrap();
    let (raw, token) = mint_token(&pool, done, EmailType::Initial).await;
    engine.activate(&raw).await.unwrap();
    set_phone_verified(&pool, token.id, VERIFIED_PHONE, chrono::Utc::now()).await;
    engine.submit(&raw, FAKE_ID_TOKEN, valid_form()).await.unwrap();
    // Submission already deletes the deferral; re-seed to exercise the sweep cleanup
    sqlx::query("INSERT INTO deferrals (recipient_id, attempts) VALUES ($1, 1) ON CONFLICT DO NOTHING")
        .bind(done)
        .execute(&pool)
        .await
        .unwrap();

    // Deferral whose owner vanished from the mirror
    let ghost = Uuid::new_v4();
    sqlx::query("INSERT INTO deferrals (recipient_id, attempts) VALUES ($1, 1)")
        .bind(ghost)
        .execute(&pool)
        .await
        .unwrap();

    let stats = resend::run(&pool, &email).await.unwrap();
    assert_eq!(stats.sent, 0);

    assert_eq!(deferral_attempts(&pool, done).await, None);
    assert_eq!(deferral_attempts(&pool, ghost).await, None);
}

#[sqlx::test]
#[test_log::test]
async fn test_full_reminder_scenario_runs_dry_at_the_cap(pool: PgPool) {
    // The end-to-end §never-engaged story: invitation expires unopened,
    // three reminders go out across resend cycles, then the recipient is
    // absorbed permanently and idempotently.
    let email = test_email_service();
    let windows = test_windows();
    let recipient = insert_recipient(&pool, "quiet@example.org").await;
    let (_raw, initial) = mint_token(&pool, recipient, EmailType::Initial).await;
    set_sent_at(&pool, initial.id, hours_ago(25)).await;

    // T0+24h: never-opened sweep defers and sends reminder #1
    never_opened::run(&pool, &email, &windows).await.unwrap();
    assert_eq!(deferral_attempts(&pool, recipient).await, Some(1));
    assert_eq!(count_tokens(&pool, recipient, "reminder").await, 1);

    // T0+48h: reminder #2
    resend::run(&pool, &email).await.unwrap();
    assert_eq!(deferral_attempts(&pool, recipient).await, Some(2));
    assert_eq!(count_tokens(&pool, recipient, "reminder").await, 2);

    // T0+96h: reminder #3 reaches the cap
    resend::run(&pool, &email).await.unwrap();
    assert_eq!(deferral_attempts(&pool, recipient).await, Some(3));
    assert_eq!(count_tokens(&pool, recipient, "reminder").await, 3);

    // Any further sweep absorbs without sending, and stays idempotent
    for _ in 0..2 {
        resend::run(&pool, &email).await.unwrap();
        assert_eq!(deferral_attempts(&pool, recipient).await, None);
        assert_eq!(count_tokens(&pool, recipient, "reminder").await, 3);
    }

    let open: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM email_tokens WHERE recipient_id = $1 AND used_at IS NULL")
        .bind(recipient)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(open, 0, "no open links remain after absorption");
}

#[sqlx::test]
#[test_log::test]
async fn test_retention_sweep(pool: PgPool) {
    let recipient = insert_recipient(&pool, "a@example.org").await;

    // Old terminal token
    let (_r1, old_used) = mint_token(&pool, recipient, EmailType::Initial).await;
    close_token(&pool, old_used.id).await;
    set_sent_at(&pool, old_used.id, hours_ago(91 * 24)).await;

    // Old but still-open token is retained
    let (_r2, old_open) = mint_token(&pool, recipient, EmailType::Reminder).await;
    set_sent_at(&pool, old_open.id, hours_ago(91 * 24)).await;

    let stats = retention::run(&pool, std::time::Duration::from_secs(90 * 24 * 60 * 60)).await.unwrap();
    assert_eq!(stats.tokens_deleted, 1);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM email_tokens WHERE recipient_id = $1")
        .bind(recipient)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 1);
}

// --- HTTP surface ------------------------------------------------------------

#[sqlx::test]
#[test_log::test]
async fn test_http_surface(pool: PgPool) {
    let (server, _bg) = create_test_app(pool.clone()).await;

    let health = server.get("/health").await;
    health.assert_status_ok();

    // Unknown token on activation: 404 with a JSON message
    let activate = server
        .post("/api/v1/activate")
        .json(&serde_json::json!({"token": "nope"}))
        .await;
    assert_eq!(activate.status_code().as_u16(), 404);
    let body: serde_json::Value = activate.json();
    assert!(body["message"].as_str().unwrap().contains("not valid"));

    // Validation endpoint answers 200 with a reason instead of erroring
    let validate = server.get("/api/v1/validate/nope").await;
    validate.assert_status_ok();
    let body: serde_json::Value = validate.json();
    assert_eq!(body["valid"], serde_json::json!(false));
    assert_eq!(body["reason"], serde_json::json!("not_found"));

    // Real flow: invite over HTTP, then activate with the stored secret
    let recipient = insert_recipient(&pool, "http@example.org").await;
    let invite = server
        .post("/api/v1/invitations")
        .json(&serde_json::json!({"recipient_id": recipient}))
        .await;
    invite.assert_status_ok();

    let link_token: String = sqlx::query_scalar("SELECT link_token FROM email_tokens WHERE recipient_id = $1")
        .bind(recipient)
        .fetch_one(&pool)
        .await
        .unwrap();

    let activate = server
        .post("/api/v1/activate")
        .json(&serde_json::json!({"token": link_token}))
        .await;
    activate.assert_status_ok();
    let body: serde_json::Value = activate.json();
    assert!(body["expires_at"].is_string());
}
