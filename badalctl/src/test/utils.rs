//! Shared helpers for integration tests.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    config::{Config, DirectoryConfig, EmailTransportConfig, IdentityConfig},
    db::handlers::EmailTokens,
    db::models::email_tokens::{EmailToken, EmailType},
    directory::UserDirectory,
    email::EmailService,
    identity::PhoneVerifier,
    lifecycle::{engine::FormSubmission, engine::OrgReference, LifecycleEngine, Windows},
    types::{OrgId, RecipientId, TokenId},
};

pub fn create_test_config() -> Config {
    // Use temp directory for test emails
    let temp_dir = std::env::temp_dir().join(format!("badalctl-test-emails-{}", std::process::id()));

    let mut config = Config::default();
    config.email.transport = EmailTransportConfig::File {
        path: temp_dir.to_string_lossy().to_string(),
    };
    config.portal_url = "http://localhost:3400".to_string();
    config.directory = DirectoryConfig::Colocated;
    config.identity = IdentityConfig::Disabled;
    config.sweeps.enabled = false;
    config.leader_election.enabled = false;
    config
}

pub async fn create_test_app(pool: PgPool) -> (axum_test::TestServer, crate::BackgroundServices) {
    let config = create_test_config();
    let app = crate::Application::new_with_pool(config, pool)
        .await
        .expect("Failed to create application");
    app.into_test_server()
}

/// Engine wired to a colocated directory, disabled verifier, and the file
/// email transport.
pub fn create_test_engine(pool: &PgPool) -> LifecycleEngine {
    let config = create_test_config();
    let email = std::sync::Arc::new(EmailService::new(&config).expect("email service"));
    LifecycleEngine::new(
        pool.clone(),
        UserDirectory::colocated(pool.clone()),
        PhoneVerifier::new(&config.identity).expect("verifier"),
        email,
        Windows::from_config(&config.windows),
        config.phone_country_code.clone(),
    )
}

/// Engine whose directory lives behind the remote (compensating) write path.
/// The "remote" pool points at the same test database, which is exactly the
/// point: the code path under test is the compensation logic, not the wire.
pub fn create_test_engine_remote_directory(pool: &PgPool) -> LifecycleEngine {
    let config = create_test_config();
    let email = std::sync::Arc::new(EmailService::new(&config).expect("email service"));
    LifecycleEngine::new(
        pool.clone(),
        UserDirectory::remote(pool.clone()),
        PhoneVerifier::new(&config.identity).expect("verifier"),
        email,
        Windows::from_config(&config.windows),
        config.phone_country_code.clone(),
    )
}

/// Recipient rows are owned by the external sync in production; tests seed
/// them directly.
pub async fn insert_recipient(pool: &PgPool, email: &str) -> RecipientId {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO recipients (id, email, full_name) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(email)
        .bind("Test Recipient")
        .execute(pool)
        .await
        .expect("insert recipient");
    id
}

pub async fn mint_token(pool: &PgPool, recipient_id: RecipientId, email_type: EmailType) -> (String, EmailToken) {
    let mut conn = pool.acquire().await.expect("acquire");
    EmailTokens::new(&mut conn)
        .mint_for_recipient(recipient_id, email_type)
        .await
        .expect("mint token")
}

pub async fn fetch_token(pool: &PgPool, id: TokenId) -> EmailToken {
    let mut conn = pool.acquire().await.expect("acquire");
    use crate::db::handlers::Repository;
    EmailTokens::new(&mut conn)
        .get_by_id(id)
        .await
        .expect("fetch token")
        .expect("token exists")
}

pub async fn set_sent_at(pool: &PgPool, id: TokenId, sent_at: DateTime<Utc>) {
    sqlx::query("UPDATE email_tokens SET sent_at = $2 WHERE id = $1")
        .bind(id)
        .bind(sent_at)
        .execute(pool)
        .await
        .expect("backdate sent_at");
}

pub async fn set_activated_at(pool: &PgPool, id: TokenId, activated_at: DateTime<Utc>) {
    sqlx::query("UPDATE email_tokens SET activated_at = $2 WHERE id = $1")
        .bind(id)
        .bind(activated_at)
        .execute(pool)
        .await
        .expect("backdate activated_at");
}

pub async fn set_oauth_flag(pool: &PgPool, id: TokenId, in_progress: bool) {
    sqlx::query("UPDATE email_tokens SET oauth_in_progress = $2 WHERE id = $1")
        .bind(id)
        .bind(in_progress)
        .execute(pool)
        .await
        .expect("set oauth flag");
}

/// Stamp a verified phone as of `verified_at`.
pub async fn set_phone_verified(pool: &PgPool, id: TokenId, phone: &str, verified_at: DateTime<Utc>) {
    sqlx::query("UPDATE email_tokens SET verified_phone = $2, phone_verified_at = $3 WHERE id = $1")
        .bind(id)
        .bind(phone)
        .bind(verified_at)
        .execute(pool)
        .await
        .expect("set verified phone");
}

pub async fn close_token(pool: &PgPool, id: TokenId) {
    sqlx::query("UPDATE email_tokens SET used_at = now(), status = 'used' WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .expect("close token");
}

pub async fn insert_registered_org(pool: &PgPool, name: &str, org_type: &str) -> OrgId {
    sqlx::query_scalar::<_, Uuid>("INSERT INTO organizations (name, org_type) VALUES ($1, $2) RETURNING id")
        .bind(name)
        .bind(org_type)
        .fetch_one(pool)
        .await
        .expect("insert organization")
}

pub async fn insert_seed_org(pool: &PgPool, name: &str, org_type: &str) -> OrgId {
    sqlx::query_scalar::<_, Uuid>("INSERT INTO seed_organizations (name, org_type) VALUES ($1, $2) RETURNING id")
        .bind(name)
        .bind(org_type)
        .fetch_one(pool)
        .await
        .expect("insert seed organization")
}

pub async fn deferral_attempts(pool: &PgPool, recipient_id: RecipientId) -> Option<i32> {
    sqlx::query_scalar::<_, i32>("SELECT attempts FROM deferrals WHERE recipient_id = $1")
        .bind(recipient_id)
        .fetch_optional(pool)
        .await
        .expect("fetch deferral")
}

pub async fn count_tokens(pool: &PgPool, recipient_id: RecipientId, email_type: &str) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM email_tokens WHERE recipient_id = $1 AND email_type = $2")
        .bind(recipient_id)
        .bind(email_type)
        .fetch_one(pool)
        .await
        .expect("count tokens")
}

pub async fn count_submissions(pool: &PgPool, recipient_id: RecipientId) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM submissions WHERE recipient_id = $1")
        .bind(recipient_id)
        .fetch_one(pool)
        .await
        .expect("count submissions")
}

/// A submission form that passes every engine check once the phone
/// `+919876543210` has been verified on the token.
pub fn valid_form() -> FormSubmission {
    FormSubmission {
        full_name: "Asha Rao".to_string(),
        email: "asha@example.org".to_string(),
        phone: "+91 98765 43210".to_string(),
        github_url: Some("https://github.com/asharao".to_string()),
        city: Some("Pune".to_string()),
        tech_stack: vec!["Rust".to_string(), "Postgres".to_string()],
        organization: OrgReference {
            ref_type: "custom".to_string(),
            id: None,
            name: Some("Open Data Collective".to_string()),
            org_type: Some("community".to_string()),
        },
        source: None,
    }
}

pub const VERIFIED_PHONE: &str = "+919876543210";

/// A structurally valid provider ID token (JWT-shaped, unverifiable).
pub const FAKE_ID_TOKEN: &str = "eyJhbGciOiJSUzI1NiJ9.eyJzdWIiOiJ0ZXN0In0.sig";

pub fn hours_ago(hours: i64) -> DateTime<Utc> {
    Utc::now() - Duration::hours(hours)
}

pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(minutes)
}
