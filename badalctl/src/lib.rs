//! # badalctl: The Badal Onboarding Layer
//!
//! `badalctl` is the backend for the Badal community program's contributor
//! onboarding portal. It owns the token-gated form lifecycle: every
//! outbound invitation email carries an opaque link token whose activation,
//! phone verification, submission, deferral and expiry are coordinated
//! here, together with the cron-style sweeps that chase non-responsive
//! recipients with attempt-capped reminders.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for
//! the HTTP layer and uses PostgreSQL for persistence. Finalized
//! submissions are mirrored into a separate "production" user directory
//! which either shares the engagement database (colocated) or lives in its
//! own (remote); the submission path picks transactional or compensating
//! writes accordingly.
//!
//! ### Request Flow
//!
//! A request to `/api/v1/*` reaches a handler which delegates to the
//! [`lifecycle::LifecycleEngine`]. The engine runs its checks and writes
//! through repository types ([`db::handlers`]) inside short transactions,
//! calls out to the phone-verification adapter ([`identity`]) and the email
//! service ([`email`]) with bounded timeouts, and maps every failure to a
//! stable error shape ([`errors::Error`]).
//!
//! ### Background Services
//!
//! The sweep scheduler ([`sweeps::SweepScheduler`]) runs alongside the HTTP
//! server: stale-activation, never-opened, deferred-resend and retention
//! passes on fixed cadences. In multi-replica deployments a PostgreSQL
//! advisory lock elects the single replica that runs them
//! ([`leader_election`]).
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use badalctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = badalctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     badalctl::telemetry::init_telemetry();
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod directory;
pub mod email;
pub mod errors;
pub mod identity;
mod leader_election;
pub mod lifecycle;
mod openapi;
pub mod phone;
pub mod sweeps;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::{routing::get, routing::post, Json, Router};
use bon::Builder;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    api::handlers::{engagement, form},
    config::{DirectoryConfig, PoolSettings},
    directory::UserDirectory,
    email::EmailService,
    identity::PhoneVerifier,
    lifecycle::{LifecycleEngine, Windows},
    sweeps::SweepScheduler,
};

pub use config::Config;

/// Shared application state passed to all request handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub engine: Arc<LifecycleEngine>,
}

/// Get the badalctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the HTTP router: the `/api/v1` surface, health, and Scalar docs.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/activate", post(form::activate))
        .route("/validate/{token}", get(form::validate))
        .route("/verify-phone", post(form::verify_phone))
        .route("/submit", post(form::submit))
        .route("/oauth-state", post(form::oauth_state))
        .route("/save-partial", post(form::save_partial))
        .route("/partial/{token}", get(form::get_partial).delete(form::delete_partial))
        .route("/invitations", post(engagement::invite))
        .route("/defer", post(engagement::defer))
        .route("/optout", post(engagement::optout))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/docs", openapi::ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Container for background services and their lifecycle management.
///
/// Wraps the sweep scheduler loops and (when enabled) the leader election
/// task. When dropped, the `drop_guard` cancels the shutdown token,
/// signaling all tasks to stop.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: tokio_util::sync::CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<tokio_util::sync::DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();
        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// Setup background services (sweep scheduler, leader election)
fn setup_background_services(
    pool: PgPool,
    email: Arc<EmailService>,
    config: Config,
    shutdown_token: tokio_util::sync::CancellationToken,
) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();

    // Without leader election every replica considers itself the leader.
    let is_leader = Arc::new(AtomicBool::new(!config.leader_election.enabled));

    if config.leader_election.enabled {
        let election_pool = pool.clone();
        let election_flag = is_leader.clone();
        let election_shutdown = shutdown_token.clone();
        background_tasks.push(tokio::spawn(async move {
            leader_election::leader_election_task(
                election_pool,
                election_flag,
                leader_election::SWEEP_LEADER_LOCK_ID,
                election_shutdown,
            )
            .await;
        }));
    } else {
        info!("Leader election disabled: running sweeps on this replica");
    }

    if config.sweeps.enabled {
        let windows = Windows::from_config(&config.windows);
        let scheduler = SweepScheduler::new(pool, email, config.sweeps.clone(), windows, is_leader);
        background_tasks.extend(scheduler.spawn(shutdown_token.clone()));
    } else {
        info!("Sweep scheduler disabled by configuration");
    }

    BackgroundServices {
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

fn pool_options(settings: &PoolSettings) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout)
}

/// Connect pools and build the user directory according to its configured
/// mode. This is where the transaction capability is decided.
async fn setup_directory(config: &Config, pool: &PgPool) -> anyhow::Result<UserDirectory> {
    match &config.directory {
        DirectoryConfig::Colocated => Ok(UserDirectory::colocated(pool.clone())),
        DirectoryConfig::Remote { url, pool: settings } => {
            let directory_pool = pool_options(settings).connect(url).await?;
            Ok(UserDirectory::remote(directory_pool))
        }
    }
}

pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting onboarding layer with configuration: {:#?}", config);

        let pool = pool_options(&config.database.pool).connect(config.effective_database_url()).await?;
        migrator().run(&pool).await?;

        Self::new_with_pool(config, pool).await
    }

    /// Create an application on an already-connected pool (tests supply the
    /// pool; migrations are assumed to have run).
    pub async fn new_with_pool(config: Config, pool: PgPool) -> anyhow::Result<Self> {
        let directory = setup_directory(&config, &pool).await?;
        let verifier = PhoneVerifier::new(&config.identity).map_err(|e| anyhow::anyhow!("{e}"))?;
        let email = Arc::new(EmailService::new(&config).map_err(|e| anyhow::anyhow!("{e}"))?);

        let engine = Arc::new(LifecycleEngine::new(
            pool.clone(),
            directory,
            verifier,
            email.clone(),
            Windows::from_config(&config.windows),
            config.phone_country_code.clone(),
        ));

        let shutdown_token = tokio_util::sync::CancellationToken::new();
        let bg_services = setup_background_services(pool.clone(), email, config.clone(), shutdown_token);

        let state = AppState::builder().db(pool.clone()).config(config.clone()).engine(engine).build();
        let router = build_router(state);

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Onboarding layer listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Shutdown background services and wait for tasks to complete
        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}
