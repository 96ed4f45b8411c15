//! Background scheduler for the expiry/resend sweeps.
//!
//! Runs as a set of interval loops alongside the HTTP server. Each loop
//! checks the leadership flag before doing work, so in multi-replica
//! deployments only the elected leader touches the shared records. Sweep
//! errors are logged and the loop keeps its cadence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    config::SweepsConfig,
    email::EmailService,
    lifecycle::Windows,
    sweeps::{never_opened, resend, retention, stale_activation},
};

#[derive(Clone)]
pub struct SweepScheduler {
    pool: PgPool,
    email: Arc<EmailService>,
    config: SweepsConfig,
    windows: Windows,
    is_leader: Arc<AtomicBool>,
}

impl SweepScheduler {
    pub fn new(pool: PgPool, email: Arc<EmailService>, config: SweepsConfig, windows: Windows, is_leader: Arc<AtomicBool>) -> Self {
        Self {
            pool,
            email,
            config,
            windows,
            is_leader,
        }
    }

    /// Spawn one interval loop per sweep. Handles are returned so the host
    /// can await them during graceful shutdown.
    pub fn spawn(self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        {
            let scheduler = self.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                scheduler
                    .run_loop("stale_activation", scheduler.config.stale_activation_interval, shutdown, |s| async move {
                        stale_activation::run(&s.pool, &s.windows).await.map(|_| ())
                    })
                    .await;
            }));
        }

        {
            let scheduler = self.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                scheduler
                    .run_loop("never_opened", scheduler.config.never_opened_interval, shutdown, |s| async move {
                        never_opened::run(&s.pool, &s.email, &s.windows).await.map(|_| ())
                    })
                    .await;
            }));
        }

        {
            let scheduler = self.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                scheduler
                    .run_loop("resend", scheduler.config.resend_interval, shutdown, |s| async move {
                        resend::run(&s.pool, &s.email).await.map(|_| ())
                    })
                    .await;
            }));
        }

        {
            let scheduler = self.clone();
            let retention_age = self.config.retention_age;
            handles.push(tokio::spawn(async move {
                scheduler
                    .run_loop("retention", scheduler.config.retention_interval, shutdown, move |s| async move {
                        retention::run(&s.pool, retention_age).await.map(|_| ())
                    })
                    .await;
            }));
        }

        handles
    }

    async fn run_loop<F, Fut>(&self, name: &'static str, period: Duration, shutdown: CancellationToken, sweep: F)
    where
        F: Fn(SweepScheduler) -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<()>>,
    {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("sweep loop {name} shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if !self.is_leader.load(Ordering::Relaxed) {
                        tracing::debug!("skipping sweep {name}: not the leader");
                        continue;
                    }
                    if let Err(e) = sweep(self.clone()).await {
                        tracing::error!("sweep {name} failed: {e:#}");
                    }
                }
            }
        }
    }
}
