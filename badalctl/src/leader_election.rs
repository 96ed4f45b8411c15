//! Background task for leader election.
//!
//! Sweeps must only run on one replica at a time. Leadership is a
//! PostgreSQL advisory lock: session-based, so a dedicated connection is
//! held for the entire duration of leadership and losing the connection
//! loses the lock.

use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Advisory lock id for sweep leadership ("BDLSWEEP" in ASCII hex).
pub const SWEEP_LEADER_LOCK_ID: i64 = 0x4244_4C53_5745_4550_i64;

/// Maintain (or attempt to acquire) sweep leadership until shutdown.
///
/// The `is_leader` flag is the only output; sweep loops read it before each
/// pass rather than being started and stopped on transitions.
#[instrument(skip_all)]
pub async fn leader_election_task(pool: PgPool, is_leader: Arc<AtomicBool>, lock_id: i64, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
    let mut leader_conn: Option<sqlx::pool::PoolConnection<sqlx::Postgres>> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Leader election shutting down");
                // Dropping the connection releases the advisory lock
                is_leader.store(false, Ordering::Relaxed);
                break;
            }
            _ = interval.tick() => {}
        }

        let currently_leader = is_leader.load(Ordering::Relaxed);

        if !currently_leader {
            // Try to acquire a connection and the lock
            match pool.acquire().await {
                Ok(mut conn) => {
                    match sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1)")
                        .bind(lock_id)
                        .fetch_one(&mut *conn)
                        .await
                    {
                        Ok(true) => {
                            info!("Gained sweep leadership");
                            is_leader.store(true, Ordering::Relaxed);
                            leader_conn = Some(conn); // Keep connection alive
                        }
                        Ok(false) => {
                            debug!("Another replica leads - will retry");
                        }
                        Err(e) => {
                            tracing::error!("Failed to check leader lock: {}", e);
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to acquire connection for leader election: {}", e);
                }
            }
        } else if let Some(conn) = leader_conn.as_mut() {
            // Ping the connection; if it died the advisory lock is gone
            match sqlx::query("SELECT 1").execute(&mut **conn).await {
                Ok(_) => {
                    debug!("Sweep leadership renewed (connection alive)");
                }
                Err(e) => {
                    tracing::warn!("Lost sweep leadership (connection died): {}", e);
                    is_leader.store(false, Ordering::Relaxed);
                    leader_conn = None;
                }
            }
        } else {
            tracing::error!("Inconsistent state: is_leader=true but no connection");
            is_leader.store(false, Ordering::Relaxed);
        }
    }
}
