//! Periodic coordination: the minute dispatcher that fans due scouts out
//! to isolated executor invocations, and the reaper that reclaims stuck
//! running rows.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tracing::{error, info};

use scout_common::ScoutError;
use scout_runner::executor::EXECUTOR_WALL_LIMIT;
use scout_runner::Executor;

const DISPATCH_INTERVAL: Duration = Duration::from_secs(60);
const REAP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Dispatcher never caps fan-out; this bound only protects the store
/// query. Scout-level serialization is the natural limiter.
const DISPATCH_BATCH_CAP: usize = 1000;

/// Start the minute dispatcher. Each tick selects due scouts and fires one
/// independent task per scout; a failing invocation affects nothing else.
pub fn spawn_dispatcher(pool: PgPool, executor: Arc<Executor>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(DISPATCH_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;

            let due = match scout_store::list_due_scouts(&pool, Utc::now(), DISPATCH_BATCH_CAP).await
            {
                Ok(scouts) => scouts,
                Err(e) => {
                    error!(error = %e, "Dispatcher failed to list due scouts");
                    continue;
                }
            };

            if due.is_empty() {
                continue;
            }
            info!(count = due.len(), "Dispatching due scouts");

            for scout in due {
                let executor = executor.clone();
                tokio::spawn(async move {
                    match executor.execute_scout(scout.id).await {
                        Ok(_) => {}
                        // Lost the claim to a concurrent invocation; the
                        // running execution is the source of truth.
                        Err(ScoutError::ExecutionInProgress { .. }) => {}
                        Err(e) => {
                            error!(scout_id = %scout.id, error = %e, "Dispatched run failed");
                        }
                    }
                });
            }
        }
    });
}

/// Start the 5-minute reaper. Rows running longer than twice the executor
/// wall limit belong to crashed invocations.
pub fn spawn_reaper(pool: PgPool) {
    let older_than = chrono::Duration::from_std(EXECUTOR_WALL_LIMIT * 2)
        .expect("wall limit fits in chrono::Duration");

    tokio::spawn(async move {
        let mut tick = tokio::time::interval(REAP_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;

            match scout_store::reap_stale_running(&pool, Utc::now(), older_than).await {
                Ok(0) => {}
                Ok(reaped) => {
                    info!(reaped, "Stale executions reclaimed");
                }
                Err(e) => {
                    error!(error = %e, "Reaper failed");
                }
            }
        }
    });
}
