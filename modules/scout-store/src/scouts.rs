use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use scout_common::{Frequency, Scout, ScoutLocation, ScrapeOptions};

/// Consecutive failures at which a scout is deactivated.
pub const DEACTIVATION_THRESHOLD: i32 = 3;

type ScoutRow = (
    Uuid,                      // id
    Uuid,                      // user_id
    String,                    // title
    String,                    // goal
    String,                    // description
    serde_json::Value,         // queries
    Option<serde_json::Value>, // location
    String,                    // frequency
    Option<serde_json::Value>, // scrape_options
    bool,                      // is_active
    Option<DateTime<Utc>>,     // last_run_at
    i32,                       // consecutive_failures
);

const SCOUT_COLUMNS: &str = "id, user_id, title, goal, description, queries, location, \
     frequency, scrape_options, is_active, last_run_at, consecutive_failures";

fn row_to_scout(r: ScoutRow) -> Option<Scout> {
    let frequency = match Frequency::parse(&r.7) {
        Some(f) => f,
        None => {
            warn!(scout_id = %r.0, frequency = %r.7, "Scout has unknown frequency, skipping");
            return None;
        }
    };
    let queries: Vec<String> = serde_json::from_value(r.5).unwrap_or_default();
    let location: Option<ScoutLocation> = r.6.and_then(|v| serde_json::from_value(v).ok());
    let scrape_options: Option<ScrapeOptions> = r.8.and_then(|v| serde_json::from_value(v).ok());

    Some(Scout {
        id: r.0,
        user_id: r.1,
        title: r.2,
        goal: r.3,
        description: r.4,
        queries,
        location,
        frequency,
        scrape_options,
        is_active: r.9,
        last_run_at: r.10,
        consecutive_failures: r.11,
    })
}

pub async fn get_scout(pool: &PgPool, id: Uuid) -> Result<Option<Scout>> {
    let row = sqlx::query_as::<_, ScoutRow>(&format!(
        "SELECT {SCOUT_COLUMNS} FROM scouts WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.and_then(row_to_scout))
}

/// Every scout that is active, configuration-complete, and due at `now`.
/// Due-ness is a pure predicate on the scout (`Scout::is_due`); the SQL
/// pre-filters to active rows only.
pub async fn list_due_scouts(pool: &PgPool, now: DateTime<Utc>, batch_cap: usize) -> Result<Vec<Scout>> {
    let rows = sqlx::query_as::<_, ScoutRow>(&format!(
        "SELECT {SCOUT_COLUMNS} FROM scouts WHERE is_active ORDER BY last_run_at ASC NULLS FIRST"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(row_to_scout)
        .filter(|s| s.is_due(now))
        .take(batch_cap)
        .collect())
}

/// Result of the post-run counter update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostRunOutcome {
    pub consecutive_failures: i32,
    pub is_active: bool,
}

/// Stamp `last_run_at` and update the failure counter. A successful run
/// resets the counter; a failed run increments it and deactivates the
/// scout once it reaches the threshold.
pub async fn update_scout_post_run(
    pool: &PgPool,
    scout_id: Uuid,
    last_run_at: DateTime<Utc>,
    success: bool,
) -> Result<PostRunOutcome> {
    let row: (i32, bool) = if success {
        sqlx::query_as(
            r#"
            UPDATE scouts
            SET last_run_at = $2, consecutive_failures = 0, updated_at = now()
            WHERE id = $1
            RETURNING consecutive_failures, is_active
            "#,
        )
        .bind(scout_id)
        .bind(last_run_at)
        .fetch_one(pool)
        .await?
    } else {
        sqlx::query_as(
            r#"
            UPDATE scouts
            SET last_run_at = $2,
                consecutive_failures = consecutive_failures + 1,
                is_active = is_active AND (consecutive_failures + 1 < $3),
                updated_at = now()
            WHERE id = $1
            RETURNING consecutive_failures, is_active
            "#,
        )
        .bind(scout_id)
        .bind(last_run_at)
        .bind(DEACTIVATION_THRESHOLD)
        .fetch_one(pool)
        .await?
    };

    Ok(PostRunOutcome {
        consecutive_failures: row.0,
        is_active: row.1,
    })
}

/// Deactivate every scout a user owns. Used by the 402 payment-failure
/// path to stop credit thrash. Returns the number of scouts deactivated.
pub async fn disable_all_user_scouts(pool: &PgPool, user_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE scouts SET is_active = false, updated_at = now() WHERE user_id = $1 AND is_active",
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
