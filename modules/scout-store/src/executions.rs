use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use scout_common::{Execution, ExecutionStatus, RecentFinding, EMBEDDING_DIM};

/// Outcome of the atomic running-claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller owns the new running execution.
    Claimed(Uuid),
    /// Another execution is already running for this scout.
    AlreadyRunning(Uuid),
}

/// Insert a `running` execution unconditionally. Fails on the partial
/// unique index if one is already running; callers that want a 409-style
/// refusal use `try_claim_running` instead.
pub async fn create_running(pool: &PgPool, scout_id: Uuid) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO scout_executions (id, scout_id, status, created_at) VALUES ($1, $2, 'running', now())",
    )
    .bind(id)
    .bind(scout_id)
    .execute(pool)
    .await?;
    Ok(id)
}

/// Insert a `running` execution only if none exists for this scout.
/// The check-then-insert is a single statement against the partial unique
/// index, so concurrent claimers serialize in the database.
pub async fn try_claim_running(pool: &PgPool, scout_id: Uuid) -> Result<ClaimOutcome> {
    let id = Uuid::new_v4();
    let inserted: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO scout_executions (id, scout_id, status, created_at)
        VALUES ($1, $2, 'running', now())
        ON CONFLICT (scout_id) WHERE status = 'running' DO NOTHING
        RETURNING id
        "#,
    )
    .bind(id)
    .bind(scout_id)
    .fetch_optional(pool)
    .await?;

    if let Some((claimed,)) = inserted {
        return Ok(ClaimOutcome::Claimed(claimed));
    }

    // Lost the race: report the holder. If the holder finished in the
    // meantime, the slot is free again and a plain insert claims it.
    match find_running(pool, scout_id).await? {
        Some(existing) => Ok(ClaimOutcome::AlreadyRunning(existing)),
        None => Ok(ClaimOutcome::Claimed(create_running(pool, scout_id).await?)),
    }
}

pub async fn find_running(pool: &PgPool, scout_id: Uuid) -> Result<Option<Uuid>> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM scout_executions WHERE scout_id = $1 AND status = 'running'",
    )
    .bind(scout_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.0))
}

/// Terminal fields written exactly once per execution.
#[derive(Debug, Default)]
pub struct FinishFields {
    pub results_summary: Option<serde_json::Value>,
    pub summary_text: Option<String>,
    pub summary_embedding: Option<Vec<f32>>,
    pub error_message: Option<String>,
    pub duplicate_of: Option<Uuid>,
}

/// Transition a running execution to `completed` or `failed`. The
/// `status = 'running'` guard makes the transition single-shot.
pub async fn finish_execution(
    pool: &PgPool,
    execution_id: Uuid,
    status: ExecutionStatus,
    fields: FinishFields,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE scout_executions
        SET status = $2,
            completed_at = now(),
            results_summary = $3,
            summary_text = $4,
            summary_embedding = $5,
            error_message = $6,
            duplicate_of = $7
        WHERE id = $1 AND status = 'running'
        "#,
    )
    .bind(execution_id)
    .bind(status.as_str())
    .bind(fields.results_summary)
    .bind(fields.summary_text)
    .bind(fields.summary_embedding)
    .bind(fields.error_message)
    .bind(fields.duplicate_of)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        warn!(execution_id = %execution_id, "finish_execution found no running row (already finalized?)");
    }
    Ok(())
}

/// Last `limit` completed executions of a scout that carry a valid
/// EMBEDDING_DIM-length vector, newest first. Rows with a wrong-dimension
/// vector are skipped (and logged), never treated as zero-similarity.
pub async fn list_recent_completed_with_embedding(
    pool: &PgPool,
    scout_id: Uuid,
    limit: i64,
) -> Result<Vec<RecentFinding>> {
    let rows: Vec<(Uuid, Option<String>, Vec<f32>, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT id, summary_text, summary_embedding, completed_at
        FROM scout_executions
        WHERE scout_id = $1
          AND status = 'completed'
          AND summary_embedding IS NOT NULL
          AND completed_at IS NOT NULL
        ORDER BY completed_at DESC
        LIMIT $2
        "#,
    )
    .bind(scout_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(id, summary, embedding, completed_at)| {
            if embedding.len() != EMBEDDING_DIM {
                warn!(
                    execution_id = %id,
                    dim = embedding.len(),
                    "Stored embedding has wrong dimension, skipping"
                );
                return None;
            }
            Some(RecentFinding {
                execution_id: id,
                summary_text: summary.unwrap_or_default(),
                embedding,
                completed_at,
            })
        })
        .collect())
}

type ExecutionRow = (
    Uuid,                      // id
    Uuid,                      // scout_id
    String,                    // status
    DateTime<Utc>,             // created_at
    Option<DateTime<Utc>>,     // completed_at
    Option<String>,            // error_message
    Option<serde_json::Value>, // results_summary
    Option<String>,            // summary_text
    Option<Vec<f32>>,          // summary_embedding
    Option<Uuid>,              // duplicate_of
);

fn row_to_execution(r: ExecutionRow) -> Option<Execution> {
    let status = match ExecutionStatus::parse(&r.2) {
        Some(s) => s,
        None => {
            warn!(execution_id = %r.0, status = %r.2, "Execution row has unknown status, skipping");
            return None;
        }
    };
    Some(Execution {
        id: r.0,
        scout_id: r.1,
        status,
        created_at: r.3,
        completed_at: r.4,
        error_message: r.5,
        results_summary: r.6,
        summary_text: r.7,
        summary_embedding: r.8,
        duplicate_of: r.9,
    })
}

/// Run history for a scout, newest first.
pub async fn list_executions(pool: &PgPool, scout_id: Uuid, limit: i64) -> Result<Vec<Execution>> {
    let rows: Vec<ExecutionRow> = sqlx::query_as(
        r#"
        SELECT id, scout_id, status, created_at, completed_at, error_message,
               results_summary, summary_text, summary_embedding, duplicate_of
        FROM scout_executions
        WHERE scout_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(scout_id)
    .bind(limit.min(100))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().filter_map(row_to_execution).collect())
}

/// Mark `running` rows older than `older_than` as failed with reason
/// `stale`. Keeps a crashed executor from blocking all future runs of its
/// scout. Returns the number of rows reclaimed.
pub async fn reap_stale_running(
    pool: &PgPool,
    now: DateTime<Utc>,
    older_than: Duration,
) -> Result<u64> {
    let cutoff = now - older_than;
    let result = sqlx::query(
        r#"
        UPDATE scout_executions
        SET status = 'failed', completed_at = now(), error_message = 'stale'
        WHERE status = 'running' AND created_at < $1
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
