use anyhow::Result;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use scout_common::{ExecutionStep, StepStatus, StepType};

/// Insert a step in `running` state, before the external call it records.
pub async fn append_step(
    pool: &PgPool,
    execution_id: Uuid,
    step_number: i32,
    step_type: StepType,
    description: &str,
    input_data: Option<serde_json::Value>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO scout_execution_steps
            (execution_id, step_number, step_type, description, input_data, status, created_at)
        VALUES ($1, $2, $3, $4, $5, 'running', now())
        "#,
    )
    .bind(execution_id)
    .bind(step_number)
    .bind(step_type.as_str())
    .bind(description)
    .bind(input_data)
    .execute(pool)
    .await?;
    Ok(())
}

/// The step trace of one execution, in step order.
pub async fn list_steps(pool: &PgPool, execution_id: Uuid) -> Result<Vec<ExecutionStep>> {
    let rows: Vec<(
        Uuid,
        i32,
        String,
        String,
        Option<serde_json::Value>,
        Option<serde_json::Value>,
        Option<String>,
        String,
    )> = sqlx::query_as(
        r#"
        SELECT execution_id, step_number, step_type, description,
               input_data, output_data, error_message, status
        FROM scout_execution_steps
        WHERE execution_id = $1
        ORDER BY step_number ASC
        "#,
    )
    .bind(execution_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|r| {
            let (Some(step_type), Some(status)) = (StepType::parse(&r.2), StepStatus::parse(&r.7))
            else {
                warn!(execution_id = %r.0, step_number = r.1, "Step row has unknown type or status");
                return None;
            };
            Some(ExecutionStep {
                execution_id: r.0,
                step_number: r.1,
                step_type,
                description: r.3,
                input_data: r.4,
                output_data: r.5,
                error_message: r.6,
                status,
            })
        })
        .collect())
}

#[derive(Debug, Default)]
pub struct StepFinish {
    pub output_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

/// Finalize a step with its output or error.
pub async fn update_step(
    pool: &PgPool,
    execution_id: Uuid,
    step_number: i32,
    status: StepStatus,
    fields: StepFinish,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE scout_execution_steps
        SET status = $3, output_data = $4, error_message = $5
        WHERE execution_id = $1 AND step_number = $2
        "#,
    )
    .bind(execution_id)
    .bind(step_number)
    .bind(status.as_str())
    .bind(fields.output_data)
    .bind(fields.error_message)
    .execute(pool)
    .await?;
    Ok(())
}
