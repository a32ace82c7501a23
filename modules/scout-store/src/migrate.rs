use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

/// Idempotent schema setup, run once at startup.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS scouts (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            goal TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            queries JSONB NOT NULL DEFAULT '[]',
            location JSONB,
            frequency TEXT NOT NULL DEFAULT 'daily',
            scrape_options JSONB,
            is_active BOOLEAN NOT NULL DEFAULT false,
            last_run_at TIMESTAMPTZ,
            consecutive_failures INT NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_scouts_user ON scouts (user_id)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS scout_executions (
            id UUID PRIMARY KEY,
            scout_id UUID NOT NULL REFERENCES scouts (id) ON DELETE CASCADE,
            status TEXT NOT NULL DEFAULT 'running',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            completed_at TIMESTAMPTZ,
            error_message TEXT,
            results_summary JSONB,
            summary_text TEXT,
            summary_embedding REAL[],
            duplicate_of UUID
        )
        "#,
        // The at-most-one-running invariant: enforced by the database so it
        // holds across processes and executor crashes.
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uq_executions_one_running
            ON scout_executions (scout_id) WHERE status = 'running'
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_executions_scout_completed
            ON scout_executions (scout_id, completed_at DESC)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS scout_execution_steps (
            execution_id UUID NOT NULL REFERENCES scout_executions (id) ON DELETE CASCADE,
            step_number INT NOT NULL,
            step_type TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            input_data JSONB,
            output_data JSONB,
            error_message TEXT,
            status TEXT NOT NULL DEFAULT 'running',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (execution_id, step_number)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS user_preferences (
            user_id UUID PRIMARY KEY,
            notification_email TEXT,
            search_api_key TEXT,
            search_key_status TEXT NOT NULL DEFAULT 'active',
            search_key_invalid_reason TEXT,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    ];

    for ddl in statements {
        sqlx::query(ddl).execute(pool).await?;
    }

    info!("Store migrations applied");
    Ok(())
}
