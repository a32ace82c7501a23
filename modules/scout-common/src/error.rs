use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scout {0} not found")]
    ScoutNotFound(Uuid),

    #[error("Scout is not active")]
    ScoutInactive,

    #[error("Scout configuration is incomplete: {0}")]
    IncompleteScout(String),

    #[error("No search API key on file. Add your key in settings to run scouts.")]
    MissingCredential,

    #[error("Search credits exhausted. Add your own API key in settings to keep your scouts running.")]
    CreditsExhausted,

    #[error("An execution is already in progress for this scout")]
    ExecutionInProgress { execution_id: Uuid },

    #[error("Model call failed: {0}")]
    Llm(String),

    #[error("Too many consecutive tool errors: {0}")]
    ConsecutiveToolErrors(String),

    #[error("Execution exceeded the wall-clock limit")]
    WallClockExceeded,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl ScoutError {
    /// True when the message should be shown to the scout's owner as-is,
    /// rather than a generic "run failed" line.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            ScoutError::MissingCredential
                | ScoutError::CreditsExhausted
                | ScoutError::IncompleteScout(_)
        )
    }
}
