// Trait abstractions for the agent loop's dependencies.
//
// ChatModel wraps the LLM client, WebFetcher the search/scrape provider,
// StepSink the execution-trace writer, CredentialEvents the 401/402 side
// effects. These enable deterministic loop tests with mock implementations:
// no network, no database.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use ai_client::{ChatMessage, ChatRequest, LlmClient};
use scout_common::{StepStatus, StepType};

use crate::webclient::{
    ScrapeOutput, ScrapeRequest, SearchOutput, SearchRequest, ToolError,
};

// ---------------------------------------------------------------------------
// ChatModel
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// One chat completion over the full conversation history.
    async fn chat(&self, request: ChatRequest) -> Result<ChatMessage>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatMessage> {
        LlmClient::chat(self, request).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        LlmClient::embed(self, text).await
    }
}

// ---------------------------------------------------------------------------
// WebFetcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait WebFetcher: Send + Sync {
    async fn search(&self, request: SearchRequest) -> Result<SearchOutput, ToolError>;

    async fn scrape(&self, request: ScrapeRequest) -> Result<ScrapeOutput, ToolError>;
}

// ---------------------------------------------------------------------------
// StepSink
// ---------------------------------------------------------------------------

/// Persists the execution trace. Implementations log-and-swallow their own
/// write failures: a trace hiccup never kills a run.
#[async_trait]
pub trait StepSink: Send + Sync {
    async fn append(
        &self,
        execution_id: Uuid,
        step_number: i32,
        step_type: StepType,
        description: &str,
        input_data: Option<serde_json::Value>,
    );

    async fn finish(
        &self,
        execution_id: Uuid,
        step_number: i32,
        status: StepStatus,
        output_data: Option<serde_json::Value>,
        error_message: Option<String>,
    );
}

/// Postgres-backed step sink.
pub struct PgSteps {
    pool: PgPool,
}

impl PgSteps {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StepSink for PgSteps {
    async fn append(
        &self,
        execution_id: Uuid,
        step_number: i32,
        step_type: StepType,
        description: &str,
        input_data: Option<serde_json::Value>,
    ) {
        if let Err(e) = scout_store::append_step(
            &self.pool,
            execution_id,
            step_number,
            step_type,
            description,
            input_data,
        )
        .await
        {
            warn!(execution_id = %execution_id, step_number, error = %e, "Failed to append step");
        }
    }

    async fn finish(
        &self,
        execution_id: Uuid,
        step_number: i32,
        status: StepStatus,
        output_data: Option<serde_json::Value>,
        error_message: Option<String>,
    ) {
        if let Err(e) = scout_store::update_step(
            &self.pool,
            execution_id,
            step_number,
            status,
            scout_store::StepFinish {
                output_data,
                error_message,
            },
        )
        .await
        {
            warn!(execution_id = %execution_id, step_number, error = %e, "Failed to finalize step");
        }
    }
}

/// No-op sink for loop tests.
pub struct NoopSteps;

#[async_trait]
impl StepSink for NoopSteps {
    async fn append(
        &self,
        _execution_id: Uuid,
        _step_number: i32,
        _step_type: StepType,
        _description: &str,
        _input_data: Option<serde_json::Value>,
    ) {
    }

    async fn finish(
        &self,
        _execution_id: Uuid,
        _step_number: i32,
        _status: StepStatus,
        _output_data: Option<serde_json::Value>,
        _error_message: Option<String>,
    ) {
    }
}

// ---------------------------------------------------------------------------
// CredentialEvents
// ---------------------------------------------------------------------------

/// Side effects the credential resolver applies when the provider rejects
/// the user's key mid-run. 401 marks the key invalid and the run continues
/// (the error still counts as transient); 402 additionally disables every
/// scout the user owns before the run aborts.
#[async_trait]
pub trait CredentialEvents: Send + Sync {
    async fn on_unauthorized(&self, raw_error: &str);

    async fn on_payment_required(&self, raw_error: &str);
}
