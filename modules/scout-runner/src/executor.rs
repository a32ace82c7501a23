//! One executor invocation: claim the run, drive the agent loop, then do
//! the bookkeeping (summary, embedding, dedup, persistence, notification,
//! scout counters).

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use ai_client::{ChatMessage, ChatRequest, LlmClient};
use scout_common::{
    AgentResponse, ExecutionStatus, Scout, ScoutError, StepStatus, StepType, EMBEDDING_DIM,
    SUMMARY_MAX_CHARS,
};
use scout_store::{ClaimOutcome, FinishFields};

use crate::agent::AgentRun;
use crate::analytics::AnalyticsSink;
use crate::credentials::{self, PgCredentialEvents};
use crate::dedup::{duplicate_note, find_duplicate, DuplicateMatch};
use crate::notify::NotifyBackend;
use crate::prompts::SUMMARY_SYSTEM_PROMPT;
use crate::traits::{ChatModel, PgSteps, StepSink};
use crate::webclient::SearchClient;

/// Design ceiling for one invocation. The reaper reclaims rows older than
/// twice this.
pub const EXECUTOR_WALL_LIMIT: Duration = Duration::from_secs(300);

/// How many recent findings feed deduplication.
const RECENT_FINDINGS_LIMIT: i64 = 20;

/// Shared executor state; one instance serves every invocation.
pub struct Executor {
    pool: PgPool,
    llm: LlmClient,
    search_base_url: String,
    notifier: Arc<dyn NotifyBackend>,
    analytics: AnalyticsSink,
}

/// What a successful invocation reports back to the HTTP entry.
#[derive(Debug, Clone)]
pub struct ExecuteSuccess {
    pub scout_id: Uuid,
    pub title: String,
    pub execution_id: Uuid,
}

struct RunStats {
    steps: i32,
    searches: u32,
    scrapes: u32,
    duplicate: bool,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} steps ({} searches, {} scrapes){}",
            self.steps,
            self.searches,
            self.scrapes,
            if self.duplicate { ", duplicate" } else { "" },
        )
    }
}

struct RunProduct {
    response: AgentResponse,
    summary_text: Option<String>,
    summary_embedding: Option<Vec<f32>>,
    duplicate: Option<DuplicateMatch>,
    stats: RunStats,
}

impl Executor {
    pub fn new(
        pool: PgPool,
        llm: LlmClient,
        search_base_url: String,
        notifier: Arc<dyn NotifyBackend>,
        analytics: AnalyticsSink,
    ) -> Self {
        Self {
            pool,
            llm,
            search_base_url,
            notifier,
            analytics,
        }
    }

    /// Entry point: run one scout to a terminal execution row.
    ///
    /// Refusals (`ExecutionInProgress`, unknown/inactive scout) leave all
    /// state untouched. Any error after the claim writes a failed row and
    /// counts toward the scout's consecutive failures.
    pub async fn execute_scout(&self, scout_id: Uuid) -> Result<ExecuteSuccess, ScoutError> {
        let scout = scout_store::get_scout(&self.pool, scout_id)
            .await?
            .ok_or(ScoutError::ScoutNotFound(scout_id))?;

        if !scout.is_active {
            return Err(ScoutError::ScoutInactive);
        }

        let execution_id = match scout_store::try_claim_running(&self.pool, scout_id).await? {
            ClaimOutcome::Claimed(id) => id,
            ClaimOutcome::AlreadyRunning(existing) => {
                info!(scout_id = %scout_id, running = %existing, "Refusing overlapping run");
                return Err(ScoutError::ExecutionInProgress {
                    execution_id: existing,
                });
            }
        };

        info!(scout_id = %scout_id, execution_id = %execution_id, title = %scout.title, "Execution starting");

        match self.run_claimed(&scout, execution_id).await {
            Ok(product) => {
                self.finalize_success(&scout, execution_id, product).await?;
                Ok(ExecuteSuccess {
                    scout_id,
                    title: scout.title.clone(),
                    execution_id,
                })
            }
            Err(err) => {
                self.finalize_failure(&scout, execution_id, &err).await;
                Err(err)
            }
        }
    }

    /// Everything between the claim and the terminal row.
    async fn run_claimed(&self, scout: &Scout, execution_id: Uuid) -> Result<RunProduct, ScoutError> {
        if let Some(problem) = scout.completeness_error() {
            return Err(ScoutError::IncompleteScout(problem));
        }

        let api_key = credentials::resolve(&self.pool, scout.user_id).await?;
        let web = SearchClient::new(&self.search_base_url, api_key);
        let steps = PgSteps::new(self.pool.clone());
        let creds = PgCredentialEvents::new(self.pool.clone(), scout.user_id);

        let recent = scout_store::list_recent_completed_with_embedding(
            &self.pool,
            scout.id,
            RECENT_FINDINGS_LIMIT,
        )
        .await?;

        let run = AgentRun::new(&self.llm, &web, &steps, &creds, scout, execution_id);
        let outcome = tokio::time::timeout(EXECUTOR_WALL_LIMIT, run.run(&recent))
            .await
            .map_err(|_| ScoutError::WallClockExceeded)??;

        let mut response = outcome.response;
        let mut step_number = outcome.steps_used;

        // Summary and embedding only exist for completed tasks; both are
        // best-effort.
        let (summary_text, summary_embedding) = if response.task_completed {
            step_number += 1;
            self.summarize(&steps, execution_id, step_number, &response.response)
                .await
        } else {
            (None, None)
        };

        let duplicate = summary_embedding
            .as_deref()
            .and_then(|e| find_duplicate(e, &recent));

        if let Some(m) = &duplicate {
            info!(
                execution_id = %execution_id,
                matched = %m.execution_id,
                similarity = m.similarity,
                "Run marked as duplicate of a recent finding"
            );
            response.response.push_str(&duplicate_note(m));
        }

        Ok(RunProduct {
            stats: RunStats {
                steps: step_number,
                searches: outcome.searches,
                scrapes: outcome.scrapes,
                duplicate: duplicate.is_some(),
            },
            response,
            summary_text,
            summary_embedding,
            duplicate,
        })
    }

    /// Second model call for the one-sentence summary, then its embedding.
    /// Failures leave both fields null and never fail the run.
    async fn summarize(
        &self,
        steps: &PgSteps,
        execution_id: Uuid,
        step_number: i32,
        response_text: &str,
    ) -> (Option<String>, Option<Vec<f32>>) {
        steps
            .append(
                execution_id,
                step_number,
                StepType::Summarize,
                "Summarize finding",
                None,
            )
            .await;

        let request = ChatRequest::new(vec![
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(response_text.to_string()),
        ]);

        let summary = match self.llm.chat(request).await {
            Ok(message) => {
                let text = message.content.unwrap_or_default().trim().to_string();
                if text.is_empty() {
                    None
                } else {
                    Some(truncate_chars(&text, SUMMARY_MAX_CHARS))
                }
            }
            Err(e) => {
                warn!(execution_id = %execution_id, error = %e, "Summary generation failed");
                None
            }
        };

        let embedding = match &summary {
            Some(text) => match ChatModel::embed(&self.llm, text).await {
                Ok(vector) if vector.len() == EMBEDDING_DIM => Some(vector),
                Ok(vector) => {
                    warn!(
                        execution_id = %execution_id,
                        dim = vector.len(),
                        "Embedding has unexpected dimension, discarding"
                    );
                    None
                }
                Err(e) => {
                    warn!(execution_id = %execution_id, error = %e, "Embedding generation failed");
                    None
                }
            },
            None => None,
        };

        match &summary {
            Some(text) => {
                steps
                    .finish(
                        execution_id,
                        step_number,
                        StepStatus::Completed,
                        Some(json!({"summary": text, "embedded": embedding.is_some()})),
                        None,
                    )
                    .await;
            }
            None => {
                steps
                    .finish(
                        execution_id,
                        step_number,
                        StepStatus::Failed,
                        None,
                        Some("Summary generation failed".to_string()),
                    )
                    .await;
            }
        }

        (summary, embedding)
    }

    async fn finalize_success(
        &self,
        scout: &Scout,
        execution_id: Uuid,
        product: RunProduct,
    ) -> Result<(), ScoutError> {
        let RunProduct {
            response,
            summary_text,
            summary_embedding,
            duplicate,
            stats,
        } = product;

        scout_store::finish_execution(
            &self.pool,
            execution_id,
            ExecutionStatus::Completed,
            FinishFields {
                results_summary: Some(serde_json::to_value(&response).unwrap_or(json!({}))),
                summary_text,
                summary_embedding,
                error_message: None,
                duplicate_of: duplicate.as_ref().map(|m| m.execution_id),
            },
        )
        .await?;

        scout_store::update_scout_post_run(&self.pool, scout.id, chrono::Utc::now(), true).await?;

        if response.task_completed && duplicate.is_none() {
            self.notify(scout, &response).await;
        }

        self.analytics.track(
            "scout_execution_completed",
            Some(scout.user_id),
            json!({
                "scout_id": scout.id,
                "execution_id": execution_id,
                "task_completed": response.task_completed,
                "task_status": response.task_status,
                "steps": stats.steps,
                "duplicate": stats.duplicate,
            }),
        );

        info!(scout_id = %scout.id, execution_id = %execution_id, "Execution complete: {stats}");
        Ok(())
    }

    /// Write the failed row and counters. Best-effort: the original error
    /// is what the caller sees, even if bookkeeping also fails.
    async fn finalize_failure(&self, scout: &Scout, execution_id: Uuid, err: &ScoutError) {
        let message = err.to_string();

        if err.is_user_actionable() {
            info!(scout_id = %scout.id, execution_id = %execution_id, error = %message, "Run aborted, waiting on the user");
        } else {
            warn!(scout_id = %scout.id, execution_id = %execution_id, error = %message, "Run failed");
        }

        if let Err(e) = scout_store::finish_execution(
            &self.pool,
            execution_id,
            ExecutionStatus::Failed,
            FinishFields {
                error_message: Some(message.clone()),
                ..Default::default()
            },
        )
        .await
        {
            warn!(execution_id = %execution_id, error = %e, "Failed to write failed execution row");
        }

        match scout_store::update_scout_post_run(&self.pool, scout.id, chrono::Utc::now(), false)
            .await
        {
            Ok(outcome) if !outcome.is_active => {
                info!(
                    scout_id = %scout.id,
                    failures = outcome.consecutive_failures,
                    "Scout deactivated after repeated failures"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(scout_id = %scout.id, error = %e, "Failed to update scout counters");
            }
        }

        self.analytics.track(
            "scout_execution_failed",
            Some(scout.user_id),
            json!({
                "scout_id": scout.id,
                "execution_id": execution_id,
                "error": message,
            }),
        );
    }

    async fn notify(&self, scout: &Scout, response: &AgentResponse) {
        let to = match scout_store::get_notification_email(&self.pool, scout.user_id).await {
            Ok(Some(email)) => email,
            Ok(None) => {
                info!(scout_id = %scout.id, "No notification email on file, skipping");
                return;
            }
            Err(e) => {
                warn!(scout_id = %scout.id, error = %e, "Failed to look up notification email");
                return;
            }
        };

        if let Err(e) = self
            .notifier
            .send_success(&to, scout, &response.response)
            .await
        {
            warn!(scout_id = %scout.id, error = %e, "Success notification failed");
            self.analytics.track(
                "scout_notification_failed",
                Some(scout.user_id),
                json!({"scout_id": scout.id, "error": e.to_string()}),
            );
        }
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_truncation_is_char_safe() {
        let long = "ü".repeat(200);
        assert_eq!(truncate_chars(&long, SUMMARY_MAX_CHARS).chars().count(), 150);
        assert_eq!(truncate_chars("short", SUMMARY_MAX_CHARS), "short");
    }

    #[test]
    fn stats_display_mentions_duplicates() {
        let stats = RunStats {
            steps: 5,
            searches: 2,
            scrapes: 2,
            duplicate: true,
        };
        assert_eq!(stats.to_string(), "5 steps (2 searches, 2 scrapes), duplicate");
    }
}
