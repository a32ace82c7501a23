//! The bounded tool-calling agent loop.
//!
//! One invocation per execution: issue a chat completion, dispatch any tool
//! calls through the search/scrape adapter while persisting a step per
//! call, feed results back, and stop on the model's structured final
//! message or on a bound (loop limit, consecutive tool errors).

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use ai_client::{ChatMessage, ChatRequest, ToolCall};
use scout_common::{
    AgentResponse, RecentFinding, Scout, ScoutError, StepStatus, StepType, TaskStatus,
};

use crate::prompts;
use crate::response::parse_agent_response;
use crate::tools::{tool_specs, ToolInvocation};
use crate::traits::{ChatModel, CredentialEvents, StepSink, WebFetcher};
use crate::webclient::{ScrapeRequest, SearchRequest, ToolError};

/// Maximum chat-completion rounds before a forced partial result.
pub const MAX_LOOPS: u32 = 7;

/// Consecutive tool errors that abort the run.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Default search result count when the model does not ask for one.
const DEFAULT_SEARCH_LIMIT: u32 = 5;

/// What the loop produced, before post-run bookkeeping.
#[derive(Debug)]
pub struct AgentOutcome {
    pub response: AgentResponse,
    /// Step number reached; the executor continues the sequence for the
    /// summarize step.
    pub steps_used: i32,
    pub searches: u32,
    pub scrapes: u32,
}

pub struct AgentRun<'a> {
    chat: &'a dyn ChatModel,
    web: &'a dyn WebFetcher,
    steps: &'a dyn StepSink,
    creds: &'a dyn CredentialEvents,
    scout: &'a Scout,
    execution_id: Uuid,
    step_number: i32,
    searches: u32,
    scrapes: u32,
}

impl<'a> AgentRun<'a> {
    pub fn new(
        chat: &'a dyn ChatModel,
        web: &'a dyn WebFetcher,
        steps: &'a dyn StepSink,
        creds: &'a dyn CredentialEvents,
        scout: &'a Scout,
        execution_id: Uuid,
    ) -> Self {
        Self {
            chat,
            web,
            steps,
            creds,
            scout,
            execution_id,
            step_number: 0,
            searches: 0,
            scrapes: 0,
        }
    }

    /// Run the loop to a structured result. Errors are terminal for the
    /// run; the executor writes the failed row and counters.
    pub async fn run(mut self, recent: &[RecentFinding]) -> Result<AgentOutcome, ScoutError> {
        let now = chrono::Utc::now();
        let mut history = vec![
            ChatMessage::system(prompts::system_prompt(self.scout, recent, now)),
            ChatMessage::user(format!(
                "Run this scout now. The current date is {}.",
                now.format("%Y-%m-%d")
            )),
        ];

        let mut loop_count: u32 = 0;
        let mut consecutive_errors: u32 = 0;
        let mut last_error = String::new();

        loop {
            if loop_count >= MAX_LOOPS {
                info!(
                    scout_id = %self.scout.id,
                    loops = loop_count,
                    "Loop limit reached, forcing partial result"
                );
                return Ok(self.outcome(AgentResponse {
                    task_completed: false,
                    task_status: TaskStatus::Partial,
                    response: format!(
                        "Reached the iteration limit ({MAX_LOOPS} steps) before completing \
                         the task. Partial results may be missing verification."
                    ),
                }));
            }

            if loop_count > 0 && loop_count % 3 == 0 {
                history.push(ChatMessage::user(prompts::reminder_message(
                    self.step_number,
                    MAX_LOOPS,
                )));
            }

            // A failed completion is fatal to the run: without the model
            // there is nothing to drive the loop.
            let request = ChatRequest::new(history.clone()).tools(tool_specs());
            let message = self
                .chat
                .chat(request)
                .await
                .map_err(|e| ScoutError::Llm(e.to_string()))?;

            history.push(message.clone());

            if !message.has_tool_calls() {
                let content = message.content.unwrap_or_default();
                let response = parse_agent_response(&content);
                info!(
                    scout_id = %self.scout.id,
                    task_completed = response.task_completed,
                    status = ?response.task_status,
                    loops = loop_count,
                    "Agent produced final response"
                );
                return Ok(self.outcome(response));
            }
            let tool_calls = message.tool_calls.unwrap_or_default();

            for call in &tool_calls {
                let result = self.dispatch(call).await;

                match result {
                    Ok(output_json) => {
                        consecutive_errors = 0;
                        history.push(ChatMessage::tool(call.id.clone(), output_json));
                    }
                    Err(err) => {
                        history.push(ChatMessage::tool(
                            call.id.clone(),
                            format!("Error: {err}"),
                        ));

                        match &err {
                            // Blacklisted targets are the model's misstep,
                            // not a provider fault; they do not count.
                            ToolError::BlacklistedUrl(_) => {}
                            ToolError::Unauthorized(raw) => {
                                self.creds.on_unauthorized(raw).await;
                                consecutive_errors += 1;
                                last_error = err.to_string();
                            }
                            ToolError::PaymentRequired(raw) => {
                                self.creds.on_payment_required(raw).await;
                                return Err(ScoutError::CreditsExhausted);
                            }
                            ToolError::Other(_) => {
                                consecutive_errors += 1;
                                last_error = err.to_string();
                            }
                        }

                        if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                            warn!(
                                scout_id = %self.scout.id,
                                error = %last_error,
                                "Aborting run after consecutive tool errors"
                            );
                            return Err(ScoutError::ConsecutiveToolErrors(last_error));
                        }
                    }
                }
            }

            loop_count += 1;
        }
    }

    /// Execute one tool call: persist the running step, call the adapter,
    /// finalize the step with output or error. Returns the JSON payload
    /// for the tool message.
    async fn dispatch(&mut self, call: &ToolCall) -> Result<String, ToolError> {
        self.step_number += 1;
        let step = self.step_number;

        let args = match call.parsed_arguments() {
            Ok(v) => v,
            Err(e) => {
                let msg = format!("Unparseable tool arguments: {e}");
                self.steps
                    .append(
                        self.execution_id,
                        step,
                        StepType::ToolCall,
                        &format!("Tool call: {}", call.function.name),
                        None,
                    )
                    .await;
                self.steps
                    .finish(self.execution_id, step, StepStatus::Failed, None, Some(msg.clone()))
                    .await;
                return Err(ToolError::Other(msg));
            }
        };

        let invocation = match ToolInvocation::parse(&call.function.name, &args) {
            Ok(inv) => inv,
            Err(msg) => {
                self.steps
                    .append(
                        self.execution_id,
                        step,
                        StepType::ToolCall,
                        &format!("Tool call: {}", call.function.name),
                        Some(args.clone()),
                    )
                    .await;
                self.steps
                    .finish(self.execution_id, step, StepStatus::Failed, None, Some(msg.clone()))
                    .await;
                return Err(ToolError::Other(msg));
            }
        };

        self.steps
            .append(
                self.execution_id,
                step,
                invocation.step_type(),
                &invocation.description(),
                Some(args),
            )
            .await;

        let result: Result<serde_json::Value, ToolError> = match &invocation {
            ToolInvocation::Search(search) => {
                self.searches += 1;
                let request = SearchRequest {
                    query: search.query.clone(),
                    limit: search.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
                    tbs: search
                        .tbs
                        .clone()
                        .or_else(|| Some(self.scout.frequency.tbs().to_string())),
                    location: self.scout.search_location().map(|l| l.city.clone()),
                    max_age_ms: self.scout.frequency.max_age_ms(),
                    scrape_options: self.scout.scrape_options.clone(),
                };
                self.web
                    .search(request)
                    .await
                    .map(|out| json!(out))
            }
            ToolInvocation::Scrape(scrape) => {
                self.scrapes += 1;
                let request = ScrapeRequest {
                    url: scrape.url.clone(),
                    max_age_ms: self.scout.frequency.max_age_ms(),
                    scrape_options: self.scout.scrape_options.clone(),
                };
                self.web
                    .scrape(request)
                    .await
                    .map(|out| json!(out))
            }
        };

        match result {
            Ok(output) => {
                self.steps
                    .finish(
                        self.execution_id,
                        step,
                        StepStatus::Completed,
                        Some(output.clone()),
                        None,
                    )
                    .await;
                Ok(output.to_string())
            }
            Err(err) => {
                self.steps
                    .finish(
                        self.execution_id,
                        step,
                        StepStatus::Failed,
                        None,
                        Some(err.to_string()),
                    )
                    .await;
                Err(err)
            }
        }
    }

    fn outcome(self, response: AgentResponse) -> AgentOutcome {
        AgentOutcome {
            response,
            steps_used: self.step_number,
            searches: self.searches,
            scrapes: self.scrapes,
        }
    }
}
