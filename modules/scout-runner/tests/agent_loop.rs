//! Deterministic agent-loop tests against mock providers: no network, no
//! database.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use ai_client::{ChatMessage, ChatRequest, FunctionCall, Role, ToolCall};
use scout_common::{
    Frequency, RecentFinding, Scout, ScoutError, ScoutLocation, StepStatus, StepType, TaskStatus,
};
use scout_runner::agent::{AgentRun, MAX_LOOPS};
use scout_runner::traits::{ChatModel, CredentialEvents, StepSink, WebFetcher};
use scout_runner::webclient::{
    ScrapeOutput, ScrapeRequest, SearchOutput, SearchRequest, SearchResultItem, ToolError,
};

// ---------------------------------------------------------------------------
// Mocks
// ---------------------------------------------------------------------------

/// Scripted model: pops one canned message per chat call and records every
/// request it saw.
struct ScriptedModel {
    responses: Mutex<VecDeque<ChatMessage>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    fn new(responses: Vec<ChatMessage>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, i: usize) -> ChatRequest {
        self.requests.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, request: ChatRequest) -> anyhow::Result<ChatMessage> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))
    }

    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(vec![0.0; scout_common::EMBEDDING_DIM])
    }
}

/// Model that issues the same tool call forever.
struct EndlessToolModel;

#[async_trait]
impl ChatModel for EndlessToolModel {
    async fn chat(&self, _request: ChatRequest) -> anyhow::Result<ChatMessage> {
        Ok(tool_call_message(vec![search_call("c1", "more news")]))
    }

    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(vec![0.0; scout_common::EMBEDDING_DIM])
    }
}

/// Web fetcher with scripted per-call results; records every request.
struct ScriptedWeb {
    search_results: Mutex<VecDeque<Result<SearchOutput, ToolError>>>,
    scrape_results: Mutex<VecDeque<Result<ScrapeOutput, ToolError>>>,
    search_requests: Mutex<Vec<SearchRequest>>,
    scrape_requests: Mutex<Vec<ScrapeRequest>>,
}

impl ScriptedWeb {
    fn new() -> Self {
        Self {
            search_results: Mutex::new(VecDeque::new()),
            scrape_results: Mutex::new(VecDeque::new()),
            search_requests: Mutex::new(Vec::new()),
            scrape_requests: Mutex::new(Vec::new()),
        }
    }

    fn push_search(&self, result: Result<SearchOutput, ToolError>) {
        self.search_results.lock().unwrap().push_back(result);
    }

    fn push_scrape(&self, result: Result<ScrapeOutput, ToolError>) {
        self.scrape_results.lock().unwrap().push_back(result);
    }

    fn search_request(&self, i: usize) -> SearchRequest {
        self.search_requests.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl WebFetcher for ScriptedWeb {
    async fn search(&self, request: SearchRequest) -> Result<SearchOutput, ToolError> {
        self.search_requests.lock().unwrap().push(request.clone());
        self.search_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(empty_search(&request.query)))
    }

    async fn scrape(&self, request: ScrapeRequest) -> Result<ScrapeOutput, ToolError> {
        self.scrape_requests.lock().unwrap().push(request.clone());
        self.scrape_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(ScrapeOutput {
                    url: request.url.clone(),
                    title: "Page".to_string(),
                    content: "content".to_string(),
                    screenshot: None,
                    favicon: None,
                })
            })
    }
}

/// Records the persisted step trace.
#[derive(Default)]
struct RecordingSteps {
    appended: Mutex<Vec<(i32, StepType)>>,
    finished: Mutex<Vec<(i32, StepStatus)>>,
}

#[async_trait]
impl StepSink for RecordingSteps {
    async fn append(
        &self,
        _execution_id: Uuid,
        step_number: i32,
        step_type: StepType,
        _description: &str,
        _input_data: Option<serde_json::Value>,
    ) {
        self.appended.lock().unwrap().push((step_number, step_type));
    }

    async fn finish(
        &self,
        _execution_id: Uuid,
        step_number: i32,
        status: StepStatus,
        _output_data: Option<serde_json::Value>,
        _error_message: Option<String>,
    ) {
        self.finished.lock().unwrap().push((step_number, status));
    }
}

/// Records credential side effects.
#[derive(Default)]
struct RecordingCreds {
    unauthorized: Mutex<Vec<String>>,
    payment_required: Mutex<Vec<String>>,
}

#[async_trait]
impl CredentialEvents for RecordingCreds {
    async fn on_unauthorized(&self, raw_error: &str) {
        self.unauthorized.lock().unwrap().push(raw_error.to_string());
    }

    async fn on_payment_required(&self, raw_error: &str) {
        self.payment_required
            .lock()
            .unwrap()
            .push(raw_error.to_string());
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn scout() -> Scout {
    Scout {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        title: "AI News".to_string(),
        goal: "Track AI model releases".to_string(),
        description: "Watches for new model announcements".to_string(),
        queries: vec![
            "AI news".to_string(),
            "artificial intelligence news".to_string(),
        ],
        location: Some(ScoutLocation {
            city: "any".to_string(),
            lat: 0.0,
            lon: 0.0,
        }),
        frequency: Frequency::Daily,
        scrape_options: None,
        is_active: true,
        last_run_at: None,
        consecutive_failures: 0,
    }
}

fn search_call(id: &str, query: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        call_type: "function".to_string(),
        function: FunctionCall {
            name: "searchWeb".to_string(),
            arguments: format!(r#"{{"query": "{query}"}}"#),
        },
    }
}

fn scrape_call(id: &str, url: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        call_type: "function".to_string(),
        function: FunctionCall {
            name: "scrapeWebsite".to_string(),
            arguments: format!(r#"{{"url": "{url}"}}"#),
        },
    }
}

fn tool_call_message(calls: Vec<ToolCall>) -> ChatMessage {
    ChatMessage {
        role: Role::Assistant,
        content: None,
        tool_calls: Some(calls),
        tool_call_id: None,
    }
}

fn final_message(task_completed: bool, status: &str, response: &str) -> ChatMessage {
    ChatMessage::assistant(format!(
        r#"{{"taskCompleted": {task_completed}, "taskStatus": "{status}", "response": "{response}"}}"#
    ))
}

fn empty_search(query: &str) -> SearchOutput {
    SearchOutput {
        results: vec![],
        filtered_count: 0,
        query: query.to_string(),
        tbs: None,
        location: None,
    }
}

fn one_result_search(query: &str, url: &str) -> SearchOutput {
    SearchOutput {
        results: vec![SearchResultItem {
            title: "Result".to_string(),
            url: url.to_string(),
            description: "A result".to_string(),
            published_time: None,
            favicon: None,
        }],
        filtered_count: 1,
        query: query.to_string(),
        tbs: Some("qdr:d".to_string()),
        location: None,
    }
}

async fn run_loop(
    model: &dyn ChatModel,
    web: &dyn WebFetcher,
    steps: &RecordingSteps,
    creds: &RecordingCreds,
    scout: &Scout,
    recent: &[RecentFinding],
) -> Result<scout_runner::AgentOutcome, ScoutError> {
    AgentRun::new(model, web, steps, creds, scout, Uuid::new_v4())
        .run(recent)
        .await
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_successful_run_records_ordered_steps() {
    let model = ScriptedModel::new(vec![
        tool_call_message(vec![
            search_call("c1", "AI news"),
            search_call("c2", "artificial intelligence news"),
        ]),
        tool_call_message(vec![
            scrape_call("c3", "https://a.example/story"),
            scrape_call("c4", "https://b.example/story"),
        ]),
        final_message(true, "completed", "Model X launched today."),
    ]);
    let web = ScriptedWeb::new();
    web.push_search(Ok(one_result_search("AI news", "https://a.example/story")));
    web.push_search(Ok(one_result_search(
        "artificial intelligence news",
        "https://b.example/story",
    )));
    let steps = RecordingSteps::default();
    let creds = RecordingCreds::default();
    let s = scout();

    let outcome = run_loop(&model, &web, &steps, &creds, &s, &[]).await.unwrap();

    assert!(outcome.response.task_completed);
    assert_eq!(outcome.response.task_status, TaskStatus::Completed);
    assert_eq!(outcome.searches, 2);
    assert_eq!(outcome.scrapes, 2);
    assert_eq!(outcome.steps_used, 4);

    // Step numbers form a contiguous 1-based sequence, typed per tool.
    let appended = steps.appended.lock().unwrap();
    assert_eq!(
        *appended,
        vec![
            (1, StepType::Search),
            (2, StepType::Search),
            (3, StepType::Scrape),
            (4, StepType::Scrape),
        ]
    );
    let finished = steps.finished.lock().unwrap();
    assert!(finished.iter().all(|(_, s)| *s == StepStatus::Completed));

    // Both scrapes carried the scout's frequency-derived freshness hint.
    let scrapes = web.scrape_requests.lock().unwrap();
    assert_eq!(scrapes.len(), 2);
    assert!(scrapes.iter().all(|r| r.max_age_ms == 86_400_000));
}

#[tokio::test]
async fn step_limit_overflow_forces_partial_result() {
    let model = EndlessToolModel;
    let web = ScriptedWeb::new();
    let steps = RecordingSteps::default();
    let creds = RecordingCreds::default();
    let s = scout();

    let outcome = run_loop(&model, &web, &steps, &creds, &s, &[]).await.unwrap();

    assert!(!outcome.response.task_completed);
    assert_eq!(outcome.response.task_status, TaskStatus::Partial);
    assert!(outcome.response.response.contains("iteration limit"));
    // One search per loop round, bounded by MAX_LOOPS.
    assert_eq!(outcome.searches, MAX_LOOPS);
}

#[tokio::test]
async fn three_consecutive_tool_errors_abort_the_run() {
    let model = ScriptedModel::new(vec![
        tool_call_message(vec![
            search_call("c1", "q1"),
            search_call("c2", "q2"),
            search_call("c3", "q3"),
        ]),
        final_message(false, "not_found", "unreachable"),
    ]);
    let web = ScriptedWeb::new();
    for _ in 0..3 {
        web.push_search(Err(ToolError::Other("Provider error (500): boom".to_string())));
    }
    let steps = RecordingSteps::default();
    let creds = RecordingCreds::default();
    let s = scout();

    let err = run_loop(&model, &web, &steps, &creds, &s, &[]).await.unwrap_err();
    assert!(matches!(err, ScoutError::ConsecutiveToolErrors(_)));

    // All three failing steps were still traced.
    assert_eq!(steps.finished.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn a_success_resets_the_error_counter() {
    let model = ScriptedModel::new(vec![
        tool_call_message(vec![search_call("c1", "q1"), search_call("c2", "q2")]),
        tool_call_message(vec![search_call("c3", "q3"), search_call("c4", "q4")]),
        final_message(false, "not_found", "Nothing today."),
    ]);
    let web = ScriptedWeb::new();
    web.push_search(Err(ToolError::Other("timeout".to_string())));
    web.push_search(Err(ToolError::Other("timeout".to_string())));
    web.push_search(Ok(empty_search("q3")));
    web.push_search(Err(ToolError::Other("timeout".to_string())));
    let steps = RecordingSteps::default();
    let creds = RecordingCreds::default();
    let s = scout();

    // err, err, ok (reset), err: never reaches three consecutive.
    let outcome = run_loop(&model, &web, &steps, &creds, &s, &[]).await.unwrap();
    assert_eq!(outcome.response.task_status, TaskStatus::NotFound);
}

#[tokio::test]
async fn blacklisted_scrape_errors_are_not_counted() {
    let model = ScriptedModel::new(vec![
        tool_call_message(vec![
            scrape_call("c1", "https://twitter.com/a"),
            scrape_call("c2", "https://youtube.com/b"),
            scrape_call("c3", "https://facebook.com/c"),
            scrape_call("c4", "https://reddit.com/d"),
        ]),
        final_message(false, "not_found", "Only social links found."),
    ]);
    let web = ScriptedWeb::new();
    for url in [
        "https://twitter.com/a",
        "https://youtube.com/b",
        "https://facebook.com/c",
        "https://reddit.com/d",
    ] {
        web.push_scrape(Err(ToolError::BlacklistedUrl(url.to_string())));
    }
    let steps = RecordingSteps::default();
    let creds = RecordingCreds::default();
    let s = scout();

    // Four blacklist refusals in a row must not trip the cutoff.
    let outcome = run_loop(&model, &web, &steps, &creds, &s, &[]).await.unwrap();
    assert_eq!(outcome.response.task_status, TaskStatus::NotFound);
}

#[tokio::test]
async fn payment_required_aborts_and_fires_side_effects() {
    let model = ScriptedModel::new(vec![tool_call_message(vec![search_call("c1", "q1")])]);
    let web = ScriptedWeb::new();
    web.push_search(Err(ToolError::PaymentRequired(
        "Provider error (402): insufficient credits".to_string(),
    )));
    let steps = RecordingSteps::default();
    let creds = RecordingCreds::default();
    let s = scout();

    let err = run_loop(&model, &web, &steps, &creds, &s, &[]).await.unwrap_err();
    assert!(matches!(err, ScoutError::CreditsExhausted));
    assert_eq!(creds.payment_required.lock().unwrap().len(), 1);
    assert!(creds.unauthorized.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unauthorized_marks_credential_but_run_continues() {
    let model = ScriptedModel::new(vec![
        tool_call_message(vec![search_call("c1", "q1")]),
        final_message(false, "insufficient_data", "Search was unavailable."),
    ]);
    let web = ScriptedWeb::new();
    web.push_search(Err(ToolError::Unauthorized(
        "Provider error (401): invalid key".to_string(),
    )));
    let steps = RecordingSteps::default();
    let creds = RecordingCreds::default();
    let s = scout();

    let outcome = run_loop(&model, &web, &steps, &creds, &s, &[]).await.unwrap();
    assert_eq!(outcome.response.task_status, TaskStatus::InsufficientData);
    assert_eq!(creds.unauthorized.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn reminder_is_injected_every_third_loop() {
    let model = ScriptedModel::new(vec![
        tool_call_message(vec![search_call("c1", "q1")]),
        tool_call_message(vec![search_call("c2", "q2")]),
        tool_call_message(vec![search_call("c3", "q3")]),
        tool_call_message(vec![search_call("c4", "q4")]),
        final_message(false, "not_found", "done"),
    ]);
    let web = ScriptedWeb::new();
    let steps = RecordingSteps::default();
    let creds = RecordingCreds::default();
    let s = scout();

    run_loop(&model, &web, &steps, &creds, &s, &[]).await.unwrap();

    let has_reminder = |req: &ChatRequest| {
        req.messages.iter().any(|m| {
            m.content
                .as_deref()
                .is_some_and(|c| c.contains("Progress check"))
        })
    };

    // Requests 0-2 (loop counts 0-2): no reminder. Request 3 (loop count
    // 3): reminder present.
    assert_eq!(model.request_count(), 5);
    assert!(!has_reminder(&model.request(0)));
    assert!(!has_reminder(&model.request(2)));
    assert!(has_reminder(&model.request(3)));
}

#[tokio::test]
async fn search_requests_inherit_frequency_and_skip_any_location() {
    let model = ScriptedModel::new(vec![
        tool_call_message(vec![search_call("c1", "AI news")]),
        final_message(false, "not_found", "done"),
    ]);
    let web = ScriptedWeb::new();
    let steps = RecordingSteps::default();
    let creds = RecordingCreds::default();
    let s = scout(); // daily, location "any"

    run_loop(&model, &web, &steps, &creds, &s, &[]).await.unwrap();

    let req = web.search_request(0);
    assert_eq!(req.max_age_ms, 86_400_000);
    assert_eq!(req.tbs.as_deref(), Some("qdr:d"));
    assert_eq!(req.location, None);
}

#[tokio::test]
async fn search_requests_carry_real_locations() {
    let model = ScriptedModel::new(vec![
        tool_call_message(vec![search_call("c1", "housing news")]),
        final_message(false, "not_found", "done"),
    ]);
    let web = ScriptedWeb::new();
    let steps = RecordingSteps::default();
    let creds = RecordingCreds::default();
    let mut s = scout();
    s.location = Some(ScoutLocation {
        city: "Portland".to_string(),
        lat: 45.5,
        lon: -122.6,
    });

    run_loop(&model, &web, &steps, &creds, &s, &[]).await.unwrap();
    assert_eq!(web.search_request(0).location.as_deref(), Some("Portland"));
}

#[tokio::test]
async fn unknown_tool_counts_as_an_error_but_gets_a_tool_reply() {
    let model = ScriptedModel::new(vec![
        tool_call_message(vec![ToolCall {
            id: "c1".to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: "launchMissiles".to_string(),
                arguments: "{}".to_string(),
            },
        }]),
        final_message(false, "insufficient_data", "sorry"),
    ]);
    let web = ScriptedWeb::new();
    let steps = RecordingSteps::default();
    let creds = RecordingCreds::default();
    let s = scout();

    let outcome = run_loop(&model, &web, &steps, &creds, &s, &[]).await.unwrap();
    assert_eq!(outcome.response.task_status, TaskStatus::InsufficientData);

    // The bad call still produced a traced, failed step and the model got
    // a tool message for it (otherwise the next completion would be
    // rejected by the provider).
    let finished = steps.finished.lock().unwrap();
    assert_eq!(*finished, vec![(1, StepStatus::Failed)]);
    let second_request = model.request(1);
    assert!(second_request
        .messages
        .iter()
        .any(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some("c1")));
}

#[tokio::test]
async fn final_prose_is_coerced_to_insufficient_data() {
    let model = ScriptedModel::new(vec![ChatMessage::assistant(
        "I looked around but could not produce the JSON you asked for.",
    )]);
    let web = ScriptedWeb::new();
    let steps = RecordingSteps::default();
    let creds = RecordingCreds::default();
    let s = scout();

    let outcome = run_loop(&model, &web, &steps, &creds, &s, &[]).await.unwrap();
    assert!(!outcome.response.task_completed);
    assert_eq!(outcome.response.task_status, TaskStatus::InsufficientData);
    assert!(outcome.response.response.contains("could not produce"));
}

#[tokio::test]
async fn llm_failure_is_fatal() {
    let model = ScriptedModel::new(vec![]); // script exhausted on first call
    let web = ScriptedWeb::new();
    let steps = RecordingSteps::default();
    let creds = RecordingCreds::default();
    let s = scout();

    let err = run_loop(&model, &web, &steps, &creds, &s, &[]).await.unwrap_err();
    assert!(matches!(err, ScoutError::Llm(_)));
}

#[tokio::test]
async fn recent_findings_surface_in_the_system_prompt() {
    let model = ScriptedModel::new(vec![final_message(false, "not_found", "done")]);
    let web = ScriptedWeb::new();
    let steps = RecordingSteps::default();
    let creds = RecordingCreds::default();
    let s = scout();
    let recent = vec![RecentFinding {
        execution_id: Uuid::new_v4(),
        summary_text: "Model X released with 2T parameters".to_string(),
        embedding: vec![0.1; scout_common::EMBEDDING_DIM],
        completed_at: chrono::Utc::now() - chrono::Duration::days(1),
    }];

    run_loop(&model, &web, &steps, &creds, &s, &recent).await.unwrap();

    let system = model.request(0).messages[0].clone();
    assert_eq!(system.role, Role::System);
    let content = system.content.unwrap();
    assert!(content.contains("Model X released with 2T parameters"));
    assert!(content.contains("found yesterday"));
}
