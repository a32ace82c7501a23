use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dimension of summary embeddings. Vectors of any other length are
/// rejected at the store boundary and skipped by deduplication.
pub const EMBEDDING_DIM: usize = 1536;

/// Maximum length of the one-sentence run summary.
pub const SUMMARY_MAX_CHARS: usize = 150;

// ---------------------------------------------------------------------------
// Scout
// ---------------------------------------------------------------------------

/// How often a scout runs. Anything outside this set is rejected at
/// deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Hourly,
    Daily,
    #[serde(rename = "every_3_days")]
    Every3Days,
    Weekly,
}

impl Frequency {
    /// The minimum elapsed time between two runs.
    pub fn period(&self) -> Duration {
        match self {
            Frequency::Hourly => Duration::hours(1),
            Frequency::Daily => Duration::hours(24),
            Frequency::Every3Days => Duration::hours(72),
            Frequency::Weekly => Duration::days(7),
        }
    }

    /// Freshness hint passed to the search/scrape provider, in milliseconds.
    /// Roughly the period length: content older than one period has already
    /// been seen by the previous run.
    pub fn max_age_ms(&self) -> u64 {
        self.period().num_milliseconds() as u64
    }

    /// Time-range filter string for the search provider.
    pub fn tbs(&self) -> &'static str {
        match self {
            Frequency::Hourly => "qdr:h",
            Frequency::Daily => "qdr:d",
            Frequency::Every3Days => "qdr:w",
            Frequency::Weekly => "qdr:w",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
            Frequency::Every3Days => "every_3_days",
            Frequency::Weekly => "weekly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hourly" => Some(Frequency::Hourly),
            "daily" => Some(Frequency::Daily),
            "every_3_days" => Some(Frequency::Every3Days),
            "weekly" => Some(Frequency::Weekly),
            _ => None,
        }
    }
}

/// Geographic bias for searches. `city == "any"` is the sentinel for
/// "no geo bias" and is never forwarded to the search provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoutLocation {
    pub city: String,
    pub lat: f64,
    pub lon: f64,
}

impl ScoutLocation {
    pub fn is_any(&self) -> bool {
        self.city.eq_ignore_ascii_case("any")
    }
}

/// Wait instruction for the scrape provider: either a delay in
/// milliseconds or a CSS selector to wait for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WaitFor {
    Millis(u64),
    Selector(String),
}

/// Per-scout scrape pass-through options. Carried opaquely from the scout
/// definition to the provider request; never spliced into prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for: Option<WaitFor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// A user's monitoring definition and its operational state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scout {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub goal: String,
    pub description: String,
    /// 1-5 search queries, in priority order.
    pub queries: Vec<String>,
    pub location: Option<ScoutLocation>,
    pub frequency: Frequency,
    pub scrape_options: Option<ScrapeOptions>,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub consecutive_failures: i32,
}

impl Scout {
    /// A scout with missing required fields is never dispatched and fails
    /// fast in the executor with a user-actionable message.
    pub fn completeness_error(&self) -> Option<String> {
        if self.title.trim().is_empty() {
            return Some("missing title".to_string());
        }
        if self.goal.trim().is_empty() {
            return Some("missing goal".to_string());
        }
        if self.queries.is_empty() {
            return Some("no search queries configured".to_string());
        }
        if self.queries.len() > 5 {
            return Some("more than 5 search queries configured".to_string());
        }
        if self.queries.iter().any(|q| q.trim().is_empty()) {
            return Some("empty search query".to_string());
        }
        None
    }

    pub fn is_complete(&self) -> bool {
        self.completeness_error().is_none()
    }

    /// Dispatch eligibility: active, complete, and one full period has
    /// elapsed since the last run. A never-run scout is immediately due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active || !self.is_complete() {
            return false;
        }
        match self.last_run_at {
            None => true,
            Some(last) => now - last >= self.frequency.period(),
        }
    }

    /// Location to forward to the search provider, skipping the "any"
    /// sentinel.
    pub fn search_location(&self) -> Option<&ScoutLocation> {
        self.location.as_ref().filter(|l| !l.is_any())
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(ExecutionStatus::Running),
            "completed" => Some(ExecutionStatus::Completed),
            "failed" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }
}

/// A single run attempt. Created `running`, transitions exactly once to
/// `completed` or `failed`, then immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub scout_id: Uuid,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub results_summary: Option<serde_json::Value>,
    pub summary_text: Option<String>,
    pub summary_embedding: Option<Vec<f32>>,
    /// Set when deduplication matched a recent execution.
    pub duplicate_of: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    ToolCall,
    Search,
    Scrape,
    Summarize,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::ToolCall => "tool_call",
            StepType::Search => "search",
            StepType::Scrape => "scrape",
            StepType::Summarize => "summarize",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tool_call" => Some(StepType::ToolCall),
            "search" => Some(StepType::Search),
            "scrape" => Some(StepType::Scrape),
            "summarize" => Some(StepType::Summarize),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(StepStatus::Running),
            "completed" => Some(StepStatus::Completed),
            "failed" => Some(StepStatus::Failed),
            _ => None,
        }
    }
}

/// An ordered event within an execution. Step numbers are 1-based and
/// contiguous per execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub execution_id: Uuid,
    pub step_number: i32,
    pub step_type: StepType,
    pub description: String,
    pub input_data: Option<serde_json::Value>,
    pub output_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub status: StepStatus,
}

// ---------------------------------------------------------------------------
// Agent response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Partial,
    NotFound,
    InsufficientData,
}

/// The structured final message the model is instructed to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub task_completed: bool,
    pub task_status: TaskStatus,
    pub response: String,
}

// ---------------------------------------------------------------------------
// Dedup input
// ---------------------------------------------------------------------------

/// A recent successful execution used as deduplication input. Only rows
/// with a valid EMBEDDING_DIM-length vector qualify.
#[derive(Debug, Clone)]
pub struct RecentFinding {
    pub execution_id: Uuid,
    pub summary_text: String,
    pub embedding: Vec<f32>,
    pub completed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    Active,
    Invalid,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Active => "active",
            CredentialStatus::Invalid => "invalid",
        }
    }
}

/// Per-user search/scrape key state. There is no shared fallback key.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub user_id: Uuid,
    pub search_api_key: String,
    pub status: CredentialStatus,
    pub invalid_reason: Option<String>,
}
