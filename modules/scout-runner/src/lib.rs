//! Scout executor: the bounded tool-calling agent loop and everything one
//! invocation needs around it (credential resolution, the search/scrape
//! adapter, response parsing, similarity dedup, notification, analytics).

pub mod agent;
pub mod analytics;
pub mod blacklist;
pub mod credentials;
pub mod dedup;
pub mod executor;
pub mod notify;
pub mod prompts;
pub mod response;
pub mod tools;
pub mod traits;
pub mod webclient;

pub use agent::{AgentOutcome, AgentRun};
pub use analytics::AnalyticsSink;
pub use executor::{ExecuteSuccess, Executor};
pub use traits::{ChatModel, CredentialEvents, StepSink, WebFetcher};
pub use webclient::{SearchClient, ToolError};
