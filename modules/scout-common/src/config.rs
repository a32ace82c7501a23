use std::env;

/// LLM provider endpoint configuration. Exactly one mode is active,
/// selected by the presence of `LLM_DEPLOYMENT_ENDPOINT`.
#[derive(Debug, Clone)]
pub enum LlmConfig {
    /// Standard endpoint: model name travels in the request body.
    Direct {
        base_url: String,
        api_key: String,
        model: String,
        embedding_model: String,
    },
    /// Deployment-style endpoint: deployment name is part of the URL path,
    /// the body omits the model, and an api-version query parameter is
    /// required.
    Deployment {
        endpoint: String,
        api_key: String,
        chat_deployment: String,
        embedding_deployment: String,
        api_version: String,
    },
}

impl LlmConfig {
    pub fn from_env() -> Self {
        match env::var("LLM_DEPLOYMENT_ENDPOINT") {
            Ok(endpoint) => LlmConfig::Deployment {
                endpoint,
                api_key: required_env("LLM_API_KEY"),
                chat_deployment: required_env("LLM_CHAT_DEPLOYMENT"),
                embedding_deployment: required_env("LLM_EMBEDDING_DEPLOYMENT"),
                api_version: required_env("LLM_API_VERSION"),
            },
            Err(_) => LlmConfig::Direct {
                base_url: env::var("LLM_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                api_key: required_env("LLM_API_KEY"),
                model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
                embedding_model: env::var("LLM_EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            },
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // LLM provider (direct or deployment mode)
    pub llm: LlmConfig,

    // Search/scrape provider base URL. Keys are per-user, from the store.
    pub search_base_url: String,

    // Transactional email
    pub email_api_key: String,
    pub email_from: String,

    // Analytics (optional; events are dropped when unset)
    pub analytics_api_key: Option<String>,
    pub analytics_endpoint: Option<String>,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    /// Set to "0"/"false" to run the HTTP entry without the built-in
    /// dispatcher (e.g. when an external scheduler drives invocations).
    pub dispatcher_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            llm: LlmConfig::from_env(),
            search_base_url: env::var("SEARCH_API_BASE")
                .unwrap_or_else(|_| "https://api.firecrawl.dev/v1".to_string()),
            email_api_key: required_env("EMAIL_API_KEY"),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "scouts@notifications.localhost".to_string()),
            analytics_api_key: env::var("ANALYTICS_API_KEY").ok(),
            analytics_endpoint: env::var("ANALYTICS_ENDPOINT").ok(),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
            dispatcher_enabled: env::var("DISPATCHER_ENABLED")
                .map(|v| v != "0" && v != "false")
                .unwrap_or(true),
        }
    }

    /// Log key lengths (never values) for startup debugging.
    pub fn log_redacted(&self) {
        let llm_key = match &self.llm {
            LlmConfig::Direct { api_key, .. } => api_key,
            LlmConfig::Deployment { api_key, .. } => api_key,
        };
        let vars = [
            ("LLM_API_KEY", llm_key.as_str()),
            ("EMAIL_API_KEY", self.email_api_key.as_str()),
            (
                "ANALYTICS_API_KEY",
                self.analytics_api_key.as_deref().unwrap_or(""),
            ),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
        match &self.llm {
            LlmConfig::Direct { base_url, model, .. } => {
                tracing::info!(base_url, model, "LLM provider: direct mode");
            }
            LlmConfig::Deployment {
                endpoint,
                chat_deployment,
                api_version,
                ..
            } => {
                tracing::info!(
                    endpoint,
                    chat_deployment,
                    api_version,
                    "LLM provider: deployment mode"
                );
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
