mod dispatcher;
mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::LlmClient;
use scout_common::{Config, LlmConfig};
use scout_runner::notify::EmailNotifier;
use scout_runner::{AnalyticsSink, Executor};

use routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Scout server starting...");

    // Load .env from the workspace root (never overrides real env vars)
    dotenv_load();

    let config = Config::from_env();
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;

    scout_store::migrate(&pool).await?;

    let llm = match &config.llm {
        LlmConfig::Direct {
            base_url,
            api_key,
            model,
            embedding_model,
        } => LlmClient::direct(base_url, api_key, model, embedding_model),
        LlmConfig::Deployment {
            endpoint,
            api_key,
            chat_deployment,
            embedding_deployment,
            api_version,
        } => LlmClient::deployment(
            endpoint,
            api_key,
            chat_deployment,
            embedding_deployment,
            api_version,
        ),
    };

    let notifier = Arc::new(EmailNotifier::new(
        config.email_api_key.clone(),
        config.email_from.clone(),
    ));
    let analytics = AnalyticsSink::new(
        config.analytics_endpoint.clone(),
        config.analytics_api_key.clone(),
    );

    let executor = Arc::new(Executor::new(
        pool.clone(),
        llm,
        config.search_base_url.clone(),
        notifier,
        analytics,
    ));

    if config.dispatcher_enabled {
        dispatcher::spawn_dispatcher(pool.clone(), executor.clone());
        dispatcher::spawn_reaper(pool.clone());
        info!("Dispatcher and reaper started");
    } else {
        info!("Dispatcher disabled; executor is invocation-only");
    }

    let app = routes::router(Arc::new(AppState {
        pool: pool.clone(),
        executor,
    }));
    let addr = format!("{}:{}", config.web_host, config.web_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, app).await?;
    Ok(())
}

fn dotenv_load() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .map(|p| p.join(".env"));
    let Some(path) = path else { return };
    if let Ok(content) = std::fs::read_to_string(&path) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                if std::env::var(key.trim()).is_err() {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }
}
