//! Fire-and-forget analytics. Events go into an unbounded channel; a
//! background task drains it to the ingestion endpoint. `track()` never
//! blocks and never fails the run.

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug)]
pub struct AnalyticsEvent {
    pub name: &'static str,
    pub user_id: Option<Uuid>,
    pub properties: serde_json::Value,
}

#[derive(Clone)]
pub struct AnalyticsSink {
    tx: Option<mpsc::UnboundedSender<AnalyticsEvent>>,
}

impl AnalyticsSink {
    /// Start the drain task. With no endpoint configured, events are
    /// dropped silently.
    pub fn new(endpoint: Option<String>, api_key: Option<String>) -> Self {
        let (endpoint, api_key) = match (endpoint, api_key) {
            (Some(e), Some(k)) => (e, k),
            _ => return Self { tx: None },
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<AnalyticsEvent>();
        let http = reqwest::Client::new();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let payload = json!({
                    "api_key": api_key,
                    "event": event.name,
                    "distinct_id": event.user_id.map(|u| u.to_string()).unwrap_or_else(|| "system".to_string()),
                    "properties": event.properties,
                });
                match http.post(&endpoint).json(&payload).send().await {
                    Ok(resp) if !resp.status().is_success() => {
                        warn!(status = %resp.status(), event = event.name, "Analytics ingest rejected");
                    }
                    Err(e) => {
                        warn!(error = %e, event = event.name, "Analytics ingest failed");
                    }
                    Ok(_) => {
                        debug!(event = event.name, "Analytics event sent");
                    }
                }
            }
        });

        Self { tx: Some(tx) }
    }

    /// Sink that drops everything. Used in tests.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn track(&self, name: &'static str, user_id: Option<Uuid>, properties: serde_json::Value) {
        if let Some(tx) = &self.tx {
            // A closed channel only happens at shutdown; dropping is fine.
            let _ = tx.send(AnalyticsEvent {
                name,
                user_id,
                properties,
            });
        }
    }
}
