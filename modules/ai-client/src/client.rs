use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use crate::types::*;

/// Wall-clock budget per HTTP call to the provider.
const CALL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
enum Endpoint {
    /// Model name travels in the request body; one base URL for all calls.
    Direct {
        base_url: String,
        model: String,
        embedding_model: String,
    },
    /// Deployment name is part of the URL path; the body omits the model
    /// and every call carries an api-version query parameter.
    Deployment {
        endpoint: String,
        chat_deployment: String,
        embedding_deployment: String,
        api_version: String,
    },
}

/// Chat-completion and embedding client over either endpoint style.
#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    http: reqwest::Client,
    endpoint: Endpoint,
}

impl LlmClient {
    pub fn direct(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            http: http_client(),
            endpoint: Endpoint::Direct {
                base_url: trim_slash(base_url.into()),
                model: model.into(),
                embedding_model: embedding_model.into(),
            },
        }
    }

    pub fn deployment(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        chat_deployment: impl Into<String>,
        embedding_deployment: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            http: http_client(),
            endpoint: Endpoint::Deployment {
                endpoint: trim_slash(endpoint.into()),
                chat_deployment: chat_deployment.into(),
                embedding_deployment: embedding_deployment.into(),
                api_version: api_version.into(),
            },
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        match self.endpoint {
            Endpoint::Direct { .. } => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
                );
            }
            Endpoint::Deployment { .. } => {
                headers.insert("api-key", HeaderValue::from_str(&self.api_key)?);
            }
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn chat_url(&self) -> String {
        match &self.endpoint {
            Endpoint::Direct { base_url, .. } => format!("{base_url}/chat/completions"),
            Endpoint::Deployment {
                endpoint,
                chat_deployment,
                api_version,
                ..
            } => format!(
                "{endpoint}/openai/deployments/{chat_deployment}/chat/completions?api-version={api_version}"
            ),
        }
    }

    fn embeddings_url(&self) -> String {
        match &self.endpoint {
            Endpoint::Direct { base_url, .. } => format!("{base_url}/embeddings"),
            Endpoint::Deployment {
                endpoint,
                embedding_deployment,
                api_version,
                ..
            } => format!(
                "{endpoint}/openai/deployments/{embedding_deployment}/embeddings?api-version={api_version}"
            ),
        }
    }

    /// Issue a chat completion. Transport and non-2xx errors are surfaced
    /// verbatim with the provider's status and body.
    pub async fn chat(&self, mut request: ChatRequest) -> Result<ChatMessage> {
        match &self.endpoint {
            Endpoint::Direct { model, .. } => request.model = Some(model.clone()),
            Endpoint::Deployment { .. } => request.model = None,
        }

        debug!(messages = request.messages.len(), "LLM chat request");

        let response = self
            .http
            .post(self.chat_url())
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("LLM API error ({status}): {error_text}"));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .into_message()
            .ok_or_else(|| anyhow!("LLM response contained no choices"))
    }

    /// Embed a single text. Returns the provider's vector as-is; callers
    /// validate dimension.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = match &self.endpoint {
            Endpoint::Direct {
                embedding_model, ..
            } => Some(embedding_model.clone()),
            Endpoint::Deployment { .. } => None,
        };
        let request = EmbeddingRequest {
            model,
            input: text.to_string(),
        };

        let response = self
            .http
            .post(self.embeddings_url())
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("Embedding API error ({status}): {error_text}"));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow!("No embedding in response"))
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(CALL_TIMEOUT)
        .build()
        .expect("reqwest client")
}

fn trim_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_urls() {
        let client = LlmClient::direct("https://api.openai.com/v1/", "k", "gpt-4o", "te3");
        assert_eq!(client.chat_url(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(client.embeddings_url(), "https://api.openai.com/v1/embeddings");
    }

    #[test]
    fn deployment_urls_carry_api_version() {
        let client = LlmClient::deployment(
            "https://example.cognitive.azure.example",
            "k",
            "chat-prod",
            "embed-prod",
            "2024-10-21",
        );
        assert_eq!(
            client.chat_url(),
            "https://example.cognitive.azure.example/openai/deployments/chat-prod/chat/completions?api-version=2024-10-21"
        );
        assert_eq!(
            client.embeddings_url(),
            "https://example.cognitive.azure.example/openai/deployments/embed-prod/embeddings?api-version=2024-10-21"
        );
    }
}
