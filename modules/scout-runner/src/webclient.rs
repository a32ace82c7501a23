//! Search/scrape provider adapter. Both operations go to the same HTTP
//! provider with the per-user key; request bodies carry the scout's
//! scrape pass-through options and a frequency-derived freshness hint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use scout_common::{ScrapeOptions, WaitFor};

use crate::blacklist::is_blacklisted;
use crate::traits::WebFetcher;

/// Wall-clock budget per provider call.
const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Scraped page content is truncated to this many characters before it
/// reaches the model.
const SCRAPE_CONTENT_MAX_CHARS: usize = 2000;

/// Appended to a location that names no country.
const DEFAULT_COUNTRY_NAME: &str = "United States";
const DEFAULT_COUNTRY_CODE: &str = "US";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failed tool call, classified for the loop's error accounting and the
/// credential resolver.
#[derive(Debug, Clone)]
pub enum ToolError {
    /// The target host is on the static blacklist. Not counted against the
    /// consecutive-error cutoff.
    BlacklistedUrl(String),
    /// Provider rejected the key (error text carried "401").
    Unauthorized(String),
    /// Provider reported exhausted credits (error text carried "402").
    PaymentRequired(String),
    /// Anything else: timeouts, 5xx, malformed payloads.
    Other(String),
}

impl ToolError {
    /// Classify a raw provider error by the status substrings the provider
    /// embeds in its payloads.
    pub fn classify(raw: String) -> Self {
        if raw.contains("402") {
            ToolError::PaymentRequired(raw)
        } else if raw.contains("401") {
            ToolError::Unauthorized(raw)
        } else {
            ToolError::Other(raw)
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ToolError::BlacklistedUrl(m)
            | ToolError::Unauthorized(m)
            | ToolError::PaymentRequired(m)
            | ToolError::Other(m) => m,
        }
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolError::BlacklistedUrl(url) => {
                write!(f, "URL is on the blocked domain list: {url}")
            }
            other => write!(f, "{}", other.message()),
        }
    }
}

impl std::error::Error for ToolError {}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Search invocation, already resolved against the scout's configuration.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub limit: u32,
    pub tbs: Option<String>,
    /// City string; country handling happens in the adapter.
    pub location: Option<String>,
    pub max_age_ms: u64,
    pub scrape_options: Option<ScrapeOptions>,
}

/// Scrape invocation, already resolved against the scout's configuration.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub url: String,
    pub max_age_ms: u64,
    pub scrape_options: Option<ScrapeOptions>,
}

// ---------------------------------------------------------------------------
// Outputs (what the model and the step trace see)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub title: String,
    pub url: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutput {
    pub results: Vec<SearchResultItem>,
    /// How many results the blacklist removed.
    pub filtered_count: usize,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tbs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeOutput {
    pub url: String,
    pub title: String,
    /// Markdown, truncated to SCRAPE_CONTENT_MAX_CHARS.
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

// ---------------------------------------------------------------------------
// Provider wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody {
    query: String,
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tbs: Option<String>,
    #[serde(rename = "ignoreInvalidURLs")]
    ignore_invalid_urls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    country: Option<String>,
    scrape_options: EmbeddedScrapeOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddedScrapeOptions {
    max_age: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<std::collections::HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_for: Option<WaitFor>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeBody {
    url: String,
    formats: Vec<serde_json::Value>,
    max_age: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<std::collections::HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_for: Option<WaitFor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<ProviderSearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderSearchResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    description: String,
    published_time: Option<String>,
    favicon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: bool,
    data: Option<ScrapeData>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    markdown: Option<String>,
    screenshot: Option<String>,
    metadata: Option<ScrapeMetadata>,
}

#[derive(Debug, Deserialize)]
struct ScrapeMetadata {
    title: Option<String>,
    favicon: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the search/scrape provider, bound to one user's key.
pub struct SearchClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl SearchClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            http: reqwest::Client::builder()
                .timeout(CALL_TIMEOUT)
                .build()
                .expect("reqwest client"),
        }
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ToolError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ToolError::classify(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ToolError::classify(format!(
                "Provider error ({status}): {text}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ToolError::Other(format!("Malformed provider response: {e}")))
    }
}

/// Resolve the location string the provider receives: a bare city gets the
/// default country appended; the ISO code always accompanies the request.
fn provider_location(location: Option<&str>) -> (Option<String>, Option<String>) {
    match location {
        None => (None, None),
        Some(loc) if loc.contains(',') => (
            Some(loc.to_string()),
            Some(DEFAULT_COUNTRY_CODE.to_string()),
        ),
        Some(loc) => (
            Some(format!("{loc}, {DEFAULT_COUNTRY_NAME}")),
            Some(DEFAULT_COUNTRY_CODE.to_string()),
        ),
    }
}

fn embedded_options(max_age_ms: u64, opts: Option<&ScrapeOptions>) -> EmbeddedScrapeOptions {
    EmbeddedScrapeOptions {
        max_age: max_age_ms,
        headers: opts.and_then(|o| merged_headers(o)),
        wait_for: opts.and_then(|o| o.wait_for.clone()),
    }
}

/// Cookies travel as a Cookie header; explicit headers win on collision.
fn merged_headers(opts: &ScrapeOptions) -> Option<std::collections::HashMap<String, String>> {
    let mut headers = std::collections::HashMap::new();
    if let Some(cookies) = &opts.cookies {
        if !cookies.is_empty() {
            headers.insert("Cookie".to_string(), cookies.clone());
        }
    }
    if let Some(custom) = &opts.headers {
        headers.extend(custom.clone());
    }
    if headers.is_empty() {
        None
    } else {
        Some(headers)
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

#[async_trait]
impl WebFetcher for SearchClient {
    async fn search(&self, request: SearchRequest) -> Result<SearchOutput, ToolError> {
        let (location, country) = provider_location(request.location.as_deref());
        let body = SearchBody {
            query: request.query.clone(),
            limit: request.limit.min(10),
            tbs: request.tbs.clone(),
            ignore_invalid_urls: true,
            location: location.clone(),
            country,
            scrape_options: embedded_options(request.max_age_ms, request.scrape_options.as_ref()),
        };

        debug!(query = %request.query, limit = body.limit, "Search request");

        let resp: SearchResponse = self.post_json("/search", &body).await?;
        if !resp.success {
            return Err(ToolError::Other("Search request was not successful".to_string()));
        }

        let total = resp.data.len();
        let results: Vec<SearchResultItem> = resp
            .data
            .into_iter()
            .filter(|r| !is_blacklisted(&r.url))
            .map(|r| SearchResultItem {
                title: r.title,
                url: r.url,
                description: r.description,
                published_time: r.published_time,
                favicon: r.favicon,
            })
            .collect();
        let filtered_count = total - results.len();

        if filtered_count > 0 {
            debug!(filtered_count, query = %request.query, "Blacklisted results removed");
        }

        Ok(SearchOutput {
            results,
            filtered_count,
            query: request.query,
            tbs: request.tbs,
            location,
        })
    }

    async fn scrape(&self, request: ScrapeRequest) -> Result<ScrapeOutput, ToolError> {
        if is_blacklisted(&request.url) {
            return Err(ToolError::BlacklistedUrl(request.url));
        }

        let opts = request.scrape_options.as_ref();
        let body = ScrapeBody {
            url: request.url.clone(),
            formats: vec![
                serde_json::json!("markdown"),
                serde_json::json!({"type": "screenshot", "fullPage": false}),
            ],
            max_age: request.max_age_ms,
            headers: opts.and_then(merged_headers),
            wait_for: opts.and_then(|o| o.wait_for.clone()),
            timeout: opts.and_then(|o| o.timeout),
        };

        debug!(url = %request.url, "Scrape request");

        let resp: ScrapeResponse = self.post_json("/scrape", &body).await?;
        if !resp.success {
            return Err(ToolError::Other(format!(
                "Scrape of {} was not successful",
                request.url
            )));
        }
        let data = resp
            .data
            .ok_or_else(|| ToolError::Other(format!("Scrape of {} returned no data", request.url)))?;

        let markdown = data.markdown.unwrap_or_default();
        if markdown.is_empty() {
            warn!(url = %request.url, "Scrape returned empty content");
        }

        Ok(ScrapeOutput {
            url: request.url,
            title: data
                .metadata
                .as_ref()
                .and_then(|m| m.title.clone())
                .unwrap_or_default(),
            content: truncate_chars(&markdown, SCRAPE_CONTENT_MAX_CHARS),
            screenshot: data.screenshot,
            favicon: data.metadata.and_then(|m| m.favicon),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_tags_payment_before_auth() {
        assert!(matches!(
            ToolError::classify("Provider error (402): payment required".to_string()),
            ToolError::PaymentRequired(_)
        ));
        assert!(matches!(
            ToolError::classify("Provider error (401): bad key".to_string()),
            ToolError::Unauthorized(_)
        ));
        assert!(matches!(
            ToolError::classify("Provider error (500): boom".to_string()),
            ToolError::Other(_)
        ));
    }

    #[test]
    fn bare_city_gets_default_country() {
        let (loc, country) = provider_location(Some("Portland"));
        assert_eq!(loc.as_deref(), Some("Portland, United States"));
        assert_eq!(country.as_deref(), Some("US"));
    }

    #[test]
    fn city_with_country_is_untouched() {
        let (loc, country) = provider_location(Some("Berlin, Germany"));
        assert_eq!(loc.as_deref(), Some("Berlin, Germany"));
        assert_eq!(country.as_deref(), Some("US"));
    }

    #[test]
    fn no_location_sends_neither_field() {
        assert_eq!(provider_location(None), (None, None));
    }

    #[test]
    fn cookies_become_cookie_header() {
        let opts = ScrapeOptions {
            cookies: Some("session=abc".to_string()),
            ..Default::default()
        };
        let headers = merged_headers(&opts).unwrap();
        assert_eq!(headers.get("Cookie").unwrap(), "session=abc");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "é".repeat(3000);
        let out = truncate_chars(&s, SCRAPE_CONTENT_MAX_CHARS);
        assert_eq!(out.chars().count(), SCRAPE_CONTENT_MAX_CHARS);
    }

    #[test]
    fn search_body_serializes_provider_field_names() {
        let body = SearchBody {
            query: "ai news".to_string(),
            limit: 5,
            tbs: Some("qdr:d".to_string()),
            ignore_invalid_urls: true,
            location: None,
            country: None,
            scrape_options: EmbeddedScrapeOptions {
                max_age: 86_400_000,
                headers: None,
                wait_for: Some(WaitFor::Millis(1500)),
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["ignoreInvalidURLs"], true);
        assert_eq!(json["scrapeOptions"]["maxAge"], 86_400_000);
        assert_eq!(json["scrapeOptions"]["waitFor"], 1500);
    }
}
