//! The agent's tool surface: exactly two tools, modeled as tagged
//! variants. JSON only exists at the LLM boundary; everything inward is
//! typed.

use serde::Deserialize;

use ai_client::ToolSpec;
use scout_common::StepType;

pub const SEARCH_TOOL: &str = "searchWeb";
pub const SCRAPE_TOOL: &str = "scrapeWebsite";

#[derive(Debug, Clone, Deserialize)]
pub struct SearchWebArgs {
    pub query: String,
    pub limit: Option<u32>,
    pub tbs: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeWebsiteArgs {
    pub url: String,
}

/// A parsed tool call from the model.
#[derive(Debug, Clone)]
pub enum ToolInvocation {
    Search(SearchWebArgs),
    Scrape(ScrapeWebsiteArgs),
}

impl ToolInvocation {
    pub fn parse(name: &str, arguments: &serde_json::Value) -> Result<Self, String> {
        match name {
            SEARCH_TOOL => serde_json::from_value(arguments.clone())
                .map(ToolInvocation::Search)
                .map_err(|e| format!("Invalid {SEARCH_TOOL} arguments: {e}")),
            SCRAPE_TOOL => serde_json::from_value(arguments.clone())
                .map(ToolInvocation::Scrape)
                .map_err(|e| format!("Invalid {SCRAPE_TOOL} arguments: {e}")),
            other => Err(format!("Unknown tool: {other}")),
        }
    }

    pub fn step_type(&self) -> StepType {
        match self {
            ToolInvocation::Search(_) => StepType::Search,
            ToolInvocation::Scrape(_) => StepType::Scrape,
        }
    }

    pub fn description(&self) -> String {
        match self {
            ToolInvocation::Search(args) => format!("Search: {}", args.query),
            ToolInvocation::Scrape(args) => format!("Scrape: {}", args.url),
        }
    }
}

/// Tool declarations sent with every chat completion.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec::function(
            SEARCH_TOOL,
            "Search the web. Returns result titles, URLs, and descriptions. \
             Social media, video, and paywalled domains are filtered out.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum results to return (default 5, max 10)"
                    },
                    "tbs": {
                        "type": "string",
                        "description": "Time filter: qdr:h (hour), qdr:d (day), qdr:w (week), qdr:m (month)"
                    }
                },
                "required": ["query"]
            }),
        ),
        ToolSpec::function(
            SCRAPE_TOOL,
            "Fetch a web page and return its content as markdown. \
             Use on promising search results to verify findings.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The URL to fetch"
                    }
                },
                "required": ["url"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_arguments() {
        let inv = ToolInvocation::parse(
            SEARCH_TOOL,
            &serde_json::json!({"query": "ai news", "limit": 5}),
        )
        .unwrap();
        match inv {
            ToolInvocation::Search(args) => {
                assert_eq!(args.query, "ai news");
                assert_eq!(args.limit, Some(5));
                assert_eq!(args.tbs, None);
            }
            other => panic!("expected search, got {other:?}"),
        }
    }

    #[test]
    fn parses_scrape_arguments() {
        let inv =
            ToolInvocation::parse(SCRAPE_TOOL, &serde_json::json!({"url": "https://a.example"}))
                .unwrap();
        assert!(matches!(inv, ToolInvocation::Scrape(_)));
        assert_eq!(inv.step_type(), StepType::Scrape);
    }

    #[test]
    fn unknown_tool_is_an_error() {
        let err = ToolInvocation::parse("deleteEverything", &serde_json::json!({})).unwrap_err();
        assert!(err.contains("Unknown tool"));
    }

    #[test]
    fn missing_required_argument_is_an_error() {
        assert!(ToolInvocation::parse(SEARCH_TOOL, &serde_json::json!({})).is_err());
    }

    #[test]
    fn declares_exactly_two_tools() {
        let specs = tool_specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].function.name, SEARCH_TOOL);
        assert_eq!(specs[1].function.name, SCRAPE_TOOL);
    }
}
