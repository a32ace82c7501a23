//! Tolerant parsing of the model's structured final message.

use tracing::warn;

use scout_common::{AgentResponse, TaskStatus};

/// Parse the assistant's final content as the structured response.
///
/// Models wrap JSON in code fences and sometimes trail prose after the
/// closing brace; both are stripped before parsing. A message that still
/// fails to parse is coerced to an insufficient_data result carrying the
/// raw text, never an error.
pub fn parse_agent_response(raw: &str) -> AgentResponse {
    let cleaned = clean_json_payload(raw);

    match serde_json::from_str::<AgentResponse>(&cleaned) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Model final message was not valid JSON, coercing");
            AgentResponse {
                task_completed: false,
                task_status: TaskStatus::InsufficientData,
                response: raw.to_string(),
            }
        }
    }
}

/// Strip common markdown fences and truncate to the last closing brace.
fn clean_json_payload(raw: &str) -> String {
    let mut s = raw.trim();

    for fence in ["```json", "```JSON", "```"] {
        if let Some(rest) = s.strip_prefix(fence) {
            s = rest;
            break;
        }
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    let s = s.trim();

    match s.rfind('}') {
        Some(pos) => s[..=pos].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str =
        r#"{"taskCompleted": true, "taskStatus": "completed", "response": "Found a release."}"#;

    #[test]
    fn parses_plain_json() {
        let r = parse_agent_response(VALID);
        assert!(r.task_completed);
        assert_eq!(r.task_status, TaskStatus::Completed);
        assert_eq!(r.response, "Found a release.");
    }

    #[test]
    fn strips_json_code_fence() {
        let fenced = format!("```json\n{VALID}\n```");
        assert!(parse_agent_response(&fenced).task_completed);
    }

    #[test]
    fn strips_bare_code_fence() {
        let fenced = format!("```\n{VALID}\n```");
        assert!(parse_agent_response(&fenced).task_completed);
    }

    #[test]
    fn truncates_trailing_prose_after_brace() {
        let noisy = format!("{VALID}\n\nLet me know if you need anything else!");
        assert!(parse_agent_response(&noisy).task_completed);
    }

    #[test]
    fn coerces_non_json_to_insufficient_data() {
        let r = parse_agent_response("I could not find anything relevant today.");
        assert!(!r.task_completed);
        assert_eq!(r.task_status, TaskStatus::InsufficientData);
        assert_eq!(r.response, "I could not find anything relevant today.");
    }

    #[test]
    fn coerces_unknown_status_to_insufficient_data() {
        let r = parse_agent_response(
            r#"{"taskCompleted": true, "taskStatus": "done", "response": "x"}"#,
        );
        assert_eq!(r.task_status, TaskStatus::InsufficientData);
    }

    #[test]
    fn not_found_status_round_trips() {
        let r = parse_agent_response(
            r#"{"taskCompleted": false, "taskStatus": "not_found", "response": "Nothing new."}"#,
        );
        assert_eq!(r.task_status, TaskStatus::NotFound);
    }
}
