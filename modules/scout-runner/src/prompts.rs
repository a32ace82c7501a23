//! System prompt assembly for the agent loop.

use chrono::{DateTime, Utc};

use scout_common::{RecentFinding, Scout};

/// How many recent findings are surfaced in the prompt.
pub const MAX_FINDINGS_IN_PROMPT: usize = 5;

const RESPONSE_CONTRACT: &str = r#"When you are done, respond with ONLY a JSON object (no prose around it):
{
  "taskCompleted": boolean, // true only if you verified a genuinely new, relevant finding
  "taskStatus": "completed" | "partial" | "not_found" | "insufficient_data",
  "response": string // markdown summary of what you found; do not use em-dashes
}"#;

/// Build the system message for a run.
pub fn system_prompt(scout: &Scout, recent: &[RecentFinding], now: DateTime<Utc>) -> String {
    let queries = scout
        .queries
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{}. \"{q}\"", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    let location_line = match scout.search_location() {
        Some(loc) => format!("Bias searches toward: {}\n", loc.city),
        None => String::new(),
    };

    let mut prompt = format!(
        "You are a web monitoring agent running the scout \"{title}\".\n\
         Goal: {goal}\n\
         {description}\n\
         {location_line}\n\
         How to work:\n\
         - Start with the configured queries, in order:\n{queries}\n\
         - Scrape 2-3 of the most promising results to verify what the \
           snippets claim before reporting it.\n\
         - Do not repeat a search you have already run.\n\
         - You have roughly 7 steps; budget them.\n\n\
         {contract}",
        title = scout.title,
        goal = scout.goal,
        description = scout.description,
        location_line = location_line,
        queries = queries,
        contract = RESPONSE_CONTRACT,
    );

    if !recent.is_empty() {
        prompt.push_str("\n\nPrevious findings for this scout:\n");
        for finding in recent.iter().take(MAX_FINDINGS_IN_PROMPT) {
            prompt.push_str(&format!(
                "- {} ({})\n",
                finding.summary_text,
                relative_day_phrase(finding.completed_at, now)
            ));
        }
        prompt.push_str(
            "If what you find substantially duplicates any of these, set \
             taskStatus to \"not_found\" instead of reporting it again.",
        );
    }

    prompt
}

/// "found today" / "found yesterday" / "found N days ago".
pub fn relative_day_phrase(completed_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = (now - completed_at).num_days();
    match days {
        i64::MIN..=0 => "found today".to_string(),
        1 => "found yesterday".to_string(),
        n => format!("found {n} days ago"),
    }
}

/// Injected every third loop to keep the model aware of its step budget.
pub fn reminder_message(steps_used: i32, max_loops: u32) -> String {
    format!(
        "Progress check: you have used {steps_used} steps of roughly {max_loops}. \
         Wrap up soon and produce the final JSON response."
    )
}

/// System prompt for the post-run summary call.
pub const SUMMARY_SYSTEM_PROMPT: &str = "Condense the finding into a single sentence of at most \
     150 characters. Include the concrete specifics (names, numbers, dates), not generalities. \
     Respond with the sentence only.";
