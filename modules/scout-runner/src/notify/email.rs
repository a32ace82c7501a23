use async_trait::async_trait;
use pulldown_cmark::{html, Options, Parser};
use serde_json::json;
use tracing::warn;

use scout_common::Scout;

use super::NotifyBackend;

const EMAIL_API_URL: &str = "https://api.resend.com/emails";

/// Transactional email backend.
pub struct EmailNotifier {
    api_key: String,
    from: String,
    http: reqwest::Client,
}

impl EmailNotifier {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            api_key,
            from,
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(EMAIL_API_URL)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Email API returned non-success");
            anyhow::bail!("Email API returned {status}");
        }

        Ok(())
    }
}

#[async_trait]
impl NotifyBackend for EmailNotifier {
    async fn send_success(
        &self,
        to: &str,
        scout: &Scout,
        response_markdown: &str,
    ) -> anyhow::Result<()> {
        let subject = format!("Your scout \"{}\" found something new", scout.title);
        let html = render_email_html(scout, response_markdown);

        let payload = json!({
            "from": self.from,
            "to": [to],
            "subject": subject,
            "html": html,
        });

        self.post(payload).await
    }
}

/// Render the result markdown into the notification body.
fn render_email_html(scout: &Scout, response_markdown: &str) -> String {
    let mut rendered = String::new();
    let parser = Parser::new_ext(response_markdown, Options::empty());
    html::push_html(&mut rendered, parser);

    format!(
        r#"<div style="font-family: sans-serif; max-width: 640px; margin: 0 auto;">
  <h2 style="margin-bottom: 4px;">{title}</h2>
  <p style="color: #666; margin-top: 0;">{goal}</p>
  <hr style="border: none; border-top: 1px solid #ddd;">
  {body}
  <hr style="border: none; border-top: 1px solid #ddd;">
  <p style="color: #999; font-size: 12px;">
    This scout runs {frequency}. Manage it from your dashboard.
  </p>
</div>"#,
        title = escape_html(&scout.title),
        goal = escape_html(&scout.goal),
        body = rendered,
        frequency = frequency_phrase(scout),
    )
}

fn frequency_phrase(scout: &Scout) -> &'static str {
    match scout.frequency {
        scout_common::Frequency::Hourly => "every hour",
        scout_common::Frequency::Daily => "daily",
        scout_common::Frequency::Every3Days => "every 3 days",
        scout_common::Frequency::Weekly => "weekly",
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scout() -> Scout {
        Scout {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "AI News <daily>".to_string(),
            goal: "Track releases".to_string(),
            description: String::new(),
            queries: vec!["ai".to_string()],
            location: None,
            frequency: scout_common::Frequency::Daily,
            scrape_options: None,
            is_active: true,
            last_run_at: None,
            consecutive_failures: 0,
        }
    }

    #[test]
    fn renders_markdown_to_html() {
        let html = render_email_html(&scout(), "**Bold finding** with a [link](https://a.example)");
        assert!(html.contains("<strong>Bold finding</strong>"));
        assert!(html.contains("href=\"https://a.example\""));
    }

    #[test]
    fn escapes_scout_fields() {
        let html = render_email_html(&scout(), "body");
        assert!(html.contains("AI News &lt;daily&gt;"));
        assert!(!html.contains("AI News <daily>"));
    }
}
