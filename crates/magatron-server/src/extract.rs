use anyhow::Context;
use chrono::{DateTime, SecondsFormat};
use magatron_due::{parse_candidate, TaskCandidate, Tz};
use serde::{Deserialize, Serialize};
use tracing::debug;

const SYSTEM_PROMPT: &str = "You turn chat messages into tasks. From the user's message extract:\n\
1. title: a short task name\n\
2. description: extra details, or an empty string\n\
3. due_date: the deadline as YYYY-MM-DDTHH:MM:SS in the user's local time, or null if none is given\n\
4. labels: a list of short tags, possibly empty\n\
Resolve relative dates (\"tomorrow\", \"on Friday\") against the current time you are given. \
Keep the language of the message. Reply with a single JSON object and nothing else:\n\
{\"title\": \"...\", \"description\": \"...\", \"due_date\": \"...\", \"labels\": [\"...\"]}";

/// Client for an OpenAI-compatible chat completions API that extracts task fields.
pub struct Extractor {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl Extractor {
    pub fn new(http: reqwest::Client, api_key: String, base_url: String, model: String) -> Self {
        Self {
            http,
            api_key,
            base_url,
            model,
        }
    }

    /// Ask the model for task fields. The reply is parsed and normalized but its title is
    /// not validated here.
    pub async fn extract(
        &self,
        text: &str,
        reference_now: DateTime<Tz>,
    ) -> anyhow::Result<TaskCandidate> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: [Message<'a>; 2],
            temperature: f32,
        }

        let url = format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let user_content = build_user_content(text, reference_now);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&Req {
                model: &self.model,
                messages: [
                    Message {
                        role: "system",
                        content: SYSTEM_PROMPT,
                    },
                    Message {
                        role: "user",
                        content: &user_content,
                    },
                ],
                temperature: 0.0,
            })
            .send()
            .await
            .context("chat completions request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("chat completions API error {status}: {text}");
        }

        let body: ChatCompletion = resp.json().await.context("decode chat completion")?;
        let reply = reply_content(body).context("chat completion contained no message")?;
        debug!(reply = %reply, "extraction reply");

        parse_candidate(&reply).context("parse extracted task")
    }
}

fn build_user_content(text: &str, reference_now: DateTime<Tz>) -> String {
    format!(
        "Current time: {} ({})\n\nMessage: {}",
        reference_now.to_rfc3339_opts(SecondsFormat::Secs, false),
        reference_now.timezone().name(),
        text.trim()
    )
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn reply_content(body: ChatCompletion) -> Option<String> {
    body.choices
        .into_iter()
        .find_map(|c| c.message.content.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn user_content_carries_reference_time() {
        let now = Tz::Europe__Moscow
            .with_ymd_and_hms(2025, 1, 10, 9, 0, 0)
            .unwrap();
        assert_eq!(
            build_user_content("  напомни завтра в 15:00 ", now),
            "Current time: 2025-01-10T09:00:00+03:00 (Europe/Moscow)\n\nMessage: напомни завтра в 15:00"
        );
    }

    #[test]
    fn takes_first_non_empty_choice() {
        let body: ChatCompletion = serde_json::from_value(serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "{\"title\": \"x\"}" } }
            ]
        }))
        .unwrap();
        assert_eq!(reply_content(body).as_deref(), Some("{\"title\": \"x\"}"));

        let body: ChatCompletion =
            serde_json::from_value(serde_json::json!({ "choices": [] })).unwrap();
        assert_eq!(reply_content(body), None);

        let body: ChatCompletion = serde_json::from_value(serde_json::json!({
            "choices": [ { "message": { "content": null } } ]
        }))
        .unwrap();
        assert_eq!(reply_content(body), None);
    }
}
