use anyhow::Context;
use magatron_due::ResolvedTask;

/// Posts resolved tasks, unchanged, to an automation webhook.
pub struct Forwarder {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl Forwarder {
    pub fn new(http: reqwest::Client, url: String, token: Option<String>) -> Self {
        Self { http, url, token }
    }

    pub async fn forward(&self, task: &ResolvedTask) -> anyhow::Result<()> {
        let mut req = self.http.post(&self.url).json(task);
        if let Some(token) = self.token.as_deref() {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.context("forward task")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("forward webhook error {status}: {text}");
        }

        Ok(())
    }
}
