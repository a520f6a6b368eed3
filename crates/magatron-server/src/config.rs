use anyhow::Context;
use chrono::NaiveTime;
use clap::Parser;
use magatron_due::{parse_zone, PastCandidatePolicy, ResolverPolicy, Tz};

#[derive(Parser, Debug, Clone)]
#[command(name = "magatron-server")]
pub struct Config {
    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// IANA zone in which naive dates and relative phrases are interpreted.
    #[arg(long, env = "MAGATRON_ZONE", default_value = "Europe/Moscow")]
    pub zone: String,

    /// Time of day (HH:MM) given to dates that carry none.
    #[arg(long, env = "MAGATRON_DEFAULT_TIME", default_value = "09:00")]
    pub default_time: String,

    /// What to do with an extracted due date that is already in the past:
    /// `repair`, `honor` or `discard`.
    #[arg(long, env = "MAGATRON_PAST_CANDIDATE", default_value = "repair")]
    pub past_candidate: PastCandidatePolicy,

    #[arg(long, env = "MAGATRON_MAX_YEAR_LAG", default_value = "10")]
    pub max_year_lag: i32,

    /// Years the extractor is known to invent (comma-separated in the environment).
    #[arg(
        long = "sentinel-year",
        env = "MAGATRON_SENTINEL_YEARS",
        value_delimiter = ','
    )]
    pub sentinel_years: Vec<i32>,

    /// Enables LLM extraction for requests that arrive without a candidate.
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com")]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,

    /// If set, every resolved task is POSTed here as JSON.
    #[arg(long, env = "FORWARD_WEBHOOK_URL")]
    pub forward_webhook_url: Option<String>,

    #[arg(long, env = "FORWARD_WEBHOOK_TOKEN")]
    pub forward_token: Option<String>,

    /// If set, require requests to include header `X-Magatron-Secret: <value>`.
    #[arg(long, env = "MAGATRON_WEBHOOK_SECRET")]
    pub webhook_secret: Option<String>,
}

impl Config {
    pub fn effective_zone(&self) -> anyhow::Result<Tz> {
        parse_zone(&self.zone).context("MAGATRON_ZONE")
    }

    pub fn resolver_policy(&self) -> anyhow::Result<ResolverPolicy> {
        let default_time = parse_time_of_day(&self.default_time)
            .with_context(|| format!("invalid MAGATRON_DEFAULT_TIME: {}", self.default_time))?;
        anyhow::ensure!(self.max_year_lag >= 0, "MAGATRON_MAX_YEAR_LAG must not be negative");
        Ok(ResolverPolicy {
            default_time,
            past_candidate: self.past_candidate,
            max_year_lag: self.max_year_lag,
            sentinel_years: self.sentinel_years.clone(),
        })
    }
}

pub fn nonempty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_time_of_day(s: &str) -> anyhow::Result<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .context("expected HH:MM")
}
