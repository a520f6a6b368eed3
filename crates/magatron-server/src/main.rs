mod config;
mod extract;
mod forward;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, TimeZone, Utc};
use clap::Parser;
use magatron_due::{parse_zone, ResolvedTask, Resolver, TaskCandidate, Tz};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{nonempty, Config};
use crate::extract::Extractor;
use crate::forward::Forwarder;

type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    err: anyhow::Error,
}

impl AppError {
    fn new(status: StatusCode, err: impl Into<anyhow::Error>) -> Self {
        Self {
            status,
            err: err.into(),
        }
    }

    fn bad_request(msg: &'static str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, anyhow::anyhow!(msg))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = if self.status.is_server_error() {
            error!(error = %format!("{:#}", self.err), status = %self.status, "request failed");
            match self.status {
                StatusCode::INTERNAL_SERVER_ERROR => "internal error".to_string(),
                _ => self.err.to_string(),
            }
        } else {
            warn!(error = %format!("{:#}", self.err), status = %self.status, "request rejected");
            format!("{:#}", self.err)
        };
        (self.status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Clone)]
struct AppState {
    resolver: Arc<Resolver>,
    zone: Tz,
    extractor: Option<Arc<Extractor>>,
    forwarder: Option<Arc<Forwarder>>,
    webhook_secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::parse();
    let zone = config.effective_zone()?;
    let policy = config.resolver_policy()?;
    info!(
        zone = zone.name(),
        past_candidate = policy.past_candidate.as_str(),
        default_time = %policy.default_time,
        "resolver configured"
    );

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .context("build reqwest client")?;

    let extractor = match nonempty(config.openai_api_key.as_deref()) {
        Some(key) => Some(Arc::new(Extractor::new(
            http.clone(),
            key,
            config.openai_base_url.clone(),
            config.openai_model.clone(),
        ))),
        None => {
            warn!("OPENAI_API_KEY not set; requests must include a candidate");
            None
        }
    };
    let forwarder = nonempty(config.forward_webhook_url.as_deref()).map(|url| {
        info!(%url, "forwarding resolved tasks");
        Arc::new(Forwarder::new(
            http.clone(),
            url,
            nonempty(config.forward_token.as_deref()),
        ))
    });

    let state = AppState {
        resolver: Arc::new(Resolver::new(policy)),
        zone,
        extractor,
        forwarder,
        webhook_secret: nonempty(config.webhook_secret.as_deref()),
    };

    let app = router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "magatron is running" }))
        .route("/healthz", get(healthz))
        .route("/tasks", post(create_task))
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[derive(Debug, Deserialize)]
struct TaskRequest {
    #[serde(default)]
    text: String,
    /// When the message was written; the reference instant for every relative date.
    #[serde(default)]
    sent_at: Option<SentAt>,
    #[serde(default)]
    candidate: Option<TaskCandidate>,
    #[serde(default)]
    zone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SentAt {
    Unix(i64),
    Text(String),
}

impl SentAt {
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            SentAt::Unix(secs) => Utc.timestamp_opt(*secs, 0).single(),
            SentAt::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Serialize)]
struct TaskResponse {
    task: ResolvedTask,
    forwarded: bool,
}

async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<TaskResponse>> {
    check_secret(state.webhook_secret.as_deref(), &headers)?;

    let req: TaskRequest = serde_json::from_slice(&body)
        .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err))?;

    let reference_now = req
        .sent_at
        .as_ref()
        .and_then(SentAt::to_utc)
        .ok_or_else(|| AppError::bad_request("missing or invalid sent_at"))?;

    let zone = match req.zone.as_deref() {
        Some(name) => {
            parse_zone(name).map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err))?
        }
        None => state.zone,
    };

    let text = req.text.trim();
    let candidate = match req.candidate {
        Some(candidate) => candidate,
        None => {
            if text.is_empty() {
                return Err(AppError::bad_request("text or candidate required"));
            }
            let Some(extractor) = state.extractor.as_deref() else {
                return Err(AppError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    anyhow::anyhow!("extraction not configured (missing OPENAI_API_KEY)"),
                ));
            };
            extractor
                .extract(text, reference_now.with_timezone(&zone))
                .await
                .map_err(|err| AppError::new(StatusCode::BAD_GATEWAY, err))?
        }
    };

    let task = ResolvedTask::assemble(candidate, text, reference_now, zone, &state.resolver)
        .map_err(|err| AppError::new(StatusCode::UNPROCESSABLE_ENTITY, err))?;
    info!(
        title = %task.title,
        due = ?task.due,
        source = ?task.due_source,
        "task resolved"
    );

    let forwarded = match state.forwarder.as_deref() {
        Some(forwarder) => match forwarder.forward(&task).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to forward task");
                false
            }
        },
        None => false,
    };

    Ok(Json(TaskResponse { task, forwarded }))
}

fn check_secret(want: Option<&str>, headers: &HeaderMap) -> AppResult<()> {
    let Some(want) = want else {
        return Ok(());
    };
    let got = headers
        .get("X-Magatron-Secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if got.as_bytes().ct_eq(want.as_bytes()).unwrap_u8() != 1 {
        return Err(AppError::new(
            StatusCode::UNAUTHORIZED,
            anyhow::anyhow!("invalid secret"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use tower::ServiceExt;

    fn state(secret: Option<&str>) -> AppState {
        AppState {
            resolver: Arc::new(Resolver::default()),
            zone: Tz::Europe__Moscow,
            extractor: None,
            forwarder: None,
            webhook_secret: secret.map(str::to_string),
        }
    }

    fn post_tasks(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/tasks")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn healthz_ok() {
        let req = Request::builder()
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();
        let resp = router(state(None)).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn resolves_candidate_against_message_time() {
        // 2025-01-10T09:00:00+03:00
        let (status, json) = call(
            router(state(None)),
            post_tasks(serde_json::json!({
                "text": "напомни завтра в 15:00 купить билеты",
                "sent_at": 1736488800,
                "candidate": {
                    "title": "Купить билеты",
                    "due_date": null,
                    "labels": ["travel"]
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["task"]["title"], "Купить билеты");
        assert_eq!(json["task"]["due"], "2025-01-11T15:00:00+03:00");
        assert_eq!(json["task"]["due_source"], "heuristic_phrase");
        assert_eq!(json["forwarded"], false);
    }

    #[tokio::test]
    async fn zone_override_and_rfc3339_sent_at() {
        let (status, json) = call(
            router(state(None)),
            post_tasks(serde_json::json!({
                "text": "pay rent",
                "sent_at": "2025-06-01T00:00:00Z",
                "zone": "UTC",
                "candidate": { "title": "Pay rent", "due_date": "2022-03-01T10:00:00" }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["task"]["due"], "2026-03-01T10:00:00+00:00");
        assert_eq!(json["task"]["due_source"], "structured_candidate");
    }

    #[tokio::test]
    async fn missing_sent_at_is_bad_request() {
        let (status, _) = call(
            router(state(None)),
            post_tasks(serde_json::json!({
                "text": "завтра",
                "candidate": { "title": "x" }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_zone_is_bad_request() {
        let (status, json) = call(
            router(state(None)),
            post_tasks(serde_json::json!({
                "text": "завтра",
                "sent_at": 1736488800,
                "zone": "Mars/Olympus",
                "candidate": { "title": "x" }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "unknown time zone: Mars/Olympus");
    }

    #[tokio::test]
    async fn untitled_candidate_is_unprocessable() {
        let (status, _) = call(
            router(state(None)),
            post_tasks(serde_json::json!({
                "text": "завтра",
                "sent_at": 1736488800,
                "candidate": { "title": "  ", "description": "no name" }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn extraction_unavailable_without_key() {
        let (status, _) = call(
            router(state(None)),
            post_tasks(serde_json::json!({
                "text": "купить молоко завтра",
                "sent_at": 1736488800
            })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn invalid_json_is_bad_request() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/tasks")
            .body(Body::from("not json"))
            .unwrap();
        let (status, _) = call(router(state(None)), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn secret_is_enforced() {
        let body = serde_json::json!({
            "text": "завтра",
            "sent_at": 1736488800,
            "candidate": { "title": "x" }
        });

        let (status, _) = call(router(state(Some("s3cret"))), post_tasks(body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut req = post_tasks(body);
        req.headers_mut()
            .insert("x-magatron-secret", "s3cret".parse().unwrap());
        let (status, _) = call(router(state(Some("s3cret"))), req).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn sent_at_accepts_unix_and_rfc3339() {
        let unix: SentAt = serde_json::from_value(serde_json::json!(1736488800)).unwrap();
        let text: SentAt =
            serde_json::from_value(serde_json::json!("2025-01-10T09:00:00+03:00")).unwrap();
        assert_eq!(unix.to_utc(), text.to_utc());
        assert!(unix.to_utc().is_some());

        let junk: SentAt = serde_json::from_value(serde_json::json!("yesterday")).unwrap();
        assert_eq!(junk.to_utc(), None);
    }
}
