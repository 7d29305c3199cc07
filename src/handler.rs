use crate::db::{self, DbPool};
use crate::error::TrendsError;
use crate::pagination::{run_pagination, FeedFetcher, PostSource, Resume, RunContext};
use crate::settings::{FeedSettings, Settings};
use crate::sink::SnapshotSink;
use crate::trends::{read_periods, read_top_entities, roll_period, write_top_entities, PeriodReport};
use crate::utils::logs;
use crate::utils::twitter::{TwitterClient, TwitterError};
use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

pub const SECRET_HEADER: &str = "x-api-secret";

pub struct AppState {
    pub pool: DbPool,
    pub sink: Arc<dyn SnapshotSink>,
    pub settings: Settings,
    pub client: Option<TwitterClient>,
    pub api_secret: Option<String>,
    run_locks: HashMap<String, Arc<Mutex<()>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub run_count: u32,
    #[serde(default)]
    pub since_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunResponse {
    #[serde(rename_all = "camelCase")]
    Done { pages: u32, new_posts: usize },
    #[serde(rename_all = "camelCase")]
    Resume { cursor: String, run_count: u32 },
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReport {
    pub counters: usize,
    pub seen_posts: usize,
}

impl AppState {
    pub fn new(
        pool: DbPool,
        sink: Arc<dyn SnapshotSink>,
        settings: Settings,
        client: Option<TwitterClient>,
        api_secret: Option<String>,
    ) -> Self {
        let run_locks = settings
            .feeds
            .iter()
            .map(|f| (f.name.clone(), Arc::new(Mutex::new(()))))
            .collect();
        Self {
            pool,
            sink,
            settings,
            client,
            api_secret: api_secret.filter(|s| !s.is_empty()),
            run_locks,
        }
    }

    pub fn feed(&self, name: &str) -> Result<&FeedSettings, TrendsError> {
        self.settings
            .feed(name)
            .ok_or_else(|| TrendsError::UnknownFeed(name.to_string()))
    }

    fn feed_lock(&self, name: &str) -> Result<Arc<Mutex<()>>, TrendsError> {
        self.run_locks
            .get(name)
            .cloned()
            .ok_or_else(|| TrendsError::UnknownFeed(name.to_string()))
    }

    /// One pagination invocation against the live upstream.
    pub async fn run_live(
        &self,
        feed_name: &str,
        resume: &Resume,
        since_id: Option<String>,
    ) -> Result<RunResponse, TrendsError> {
        let feed = self.feed(feed_name)?;
        let client = self
            .client
            .as_ref()
            .ok_or(TrendsError::Upstream(TwitterError::MissingToken))?;
        let source = FeedFetcher::new(client, feed).with_since_id(since_id);
        self.run_feed(feed, &source, resume).await
    }

    /// Runs of the same feed are serialized; the snapshot is rewritten after every page.
    pub async fn run_feed<S: PostSource>(
        &self,
        feed: &FeedSettings,
        source: &S,
        resume: &Resume,
    ) -> Result<RunResponse, TrendsError> {
        let lock = self.feed_lock(&feed.name)?;
        let _guard = lock.lock().await;

        let mut conn = self.pool.get()?;
        let blocklist = self.settings.blocklist();
        let limit = self.settings.snapshot.top_limit;
        let ctx = RunContext {
            feed,
            quality: &self.settings.quality,
            self_domains: &self.settings.twitter.self_domains,
        };

        logs::log_run_start(&feed.name, resume);
        let result = run_pagination(&mut conn, source, &ctx, resume, |conn, progress| {
            logs::log_page(progress);
            let top = write_top_entities(conn, self.sink.as_ref(), &feed.name, limit, &blocklist)?;
            logs::log_snapshot_written(&feed.name, &top);
            Ok(())
        })
        .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                logs::log_run_error(&feed.name, &e.to_string());
                return Err(e);
            }
        };
        logs::log_run_done(&feed.name, &outcome);

        Ok(match outcome.next_resume(resume, feed.max_runs) {
            Some(next) => RunResponse::Resume {
                cursor: next.cursor.unwrap_or_default(),
                run_count: next.run_count,
            },
            None => RunResponse::Done {
                pages: outcome.pages,
                new_posts: outcome.new_posts,
            },
        })
    }

    pub async fn roll_feed(&self, feed_name: &str, today: NaiveDate) -> Result<PeriodReport, TrendsError> {
        let lock = self.feed_lock(feed_name)?;
        let _guard = lock.lock().await;

        let mut conn = self.pool.get()?;
        let report = roll_period(
            &mut conn,
            self.sink.as_ref(),
            feed_name,
            &self.settings.blocklist(),
            today,
        );
        match report {
            Ok(report) => {
                logs::log_roll(feed_name, &report);
                Ok(report)
            }
            Err(e) => {
                logs::log_roll_error(feed_name, &e.to_string());
                Err(e)
            }
        }
    }

    pub async fn clear_feed(&self, feed_name: &str) -> Result<ClearReport, TrendsError> {
        let lock = self.feed_lock(feed_name)?;
        let _guard = lock.lock().await;

        let mut conn = self.pool.get()?;
        let (counters, seen_posts) = db::clear_feed(&mut conn, feed_name)?;
        tracing::info!(feed = feed_name, counters, seen_posts, "feed namespace cleared");
        Ok(ClearReport {
            counters,
            seen_posts,
        })
    }
}

#[derive(Debug)]
pub enum ApiError {
    Trends(TrendsError),
    Unauthorized,
    BadRequest(String),
}

impl From<TrendsError> for ApiError {
    fn from(err: TrendsError) -> Self {
        ApiError::Trends(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Trends(err) => {
                let status = match &err {
                    TrendsError::Upstream(_) => StatusCode::BAD_GATEWAY,
                    TrendsError::UnknownFeed(_) => StatusCode::NOT_FOUND,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::warn!(error = %err, "request failed");
                }
                (status, err.to_string())
            }
        };
        (status, Json(serde_json::json!({ "ok": false, "error": message }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct Success<T> {
    ok: bool,
    data: T,
}

fn success<T: Serialize>(data: T) -> Json<Success<T>> {
    Json(Success { ok: true, data })
}

type ApiResult<T> = Result<Json<Success<T>>, ApiError>;

/// Compares without short-circuiting on the first differing byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

async fn require_secret(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok());

    let authorized = match (state.api_secret.as_deref(), provided) {
        (Some(expected), Some(given)) => constant_time_eq(expected.as_bytes(), given.as_bytes()),
        _ => false,
    };

    if !authorized {
        logs::log_unauthorized(request.uri().path());
        return ApiError::Unauthorized.into_response();
    }
    next.run(request).await
}

pub fn router(state: Arc<AppState>) -> Router {
    let writes = Router::new()
        .route("/feeds/{feed}/run", post(run_handler))
        .route("/feeds/{feed}/roll", post(roll_handler))
        .route("/feeds/{feed}", delete(clear_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_secret));

    Router::new()
        .route("/health", get(health))
        .route("/feeds/{feed}/top", get(top_handler))
        .route("/feeds/{feed}/periods", get(periods_handler))
        .merge(writes)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Success<serde_json::Value>> {
    let feeds: Vec<&str> = state.settings.feeds.iter().map(|f| f.name.as_str()).collect();
    success(serde_json::json!({ "status": "ok", "feeds": feeds }))
}

async fn top_handler(
    State(state): State<Arc<AppState>>,
    Path(feed): Path<String>,
) -> ApiResult<Option<crate::trends::TopEntities>> {
    state.feed(&feed)?;
    Ok(success(read_top_entities(state.sink.as_ref(), &feed)?))
}

async fn periods_handler(
    State(state): State<Arc<AppState>>,
    Path(feed): Path<String>,
) -> ApiResult<Option<PeriodReport>> {
    state.feed(&feed)?;
    Ok(success(read_periods(state.sink.as_ref(), &feed)?))
}

async fn run_handler(
    State(state): State<Arc<AppState>>,
    Path(feed): Path<String>,
    body: Bytes,
) -> ApiResult<RunResponse> {
    let request: RunRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RunRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };
    let resume = Resume {
        cursor: request.cursor,
        run_count: request.run_count,
    };

    Ok(success(state.run_live(&feed, &resume, request.since_id).await?))
}

async fn roll_handler(
    State(state): State<Arc<AppState>>,
    Path(feed): Path<String>,
) -> ApiResult<PeriodReport> {
    let today = Utc::now().date_naive();
    Ok(success(state.roll_feed(&feed, today).await?))
}

async fn clear_handler(
    State(state): State<Arc<AppState>>,
    Path(feed): Path<String>,
) -> ApiResult<ClearReport> {
    Ok(success(state.clear_feed(&feed).await?))
}
