use crate::config::ServerConfig;
use crate::error::{Error, FetchError};
use crate::irrops::IrropsService;
use crate::rate_limit::{client_ip, SlidingWindowLimiter};
use crate::schedule::ScheduleService;
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, ORIGIN};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

const IRROPS_CACHE_CONTROL: &str = "s-maxage=900, stale-while-revalidate=300";
const STALE_CACHE_CONTROL: &str = "s-maxage=60";

/// JSON error body with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidRequest(message) => ApiError::new(StatusCode::BAD_REQUEST, message),
            Error::Upstream(FetchError::Timeout) => {
                ApiError::new(StatusCode::GATEWAY_TIMEOUT, "Upstream timeout")
            }
            Error::Upstream(_) => {
                ApiError::new(StatusCode::BAD_GATEWAY, "Upstream service unavailable")
            }
            Error::NoHubData | Error::PassAborted(_) => {
                ApiError::new(StatusCode::BAD_GATEWAY, "Failed to compute IRROPS data")
            }
        }
    }
}

/// Which browser origins may call the API. Requests without an `Origin`
/// header (server-to-server, curl) skip this check.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allowed: Vec<String>,
    allow_localhost: bool,
}

impl OriginPolicy {
    pub fn new(allowed: Vec<String>, allow_localhost: bool) -> Self {
        Self {
            allowed,
            allow_localhost,
        }
    }

    pub fn permits(&self, origin: &str) -> bool {
        if self.allowed.iter().any(|o| o == origin) {
            return true;
        }
        self.allow_localhost && is_localhost(origin)
    }
}

// http://localhost or http://localhost:<digits>
fn is_localhost(origin: &str) -> bool {
    match origin.strip_prefix("http://localhost") {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix(':')
            .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false),
        None => false,
    }
}

#[derive(Clone)]
pub struct AppState {
    pub irrops: Arc<IrropsService>,
    pub schedule: Arc<ScheduleService>,
    pub irrops_limiter: Arc<SlidingWindowLimiter>,
    pub schedule_limiter: Arc<SlidingWindowLimiter>,
    pub origins: OriginPolicy,
}

impl AppState {
    pub fn new(
        config: &ServerConfig,
        irrops: Arc<IrropsService>,
        schedule: Arc<ScheduleService>,
    ) -> Self {
        Self {
            irrops,
            schedule,
            irrops_limiter: Arc::new(SlidingWindowLimiter::new("irrops", config.irrops_rate_limit)),
            schedule_limiter: Arc::new(SlidingWindowLimiter::new(
                "schedule",
                config.schedule_rate_limit,
            )),
            origins: OriginPolicy::new(config.allowed_origins.clone(), config.allow_localhost),
        }
    }

    fn admit(&self, headers: &HeaderMap, limiter: &SlidingWindowLimiter) -> Result<(), ApiError> {
        // Only an absent header means "no origin"; an unreadable one is rejected.
        if let Some(value) = headers.get(ORIGIN) {
            let permitted = value
                .to_str()
                .map(|origin| self.origins.permits(origin))
                .unwrap_or(false);
            if !permitted {
                warn!("Rejected origin {:?} on {}", value, limiter.name());
                return Err(ApiError::new(StatusCode::FORBIDDEN, "Forbidden"));
            }
        }

        let ip = client_ip(headers);
        if limiter.is_limited(&ip) {
            warn!("Rate limited {} on {}", ip, limiter.name());
            return Err(ApiError::new(
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limited, try again shortly",
            ));
        }
        Ok(())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/irrops", get(irrops_handler).fallback(method_not_allowed))
        .route("/api/schedule", get(schedule_handler).fallback(method_not_allowed))
        .with_state(state)
}

async fn method_not_allowed() -> ApiError {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

async fn irrops_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    state.admit(&headers, &state.irrops_limiter)?;

    let snapshot = state.irrops.snapshot().await.map_err(|e| {
        error!("IRROPS API error: {}", e);
        ApiError::from(e)
    })?;

    let cache_control = if snapshot.stale {
        STALE_CACHE_CONTROL
    } else {
        IRROPS_CACHE_CONTROL
    };
    Ok(([(CACHE_CONTROL, HeaderValue::from_static(cache_control))], Json(snapshot)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ScheduleParams {
    hub: Option<String>,
    dir: Option<String>,
    timestamp: Option<String>,
}

async fn schedule_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ScheduleParams>,
) -> Result<Response, ApiError> {
    state.admit(&headers, &state.schedule_limiter)?;

    let query = state.schedule.query(
        params.hub.as_deref(),
        params.dir.as_deref(),
        params.timestamp.as_deref(),
    )?;

    let lookup = state.schedule.lookup(query).await.map_err(|e| {
        error!("Schedule API error: {}", e);
        ApiError::from(e)
    })?;

    let cache_control = format!(
        "s-maxage={}, stale-while-revalidate=300",
        lookup.cdn_max_age
    );
    let cache_control = HeaderValue::from_str(&cache_control)
        .unwrap_or_else(|_| HeaderValue::from_static(IRROPS_CACHE_CONTROL));
    Ok(([(CACHE_CONTROL, cache_control)], Json(lookup)).into_response())
}
