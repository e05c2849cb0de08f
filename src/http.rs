// HTTP API for the pingboard service
//
// Routes:
// - POST /login   form login, sets the session cookie
// - GET  /ping    rate-limited action
// - POST /logout  revoke the session
// - GET  /top     leaderboard (?k=N)
// - GET  /count   distinct-caller estimate
// - GET  /health  store liveness
// - GET  /metrics Prometheus scrape endpoint

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::UsageError;
use crate::metrics;
use crate::usage::{Credentials, UsageService};

/// Header accepted in place of the session cookie
pub const SESSION_HEADER: &str = "x-session-id";

/// Shared handler state
#[derive(Clone, Debug)]
pub struct AppState {
    service: UsageService,
    cookie_name: String,
    metrics_enabled: bool,
}

impl AppState {
    pub fn new(service: UsageService, config: &Config) -> Self {
        Self {
            service,
            cookie_name: config.session.cookie_name.clone(),
            metrics_enabled: config.metrics.enabled,
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/login", post(login_handler))
        .route("/ping", get(ping_handler))
        .route("/logout", post(logout_handler))
        .route("/top", get(top_handler))
        .route("/count", get(count_handler))
        .route("/health", get(health_handler));

    if state.metrics_enabled {
        app = app.route("/metrics", get(metrics_handler));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: &Config, service: UsageService) -> Result<()> {
    if config.metrics.enabled {
        metrics::init().context("Failed to initialize metrics")?;
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let sweeper = service.start_cleanup_task(config.store.cleanup_interval());
    let app = router(AppState::new(service, config));

    info!("Starting pingboard server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind server")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

/// Session token from the cookie, falling back to the header
fn session_token(headers: &HeaderMap, cookie_name: &str) -> String {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string());

    from_cookie
        .or_else(|| {
            headers
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

fn session_cookie(name: &str, token: &str, max_age_secs: u64) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; Path=/; Max-Age={}",
        name, token, max_age_secs
    ))
    .ok()
}

/// HTTP status for a usage error
pub fn status_for(err: &UsageError) -> StatusCode {
    match err {
        UsageError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        UsageError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        UsageError::StoreUnavailable(_)
        | UsageError::LeaderboardUnavailable(_)
        | UsageError::EstimatorUnavailable(_)
        | UsageError::CredentialsUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for UsageError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if self.is_systemic() {
            warn!(error = %self, "Request failed on a backing service");
        } else {
            debug!(error = %self, "Request rejected");
        }

        match self {
            UsageError::Unauthorized(message) => {
                (status, Json(json!({ "message": message }))).into_response()
            }
            UsageError::RateLimited { retry_after_secs } => {
                let mut response = (
                    status,
                    Json(json!({
                        "message": "Rate limit exceeded",
                        "retry_after_secs": retry_after_secs,
                    })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                response
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}

/// Login form; absent fields count as empty so they fail as bad credentials
#[derive(Debug, Deserialize)]
struct LoginForm {
    username: Option<String>,
    password: Option<String>,
}

/// Login handler
async fn login_handler(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, UsageError> {
    let credentials = Credentials::new(
        form.username.unwrap_or_default(),
        form.password.unwrap_or_default(),
    );
    let token = state.service.authenticate(&credentials).await?;

    let mut response = Json(json!({
        "message": "Log in successfully!",
        "sessionID": token,
    }))
    .into_response();

    let max_age = state.service.session_ttl().as_secs();
    if let Some(cookie) = session_cookie(&state.cookie_name, &token, max_age) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    Ok(response)
}

/// Rate-limited action handler
async fn ping_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, UsageError> {
    let token = session_token(&headers, &state.cookie_name);
    let result = state.service.perform_rate_limited_action(&token).await?;
    Ok(Json(result).into_response())
}

/// Logout handler
async fn logout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, UsageError> {
    let token = session_token(&headers, &state.cookie_name);
    let revoked = state.service.logout(&token).await?;

    let mut response = Json(json!({
        "message": "Logged out",
        "revoked": revoked,
    }))
    .into_response();

    if let Some(cookie) = session_cookie(&state.cookie_name, "", 0) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    Ok(response)
}

#[derive(Debug, Deserialize)]
struct TopParams {
    k: Option<usize>,
}

/// Leaderboard handler
async fn top_handler(
    State(state): State<AppState>,
    Query(params): Query<TopParams>,
) -> Result<Response, UsageError> {
    let k = params.k.unwrap_or(state.service.leaderboard_size());
    let top_users = state.service.get_leaderboard(k).await?;
    Ok(Json(json!({ "top_users": top_users })).into_response())
}

/// Distinct-caller estimate handler
async fn count_handler(State(state): State<AppState>) -> Result<Response, UsageError> {
    let distinct_callers = state.service.get_distinct_caller_estimate().await?;
    Ok(Json(json!({ "distinct_callers": distinct_callers })).into_response())
}

/// Health check endpoint
async fn health_handler(State(state): State<AppState>) -> Response {
    match state.service.health().await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "store unavailable").into_response()
        }
    }
}

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}
