//! API route definitions.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::AppState;
use crate::credentials::mask::mask_opt;
use crate::credentials::{mask, CredentialPatch};
use crate::refresh::{refresh_reward_token, verify_reward_token};
use crate::sign;
use crate::storage::log::MAX_PAGE_LIMIT;
use crate::storage::Trigger;

/// Common response body.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    pub data: Value,
}

impl ApiResponse {
    fn ok(data: impl Serialize) -> Json<Self> {
        Json(Self {
            success: true,
            message: String::new(),
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        })
    }

    fn done(message: impl Into<String>, data: Value) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data,
        })
    }

    fn fail(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            message: message.into(),
            data: json!({}),
        })
    }
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/sign/now", post(sign_now))
        .route("/sign/status", get(sign_status))
        .route("/sign/logs", get(sign_logs))
        .route("/sign/spin", post(sign_spin))
        .route("/sign/action", post(sign_action))
        .route("/token/status", get(token_status))
        .route("/token/set", post(token_set))
        .route("/token/refresh", post(token_refresh))
        .route("/token/newapi", get(newapi_status).post(newapi_set))
        .route(
            "/schedule",
            get(schedule_status).post(schedule_set).delete(schedule_delete),
        )
}

async fn health(State(state): State<AppState>) -> Json<ApiResponse> {
    ApiResponse::ok(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "variant": state.workflow.strategy_name(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

// ---------------------------------------------------------------------------
// Sign
// ---------------------------------------------------------------------------

fn run_response(result: sign::RunResult) -> Json<ApiResponse> {
    Json(ApiResponse {
        success: result.success,
        message: result.message,
        data: result
            .data
            .and_then(|d| serde_json::to_value(d).ok())
            .unwrap_or_else(|| json!({})),
    })
}

async fn sign_now(State(state): State<AppState>) -> Json<ApiResponse> {
    run_response(state.workflow.run(Trigger::Manual).await)
}

/// Reward step only with stored credentials; no redemption, no log entry.
async fn sign_action(State(state): State<AppState>) -> Json<ApiResponse> {
    run_response(state.workflow.reward_action().await)
}

async fn sign_status(State(state): State<AppState>) -> Json<ApiResponse> {
    ApiResponse::ok(state.status.status().await)
}

// Raw strings so a non-numeric value still gets the JSON error body.
#[derive(Debug, Deserialize)]
struct LogsQuery {
    page: Option<String>,
    limit: Option<String>,
}

fn parse_paging(q: &LogsQuery) -> Option<(u32, u32)> {
    let page: u32 = match q.page.as_deref() {
        Some(raw) => raw.trim().parse().ok()?,
        None => 1,
    };
    let limit: u32 = match q.limit.as_deref() {
        Some(raw) => raw.trim().parse().ok()?,
        None => 10,
    };
    (page >= 1 && (1..=MAX_PAGE_LIMIT).contains(&limit)).then_some((page, limit))
}

async fn sign_logs(
    State(state): State<AppState>,
    Query(q): Query<LogsQuery>,
) -> (StatusCode, Json<ApiResponse>) {
    let Some((page, limit)) = parse_paging(&q) else {
        return (
            StatusCode::BAD_REQUEST,
            ApiResponse::fail(format!("page must be >= 1 and limit within 1..={MAX_PAGE_LIMIT}")),
        );
    };

    match state.log.list(page, limit) {
        Ok(logs) => (StatusCode::OK, ApiResponse::ok(logs)),
        Err(e) => {
            tracing::error!(error = %e, "failed to list sign logs");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiResponse::fail("failed to read sign logs"),
            )
        }
    }
}

async fn sign_spin(State(state): State<AppState>, headers: HeaderMap) -> Json<ApiResponse> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let Some(token) = token else {
        return ApiResponse::fail("Authorization header is missing or invalid");
    };

    let out = sign::spin(state.upstream.as_ref(), token).await;
    Json(ApiResponse {
        success: out.success,
        message: out.message,
        data: out.data,
    })
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

async fn token_status(State(state): State<AppState>) -> Json<ApiResponse> {
    let record = state.credentials.load();
    let reward = &record.bohe_sign_token;
    let valid = verify_reward_token(state.upstream.as_ref(), reward).await;
    let newapi_configured =
        !record.newapi_session.is_empty() && !record.newapi_user_id.is_empty();

    ApiResponse::ok(json!({
        "linux_do_token": {
            "exists": !record.linux_do_token.is_empty(),
            "masked": mask_opt(&record.linux_do_token),
        },
        "linux_do_connect_token": {
            "exists": !record.linux_do_connect_token.is_empty(),
            "masked": mask_opt(&record.linux_do_connect_token),
        },
        "bohe_sign_token": {
            "exists": !reward.is_empty(),
            "valid": valid,
            "masked": mask_opt(reward),
        },
        "newapi": {
            "configured": newapi_configured,
            "session_masked": mask_opt(&record.newapi_session),
            "user_id": (!record.newapi_user_id.is_empty()).then_some(&record.newapi_user_id),
        },
    }))
}

#[derive(Debug, Deserialize)]
struct SetTokenRequest {
    token: String,
}

async fn token_set(
    State(state): State<AppState>,
    Json(req): Json<SetTokenRequest>,
) -> Json<ApiResponse> {
    let token = req.token.trim();
    if token.is_empty() {
        return ApiResponse::fail("Token must not be empty");
    }

    let patch = CredentialPatch {
        identity_token: Some(token.to_string()),
        ..Default::default()
    };
    match state.credentials.try_save(&patch) {
        Ok(()) => ApiResponse::done("Identity token saved", json!({})),
        Err(e) => {
            tracing::error!(error = %e, "failed to save identity token");
            ApiResponse::fail("Failed to save token")
        }
    }
}

async fn token_refresh(State(state): State<AppState>) -> Json<ApiResponse> {
    match refresh_reward_token(state.credentials.as_ref(), state.exchange.as_ref()).await {
        Ok(masked) => ApiResponse::done(
            "Token refreshed",
            json!({ "bohe_sign_token": { "valid": true, "masked": masked } }),
        ),
        Err(e) => ApiResponse::fail(format!("Refresh failed: {e}")),
    }
}

async fn newapi_status(State(state): State<AppState>) -> Json<ApiResponse> {
    let cfg = state.credentials.redemption_config();
    ApiResponse::ok(json!({
        "configured": cfg.is_configured(),
        "session_masked": mask_opt(&cfg.session),
        "user_id": (!cfg.user_id.is_empty()).then_some(&cfg.user_id),
    }))
}

#[derive(Debug, Deserialize)]
struct SetNewApiRequest {
    session: String,
    user_id: String,
}

async fn newapi_set(
    State(state): State<AppState>,
    Json(req): Json<SetNewApiRequest>,
) -> Json<ApiResponse> {
    let session = req.session.trim();
    let user_id = req.user_id.trim();
    if session.is_empty() {
        return ApiResponse::fail("Session must not be empty");
    }
    if user_id.is_empty() {
        return ApiResponse::fail("User ID must not be empty");
    }

    if state.credentials.save_redemption_config(session, user_id) {
        ApiResponse::done(
            "Redemption config saved",
            json!({ "session_masked": mask(session), "user_id": user_id }),
        )
    } else {
        ApiResponse::fail("Failed to save config")
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

async fn schedule_status(State(state): State<AppState>) -> Json<ApiResponse> {
    match state.scheduler.status().await {
        Ok(status) => ApiResponse::ok(status),
        Err(e) => ApiResponse::fail(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct SetScheduleRequest {
    enabled: bool,
    #[serde(default)]
    time: Option<String>,
}

async fn schedule_set(
    State(state): State<AppState>,
    Json(req): Json<SetScheduleRequest>,
) -> Json<ApiResponse> {
    match state.scheduler.set(req.enabled, req.time.as_deref()).await {
        Ok(status) => {
            let message = if status.enabled {
                "Schedule enabled"
            } else {
                "Schedule disabled"
            };
            ApiResponse::done(message, serde_json::to_value(status).unwrap_or(Value::Null))
        }
        Err(e) => ApiResponse::fail(e.to_string()),
    }
}

async fn schedule_delete(State(state): State<AppState>) -> Json<ApiResponse> {
    match state.scheduler.delete().await {
        Ok(()) => ApiResponse::done("Schedule deleted", json!({})),
        Err(e) => ApiResponse::fail(e.to_string()),
    }
}
