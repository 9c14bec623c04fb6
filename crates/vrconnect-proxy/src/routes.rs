use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use vrconnect_core::{ProxyError, ProxyGateway, WorldQuery};

/// Build the full application router.
pub fn router(gateway: ProxyGateway) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .nest("/proxy", proxy_router())
        .with_state(gateway)
}

/// Routes mounted under `/proxy`.
fn proxy_router() -> Router<ProxyGateway> {
    Router::new()
        .route("/login", post(login_handler))
        .route("/verify-2fa", post(verify_two_factor_handler))
        .route("/worlds", get(search_worlds_handler))
        .route("/worlds/{world_id}", get(get_world_handler))
        .route("/friends", get(friends_handler))
        .route("/status", get(status_handler))
}

/// `ProxyError` rendered as the JSON body the app expects.
#[derive(Debug)]
pub struct ErrorResponse(pub ProxyError);

impl From<ProxyError> for ErrorResponse {
    fn from(err: ProxyError) -> Self {
        Self(err)
    }
}

impl From<QueryRejection> for ErrorResponse {
    fn from(rejection: QueryRejection) -> Self {
        Self(ProxyError::InvalidInput(rejection.body_text()))
    }
}

impl From<JsonRejection> for ErrorResponse {
    fn from(rejection: JsonRejection) -> Self {
        Self(ProxyError::InvalidInput(rejection.body_text()))
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = err.to_string();

        match err {
            ProxyError::AuthPending => (
                status,
                Json(json!({
                    "success": false,
                    "message": message,
                    "requiresOtp": true,
                })),
            )
                .into_response(),
            ProxyError::RateLimited { retry_after_secs } => (
                status,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                Json(json!({
                    "success": false,
                    "message": message,
                    "retryAfter": retry_after_secs,
                })),
            )
                .into_response(),
            ProxyError::Upstream {
                status: upstream_status,
                ..
            } => (
                status,
                Json(json!({
                    "success": false,
                    "message": "Error talking to VRChat",
                    "detail": message,
                    "upstreamStatus": upstream_status,
                })),
            )
                .into_response(),
            _ => (
                status,
                Json(json!({
                    "success": false,
                    "message": message,
                })),
            )
                .into_response(),
        }
    }
}

type ApiResult = Result<Json<Value>, ErrorResponse>;

// ── Index ────────────────────────────────────────────────────────────────────

async fn index_handler() -> Json<Value> {
    Json(json!({ "message": "VRConnect proxy is running" }))
}

// ── Session ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    otp: Option<String>,
}

async fn login_handler(
    State(gateway): State<ProxyGateway>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let session = gateway
        .login(&body.username, &body.password, body.otp.as_deref())
        .await?;
    info!(username = %body.username.trim(), "Bot session established via login route");
    Ok(Json(json!({
        "success": true,
        "message": "Bot session established",
        "session": session,
    })))
}

#[derive(Deserialize)]
struct VerifyRequest {
    #[serde(default)]
    code: Option<String>,
}

async fn verify_two_factor_handler(
    State(gateway): State<ProxyGateway>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    gateway
        .verify_two_factor(body.code.as_deref().unwrap_or_default())
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Verification successful",
    })))
}

async fn status_handler(State(gateway): State<ProxyGateway>) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": gateway.status(),
    }))
}

// ── Worlds ───────────────────────────────────────────────────────────────────

async fn search_worlds_handler(
    State(gateway): State<ProxyGateway>,
    query: Result<Query<WorldQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let data = gateway.search_worlds(&query).await?;
    Ok(Json(json!({ "success": true, "data": data })))
}

async fn get_world_handler(
    State(gateway): State<ProxyGateway>,
    Path(world_id): Path<String>,
) -> ApiResult {
    let data = gateway.get_world_by_id(&world_id).await?;
    Ok(Json(json!({ "success": true, "data": data })))
}

// ── Friends ──────────────────────────────────────────────────────────────────

async fn friends_handler(State(gateway): State<ProxyGateway>) -> ApiResult {
    let data = gateway.list_friends().await?;
    Ok(Json(json!({ "success": true, "data": data })))
}
