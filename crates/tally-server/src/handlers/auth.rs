//! Login, logout and session verification handlers

use std::sync::Arc;

use axum::{body::Bytes, extract::State, Json};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use tally_core::{AIBackend, SessionLookup};

use crate::{
    clear_session_cookie, credentials_match, parse_json, session_cookie, ApiResponse, AppError,
    AppState, SESSION_COOKIE,
};

/// Request body for logging in
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

/// Session state as seen by the client
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl VerifyResponse {
    fn rejected(reason: &'static str) -> Self {
        Self {
            authenticated: false,
            username: None,
            expires_at: None,
            reason: Some(reason),
        }
    }
}

/// POST /api/auth/login - Check credentials and start a session
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, ApiResponse<LoginResponse>), AppError> {
    let req: LoginRequest = parse_json(&body)?;

    if !credentials_match(&state.config, &req.username, &req.password) {
        warn!(username = %req.username, "Failed login attempt");
        return Err(AppError::unauthorized("用户名或密码错误", "INVALID_CREDENTIALS"));
    }

    let session = state.db.create_session(
        &req.username,
        state.config.session_expiry_hours,
        Utc::now(),
    )?;
    info!(username = %session.username, "User logged in");

    let jar = jar.add(session_cookie(&state.config, session.token));
    let response = ApiResponse::ok(LoginResponse {
        username: session.username,
        expires_at: session.expires_at,
    })
    .with_message("登录成功");

    Ok((jar, response))
}

/// POST /api/auth/logout - End the current session
pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<()>), AppError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if state.db.delete_session(cookie.value())? {
            info!("User logged out");
        }
    }

    Ok((clear_session_cookie(jar), ApiResponse::message_only("已退出登录")))
}

/// GET /api/auth/verify - Report whether the session cookie is still valid
///
/// Always 200; the body says why a session is not accepted.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<VerifyResponse>), AppError> {
    let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
        return Ok((jar, Json(VerifyResponse::rejected("no_session"))));
    };

    match state.db.get_valid_session(&token, Utc::now())? {
        SessionLookup::Valid(session) => Ok((
            jar,
            Json(VerifyResponse {
                authenticated: true,
                username: Some(session.username),
                expires_at: Some(session.expires_at),
                reason: None,
            }),
        )),
        SessionLookup::Missing | SessionLookup::Expired => Ok((
            clear_session_cookie(jar),
            Json(VerifyResponse::rejected("session_expired")),
        )),
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// AI backend name, or "disabled"
    pub ai: String,
}

/// GET /api/health - Liveness probe
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let ai = match &state.ai {
        Some(client) => format!("{} ({})", client.backend_name(), client.model()),
        None => "disabled".to_string(),
    };
    Json(HealthResponse { status: "ok", ai })
}
