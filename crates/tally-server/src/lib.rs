//! Tally Web Server
//!
//! Axum-based REST API for the Tally bookkeeping tool.
//!
//! Security features:
//! - Cookie sessions checked on every `/api` route except login, logout, verify and health
//! - Constant-time credential comparison
//! - Restrictive CORS policy
//! - Input validation (pagination limits, upload size limit)
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    CookieJar,
};
use serde::{de::DeserializeOwned, Serialize};
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, warn};

use tally_core::ai::normalize::excerpt;
use tally_core::{AIBackend, AIClient, Database, SessionLookup};

mod handlers;

/// Maximum request body size (10 MB, receipt images travel as base64)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Default page size for record listings
pub const DEFAULT_PAGE_LIMIT: i64 = 20;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "session";

/// Credentials used when none are configured
const DEFAULT_USERNAME: &str = "admin";
const DEFAULT_PASSWORD: &str = "admin123";

/// Longest accepted session lifetime (one year)
pub const MAX_SESSION_EXPIRY_HOURS: i64 = 24 * 366;

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether a session is required for the protected API (secure by default)
    pub require_auth: bool,
    /// Login username
    pub auth_username: String,
    /// Login password
    pub auth_password: String,
    /// Session lifetime in hours
    pub session_expiry_hours: i64,
    /// Add `Secure` to the session cookie (set when served over HTTPS)
    pub secure_cookies: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            auth_username: DEFAULT_USERNAME.to_string(),
            auth_password: DEFAULT_PASSWORD.to_string(),
            session_expiry_hours: 24,
            secure_cookies: false,
            allowed_origins: vec![],
        }
    }
}

impl ServerConfig {
    /// Read credentials and cookie settings from the environment
    ///
    /// `AUTH_USERNAME`, `AUTH_PASSWORD`, `SESSION_EXPIRY_HOURS`,
    /// `TALLY_SECURE_COOKIES`, `TALLY_ALLOWED_ORIGINS` (comma-separated).
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let session_expiry_hours = match std::env::var("SESSION_EXPIRY_HOURS") {
            Ok(value) => parse_expiry_hours(&value).unwrap_or_else(|| {
                warn!(value = %value, "Invalid SESSION_EXPIRY_HOURS, using default");
                defaults.session_expiry_hours
            }),
            Err(_) => defaults.session_expiry_hours,
        };

        Self {
            require_auth: true,
            auth_username: env_or("AUTH_USERNAME", &defaults.auth_username),
            auth_password: env_or("AUTH_PASSWORD", &defaults.auth_password),
            session_expiry_hours,
            secure_cookies: std::env::var("TALLY_SECURE_COOKIES")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            allowed_origins: std::env::var("TALLY_ALLOWED_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or_default(),
        }
    }

    /// Whether the login still uses the built-in password
    pub fn uses_default_password(&self) -> bool {
        self.auth_password == DEFAULT_PASSWORD
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Parse a session lifetime, rejecting values outside `1..=MAX_SESSION_EXPIRY_HOURS`
pub fn parse_expiry_hours(input: &str) -> Option<i64> {
    input
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|hours| (1..=MAX_SESSION_EXPIRY_HOURS).contains(hours))
}

/// Split a comma-separated origin list
pub fn parse_origins(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub ai: Option<AIClient>,
}

/// The user a request is made on behalf of, set by the session middleware
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
}

/// Session middleware - requires a valid `session` cookie
///
/// Expired sessions are deleted on sight and their cookie cleared. With auth
/// disabled every request runs as the configured user.
async fn session_middleware(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        request.extensions_mut().insert(AuthUser {
            username: state.config.auth_username.clone(),
        });
        return next.run(request).await;
    }

    let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
        warn!(path = %request.uri().path(), "Unauthorized request - no session cookie");
        return AppError::unauthorized("Unauthorized", "NO_SESSION").into_response();
    };

    match state.db.get_valid_session(&token, chrono::Utc::now()) {
        Ok(SessionLookup::Valid(session)) => {
            request.extensions_mut().insert(AuthUser {
                username: session.username,
            });
            next.run(request).await
        }
        Ok(SessionLookup::Missing) => {
            warn!(path = %request.uri().path(), "Unauthorized request - unknown session");
            AppError::unauthorized("Unauthorized", "NO_SESSION").into_response()
        }
        Ok(SessionLookup::Expired) => {
            info!(path = %request.uri().path(), "Session expired");
            (
                clear_session_cookie(jar),
                AppError::unauthorized("Session expired", "SESSION_EXPIRED"),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Session lookup failed");
            AppError::internal("Authentication error").into_response()
        }
    }
}

/// Check login credentials in constant time
pub(crate) fn credentials_match(config: &ServerConfig, username: &str, password: &str) -> bool {
    use subtle::ConstantTimeEq;

    let user_ok = username.as_bytes().ct_eq(config.auth_username.as_bytes());
    let pass_ok = password.as_bytes().ct_eq(config.auth_password.as_bytes());
    (user_ok & pass_ok).into()
}

/// Build the session cookie for a fresh login
pub(crate) fn session_cookie(config: &ServerConfig, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies)
        .max_age(cookie::time::Duration::hours(config.session_expiry_hours))
        .build()
}

/// Remove the session cookie from the client
pub(crate) fn clear_session_cookie(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

/// Parse a JSON request body, answering malformed input with a 400
pub(crate) fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| AppError::bad_request("Invalid JSON").with_debug(e))
}

// ============================================================================
// Response Envelope
// ============================================================================

/// Pagination metadata for list responses
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        Self {
            page,
            limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

/// Success envelope: `{"success": true, "data": ..., ...}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    multiple: bool,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            pagination: None,
            multiple: false,
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Mark `data` as an array of several results
    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }
}

impl ApiResponse<()> {
    /// Success with a message and no data
    pub fn message_only(message: &str) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.to_string()),
            pagination: None,
            multiple: false,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the application router, reading the AI backend from the environment
pub fn create_router(db: Database, static_dir: Option<&str>, config: ServerConfig) -> Router {
    let ai = AIClient::from_env();
    match &ai {
        Some(client) => info!(
            "AI backend configured: {} ({}, model: {})",
            client.backend_name(),
            client.host(),
            client.model()
        ),
        None => info!("ℹ️  AI backend not configured (set AI_API_KEY to enable AI features)"),
    }

    create_router_with_ai(db, static_dir, config, ai)
}

/// Create the application router with an explicit AI backend (for testing)
pub fn create_router_with_ai(
    db: Database,
    static_dir: Option<&str>,
    config: ServerConfig,
    ai: Option<AIClient>,
) -> Router {
    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        ai,
    });

    let public_routes = Router::new()
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/verify", get(handlers::verify))
        .route("/health", get(handlers::health));

    let protected_routes = Router::new()
        // Records
        .route(
            "/records",
            get(handlers::list_records).post(handlers::create_record),
        )
        .route(
            "/records/:id",
            get(handlers::get_record)
                .put(handlers::update_record)
                .delete(handlers::delete_record),
        )
        // Categories
        .route(
            "/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        // Wallets
        .route(
            "/wallets",
            get(handlers::list_wallets).post(handlers::create_wallet),
        )
        .route(
            "/wallets/:id",
            get(handlers::get_wallet)
                .put(handlers::update_wallet)
                .delete(handlers::delete_wallet),
        )
        // Stats
        .route("/stats", get(handlers::get_stats))
        // AI
        .route("/ai/parse", post(handlers::ai_parse))
        .route("/ai/ocr", post(handlers::ai_ocr))
        .route("/ai/analyze", post(handlers::ai_analyze))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ));

    let api_routes = public_routes.merge(protected_routes);

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        // Allow specified origins; credentials so the session cookie travels
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(true)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    // Security headers
    // CSP: same-origin scripts, inline styles, data: and blob: images for receipt previews
    let csp_value = HeaderValue::from_static(
        "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' blob: data:; font-src 'self'; connect-src 'self'; frame-ancestors 'none'"
    );

    let mut app = Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            csp_value,
        ));

    // Serve static files if directory provided
    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app
}

/// Start the server
pub async fn serve(
    db: Database,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
) -> anyhow::Result<()> {
    serve_with_config(db, host, port, static_dir, ServerConfig::from_env()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    } else if config.uses_default_password() {
        warn!("⚠️  Using the default login password - set AUTH_PASSWORD before exposing the server");
    }

    // Drop sessions that expired while the server was down
    match db.purge_expired_sessions(chrono::Utc::now()) {
        Ok(count) if count > 0 => info!("Purged {} expired session(s)", count),
        Ok(_) => {}
        Err(e) => warn!("Failed to purge expired sessions: {}", e),
    }

    check_ai_connection().await;

    let app = create_router(db, static_dir, config)
        .into_make_service_with_connect_info::<std::net::SocketAddr>();
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log AI backend connection status
async fn check_ai_connection() {
    match AIClient::from_env() {
        Some(client) => {
            if client.health_check().await {
                info!(
                    "✅ AI backend connected: {} (model: {})",
                    client.host(),
                    client.model()
                );
            } else {
                warn!(
                    "⚠️  AI backend configured but not responding: {} (model: {})",
                    client.host(),
                    client.model()
                );
            }
        }
        None => {
            info!("ℹ️  AI backend not configured (set AI_API_KEY to enable AI features)");
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
///
/// Renders as `{"success": false, "error": ..., "code"?: ..., "debug"?: ...}`.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: Option<&'static str>,
    debug: Option<String>,
    internal: Option<anyhow::Error>,
}

impl AppError {
    fn with_status(status: StatusCode, msg: &str) -> Self {
        Self {
            status,
            message: msg.to_string(),
            code: None,
            debug: None,
            internal: None,
        }
    }

    pub fn bad_request(msg: &str) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(msg: &str) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, msg)
    }

    pub fn internal(msg: &str) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn bad_gateway(msg: &str) -> Self {
        Self::with_status(StatusCode::BAD_GATEWAY, msg)
    }

    pub fn unauthorized(msg: &str, code: &'static str) -> Self {
        Self {
            code: Some(code),
            ..Self::with_status(StatusCode::UNAUTHORIZED, msg)
        }
    }

    /// Attach a bounded diagnostic for the client
    pub fn with_debug(mut self, debug: impl std::fmt::Display) -> Self {
        self.debug = Some(excerpt(&debug.to_string()));
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Map a core error onto a response
    ///
    /// Validation failures are the caller's fault; storage failures stay
    /// generic 500s.
    pub fn from_core(err: tally_core::Error) -> Self {
        use tally_core::Error;

        match err {
            Error::InvalidData(msg) => Self::bad_request(&msg),
            Error::NotFound(msg) => Self::not_found(&msg),
            Error::AiNotConfigured(_) => Self::internal(handlers::AI_NOT_CONFIGURED),
            Error::Upstream(msg) => {
                warn!(error = %msg, "AI backend call failed");
                Self::bad_gateway("AI服务调用失败").with_debug(msg)
            }
            Error::Normalize(e) => handlers::normalize_error(e),
            other => Self::from(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let mut body = serde_json::json!({
            "success": false,
            "error": self.message,
        });
        if let Some(code) = self.code {
            body["code"] = code.into();
        }
        if let Some(debug) = self.debug {
            body["debug"] = debug.into();
        }

        (self.status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            code: None,
            debug: None,
            // Keep full error for logging
            internal: Some(err),
        }
    }
}
