//! HTTP API for the IT-ERA site.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/contact` | Relay a contact form to the team by email |
//! | `POST` | `/api/chat` | Chat widget: `start` a session or send a `message` |
//! | `GET`  | `/health` | Health check with version and enabled features |
//!
//! Any other method or path answers `405` with
//! `{ "error": "Method not allowed", "message": ... }`.
//!
//! # Error Contract
//!
//! Failures answer with `success: false` and an Italian `error` message
//! meant for the visitor:
//!
//! ```json
//! { "success": false, "error": "Dati non validi", "errors": ["Email valida richiesta"] }
//! ```
//!
//! `400` invalid JSON, validation or delivery failure; `429` rate limited or
//! session limit reached; `500` anything unexpected.
//!
//! # CORS
//!
//! Every response carries `Access-Control-Allow-Origin`: the request's
//! `Origin` when it is in `[server].allowed_origins`, the first allowed
//! origin otherwise. `OPTIONS` requests are answered directly with `204`.

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::ai::{self, Assistant};
use crate::chat::{ChatError, ChatService};
use crate::config::{Config, ServerConfig};
use crate::contact::{ContactError, ContactService};
use crate::contacts::ContactStore;
use crate::db;
use crate::kv::{self, KvStore};
use crate::mailer::{Mailer, ResendMailer};
use crate::migrate;
use crate::models::{ChatRequest, ContactRequest, RequestMeta};
use crate::ratelimit::RateLimiter;
use crate::teams::{Notifier, TeamsNotifier};

const GENERIC_ERROR: &str = "Errore durante l'invio. Riprova o contattaci al 039 888 2041.";
const KV_PURGE_INTERVAL: Duration = Duration::from_secs(3_600);

/// External collaborators the handlers depend on.
///
/// [`Services::connect`] wires the production implementations; tests build
/// one by hand with in-memory or recording stand-ins.
pub struct Services {
    pub kv: Arc<dyn KvStore>,
    pub mailer: Arc<dyn Mailer>,
    pub notifier: Arc<dyn Notifier>,
    pub assistant: Option<Arc<dyn Assistant>>,
    pub store: Option<ContactStore>,
}

impl Services {
    pub fn connect(config: &Config, pool: &SqlitePool) -> anyhow::Result<Self> {
        let notifier = TeamsNotifier::from_config(&config.notifications)?;
        if !notifier.is_configured() {
            tracing::warn!(
                env = %config.notifications.teams_webhook_env,
                "teams webhook not configured, escalations will only be logged"
            );
        }

        if config.ai.is_enabled() {
            tracing::info!(
                provider = %config.ai.provider,
                model = config.ai.model.as_deref().unwrap_or_default(),
                "language model replies enabled"
            );
        }

        Ok(Self {
            kv: kv::open(config, pool)?,
            mailer: Arc::new(ResendMailer::new(&config.email)?),
            notifier: Arc::new(notifier),
            assistant: ai::create_assistant(&config.ai)?.map(Arc::from),
            store: config
                .db
                .persist_contacts
                .then(|| ContactStore::new(pool.clone())),
        })
    }
}

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    kv: Arc<dyn KvStore>,
    contact: Arc<ContactService>,
    chat: Arc<ChatService>,
    contact_limiter: RateLimiter,
    chat_limiter: RateLimiter,
    features: Features,
}

#[derive(Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
struct Features {
    contact_form: bool,
    chat: bool,
    ai: bool,
    persistence: bool,
    rate_limit: bool,
}

/// Builds the application router without binding a socket.
pub fn router(config: &Config, services: Services) -> anyhow::Result<Router> {
    let config = Arc::new(config.clone());

    let features = Features {
        contact_form: true,
        chat: true,
        ai: services.assistant.is_some(),
        persistence: services.store.is_some(),
        rate_limit: true,
    };

    let contact = ContactService::new(
        config.email.clone(),
        config.analytics.clone(),
        services.mailer,
        services.store,
        services.kv.clone(),
    )?;
    let chat = ChatService::new(
        config.chat.clone(),
        services.kv.clone(),
        services.assistant,
        services.notifier,
    );

    let state = AppState {
        contact_limiter: RateLimiter::new("contact", &config.rate_limit.contact),
        chat_limiter: RateLimiter::new("chat", &config.rate_limit.chat),
        kv: services.kv,
        contact: Arc::new(contact),
        chat: Arc::new(chat),
        features,
        config,
    };

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/api/contact", post(handle_contact))
        .route("/api/chat", post(handle_chat))
        .method_not_allowed_fallback(handle_not_allowed)
        .fallback(handle_not_allowed)
        .layer(middleware::from_fn(client_ip))
        .layer(middleware::from_fn_with_state(state.clone(), cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

/// Starts the HTTP server with the production services.
///
/// Opens the database, applies migrations, and binds to `[server].bind`.
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let services = Services::connect(config, &pool)?;
    run_server_with_services(config, services).await
}

/// Starts the HTTP server with caller-supplied services.
pub async fn run_server_with_services(config: &Config, services: Services) -> anyhow::Result<()> {
    spawn_kv_sweeper(services.kv.clone());
    let app = router(config, services)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(addr = %config.server.bind, "IT-ERA API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Purges expired KV entries every [`KV_PURGE_INTERVAL`] for the life of
/// the process.
fn spawn_kv_sweeper(kv: Arc<dyn KvStore>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(KV_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            match kv.purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!(removed = n, "purged expired kv entries"),
                Err(e) => tracing::warn!(error = %e, "kv purge failed"),
            }
        }
    })
}

// ============ Middleware ============

/// The caller's address as seen through the CDN.
#[derive(Debug, Clone)]
struct ClientIp(String);

/// Resolves the client IP: `CF-Connecting-IP`, then the first
/// `X-Forwarded-For` hop, then the socket peer.
fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header_ip = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    header_ip("cf-connecting-ip")
        .or_else(|| header_ip("x-forwarded-for"))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

async fn client_ip(mut req: Request<Body>, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let ip = resolve_client_ip(req.headers(), peer);
    req.extensions_mut().insert(ClientIp(ip));
    next.run(req).await
}

/// Origin to echo back for a request carrying `origin`.
fn allowed_origin<'a>(server: &'a ServerConfig, origin: Option<&'a str>) -> &'a str {
    match origin {
        Some(o) if server.allowed_origins.iter().any(|a| a == o) => o,
        _ => server.default_origin(),
    }
}

async fn cors(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let allow = allowed_origin(&state.config.server, origin.as_deref()).to_string();

    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&allow) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    response
}

// ============ Error response ============

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
    errors: Vec<String>,
    upstream_status: Option<u16>,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            errors: Vec::new(),
            upstream_status: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({ "success": false, "error": self.message });
        if !self.errors.is_empty() {
            body["errors"] = json!(self.errors);
        }
        if let Some(status) = self.upstream_status {
            body["status"] = json!(status);
        }
        (self.status, Json(body)).into_response()
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, message)
}

/// Constructs a 429 Too Many Requests error.
fn too_many_requests(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::TOO_MANY_REQUESTS, message)
}

fn internal_error() -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR)
}

impl From<ContactError> for AppError {
    fn from(err: ContactError) -> Self {
        match err {
            ContactError::Invalid(errors) => AppError {
                errors,
                ..bad_request("Dati non validi")
            },
            ContactError::Delivery { message, status } => {
                tracing::error!(error = %message, ?status, "email delivery failed");
                AppError {
                    upstream_status: status,
                    ..bad_request("Invio non riuscito. Riprova o contattaci al 039 888 2041.")
                }
            }
            ContactError::Internal(e) => {
                tracing::error!(error = %e, "contact request failed");
                internal_error()
            }
        }
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::InvalidAction => bad_request("Azione non valida"),
            ChatError::SessionLimit(_) => too_many_requests(
                "Limite di messaggi raggiunto. Per continuare chiamaci al 039 888 2041.",
            ),
        }
    }
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "rejected malformed request body");
        bad_request("Richiesta non valida")
    })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    timestamp: String,
    features: Features,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "IT-ERA API",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
        features: state.features,
    })
}

// ============ POST /api/contact ============

async fn handle_contact(
    State(state): State<AppState>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let decision = state
        .contact_limiter
        .check_or_allow(state.kv.as_ref(), &ip)
        .await;
    if !decision.allowed {
        tracing::info!(ip = %ip, count = decision.count, "contact rate limit hit");
        return Err(too_many_requests("Troppe richieste. Riprova domani."));
    }

    let request: ContactRequest = parse_json(&body)?;
    let meta = RequestMeta {
        ip,
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    let receipt = state.contact.submit(&request, &meta).await?;

    Ok(Json(json!({
        "success": true,
        "message": receipt.message,
        "ticketId": receipt.ticket_id,
        "emailId": receipt.email_id,
        "usedFallback": receipt.used_fallback,
        "leadScore": receipt.lead_score,
    })))
}

// ============ POST /api/chat ============

async fn handle_chat(
    State(state): State<AppState>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    body: Bytes,
) -> Result<Json<crate::chat::ChatReply>, AppError> {
    let decision = state.chat_limiter.check_or_allow(state.kv.as_ref(), &ip).await;
    if !decision.allowed {
        tracing::info!(ip = %ip, count = decision.count, "chat rate limit hit");
        return Err(too_many_requests("Troppi messaggi. Riprova tra poco."));
    }

    let request: ChatRequest = parse_json(&body)?;
    let reply = state.chat.handle(&request).await?;
    Ok(Json(reply))
}

// ============ Fallback ============

async fn handle_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": "Method not allowed",
            "message": "Use POST /api/contact or POST /api/chat",
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    fn server_config() -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1:0".into(),
            allowed_origins: vec![
                "https://www.it-era.it".into(),
                "http://localhost:3000".into(),
            ],
        }
    }

    #[tokio::test]
    async fn sweeper_purges_memory_backend_on_first_tick() {
        let kv = Arc::new(MemoryKv::new());
        kv.increment("ratelimit:chat:1.2.3.4", Duration::from_millis(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let sweeper = spawn_kv_sweeper(kv.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        sweeper.abort();

        assert_eq!(kv.purge_expired().await.unwrap(), 0);
    }

    #[test]
    fn listed_origin_is_echoed() {
        let s = server_config();
        assert_eq!(
            allowed_origin(&s, Some("http://localhost:3000")),
            "http://localhost:3000"
        );
    }

    #[test]
    fn unknown_or_missing_origin_gets_default() {
        let s = server_config();
        assert_eq!(allowed_origin(&s, Some("https://evil.example")), "https://www.it-era.it");
        assert_eq!(allowed_origin(&s, None), "https://www.it-era.it");
    }

    #[test]
    fn client_ip_prefers_cdn_headers() {
        let peer: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(resolve_client_ip(&headers, Some(peer)), "10.0.0.1");
        assert_eq!(resolve_client_ip(&headers, None), "unknown");

        headers.insert("x-forwarded-for", HeaderValue::from_static("1.1.1.1, 2.2.2.2"));
        assert_eq!(resolve_client_ip(&headers, Some(peer)), "1.1.1.1");

        headers.insert("cf-connecting-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(resolve_client_ip(&headers, Some(peer)), "9.9.9.9");
    }

    #[test]
    fn validation_errors_are_listed() {
        let err: AppError = ContactError::Invalid(vec!["Email valida richiesta".into()]).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.errors, vec!["Email valida richiesta"]);
    }
}
