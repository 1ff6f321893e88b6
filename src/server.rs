use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::{io, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::config::{AccountConfig, Config, RetrievalConfig};
use crate::mail::request::PortInput;
use crate::mail::{
    self, transport::Connector, ErrorBody, ListRequest, MailError, NormalizeOptions,
    NormalizedEmail, Secret, SourceProvider, Status,
};

pub const PASSWORD_ENV: &str = "IMAP_PASSWORD";

pub struct AppState<C> {
    pub connector: Arc<C>,
    pub retrieval: RetrievalConfig,
    pub account: Option<AccountConfig>,
}

// --- Errors ---
pub enum ApiError {
    Mail(MailError),
    Other(Status, ErrorBody),
}

impl From<MailError> for ApiError {
    fn from(e: MailError) -> Self {
        ApiError::Mail(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Mail(e) => (e.status(), e.body()),
            ApiError::Other(status, body) => (status, body),
        };
        let code = StatusCode::from_u16(status.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (code, Json(body)).into_response()
    }
}

#[derive(Serialize)]
pub struct EmailsResponse {
    pub emails: Vec<NormalizedEmail>,
}

#[derive(Deserialize)]
pub struct EmailsQuery {
    pub provider: Option<String>,
}

// --- Handlers ---
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_imap<C: Connector>(
    State(state): State<Arc<AppState<C>>>,
    payload: Result<Json<ListRequest>, JsonRejection>,
) -> Result<Json<EmailsResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        ApiError::Other(
            Status::BadRequest,
            ErrorBody {
                error: "Validation".to_string(),
                details: Some(vec![rejection.body_text()]),
            },
        )
    })?;
    let emails = run_retrieval(&state, payload).await?;
    Ok(Json(EmailsResponse { emails }))
}

async fn list_provider<C: Connector>(
    State(state): State<Arc<AppState<C>>>,
    Query(query): Query<EmailsQuery>,
) -> Result<Json<EmailsResponse>, ApiError> {
    let name = query.provider.as_deref().unwrap_or("imap");
    let provider = SourceProvider::parse(name)
        .ok_or_else(|| ApiError::Other(Status::BadRequest, ErrorBody::new("Unknown provider")))?;

    let emails = match provider {
        SourceProvider::Imap => {
            let not_ready = || ApiError::Other(Status::ServerError, ErrorBody::new("IMAP not initialized"));
            let account = state.account.as_ref().ok_or_else(not_ready)?;
            let secret = std::env::var(PASSWORD_ENV).map_err(|_| not_ready())?;
            let payload = ListRequest {
                host: Some(account.host.clone().into()),
                port: Some(PortInput::Number(account.port.into()).into()),
                use_encryption: Some(account.use_encryption.into()),
                username: Some(account.username.clone().into()),
                secret: Some(Secret::new(secret).into()),
                target_mailbox: Some(account.mailbox.clone().into()),
                message_limit: None,
            };
            run_retrieval(&state, payload).await?
        }
        SourceProvider::Outlook | SourceProvider::Thunderbird => {
            debug!(provider = name, "no retrieval backend for provider");
            Vec::new()
        }
    };
    Ok(Json(EmailsResponse { emails }))
}

/// Validates and runs one retrieval on the blocking pool. The blocking task
/// is not cancelled when the client goes away, so lock release and logout
/// always run to completion.
async fn run_retrieval<C: Connector>(
    state: &Arc<AppState<C>>,
    payload: ListRequest,
) -> Result<Vec<NormalizedEmail>, ApiError> {
    let request = payload
        .validate(state.retrieval.max_message_limit)
        .map_err(MailError::from)?;
    let opts = NormalizeOptions {
        provider: SourceProvider::Imap,
        html_snippets: state.retrieval.html_snippets,
    };

    let connector = state.connector.clone();
    let joined = tokio::task::spawn_blocking(move || mail::retrieve(&*connector, &request, &opts)).await;

    match joined {
        Ok(result) => Ok(result?),
        Err(e) => {
            error!(error = %e, "retrieval task failed");
            Err(ApiError::Other(Status::ServerError, ErrorBody::new("retrieval task failed")))
        }
    }
}

// --- Server ---
pub fn router<C: Connector>(state: AppState<C>, body_limit_kb: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/imap/list", post(list_imap::<C>))
        .route("/api/emails", get(list_provider::<C>))
        .with_state(Arc::new(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(body_limit_kb * 1024))
}

/// Binds the configured port, moving to the next one while it is taken.
pub async fn bind(config: &Config) -> Result<TcpListener> {
    let base = config.server.port;
    let attempts = config.server.port_attempts.max(1);

    let mut port = base;
    for attempt in 1..=attempts {
        match TcpListener::bind((config.server.bind.as_str(), port)).await {
            Ok(listener) => {
                if port != base {
                    warn!(requested = base, port, "started on fallback port, update the client API base if necessary");
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse && attempt < attempts => {
                warn!(port, attempt, attempts, "port in use, trying the next one");
                port = port.checked_add(1).ok_or_else(|| anyhow::anyhow!("ran out of ports"))?;
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to bind {}:{} after {} attempt(s): {}",
                    config.server.bind,
                    port,
                    attempt,
                    e
                ))
            }
        }
    }
    unreachable!("attempts is at least one")
}

pub async fn run<C: Connector>(config: Config, connector: C) -> Result<()> {
    let listener = bind(&config).await?;
    info!(addr = %listener.local_addr()?, "mailglance listening");

    let state = AppState {
        connector: Arc::new(connector),
        retrieval: config.retrieval.clone(),
        account: config.account.clone(),
    };
    let app = router(state, config.server.body_limit_kb);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutting down");
        })
        .await?;
    Ok(())
}
