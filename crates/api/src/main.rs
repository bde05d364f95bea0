use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use tradar_core::domain::prediction::AnalysisResult;
use tradar_core::llm::error::ExtractionError;
use tradar_core::llm::extractor::Extractor;
use tradar_core::llm::ollama::OllamaTransport;
use tradar_core::llm::Transport;
use tradar_core::storage::predictions::PredictionRow;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var("TRADAR_CONFIG").ok().map(std::path::PathBuf::from);
    let settings = tradar_core::config::Settings::load(config_path.as_deref())?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match tradar_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "DATABASE_URL missing; stored predictions are unavailable");
            None
        }
    };

    let transport = OllamaTransport::from_settings(&settings.ai)?;
    let shutdown = CancellationToken::new();
    let state = AppState {
        pool,
        extractor: Arc::new(Extractor::new(transport)),
        shutdown: shutdown.clone(),
    };

    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

fn router<T: Transport + 'static>(state: AppState<T>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/analyze", post(analyze::<T>))
        .route(
            "/messages/:message_id/predictions",
            get(get_predictions::<T>),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

struct AppState<T> {
    pool: Option<PgPool>,
    extractor: Arc<Extractor<T>>,
    shutdown: CancellationToken,
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            extractor: Arc::clone(&self.extractor),
            shutdown: self.shutdown.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    text: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    message_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct ApiError {
    stage: &'static str,
    error: String,
}

fn extraction_error_response(err: ExtractionError) -> Response {
    let status = match &err {
        ExtractionError::Transport(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    if !err.is_cancelled() {
        sentry::capture_error(&err);
    }
    let body = ApiError {
        stage: err.stage(),
        error: err.to_string(),
    };
    (status, Json(body)).into_response()
}

async fn analyze<T: Transport + 'static>(
    State(state): State<AppState<T>>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisResult<Uuid>>, Response> {
    if req.text.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "text must be non-empty").into_response());
    }

    let message_id = req.message_id.unwrap_or_else(Uuid::new_v4);
    let channel = req.channel.unwrap_or_default();

    state
        .extractor
        .analyze_message(&state.shutdown, &req.text, &channel, message_id)
        .await
        .map(Json)
        .map_err(extraction_error_response)
}

async fn get_predictions<T: Transport + 'static>(
    State(state): State<AppState<T>>,
    Path(message_id): Path<String>,
) -> Result<Json<Vec<PredictionRow>>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let message_id = Uuid::parse_str(&message_id).map_err(|_| StatusCode::BAD_REQUEST)?;

    let rows = tradar_core::storage::predictions::fetch_for_message(pool, message_id)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    if rows.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(rows))
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    shutdown.cancel();
}

fn init_sentry(settings: &tradar_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
