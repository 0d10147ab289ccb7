//! HTTP surface: `POST /api/generate` and `GET /health`.

use crate::config::{resolve_api_key_with, Config, ConfigError};
use crate::generate::{
    GeminiClient, GenerateRequest, GenerateResponse, Plan, PlanError, PlanGenerator,
};
use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

type KeyLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Shared server state. The generator is built on first use and reused.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<StateInner>,
}

struct StateInner {
    config: Config,
    key_lookup: Box<KeyLookup>,
    generator: OnceCell<PlanGenerator<GeminiClient>>,
}

impl AppState {
    /// State that resolves the API key from the process environment.
    pub fn new(config: Config) -> Self {
        Self::with_key_lookup(config, |name| std::env::var(name).ok())
    }

    pub fn with_key_lookup<F>(config: Config, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(StateInner {
                config,
                key_lookup: Box::new(lookup),
                generator: OnceCell::new(),
            }),
        }
    }

    /// A failed initialization leaves the cell empty, so the next request retries it.
    async fn generator(&self) -> Result<&PlanGenerator<GeminiClient>, ConfigError> {
        let inner = &self.inner;
        inner
            .generator
            .get_or_try_init(|| async {
                let key = resolve_api_key_with(|name| (inner.key_lookup)(name))?;
                let client = GeminiClient::new(key, &inner.config)?;
                tracing::info!(base_url = %inner.config.api_base_url, "Generation client ready");
                Ok::<_, ConfigError>(PlanGenerator::new(client, &inner.config))
            })
            .await
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/generate", post(generate))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(config: Config) -> Result<()> {
    let bind = config.bind_address.clone();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!(address = %bind, "labscribe listening");

    axum::serve(listener, router(AppState::new(config)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> (StatusCode, Json<GenerateResponse>) {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("generate", %request_id);

    async move {
        let request = match payload {
            Ok(Json(request)) => request,
            Err(rejection) => {
                tracing::debug!(error = %rejection.body_text(), "Rejected request body");
                return failure(StatusCode::BAD_REQUEST, rejection.body_text());
            }
        };

        match run_generate(&state, &request).await {
            Ok(plan) => (StatusCode::OK, Json(GenerateResponse::success(plan))),
            Err(err) => {
                let status =
                    StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::BAD_GATEWAY);
                tracing::error!(status = status.as_u16(), error = %err, "Generation request failed");
                failure(status, err.to_string())
            }
        }
    }
    .instrument(span)
    .await
}

async fn run_generate(
    state: &AppState,
    request: &GenerateRequest,
) -> Result<Plan, PlanError> {
    // Reject bad input before touching the credential or the network.
    request.validate()?;
    let generator = state.generator().await?;
    generator
        .generate_plan(request.mode, &request.question)
        .await
}

fn failure(status: StatusCode, message: String) -> (StatusCode, Json<GenerateResponse>) {
    (status, Json(GenerateResponse::failure(message)))
}
