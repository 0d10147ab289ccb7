//! Candidate fallback and the request boundary.
//!
//! One request builds its prompt once, asks discovery for a model, then walks
//! the candidate list until a model answers with a recoverable plan. Only
//! "model unavailable" failures move on to the next candidate; everything
//! else fails the request immediately.

use super::client::{GeminiClient, GenerationError};
use super::discovery::discover_model;
use super::models::candidate_models;
use super::parse::{parse_plan, ParseError};
use super::plan::{GenerateMode, Plan};
use super::prompts::build_prompt;
use crate::config::{Config, ConfigError};
use crate::util::{truncate, MAX_ERROR_CONTENT_LEN};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Minimum question length, in characters.
pub const MIN_QUESTION_CHARS: usize = 5;

/// Everything that can fail one generation request.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Model response is missing required fields: {}", .0.join(", "))]
    Incomplete(Vec<&'static str>),
    #[error("No supported model found for this API key")]
    NoSupportedModel,
    #[error("{0}")]
    InvalidRequest(String),
}

impl PlanError {
    /// HTTP status for the response envelope.
    pub fn http_status(&self) -> u16 {
        match self {
            PlanError::InvalidRequest(_) => 400,
            PlanError::Configuration(_) => 500,
            PlanError::Generation(_)
            | PlanError::Parse(_)
            | PlanError::Incomplete(_)
            | PlanError::NoSupportedModel => 502,
        }
    }
}

/// The two remote operations generation depends on.
pub trait ModelBackend: Send + Sync {
    /// Best model to use, or `None` to fall back to the static list. Never fails.
    fn discover_model(&self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>>;

    fn generate<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, GenerationError>> + Send + 'a>>;
}

impl ModelBackend for GeminiClient {
    fn discover_model(&self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>> {
        Box::pin(discover_model(self))
    }

    fn generate<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, GenerationError>> + Send + 'a>> {
        Box::pin(self.generate_content(model, prompt))
    }
}

/// Turns a (mode, question) pair into a [`Plan`] using whichever model works.
#[derive(Debug, Clone)]
pub struct PlanGenerator<B> {
    backend: B,
    fallback_models: Vec<String>,
    retry_on_parse_failure: bool,
}

impl<B: ModelBackend> PlanGenerator<B> {
    pub fn new(backend: B, config: &Config) -> Self {
        Self {
            backend,
            fallback_models: config.fallback_models.clone(),
            retry_on_parse_failure: config.retry_on_parse_failure,
        }
    }

    pub fn with_fallback_models(mut self, models: Vec<String>) -> Self {
        self.fallback_models = models;
        self
    }

    /// Treat unparseable or incomplete responses like an unavailable model.
    pub fn with_retry_on_parse_failure(mut self, enabled: bool) -> Self {
        self.retry_on_parse_failure = enabled;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn generate_plan(
        &self,
        mode: GenerateMode,
        question: &str,
    ) -> Result<Plan, PlanError> {
        let discovered = self.backend.discover_model().await;
        if discovered.is_none() {
            tracing::info!(
                candidates = self.fallback_models.len(),
                "Model discovery found nothing, using fallback list"
            );
        }
        let candidates = candidate_models(discovered, &self.fallback_models);
        let prompt = build_prompt(mode, question);

        let mut last_error: Option<PlanError> = None;
        for model in &candidates {
            tracing::debug!(model = %model, mode = mode.as_str(), "Trying candidate model");

            let raw = match self.backend.generate(model, &prompt).await {
                Ok(raw) => raw,
                Err(err) if err.is_retryable_across_models() => {
                    tracing::warn!(
                        model = %model,
                        status = ?err.status(),
                        error = %err,
                        "Model unavailable, trying next candidate"
                    );
                    last_error = Some(err.into());
                    continue;
                }
                Err(err) => {
                    tracing::warn!(
                        model = %model,
                        kind = err.kind().as_str(),
                        status = ?err.status(),
                        "Generation failed"
                    );
                    return Err(err.into());
                }
            };

            match finish_plan(&raw, mode) {
                Ok(plan) => {
                    tracing::info!(model = %model, title = %plan.title, "Generated plan");
                    return Ok(plan);
                }
                Err(err) if self.retry_on_parse_failure => {
                    tracing::debug!(preview = %truncate(&raw, MAX_ERROR_CONTENT_LEN), "Unusable response text");
                    tracing::warn!(model = %model, error = %err, "Unusable response, trying next candidate");
                    last_error = Some(err);
                }
                Err(err) => {
                    tracing::debug!(preview = %truncate(&raw, MAX_ERROR_CONTENT_LEN), "Unusable response text");
                    tracing::warn!(model = %model, error = %err, "Unusable response");
                    return Err(err);
                }
            }
        }

        Err(last_error.unwrap_or(PlanError::NoSupportedModel))
    }
}

fn finish_plan(raw: &str, mode: GenerateMode) -> Result<Plan, PlanError> {
    let mut plan = parse_plan(raw)?;
    let missing = plan.missing_required_fields(mode);
    if !missing.is_empty() {
        return Err(PlanError::Incomplete(missing));
    }
    plan.retain_mode_fields(mode);
    Ok(plan)
}

/// Inbound generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub mode: GenerateMode,
    pub question: String,
}

impl GenerateRequest {
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.question.chars().count() < MIN_QUESTION_CHARS {
            return Err(PlanError::InvalidRequest(format!(
                "Question must be at least {} characters",
                MIN_QUESTION_CHARS
            )));
        }
        Ok(())
    }
}

/// Response envelope: `{ok: true, plan}` or `{ok: false, error}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerateResponse {
    pub fn success(plan: Plan) -> Self {
        Self {
            ok: true,
            plan: Some(plan),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            plan: None,
            error: Some(message.into()),
        }
    }
}

impl From<Result<Plan, PlanError>> for GenerateResponse {
    fn from(result: Result<Plan, PlanError>) -> Self {
        match result {
            Ok(plan) => Self::success(plan),
            Err(err) => Self::failure(err.to_string()),
        }
    }
}

/// Validate a request and run it through `generator`.
pub async fn handle_generate<B: ModelBackend>(
    generator: &PlanGenerator<B>,
    request: &GenerateRequest,
) -> Result<Plan, PlanError> {
    request.validate()?;
    generator.generate_plan(request.mode, &request.question).await
}
