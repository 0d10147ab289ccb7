use super::models::{ModelDescriptor, ModelList};
use crate::config::{ApiKey, Config, ConfigError};
use crate::util::sanitize_api_response;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use url::Url;

/// API version used for content generation
const GENERATE_API_VERSION: &str = "v1";

/// Body fragments that mark an error as "this model can't serve the request".
const UNAVAILABLE_MARKERS: [&str; 4] = ["not found", "unsupported", "not supported", "model"];

/// Why a generation call failed, as far as candidate fallback is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// Model missing, unsupported for this key/region, or produced nothing. Try the next one.
    Unavailable,
    /// Credential rejected.
    Unauthorized,
    /// Quota, upstream outage, timeout or connection failure.
    Transient,
    /// Request or response didn't have the expected shape.
    Malformed,
}

impl GenerationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationErrorKind::Unavailable => "unavailable",
            GenerationErrorKind::Unauthorized => "unauthorized",
            GenerationErrorKind::Transient => "transient",
            GenerationErrorKind::Malformed => "malformed",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GenerationError {
    kind: GenerationErrorKind,
    model: String,
    status: Option<u16>,
    message: String,
}

impl GenerationError {
    pub fn new(
        kind: GenerationErrorKind,
        model: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            model: model.into(),
            status,
            message: message.into(),
        }
    }

    /// Non-success HTTP status with its response body.
    pub fn from_status(model: &str, status: u16, body: &str) -> Self {
        let kind = classify_status(status, body);
        Self::new(
            kind,
            model,
            Some(status),
            format!(
                "Generation API error {} for model {}: {}",
                status,
                model,
                sanitize_api_response(body)
            ),
        )
    }

    pub fn empty_response(model: &str) -> Self {
        Self::new(
            GenerationErrorKind::Unavailable,
            model,
            None,
            format!("Empty response from model {}", model),
        )
    }

    fn timed_out(model: &str, after: Duration) -> Self {
        Self::new(
            GenerationErrorKind::Transient,
            model,
            None,
            format!(
                "Request to model {} timed out after {}s",
                model,
                after.as_secs()
            ),
        )
    }

    fn from_reqwest(model: &str, err: reqwest::Error) -> Self {
        // The request URL carries the API key, so it never goes into the message.
        let err = err.without_url();
        let kind = if err.is_timeout() || err.is_connect() || err.is_request() {
            GenerationErrorKind::Transient
        } else {
            GenerationErrorKind::Malformed
        };
        let message = if err.is_timeout() {
            format!("Request to model {} timed out", model)
        } else if err.is_connect() {
            "Could not connect to the generation API. Check your network and try again."
                .to_string()
        } else {
            format!("Generation request for model {} failed: {}", model, err)
        };
        Self::new(kind, model, None, message)
    }

    pub fn kind(&self) -> GenerationErrorKind {
        self.kind
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Whether the orchestrator should move on to the next candidate model.
    pub fn is_retryable_across_models(&self) -> bool {
        self.kind == GenerationErrorKind::Unavailable
    }
}

/// Map a non-success status and body to an error kind.
pub fn classify_status(status: u16, body: &str) -> GenerationErrorKind {
    match status {
        401 | 403 => GenerationErrorKind::Unauthorized,
        404 => GenerationErrorKind::Unavailable,
        // Quota bodies name the model in their details, so status decides.
        429 => GenerationErrorKind::Transient,
        _ => {
            let lower = body.to_lowercase();
            if UNAVAILABLE_MARKERS.iter().any(|m| lower.contains(m)) {
                GenerationErrorKind::Unavailable
            } else if (500..=599).contains(&status) {
                GenerationErrorKind::Transient
            } else {
                GenerationErrorKind::Malformed
            }
        }
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize, Default)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Newline-joined text parts of the first candidate, skipping absent or empty parts.
    fn first_candidate_text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }
}

/// Extract generated text from a raw success body.
pub fn extract_generated_text(body: &str) -> Result<String, serde_json::Error> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)?;
    Ok(parsed.first_candidate_text())
}

/// HTTP client for the generative-language API.
///
/// Constructed once by its owner and shared by reference; it holds no state
/// beyond the credential and connection pool.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: ApiKey,
    base_url: Url,
    request_timeout: Duration,
    discovery_timeout: Duration,
    preferred_model_tokens: Vec<String>,
}

impl GeminiClient {
    pub fn new(api_key: ApiKey, config: &Config) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&config.api_base_url)
            .map_err(|e| ConfigError::InvalidBaseUrl(format!("{}: {}", config.api_base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseUrl(config.api_base_url.clone()));
        }

        let request_timeout = Duration::from_secs(config.request_timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            base_url,
            request_timeout,
            discovery_timeout: Duration::from_secs(config.discovery_timeout_secs.max(1)),
            preferred_model_tokens: config.preferred_model_tokens.clone(),
        })
    }

    pub fn preferred_model_tokens(&self) -> &[String] {
        &self.preferred_model_tokens
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose());
        url
    }

    /// Issue one content-generation call and return the candidate's text.
    pub async fn generate_content(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<String, GenerationError> {
        let method = format!("{}:generateContent", model);
        let url = self.endpoint(&[GENERATE_API_VERSION, "models", &method]);
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let send = async {
            let response = self
                .http
                .post(url)
                .json(&request)
                .send()
                .await
                .map_err(|e| GenerationError::from_reqwest(model, e))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| GenerationError::from_reqwest(model, e))?;
            Ok::<_, GenerationError>((status, text))
        };

        let (status, text) = timeout(self.request_timeout, send)
            .await
            .map_err(|_| GenerationError::timed_out(model, self.request_timeout))??;

        if !status.is_success() {
            return Err(GenerationError::from_status(model, status.as_u16(), &text));
        }

        let content = extract_generated_text(&text).map_err(|e| {
            GenerationError::new(
                GenerationErrorKind::Malformed,
                model,
                Some(status.as_u16()),
                format!("Failed to decode generation response: {}", e),
            )
        })?;

        if content.is_empty() {
            return Err(GenerationError::empty_response(model));
        }
        Ok(content)
    }

    /// List models from one API version (`v1`, `v1beta`).
    pub async fn list_models(
        &self,
        api_version: &str,
    ) -> Result<Vec<ModelDescriptor>, GenerationError> {
        let url = self.endpoint(&[api_version, "models"]);
        let label = format!("{} model list", api_version);

        let fetch = async {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| GenerationError::from_reqwest(&label, e))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| GenerationError::from_reqwest(&label, e))?;
            Ok::<_, GenerationError>((status, text))
        };

        let (status, text) = timeout(self.discovery_timeout, fetch)
            .await
            .map_err(|_| GenerationError::timed_out(&label, self.discovery_timeout))??;

        if !status.is_success() {
            return Err(GenerationError::from_status(&label, status.as_u16(), &text));
        }

        let list: ModelList = serde_json::from_str(&text).map_err(|e| {
            GenerationError::new(
                GenerationErrorKind::Malformed,
                &label,
                Some(status.as_u16()),
                format!("Failed to decode model list: {}", e),
            )
        })?;
        Ok(list.models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_auth_failures_are_fatal() {
        assert_eq!(classify_status(401, ""), GenerationErrorKind::Unauthorized);
        // Status wins even when the body mentions a model.
        assert_eq!(
            classify_status(403, "permission denied for model"),
            GenerationErrorKind::Unauthorized
        );
    }

    #[test]
    fn test_classify_not_found_is_unavailable() {
        assert_eq!(classify_status(404, ""), GenerationErrorKind::Unavailable);
        assert_eq!(
            classify_status(400, "models/gemini-x is NOT FOUND for API version v1"),
            GenerationErrorKind::Unavailable
        );
        assert_eq!(
            classify_status(400, "generateContent is unsupported"),
            GenerationErrorKind::Unavailable
        );
    }

    #[test]
    fn test_classify_quota_and_outage_are_transient() {
        assert_eq!(
            classify_status(429, "Resource has been exhausted (e.g. check quota)."),
            GenerationErrorKind::Transient
        );
        assert_eq!(classify_status(503, "Service Unavailable"), GenerationErrorKind::Transient);
        // An overloaded model is treated as unavailable so the next candidate gets a turn.
        assert_eq!(
            classify_status(503, "The model is overloaded."),
            GenerationErrorKind::Unavailable
        );
    }

    #[test]
    fn test_classify_quota_body_naming_model_is_transient() {
        let body = r#"{
  "error": {
    "code": 429,
    "message": "You exceeded your current quota, please check your plan and billing details.",
    "status": "RESOURCE_EXHAUSTED",
    "details": [
      {
        "@type": "type.googleapis.com/google.rpc.QuotaFailure",
        "violations": [
          {
            "quotaMetric": "generativelanguage.googleapis.com/generate_content_free_tier_requests",
            "quotaId": "GenerateRequestsPerMinutePerProjectPerModel-FreeTier",
            "quotaDimensions": {"location": "global", "model": "gemini-1.5-flash"},
            "quotaValue": "15"
          }
        ]
      }
    ]
  }
}"#;
        assert_eq!(classify_status(429, body), GenerationErrorKind::Transient);
        let err = GenerationError::from_status("gemini-1.5-flash", 429, body);
        assert!(!err.is_retryable_across_models());
    }

    #[test]
    fn test_zero_timeouts_are_clamped() {
        let config = Config {
            request_timeout_secs: 0,
            discovery_timeout_secs: 0,
            ..Config::default()
        };
        let client = GeminiClient::new(ApiKey::new("k"), &config).unwrap();
        assert_eq!(client.request_timeout, Duration::from_secs(1));
        assert_eq!(client.discovery_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_classify_other_client_errors_are_malformed() {
        assert_eq!(
            classify_status(400, "API key not valid. Please pass a valid API key."),
            GenerationErrorKind::Malformed
        );
    }

    #[test]
    fn test_status_error_message_carries_status_and_body() {
        let err = GenerationError::from_status("gemini-1.5-pro", 404, "{\"error\":\"gone\"}");
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.model(), "gemini-1.5-pro");
        assert!(err.is_retryable_across_models());
        let msg = err.to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn test_empty_response_is_retryable() {
        let err = GenerationError::empty_response("gemini-1.5-flash");
        assert!(err.is_retryable_across_models());
        assert!(err.to_string().to_lowercase().contains("empty response"));
    }

    #[test]
    fn test_extract_joins_text_parts_of_first_candidate() {
        let body = r#"{"candidates":[
            {"content":{"parts":[{"text":"{\"title\":"},{"inlineData":{}},{"text":""},{"text":"\"x\"}"}]}},
            {"content":{"parts":[{"text":"ignored"}]}}
        ]}"#;
        assert_eq!(extract_generated_text(body).unwrap(), "{\"title\":\n\"x\"}");
    }

    #[test]
    fn test_extract_handles_missing_candidates() {
        assert_eq!(extract_generated_text("{}").unwrap(), "");
        assert_eq!(
            extract_generated_text(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap(),
            ""
        );
        assert!(extract_generated_text("not json").is_err());
    }

    #[test]
    fn test_endpoint_encodes_model_and_key() {
        let config = Config {
            api_base_url: "http://localhost:8080".to_string(),
            ..Config::default()
        };
        let client = GeminiClient::new(ApiKey::new("k&y"), &config).unwrap();
        let url = client.endpoint(&["v1", "models", "gemini-1.5-flash:generateContent"]);
        assert_eq!(url.path(), "/v1/models/gemini-1.5-flash:generateContent");
        assert_eq!(url.query(), Some("key=k%26y"));
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        let config = Config {
            api_base_url: "mailto:someone@example.com".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            GeminiClient::new(ApiKey::new("k"), &config),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: "hi" }],
            }],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"contents":[{"role":"user","parts":[{"text":"hi"}]}]})
        );
    }
}
