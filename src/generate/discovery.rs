//! Model discovery against the remote model registry.
//!
//! Never fails: any error is logged and treated as "nothing discovered" so
//! the caller falls back to its static candidate list.

use super::client::GeminiClient;
use super::models::{pick_model, ModelDescriptor};
use std::future::Future;

/// Listing endpoint versions, tried in order.
pub const DISCOVERY_API_VERSIONS: [&str; 2] = ["v1", "v1beta"];

/// Find a callable model id, trying each listing version until one yields a pick.
pub async fn discover_model(client: &GeminiClient) -> Option<String> {
    discover_with(client.preferred_model_tokens(), |version| {
        client.list_models(version)
    })
    .await
}

/// Discovery loop over an arbitrary lister.
pub async fn discover_with<F, Fut, E>(preferred: &[String], mut list: F) -> Option<String>
where
    F: FnMut(&'static str) -> Fut,
    Fut: Future<Output = Result<Vec<ModelDescriptor>, E>>,
    E: std::fmt::Display,
{
    for version in DISCOVERY_API_VERSIONS {
        match list(version).await {
            Ok(models) => {
                if let Some(id) = pick_model(&models, preferred) {
                    tracing::debug!(version, model = %id, "Discovered model");
                    return Some(id);
                }
                tracing::debug!(
                    version,
                    listed = models.len(),
                    "No listed model supports content generation"
                );
            }
            Err(err) => {
                tracing::debug!(version, error = %err, "Model listing failed");
            }
        }
    }
    None
}
