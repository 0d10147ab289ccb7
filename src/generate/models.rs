use serde::Deserialize;

/// Capability a listed model must advertise to be callable for plan generation.
pub const GENERATE_CONTENT_METHOD: &str = "generateContent";

/// Structural prefix the listing endpoint puts in front of model ids.
const MODEL_NAME_PREFIX: &str = "models/";

/// Rank applied to names matching none of the preference tokens
const UNRANKED: usize = usize::MAX;

/// One entry of the model-listing response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelDescriptor {
    pub fn supports_generate_content(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == GENERATE_CONTENT_METHOD)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelList {
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
}

/// Position of the first preference token contained in `name`.
fn preference_rank(name: &str, preferred: &[String]) -> usize {
    preferred
        .iter()
        .position(|token| name.contains(token.as_str()))
        .unwrap_or(UNRANKED)
}

/// Strip the `models/` path prefix, if present.
pub fn strip_model_prefix(name: &str) -> &str {
    name.strip_prefix(MODEL_NAME_PREFIX).unwrap_or(name)
}

/// Pick the best callable model id from a listing.
///
/// Keeps only named entries that support content generation, orders them by
/// preference token (stable, so listing order breaks ties) and returns the
/// winner without its `models/` prefix.
pub fn pick_model(models: &[ModelDescriptor], preferred: &[String]) -> Option<String> {
    let mut supported: Vec<&str> = models
        .iter()
        .filter(|m| m.supports_generate_content())
        .filter_map(|m| m.name.as_deref())
        .filter(|name| !name.trim().is_empty())
        .collect();

    supported.sort_by_key(|name| preference_rank(name, preferred));

    supported
        .first()
        .map(|name| strip_model_prefix(name).to_string())
}

/// Candidate list for one generation request: the discovered id alone, or the static list.
pub fn candidate_models(discovered: Option<String>, fallback: &[String]) -> Vec<String> {
    match discovered {
        Some(id) => vec![id],
        None => fallback.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, methods: &[&str]) -> ModelDescriptor {
        ModelDescriptor {
            name: Some(name.to_string()),
            supported_generation_methods: methods.iter().map(|m| m.to_string()).collect(),
        }
    }

    fn prefs() -> Vec<String> {
        vec!["flash".to_string(), "pro".to_string()]
    }

    #[test]
    fn test_prefers_flash_over_pro() {
        let models = vec![
            descriptor("models/gemini-1.5-pro", &["generateContent"]),
            descriptor("models/gemini-1.5-flash", &["generateContent"]),
        ];
        assert_eq!(pick_model(&models, &prefs()).as_deref(), Some("gemini-1.5-flash"));
    }

    #[test]
    fn test_ties_keep_listing_order() {
        let models = vec![
            descriptor("models/text-embedding-004", &["embedContent"]),
            descriptor("models/gemini-1.5-flash-002", &["generateContent"]),
            descriptor("models/gemini-1.5-flash-001", &["generateContent"]),
        ];
        assert_eq!(
            pick_model(&models, &prefs()).as_deref(),
            Some("gemini-1.5-flash-002")
        );
    }

    #[test]
    fn test_unranked_models_sort_last() {
        let models = vec![
            descriptor("models/gemma-2", &["generateContent"]),
            descriptor("models/gemini-1.0-pro", &["generateContent"]),
        ];
        assert_eq!(pick_model(&models, &prefs()).as_deref(), Some("gemini-1.0-pro"));
    }

    #[test]
    fn test_unranked_model_still_qualifies() {
        let models = vec![descriptor("models/gemma-2", &["generateContent", "countTokens"])];
        assert_eq!(pick_model(&models, &prefs()).as_deref(), Some("gemma-2"));
    }

    #[test]
    fn test_no_generate_content_means_no_pick() {
        let models = vec![
            descriptor("models/embedding-001", &["embedContent"]),
            ModelDescriptor {
                name: None,
                supported_generation_methods: vec!["generateContent".to_string()],
            },
        ];
        assert_eq!(pick_model(&models, &prefs()), None);
    }

    #[test]
    fn test_strip_prefix_only_when_present() {
        assert_eq!(strip_model_prefix("models/gemini-pro"), "gemini-pro");
        assert_eq!(strip_model_prefix("gemini-pro"), "gemini-pro");
    }

    #[test]
    fn test_candidate_models() {
        let fallback = vec!["a".to_string(), "b".to_string()];
        assert_eq!(candidate_models(Some("x".to_string()), &fallback), vec!["x"]);
        assert_eq!(candidate_models(None, &fallback), fallback);
    }

    #[test]
    fn test_model_list_deserialize() {
        let json = r#"{"models":[{"name":"models/gemini-1.5-flash","displayName":"Flash","supportedGenerationMethods":["generateContent","countTokens"]},{"displayName":"nameless"}]}"#;
        let list: ModelList = serde_json::from_str(json).unwrap();
        assert_eq!(list.models.len(), 2);
        assert!(list.models[0].supports_generate_content());
        assert!(!list.models[1].supports_generate_content());
    }
}
