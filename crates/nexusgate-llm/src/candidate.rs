//! Candidates: (model, provider) pairs eligible to serve a logical model name

use std::collections::HashMap;
use std::sync::Arc;

use nexusgate_config::{LlmConfig, Modality, ModelConfig, ProviderConfig};

/// One model deployment on one provider
#[derive(Debug, Clone)]
pub struct Candidate {
    provider_id: Arc<str>,
    /// Model deployment
    pub model: Arc<ModelConfig>,
    /// Provider serving the deployment
    pub provider: Arc<ProviderConfig>,
}

impl Candidate {
    pub fn new(provider_id: impl Into<Arc<str>>, model: Arc<ModelConfig>, provider: Arc<ProviderConfig>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model,
            provider,
        }
    }

    /// Configuration key of the provider
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Display name of the provider, falling back to its id
    pub fn provider_name(&self) -> &str {
        self.provider.name.as_deref().unwrap_or(&self.provider_id)
    }

    /// Model id sent upstream
    pub fn upstream_model(&self) -> &str {
        self.model.upstream_name()
    }

    /// Registry key of the provider's upstream protocol
    pub fn protocol(&self) -> &'static str {
        self.provider.provider_type.as_str()
    }

    /// Selection weight
    pub fn weight(&self) -> u32 {
        self.model.weight
    }

    fn matches_pin(&self, pin: &str) -> bool {
        self.provider_id.eq_ignore_ascii_case(pin) || self.provider_name().eq_ignore_ascii_case(pin)
    }
}

/// Supplies the candidates for a requested model name
pub trait CandidateSource: Send + Sync {
    /// Candidates serving `model`, restricted to the pinned provider (id or name) when set
    fn candidates(&self, model: &str, pin: Option<&str>) -> Vec<Candidate>;
}

/// Immutable snapshot of the configured chat models
#[derive(Debug, Default)]
pub struct ModelCatalog {
    by_name: HashMap<String, Vec<Candidate>>,
}

impl ModelCatalog {
    /// Build from configuration, keeping declaration order per model name
    pub fn from_config(config: &LlmConfig) -> Self {
        let providers: HashMap<&str, Arc<ProviderConfig>> = config
            .providers
            .iter()
            .map(|(id, provider)| (id.as_str(), Arc::new(provider.clone())))
            .collect();

        let mut by_name: HashMap<String, Vec<Candidate>> = HashMap::new();

        for model in &config.models {
            if model.modality != Modality::Chat {
                continue;
            }

            let Some(provider) = providers.get(model.provider.as_str()) else {
                tracing::warn!(model = %model.name, provider = %model.provider, "skipping model with unknown provider");
                continue;
            };

            by_name.entry(model.name.clone()).or_default().push(Candidate::new(
                model.provider.as_str(),
                Arc::new(model.clone()),
                Arc::clone(provider),
            ));
        }

        Self { by_name }
    }

    /// Names of all served models
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }
}

impl CandidateSource for ModelCatalog {
    fn candidates(&self, model: &str, pin: Option<&str>) -> Vec<Candidate> {
        self.by_name
            .get(model)
            .map(|list| {
                list.iter()
                    .filter(|c| pin.is_none_or(|p| c.matches_pin(p)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LlmConfig {
        let raw = indoc::indoc! {r#"
            [providers.openai-main]
            name = "OpenAI"
            type = "openai"

            [providers.claude]
            type = "anthropic"

            [[models]]
            provider = "openai-main"
            name = "smart"
            upstream_model = "gpt-4o"
            weight = 3

            [[models]]
            provider = "claude"
            name = "smart"
            upstream_model = "claude-sonnet-4"

            [[models]]
            provider = "openai-main"
            name = "embed"
            modality = "embedding"
        "#};
        toml::from_str(raw).unwrap()
    }

    #[test]
    fn candidates_keep_declaration_order() {
        let catalog = ModelCatalog::from_config(&config());
        let candidates = catalog.candidates("smart", None);

        let ids: Vec<_> = candidates.iter().map(Candidate::provider_id).collect();
        assert_eq!(ids, vec!["openai-main", "claude"]);
        assert_eq!(candidates[0].provider_name(), "OpenAI");
        assert_eq!(candidates[1].provider_name(), "claude");
        assert_eq!(candidates[1].upstream_model(), "claude-sonnet-4");
        assert_eq!(candidates[1].protocol(), "anthropic");
    }

    #[test]
    fn pin_matches_id_or_name() {
        let catalog = ModelCatalog::from_config(&config());

        assert_eq!(catalog.candidates("smart", Some("openai")).len(), 1);
        assert_eq!(catalog.candidates("smart", Some("CLAUDE")).len(), 1);
        assert!(catalog.candidates("smart", Some("bedrock")).is_empty());
    }

    #[test]
    fn embedding_models_are_not_chat_candidates() {
        let catalog = ModelCatalog::from_config(&config());
        assert!(catalog.candidates("embed", None).is_empty());
        assert!(catalog.candidates("unknown", None).is_empty());
    }
}
