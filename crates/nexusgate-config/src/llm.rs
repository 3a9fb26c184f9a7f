use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::failover::FailoverConfig;

/// Providers, models and the failover policy
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider configurations keyed by provider id
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
    /// Model deployments, each bound to one provider
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    /// Failover and retry policy
    #[serde(default)]
    pub failover: FailoverConfig,
    /// Client headers forwarded to upstream providers (case-insensitive)
    #[serde(default = "default_forward_headers")]
    pub forward_headers: Vec<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: IndexMap::new(),
            models: Vec::new(),
            failover: FailoverConfig::default(),
            forward_headers: default_forward_headers(),
        }
    }
}

fn default_forward_headers() -> Vec<String> {
    vec!["anthropic-beta".to_owned()]
}

/// Configuration for a single upstream provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Human-readable name, falls back to the provider id
    #[serde(default)]
    pub name: Option<String>,
    /// Wire protocol spoken by the provider
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// API key sent with every request
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// `api-version` query parameter (Azure only)
    #[serde(default)]
    pub api_version: Option<String>,
    /// Outbound HTTP proxy for this provider
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

/// Supported upstream protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    /// `OpenAI` chat completions and compatible APIs
    Openai,
    /// `OpenAI` Responses API
    OpenaiResponses,
    /// Anthropic Messages API
    Anthropic,
    /// Azure `OpenAI` deployments
    Azure,
    /// Ollama's OpenAI-compatible endpoint
    Ollama,
}

impl ProviderType {
    /// Registry key of the upstream adapter serving this protocol
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::OpenaiResponses => "openai-responses",
            Self::Anthropic => "anthropic",
            Self::Azure => "azure",
            Self::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound proxy settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Proxy URL (`http://`, `https://` or `socks5://`)
    pub url: Url,
    /// Basic-auth user name
    #[serde(default)]
    pub username: Option<String>,
    /// Basic-auth password
    #[serde(default)]
    pub password: Option<SecretString>,
}

/// One model deployment on one provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Stable identifier, defaults to `{provider}/{name}`
    #[serde(default)]
    pub id: Option<String>,
    /// Owning provider id
    pub provider: String,
    /// Model name clients ask for
    pub name: String,
    /// Model id sent upstream when it differs from `name`
    #[serde(default)]
    pub upstream_model: Option<String>,
    /// What the model is used for
    #[serde(default)]
    pub modality: Modality,
    /// Relative selection weight among candidates for the same name
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl ModelConfig {
    /// Identifier of this deployment
    pub fn id(&self) -> String {
        self.id.clone().unwrap_or_else(|| format!("{}/{}", self.provider, self.name))
    }

    /// Model id to put on the wire
    pub fn upstream_name(&self) -> &str {
        self.upstream_model.as_deref().unwrap_or(&self.name)
    }
}

const fn default_weight() -> u32 {
    1
}

/// Model modality
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Chat/completions
    #[default]
    Chat,
    /// Embeddings
    Embedding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_types_use_registry_keys() {
        let raw = indoc::indoc! {r#"
            [providers.a]
            type = "openai-responses"

            [providers.b]
            type = "ollama"
        "#};

        let config: LlmConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.providers["a"].provider_type.as_str(), "openai-responses");
        assert_eq!(config.providers["b"].provider_type, ProviderType::Ollama);
        assert_eq!(config.forward_headers, vec!["anthropic-beta"]);
    }

    #[test]
    fn model_defaults() {
        let raw = indoc::indoc! {r#"
            [[models]]
            provider = "openai-main"
            name = "gpt-4o"
        "#};

        let config: LlmConfig = toml::from_str(raw).unwrap();
        let model = &config.models[0];
        assert_eq!(model.id(), "openai-main/gpt-4o");
        assert_eq!(model.upstream_name(), "gpt-4o");
        assert_eq!(model.modality, Modality::Chat);
        assert_eq!(model.weight, 1);
    }

    #[test]
    fn upstream_model_overrides_wire_name() {
        let raw = indoc::indoc! {r#"
            [[models]]
            id = "m1"
            provider = "azure-east"
            name = "gpt-4o"
            upstream_model = "prod-gpt4o"
            weight = 0
        "#};

        let config: LlmConfig = toml::from_str(raw).unwrap();
        let model = &config.models[0];
        assert_eq!(model.id(), "m1");
        assert_eq!(model.upstream_name(), "prod-gpt4o");
        assert_eq!(model.weight, 0);
    }

    #[test]
    fn unknown_provider_field_is_rejected() {
        let raw = indoc::indoc! {r#"
            [providers.a]
            type = "openai"
            region = "us"
        "#};

        assert!(toml::from_str::<LlmConfig>(raw).is_err());
    }
}
