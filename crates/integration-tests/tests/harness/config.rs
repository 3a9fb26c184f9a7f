//! Programmatic configuration builder for integration tests

use std::sync::Arc;

use nexusgate_config::{Config, Modality, ModelConfig, ProviderConfig, ProviderType};
use nexusgate_llm::{ChannelSink, CompletionRecord, Gateway};
use secrecy::SecretString;
use tokio::sync::mpsc::UnboundedReceiver;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with fast retries and short timeouts
    pub fn new() -> Self {
        let mut config = Config::default();
        config.llm.failover.backoff.base_delay_ms = 1;
        config.llm.failover.backoff.max_delay_ms = 5;
        config.llm.failover.backoff.jitter_factor = 0.0;
        config.llm.failover.timeout_ms = 2_000;

        Self { config }
    }

    /// Add an OpenAI-compatible provider pointed at a mock backend
    pub fn with_openai_provider(self, id: &str, base_url: &str) -> Self {
        self.with_provider(id, ProviderType::Openai, base_url)
    }

    /// Add an Anthropic provider pointed at a mock backend
    pub fn with_anthropic_provider(self, id: &str, base_url: &str) -> Self {
        self.with_provider(id, ProviderType::Anthropic, base_url)
    }

    fn with_provider(mut self, id: &str, provider_type: ProviderType, base_url: &str) -> Self {
        self.config.llm.providers.insert(
            id.to_owned(),
            ProviderConfig {
                name: None,
                provider_type,
                base_url: Some(base_url.parse().expect("valid URL")),
                api_key: Some(SecretString::from("test-key")),
                api_version: None,
                proxy: None,
            },
        );
        self
    }

    /// Serve `name` from `provider` with the given selection weight
    pub fn with_model(mut self, name: &str, provider: &str, weight: u32) -> Self {
        self.config.llm.models.push(ModelConfig {
            id: None,
            provider: provider.to_owned(),
            name: name.to_owned(),
            upstream_model: None,
            modality: Modality::Chat,
            weight,
        });
        self
    }

    /// Retry the same candidate `n` extra times before moving on
    pub fn with_same_provider_retries(mut self, n: u32) -> Self {
        self.config.llm.failover.same_provider_retries = n;
        self
    }

    /// Per-attempt timeout in milliseconds
    pub fn with_attempt_timeout(mut self, ms: u64) -> Self {
        self.config.llm.failover.timeout_ms = ms;
        self
    }

    /// Client headers forwarded upstream
    pub fn with_forward_headers(mut self, headers: &[&str]) -> Self {
        self.config.llm.forward_headers = headers.iter().map(|h| (*h).to_owned()).collect();
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }

    /// Build a gateway whose completion records land on the returned receiver
    pub fn gateway(self) -> anyhow::Result<(Gateway, UnboundedReceiver<CompletionRecord>)> {
        let config = self.build();
        let (sink, records) = ChannelSink::new();
        let gateway = Gateway::from_config(&config.llm)?.with_sink(Arc::new(sink));

        Ok((gateway, records))
    }
}
