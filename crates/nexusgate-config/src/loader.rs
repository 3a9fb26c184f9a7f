use std::collections::HashSet;
use std::path::Path;

use crate::{Config, ProviderType};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a placeholder cannot be
    /// expanded, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded = crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistency found
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_providers()?;
        self.validate_models()?;
        self.validate_failover()?;
        Ok(())
    }

    fn validate_providers(&self) -> anyhow::Result<()> {
        for (id, provider) in &self.llm.providers {
            if provider.provider_type == ProviderType::Azure && provider.base_url.is_none() {
                anyhow::bail!("azure provider '{id}' requires a base_url");
            }
        }

        Ok(())
    }

    fn validate_models(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();

        for model in &self.llm.models {
            if !self.llm.providers.contains_key(&model.provider) {
                anyhow::bail!("model '{}' references unknown provider '{}'", model.name, model.provider);
            }

            if !seen.insert((model.provider.as_str(), model.name.as_str())) {
                anyhow::bail!("model '{}' is declared twice for provider '{}'", model.name, model.provider);
            }
        }

        Ok(())
    }

    fn validate_failover(&self) -> anyhow::Result<()> {
        let failover = &self.llm.failover;
        let backoff = &failover.backoff;

        if failover.max_provider_attempts == 0 {
            anyhow::bail!("llm.failover.max_provider_attempts must be greater than 0");
        }

        if failover.timeout_ms == 0 {
            anyhow::bail!("llm.failover.timeout_ms must be greater than 0");
        }

        if let Some(code) = failover
            .retriable_status_codes
            .iter()
            .find(|code| !(100..=599).contains(*code))
        {
            anyhow::bail!("llm.failover.retriable_status_codes contains invalid status {code}");
        }

        if !(0.0..=1.0).contains(&backoff.jitter_factor) {
            anyhow::bail!("llm.failover.backoff.jitter_factor must be within [0, 1]");
        }

        if backoff.exponent < 1.0 {
            anyhow::bail!("llm.failover.backoff.exponent must be at least 1");
        }

        if backoff.base_delay_ms > backoff.max_delay_ms {
            anyhow::bail!("llm.failover.backoff.base_delay_ms must not exceed max_delay_ms");
        }

        Ok(())
    }
}
