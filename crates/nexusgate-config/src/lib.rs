#![allow(clippy::must_use_candidate)]

mod env;
pub mod failover;
pub mod llm;
mod loader;
pub mod telemetry;

use serde::Deserialize;

pub use env::{ExpandError, expand_env};
pub use failover::*;
pub use llm::*;
pub use telemetry::*;

/// Top-level `NexusGate` configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Providers, models and failover policy
    #[serde(default)]
    pub llm: LlmConfig,
}
