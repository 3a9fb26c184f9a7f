//! Lookup of adapters by format or protocol name

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::LlmError;
use crate::format::{RequestAdapter, ResponseAdapter, anthropic, openai_chat, openai_responses};
use crate::provider::{self, UpstreamAdapter};

/// Registry of request, response and upstream adapters
///
/// Populated once at startup, then shared read-only behind an `Arc`.
#[derive(Default)]
pub struct AdapterRegistry {
    requests: HashMap<String, Arc<dyn RequestAdapter>>,
    responses: HashMap<String, Arc<dyn ResponseAdapter>>,
    upstreams: HashMap<String, Arc<dyn UpstreamAdapter>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut requests: Vec<_> = self.requests.keys().collect();
        let mut upstreams: Vec<_> = self.upstreams.keys().collect();
        requests.sort();
        upstreams.sort();

        f.debug_struct("AdapterRegistry")
            .field("formats", &requests)
            .field("protocols", &upstreams)
            .finish()
    }
}

impl AdapterRegistry {
    /// Registry with every built-in format and protocol
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();

        registry.register_request(Arc::new(openai_chat::OpenAiChatRequestAdapter));
        registry.register_request(Arc::new(openai_responses::ResponsesRequestAdapter));
        registry.register_request(Arc::new(anthropic::AnthropicRequestAdapter));

        registry.register_response(Arc::new(openai_chat::OpenAiChatResponseAdapter));
        registry.register_response(Arc::new(openai_responses::ResponsesResponseAdapter));
        registry.register_response(Arc::new(anthropic::AnthropicResponseAdapter));

        registry.register_upstream(Arc::new(provider::openai::OpenAiUpstream));
        registry.register_upstream(Arc::new(provider::responses::ResponsesUpstream));
        registry.register_upstream(Arc::new(provider::anthropic::AnthropicUpstream));
        registry.register_upstream(Arc::new(provider::azure::AzureUpstream));
        registry.register_upstream(Arc::new(provider::ollama::OllamaUpstream));

        registry
    }

    /// Register a request adapter under its format, replacing any previous one
    pub fn register_request(&mut self, adapter: Arc<dyn RequestAdapter>) {
        self.requests.insert(adapter.format().to_owned(), adapter);
    }

    /// Register a response adapter under its format, replacing any previous one
    pub fn register_response(&mut self, adapter: Arc<dyn ResponseAdapter>) {
        self.responses.insert(adapter.format().to_owned(), adapter);
    }

    /// Register an upstream adapter under its protocol, replacing any previous one
    pub fn register_upstream(&mut self, adapter: Arc<dyn UpstreamAdapter>) {
        self.upstreams.insert(adapter.protocol().to_owned(), adapter);
    }

    pub fn request(&self, format: &str) -> Result<Arc<dyn RequestAdapter>, LlmError> {
        self.requests.get(format).cloned().ok_or_else(|| LlmError::UnknownAdapter {
            kind: "request format",
            name: format.to_owned(),
        })
    }

    pub fn response(&self, format: &str) -> Result<Arc<dyn ResponseAdapter>, LlmError> {
        self.responses.get(format).cloned().ok_or_else(|| LlmError::UnknownAdapter {
            kind: "response format",
            name: format.to_owned(),
        })
    }

    pub fn upstream(&self, protocol: &str) -> Result<Arc<dyn UpstreamAdapter>, LlmError> {
        self.upstreams.get(protocol).cloned().ok_or_else(|| LlmError::UnknownAdapter {
            kind: "upstream protocol",
            name: protocol.to_owned(),
        })
    }
}
