//! Seams to the model providers and the protocol bridge.
//!
//! The engine only talks to these traits. `HttpLlmBackend` is the bundled
//! text backend; image generation and the MCP bridge are supplied by the
//! embedding application.

pub mod http;

pub use http::HttpLlmBackend;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::FlowError;
use crate::models::{BackendType, Chat, ChatResult, McpConfig, Message};

#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Answer the chat from the model alone.
    async fn send(&self, chat: &Chat) -> Result<ChatResult, FlowError>;

    /// Answer the chat grounded on the given text fragments.
    async fn ask_memory(&self, chat: &Chat, memory: &[String]) -> Result<ChatResult, FlowError>;
}

#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn send(&self, chat: &Chat) -> Result<ChatResult, FlowError>;
}

/// External tool-protocol server reachable through an agent's `McpConfig`.
#[async_trait]
pub trait ProtocolBridge: Send + Sync {
    async fn prompt(&self, config: &McpConfig, messages: &[Message]) -> Result<Message, FlowError>;
}

/// Picks the backend for a chat: its explicit provider if one is registered,
/// otherwise the default.
#[derive(Clone)]
pub struct BackendRegistry {
    default: Arc<dyn LlmBackend>,
    providers: HashMap<BackendType, Arc<dyn LlmBackend>>,
    image: Option<Arc<dyn ImageBackend>>,
    bridge: Option<Arc<dyn ProtocolBridge>>,
}

impl BackendRegistry {
    pub fn new(default: Arc<dyn LlmBackend>) -> Self {
        Self {
            default,
            providers: HashMap::new(),
            image: None,
            bridge: None,
        }
    }

    pub fn with_provider(mut self, backend: BackendType, llm: Arc<dyn LlmBackend>) -> Self {
        self.providers.insert(backend, llm);
        self
    }

    pub fn with_image(mut self, image: Arc<dyn ImageBackend>) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_bridge(mut self, bridge: Arc<dyn ProtocolBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn llm(&self, backend: Option<BackendType>) -> Arc<dyn LlmBackend> {
        backend
            .and_then(|b| self.providers.get(&b))
            .unwrap_or(&self.default)
            .clone()
    }

    pub fn image(&self) -> Result<Arc<dyn ImageBackend>, FlowError> {
        self.image
            .clone()
            .ok_or_else(|| FlowError::Configuration("no image backend configured".into()))
    }

    pub fn bridge(&self) -> Result<Arc<dyn ProtocolBridge>, FlowError> {
        self.bridge
            .clone()
            .ok_or_else(|| FlowError::Configuration("no protocol bridge configured".into()))
    }
}
