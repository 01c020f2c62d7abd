//! Shared fixtures: scripted backends and an engine over in-memory SQLite.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentflow_core::backend::{BackendRegistry, ImageBackend, LlmBackend, ProtocolBridge};
use agentflow_core::commands::CommandDispatcher;
use agentflow_core::config::EngineConfig;
use agentflow_core::models::{Chat, ChatResult, McpConfig, Message};
use agentflow_core::notify::ProgressNotifier;
use agentflow_core::{AgentService, Database, Engine, FlowError};

/// What the text backend was asked.
#[derive(Debug, Clone)]
pub struct LlmCall {
    pub chat_name: String,
    pub last_content: String,
    pub memory: Option<Vec<String>>,
}

/// Replies `"{chat name}: {last message}"`, optionally after a delay.
#[derive(Default)]
pub struct EchoLlm {
    calls: Mutex<Vec<LlmCall>>,
    delay: Option<Duration>,
}

impl EchoLlm {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn calls(&self) -> Vec<LlmCall> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, chat: &Chat, memory: Option<&[String]>) -> ChatResult {
        let last = chat
            .last_message()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(LlmCall {
            chat_name: chat.name.clone(),
            last_content: last.clone(),
            memory: memory.map(<[String]>::to_vec),
        });
        ChatResult::new(
            Message::assistant(format!("{}: {}", chat.name, last)),
            chat.model.clone(),
        )
    }
}

#[async_trait]
impl LlmBackend for EchoLlm {
    async fn send(&self, chat: &Chat) -> Result<ChatResult, FlowError> {
        self.pause().await;
        Ok(self.answer(chat, None))
    }

    async fn ask_memory(&self, chat: &Chat, memory: &[String]) -> Result<ChatResult, FlowError> {
        self.pause().await;
        Ok(self.answer(chat, Some(memory)))
    }
}

#[derive(Default)]
pub struct FakeImages {
    pub calls: Mutex<usize>,
}

#[async_trait]
impl ImageBackend for FakeImages {
    async fn send(&self, chat: &Chat) -> Result<ChatResult, FlowError> {
        *self.calls.lock().unwrap() += 1;
        let mut message = Message::assistant("image");
        message.image = Some(vec![0x89, 0x50, 0x4e, 0x47]);
        Ok(ChatResult::new(message, chat.model.clone()))
    }
}

/// What the protocol bridge was sent.
#[derive(Debug, Clone)]
pub struct BridgeCall {
    pub server: String,
    pub model: String,
    pub contents: Vec<String>,
}

/// Answers every prompt with a fixed reply and records the request.
pub struct RecordingBridge {
    reply: String,
    calls: Mutex<Vec<BridgeCall>>,
}

impl RecordingBridge {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<BridgeCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProtocolBridge for RecordingBridge {
    async fn prompt(&self, config: &McpConfig, messages: &[Message]) -> Result<Message, FlowError> {
        self.calls.lock().unwrap().push(BridgeCall {
            server: config.name.clone(),
            model: config.model.clone(),
            contents: messages.iter().map(|m| m.content.clone()).collect(),
        });
        Ok(Message::assistant(self.reply.clone()))
    }
}

pub struct Harness {
    pub service: AgentService,
    pub llm: Arc<EchoLlm>,
    pub images: Arc<FakeImages>,
    pub db: Database,
    pub knowledge_root: PathBuf,
    _dir: tempfile::TempDir,
}

#[derive(Default)]
pub struct HarnessOptions {
    pub commands: Option<CommandDispatcher>,
    pub notifier: Option<Arc<dyn ProgressNotifier>>,
    pub max_redirect_depth: Option<usize>,
    pub redirect_lock_timeout_ms: Option<u64>,
    pub llm_delay: Option<Duration>,
    pub bridge: Option<Arc<dyn ProtocolBridge>>,
}

pub fn harness() -> Harness {
    harness_with(HarnessOptions::default())
}

pub fn harness_with(options: HarnessOptions) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_in_memory().unwrap();
    let llm = Arc::new(match options.llm_delay {
        Some(delay) => EchoLlm::with_delay(delay),
        None => EchoLlm::default(),
    });
    let images = Arc::new(FakeImages::default());

    let mut config = EngineConfig {
        data_dir: dir.path().to_path_buf(),
        ..EngineConfig::default()
    };
    if let Some(depth) = options.max_redirect_depth {
        config.max_redirect_depth = depth;
    }
    if let Some(timeout) = options.redirect_lock_timeout_ms {
        config.redirect_lock_timeout_ms = timeout;
    }
    let knowledge_root = config.knowledge_root();

    let mut backends = BackendRegistry::new(llm.clone()).with_image(images.clone());
    if let Some(bridge) = options.bridge {
        backends = backends.with_bridge(bridge);
    }
    let mut builder = Engine::builder(db.clone())
        .config(config)
        .backends(backends);
    if let Some(commands) = options.commands {
        builder = builder.commands(commands);
    }
    if let Some(notifier) = options.notifier {
        builder = builder.notifier(notifier);
    }

    Harness {
        service: AgentService::new(builder.build()),
        llm,
        images,
        db,
        knowledge_root,
        _dir: dir,
    }
}
