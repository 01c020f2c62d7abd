//! HTTP model backend: Anthropic Messages API or any OpenAI-compatible
//! chat-completions endpoint.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::LlmBackend;
use crate::config::BackendConfig;
use crate::error::FlowError;
use crate::models::{Chat, ChatResult, Message, Role};

pub struct HttpLlmBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpLlmBackend {
    pub fn new(config: BackendConfig, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
        }
    }

    async fn complete(&self, chat: &Chat, memory: &[String]) -> Result<ChatResult, FlowError> {
        let content = match self.config.adapter.as_str() {
            "anthropic" | "claude" => self.call_anthropic(chat, memory).await?,
            "openai" | "opencode" | "openai-compatible" => self.call_openai(chat, memory).await?,
            other => {
                return Err(FlowError::Configuration(format!(
                    "Unknown backend adapter: '{}'",
                    other
                )))
            }
        };
        if content.trim().is_empty() {
            return Err(FlowError::Data(format!(
                "model '{}' returned an empty answer",
                chat.model
            )));
        }
        Ok(ChatResult::new(Message::assistant(content), chat.model.clone()))
    }

    /// POST {base_url}/v1/messages
    async fn call_anthropic(&self, chat: &Chat, memory: &[String]) -> Result<String, FlowError> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let mut system: Vec<String> = chat
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.clone())
            .collect();
        if let Some(grounding) = memory_prompt(memory) {
            system.push(grounding);
        }
        let messages: Vec<Value> = chat
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = if m.role == Role::Assistant { "assistant" } else { "user" };
                json!({ "role": role, "content": m.content })
            })
            .collect();

        let mut body = json!({
            "model": chat.model,
            "max_tokens": self.config.max_tokens,
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = Value::String(system.join("\n\n"));
        }
        self.apply_temperature(&mut body);

        tracing::info!("[HttpLlmBackend] Calling Anthropic API: {} (model: {})", url, chat.model);

        let json = self
            .post(
                self.client
                    .post(&url)
                    .header("x-api-key", &self.config.api_key)
                    .header("anthropic-version", "2023-06-01"),
                &body,
            )
            .await?;

        Ok(json
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default())
    }

    /// POST {base_url}/chat/completions
    async fn call_openai(&self, chat: &Chat, memory: &[String]) -> Result<String, FlowError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let mut messages: Vec<Value> = Vec::with_capacity(chat.messages.len() + 1);
        if let Some(grounding) = memory_prompt(memory) {
            messages.push(json!({ "role": "system", "content": grounding }));
        }
        messages.extend(
            chat.messages
                .iter()
                .map(|m| json!({ "role": m.role.as_str(), "content": m.content })),
        );

        let mut body = json!({
            "model": chat.model,
            "messages": messages,
        });
        self.apply_temperature(&mut body);

        tracing::info!("[HttpLlmBackend] Calling chat completions: {} (model: {})", url, chat.model);

        let json = self
            .post(
                self.client
                    .post(&url)
                    .header("Authorization", format!("Bearer {}", self.config.api_key)),
                &body,
            )
            .await?;

        Ok(json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string())
    }

    async fn post(&self, request: reqwest::RequestBuilder, body: &Value) -> Result<Value, FlowError> {
        let response = request
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(FlowError::Transport(format!("API returned {}: {}", status, text)));
        }
        serde_json::from_str(&text)
            .map_err(|e| FlowError::Data(format!("Failed to parse response JSON: {}", e)))
    }

    fn apply_temperature(&self, body: &mut Value) {
        if let Some(number) = self.config.temperature.and_then(serde_json::Number::from_f64) {
            body["temperature"] = Value::Number(number);
        }
    }
}

fn memory_prompt(memory: &[String]) -> Option<String> {
    if memory.is_empty() {
        return None;
    }
    Some(format!(
        "Answer using the following knowledge:\n\n{}",
        memory.join("\n\n")
    ))
}

#[async_trait]
impl LlmBackend for HttpLlmBackend {
    async fn send(&self, chat: &Chat) -> Result<ChatResult, FlowError> {
        self.complete(chat, &[]).await
    }

    async fn ask_memory(&self, chat: &Chat, memory: &[String]) -> Result<ChatResult, FlowError> {
        self.complete(chat, memory).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat() -> Chat {
        let mut chat = Chat::new("c", "gpt-test");
        chat.push(Message::system("Be brief"));
        chat.push(Message::user("hi"));
        chat
    }

    fn backend(adapter: &str, base_url: String) -> HttpLlmBackend {
        HttpLlmBackend::new(
            BackendConfig {
                adapter: adapter.into(),
                base_url,
                api_key: "k".into(),
                ..BackendConfig::default()
            },
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn openai_adapter_sends_memory_as_system() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer k")
            .match_body(mockito::Matcher::Regex("Refunds take 5 days".into()))
            .with_body(r#"{"choices":[{"message":{"content":"5 days"}}]}"#)
            .create_async()
            .await;

        let result = backend("openai", server.url())
            .ask_memory(&chat(), &["Refunds take 5 days".into()])
            .await
            .unwrap();
        assert_eq!(result.message.content, "5 days");
        assert_eq!(result.message.role, Role::Assistant);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn anthropic_adapter_collects_text_blocks() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "k")
            .with_body(r#"{"content":[{"type":"text","text":"a"},{"type":"text","text":"b"}]}"#)
            .create_async()
            .await;

        let result = backend("anthropic", server.url()).send(&chat()).await.unwrap();
        assert_eq!(result.message.content, "a\nb");
    }

    #[tokio::test]
    async fn error_status_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = backend("openai", server.url()).send(&chat()).await.unwrap_err();
        assert!(matches!(err, FlowError::Transport(_)));
    }

    #[tokio::test]
    async fn unknown_adapter_is_configuration_error() {
        let err = backend("carrier-pigeon", "http://localhost".into())
            .send(&chat())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Configuration(_)));
    }
}
