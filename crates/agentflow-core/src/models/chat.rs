use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::agent::BackendType;

/// Well-known message and chat property keys.
pub mod props {
    /// Set on every message the engine generates on an agent's behalf.
    pub const AGENT_INTERNAL: &str = "agent_internal";
    /// Filter value substituted for `@filter@` in sources and behaviours.
    pub const DATA_FILTER: &str = "data_filter";
    pub const CHUNK_LIMIT: &str = "chunk_limit";
    pub const API_RESPONSE_TYPE: &str = "api_response_type";
    /// Marks a chat on which the run-once `FETCH_DATA*` step already ran.
    pub const FETCH_ONCE: &str = "FETCH_DATA*";
    /// Marks a chat on which the run-once `BECOME*` step already ran.
    pub const BECOME_ONCE: &str = "BECOME*";
}

/// Placeholder replaced by the active data filter.
pub const FILTER_PLACEHOLDER: &str = "@filter@";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Vec<u8>>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            time: Utc::now(),
            image: None,
            properties: HashMap::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_property(mut self, key: &str, value: impl Into<String>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Tag the message as produced by the engine rather than a human.
    pub fn internal(self) -> Self {
        self.with_property(props::AGENT_INTERNAL, "true")
    }

    pub fn is_internal(&self) -> bool {
        self.properties
            .get(props::AGENT_INTERNAL)
            .is_some_and(|v| v == "true")
    }
}

/// The conversation owned by a single agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Free-text fragments handed to the model by `ANSWER+USE_MEMORY`.
    #[serde(default)]
    pub memory: Vec<String>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    #[serde(default)]
    pub visual: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            model: model.into(),
            messages: Vec::new(),
            memory: Vec::new(),
            properties: HashMap::new(),
            visual: false,
            backend: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Insert only when the key is not already present. Returns whether it was inserted.
    pub fn set_property_if_absent(&mut self, key: &str, value: impl Into<String>) -> bool {
        if self.properties.contains_key(key) {
            return false;
        }
        self.properties.insert(key.to_string(), value.into());
        true
    }

    /// Move the most recent User message to the tail so the model sees it last.
    pub fn ensure_user_message_last(&mut self) {
        let Some(idx) = self.messages.iter().rposition(|m| m.role == Role::User) else {
            return;
        };
        if idx + 1 != self.messages.len() {
            let message = self.messages.remove(idx);
            self.messages.push(message);
        }
    }

    /// Drop everything but the seeded instruction.
    pub fn reset_to_instruction(&mut self, instruction: &str) {
        self.properties.clear();
        if self.visual {
            self.messages.clear();
            return;
        }
        self.messages.truncate(1);
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => first.content = instruction.to_string(),
            _ => {
                self.messages.clear();
                self.messages.push(Message::system(instruction));
            }
        }
    }
}

/// Final answer of a pipeline run or a backend call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResult {
    pub message: Message,
    pub model: String,
    pub done: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatResult {
    pub fn new(message: Message, model: impl Into<String>) -> Self {
        Self {
            message,
            model: model.into(),
            done: true,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_moves_to_tail() {
        let mut chat = Chat::new("c", "m");
        chat.push(Message::system("instr"));
        chat.push(Message::user("hello"));
        chat.push(Message::system("started"));
        chat.ensure_user_message_last();
        let contents: Vec<_> = chat.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["instr", "started", "hello"]);
    }

    #[test]
    fn property_is_not_overwritten() {
        let mut chat = Chat::new("c", "m");
        assert!(chat.set_property_if_absent(props::DATA_FILTER, "a"));
        assert!(!chat.set_property_if_absent(props::DATA_FILTER, "b"));
        assert_eq!(chat.property(props::DATA_FILTER), Some("a"));
    }

    #[test]
    fn reset_keeps_instruction_only() {
        let mut chat = Chat::new("c", "m");
        chat.push(Message::system("Be a pirate"));
        chat.push(Message::user("hi"));
        chat.properties.insert("x".into(), "y".into());
        chat.reset_to_instruction("Be helpful");
        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].content, "Be helpful");
        assert!(chat.properties.is_empty());
    }
}
