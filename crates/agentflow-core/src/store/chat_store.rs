use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::db::Database;
use crate::error::FlowError;
use crate::models::Chat;

/// One chat per agent, keyed by both chat id and owning agent id.
#[derive(Clone)]
pub struct ChatStore {
    db: Database,
}

impl ChatStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, agent_id: &str, chat: &Chat) -> Result<(), FlowError> {
        let agent_id = agent_id.to_string();
        let id = chat.id.clone();
        let document = serde_json::to_string(chat)
            .map_err(|e| FlowError::Internal(format!("Failed to serialize chat: {}", e)))?;
        let now = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO chats (id, agent_id, document, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                       document = excluded.document,
                       updated_at = excluded.updated_at",
                    rusqlite::params![id, agent_id, document, now],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get_by_agent(&self, agent_id: &str) -> Result<Option<Chat>, FlowError> {
        let id = agent_id.to_string();
        let document: Option<String> = self
            .db
            .with_conn_async(move |conn| {
                conn.query_row(
                    "SELECT document FROM chats WHERE agent_id = ?1",
                    rusqlite::params![id],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;
        document
            .map(|d| {
                serde_json::from_str(&d)
                    .map_err(|e| FlowError::Data(format!("Corrupt chat document: {}", e)))
            })
            .transpose()
    }

    pub async fn delete_by_agent(&self, agent_id: &str) -> Result<(), FlowError> {
        let id = agent_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.execute("DELETE FROM chats WHERE agent_id = ?1", rusqlite::params![id])?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Agent, Message};
    use crate::store::AgentStore;

    #[tokio::test]
    async fn chat_follows_its_agent() {
        let db = Database::open_in_memory().unwrap();
        let agents = AgentStore::new(db.clone());
        let chats = ChatStore::new(db);

        let agent = Agent::builder().with_name("a").with_model("m").build().unwrap();
        agents.save(&agent).await.unwrap();

        let mut chat = Chat::new("a", "m");
        chat.push(Message::user("hi"));
        chats.save(&agent.id, &chat).await.unwrap();
        chat.push(Message::assistant("hello"));
        chats.save(&agent.id, &chat).await.unwrap();

        let loaded = chats.get_by_agent(&agent.id).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);

        agents.delete(&agent.id).await.unwrap();
        assert!(chats.get_by_agent(&agent.id).await.unwrap().is_none());
    }
}
