use rusqlite::{OptionalExtension, Row};

use crate::db::Database;
use crate::error::FlowError;
use crate::models::Agent;

/// Agents are stored as JSON documents with a few columns pulled out for lookups.
#[derive(Clone)]
pub struct AgentStore {
    db: Database,
}

impl AgentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, agent: &Agent) -> Result<(), FlowError> {
        let a = agent.clone();
        let document = serde_json::to_string(&a)
            .map_err(|e| FlowError::Internal(format!("Failed to serialize agent: {}", e)))?;
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO agents (id, name, flow_order, chat_id, document, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                       name = excluded.name,
                       flow_order = excluded.flow_order,
                       chat_id = excluded.chat_id,
                       document = excluded.document,
                       updated_at = excluded.updated_at",
                    rusqlite::params![
                        a.id,
                        a.name,
                        a.order,
                        a.chat_id,
                        document,
                        a.created_at.timestamp_millis(),
                        a.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, agent_id: &str) -> Result<Option<Agent>, FlowError> {
        let id = agent_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare("SELECT document FROM agents WHERE id = ?1")?;
                stmt.query_row(rusqlite::params![id], row_to_agent).optional()
            })
            .await
    }

    pub async fn exists(&self, agent_id: &str) -> Result<bool, FlowError> {
        let id = agent_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let found: Option<i64> = conn
                    .query_row(
                        "SELECT 1 FROM agents WHERE id = ?1",
                        rusqlite::params![id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(found.is_some())
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<Agent>, FlowError> {
        self.db
            .with_conn_async(|conn| {
                let mut stmt =
                    conn.prepare("SELECT document FROM agents ORDER BY flow_order, created_at")?;
                let rows = stmt
                    .query_map([], row_to_agent)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn list_by_flow(&self, flow_id: &str) -> Result<Vec<Agent>, FlowError> {
        let fid = flow_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT document FROM agents WHERE flow_id = ?1 ORDER BY flow_order, created_at",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![fid], row_to_agent)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn assign_flow(&self, agent_id: &str, flow_id: &str) -> Result<(), FlowError> {
        let id = agent_id.to_string();
        let fid = flow_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE agents SET flow_id = ?1 WHERE id = ?2",
                    rusqlite::params![fid, id],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn delete(&self, agent_id: &str) -> Result<(), FlowError> {
        let id = agent_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.execute("DELETE FROM agents WHERE id = ?1", rusqlite::params![id])?;
                Ok(())
            })
            .await
    }
}

fn row_to_agent(row: &Row<'_>) -> Result<Agent, rusqlite::Error> {
    let document: String = row.get(0)?;
    serde_json::from_str(&document).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}
