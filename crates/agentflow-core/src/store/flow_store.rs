use rusqlite::{OptionalExtension, Row};

use crate::db::Database;
use crate::error::FlowError;
use crate::models::AgentFlow;

/// Flow headers. Member agents live in the agents table, linked by `flow_id`.
#[derive(Clone)]
pub struct FlowStore {
    db: Database,
}

impl FlowStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, flow: &AgentFlow) -> Result<(), FlowError> {
        let f = flow.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO flows (id, name, description, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                       name = excluded.name,
                       description = excluded.description",
                    rusqlite::params![f.id, f.name, f.description, f.created_at.timestamp_millis()],
                )?;
                Ok(())
            })
            .await
    }

    /// Flow header without agents.
    pub async fn get(&self, flow_id: &str) -> Result<Option<AgentFlow>, FlowError> {
        let id = flow_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    "SELECT id, name, description, created_at FROM flows WHERE id = ?1",
                    rusqlite::params![id],
                    |row| Ok(row_to_flow(row)),
                )
                .optional()
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<AgentFlow>, FlowError> {
        self.db
            .with_conn_async(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, description, created_at FROM flows ORDER BY created_at DESC",
                )?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_flow(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn delete(&self, flow_id: &str) -> Result<(), FlowError> {
        let id = flow_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.execute("DELETE FROM flows WHERE id = ?1", rusqlite::params![id])?;
                Ok(())
            })
            .await
    }
}

fn row_to_flow(row: &Row<'_>) -> AgentFlow {
    let created_ms: i64 = row.get(3).unwrap_or(0);
    AgentFlow {
        id: row.get(0).unwrap_or_default(),
        name: row.get(1).unwrap_or_default(),
        description: row.get(2).unwrap_or_default(),
        agents: Vec::new(),
        created_at: chrono::DateTime::from_timestamp_millis(created_ms)
            .unwrap_or_else(chrono::Utc::now),
    }
}
