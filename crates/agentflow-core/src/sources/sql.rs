use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{Map, Value};

use crate::error::FlowError;

/// Run `query` against the SQLite database at `path`, one map per row.
pub(crate) async fn query_rows(path: String, query: String) -> Result<Vec<Map<String, Value>>, FlowError> {
    tokio::task::spawn_blocking(move || run(&path, &query))
        .await
        .map_err(|e| FlowError::Internal(format!("Task join error: {}", e)))?
}

fn run(path: &str, query: &str) -> Result<Vec<Map<String, Value>>, FlowError> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| FlowError::Transport(format!("Failed to connect to {}: {}", path, e)))?;

    let mut stmt = conn
        .prepare(query)
        .map_err(|e| FlowError::Data(format!("Invalid query: {}", e)))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt
        .query([])
        .map_err(|e| FlowError::Data(format!("Query failed: {}", e)))?;

    let mut out = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| FlowError::Data(format!("Query failed: {}", e)))?
    {
        let mut map = Map::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            let value = row
                .get_ref(i)
                .map_err(|e| FlowError::Data(format!("Unreadable column {}: {}", column, e)))?;
            map.insert(column.clone(), to_json(value));
        }
        out.push(map);
    }
    Ok(out)
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rows_become_column_maps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crm.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE customers (name TEXT, score REAL, visits INTEGER, note TEXT);
             INSERT INTO customers VALUES ('Ada', 9.5, 3, NULL);",
        )
        .unwrap();
        drop(conn);

        let rows = query_rows(
            path.to_string_lossy().to_string(),
            "SELECT * FROM customers".into(),
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Ada");
        assert_eq!(rows[0]["score"], 9.5);
        assert_eq!(rows[0]["visits"], 3);
        assert!(rows[0]["note"].is_null());
    }

    #[tokio::test]
    async fn missing_database_is_transport_error() {
        let err = query_rows("/nonexistent/dir/x.db".into(), "SELECT 1".into())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Transport(_)));
    }
}
