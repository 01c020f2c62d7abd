use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::error::FlowError;
use crate::models::NoSqlSource;

/// Executes a `NoSql` source query and returns flattened documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, source: &NoSqlSource) -> Result<Vec<Map<String, Value>>, FlowError>;
}

/// Collections stored as JSON arrays at
/// `{connection_string}/{db_name}/{collection}.json`. The query is a JSON
/// object; a document matches when every query field equals the document's
/// top-level field of the same name.
#[derive(Debug, Default, Clone)]
pub struct JsonDirectoryStore;

#[async_trait]
impl DocumentStore for JsonDirectoryStore {
    async fn find(&self, source: &NoSqlSource) -> Result<Vec<Map<String, Value>>, FlowError> {
        let path = PathBuf::from(&source.connection_string)
            .join(&source.db_name)
            .join(format!("{}.json", source.collection));

        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            FlowError::Transport(format!(
                "Failed to open collection {}: {}",
                path.display(),
                e
            ))
        })?;

        let documents: Vec<Value> = serde_json::from_str(&raw).map_err(|e| {
            FlowError::Data(format!("Collection {} is not a JSON array: {}", path.display(), e))
        })?;

        let query = parse_query(&source.query)?;

        let mut rows = Vec::new();
        for document in documents {
            let Value::Object(fields) = document else {
                return Err(FlowError::Data(format!(
                    "Collection {} contains a non-object document",
                    path.display()
                )));
            };
            if query.iter().all(|(k, v)| fields.get(k) == Some(v)) {
                rows.push(fields);
            }
        }
        Ok(rows)
    }
}

fn parse_query(query: &str) -> Result<Map<String, Value>, FlowError> {
    if query.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str(query) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(FlowError::Data("document query must be a JSON object".into())),
        Err(e) => Err(FlowError::Data(format!("Invalid document query: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(root: &std::path::Path, query: &str) -> NoSqlSource {
        NoSqlSource {
            connection_string: root.to_string_lossy().to_string(),
            db_name: "shop".into(),
            collection: "orders".into(),
            query: query.into(),
        }
    }

    #[tokio::test]
    async fn filters_on_top_level_fields() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("shop")).unwrap();
        std::fs::write(
            dir.path().join("shop").join("orders.json"),
            r#"[{"id":1,"status":"open"},{"id":2,"status":"closed"},{"id":3,"status":"open"}]"#,
        )
        .unwrap();

        let rows = JsonDirectoryStore
            .find(&source(dir.path(), r#"{"status":"open"}"#))
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn missing_collection_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonDirectoryStore.find(&source(dir.path(), "{}")).await.unwrap_err();
        assert!(matches!(err, FlowError::Transport(_)));
    }

    #[test]
    fn non_object_query_is_rejected() {
        assert!(parse_query("[1,2]").is_err());
        assert!(parse_query("").unwrap().is_empty());
    }
}
