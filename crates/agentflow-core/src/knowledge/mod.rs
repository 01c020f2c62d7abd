//! Per-agent knowledge index used by `ANSWER+USE_KNOWLEDGE`.
//!
//! Each agent's index lives at
//! `{root}/Knowledge/{AgentName}+{AgentId}/index.json` as indented camelCase
//! JSON. A [`Knowledge`] handle wraps the index and, when persistence is
//! enabled, writes it back after every mutation.

mod index;

pub use index::{KnowledgeIndex, KnowledgeIndexItem, KnowledgeItemType};

use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::error::FlowError;
use crate::models::Agent;

const INDEX_FILE: &str = "index.json";

/// Directory holding one agent's index.
pub fn knowledge_dir(root: &Path, agent_name: &str, agent_id: &str) -> PathBuf {
    root.join("Knowledge").join(format!("{}+{}", agent_name, agent_id))
}

#[derive(Debug, Clone)]
pub struct Knowledge {
    agent_id: String,
    agent_name: String,
    root: PathBuf,
    index: KnowledgeIndex,
    persistence: bool,
}

impl Knowledge {
    pub fn new(root: impl Into<PathBuf>, agent_name: &str, agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            agent_name: agent_name.to_string(),
            root: root.into(),
            index: KnowledgeIndex::new(),
            persistence: true,
        }
    }

    /// Load an agent's index. A missing file is a `NotFound` error.
    pub async fn load(
        root: impl Into<PathBuf>,
        agent_name: &str,
        agent_id: &str,
    ) -> Result<Self, FlowError> {
        let mut knowledge = Self::new(root, agent_name, agent_id);
        let path = knowledge.index_path();
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FlowError::NotFound(format!(
                    "knowledge index for agent '{}' at {}",
                    agent_name,
                    path.display()
                )));
            }
            Err(e) => {
                return Err(FlowError::Data(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        knowledge.index = serde_json::from_str(&raw)
            .map_err(|e| FlowError::Data(format!("Failed to parse {}: {}", path.display(), e)))?;
        Ok(knowledge)
    }

    pub async fn load_for(root: impl Into<PathBuf>, agent: &Agent) -> Result<Self, FlowError> {
        Self::load(root, &agent.name, &agent.id).await
    }

    pub fn index_path(&self) -> PathBuf {
        knowledge_dir(&self.root, &self.agent_name, &self.agent_id).join(INDEX_FILE)
    }

    pub fn index(&self) -> &KnowledgeIndex {
        &self.index
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn persistence_enabled(&self) -> bool {
        self.persistence
    }

    pub fn set_persistence(&mut self, enabled: bool) {
        self.persistence = enabled;
    }

    fn to_json(&self) -> Result<String, FlowError> {
        serde_json::to_string_pretty(&self.index)
            .map_err(|e| FlowError::Internal(format!("Failed to serialize index: {}", e)))
    }

    /// Write the index synchronously. Used while building knowledge up front.
    pub fn persist(&self) -> Result<(), FlowError> {
        let path = self.index_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FlowError::Data(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        std::fs::write(&path, self.to_json()?)
            .map_err(|e| FlowError::Data(format!("Failed to write {}: {}", path.display(), e)))?;
        tracing::debug!(
            "[Knowledge] Persisted {} item(s) to {}",
            self.index.count(),
            path.display()
        );
        Ok(())
    }

    /// Write the index from inside a running pipeline.
    pub async fn persist_async(&self) -> Result<(), FlowError> {
        let path = self.index_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                FlowError::Data(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&path, self.to_json()?)
            .await
            .map_err(|e| FlowError::Data(format!("Failed to write {}: {}", path.display(), e)))?;
        tracing::debug!(
            "[Knowledge] Persisted {} item(s) to {}",
            self.index.count(),
            path.display()
        );
        Ok(())
    }

    fn persist_if_enabled(&self) -> Result<(), FlowError> {
        if self.persistence {
            self.persist()
        } else {
            Ok(())
        }
    }

    pub fn add_item(&mut self, item: KnowledgeIndexItem) -> Result<bool, FlowError> {
        let added = self.index.add(item);
        if added {
            self.persist_if_enabled()?;
        }
        Ok(added)
    }

    pub fn remove_item(&mut self, item: &KnowledgeIndexItem) -> Result<bool, FlowError> {
        let removed = self.index.remove(item);
        if removed {
            self.persist_if_enabled()?;
        }
        Ok(removed)
    }

    pub fn remove_item_by_name(&mut self, name: &str) -> Result<bool, FlowError> {
        let removed = self.index.remove_by_name(name);
        if removed {
            self.persist_if_enabled()?;
        }
        Ok(removed)
    }

    pub fn clear(&mut self) -> Result<(), FlowError> {
        self.index.items.clear();
        self.persist_if_enabled()
    }

    pub fn set_index(&mut self, index: KnowledgeIndex) -> Result<(), FlowError> {
        self.index = index;
        self.persist_if_enabled()
    }

    pub fn items_by_type(&self, item_type: KnowledgeItemType) -> Vec<&KnowledgeIndexItem> {
        self.index.items_by_type(item_type)
    }

    pub fn items_by_tag(&self, tag: &str) -> Vec<&KnowledgeIndexItem> {
        self.index.items_by_tag(tag)
    }

    /// Resolve grounding text for `query`.
    ///
    /// Items whose tags appear as words in the query are preferred; when
    /// nothing matches every item is used. Text items contribute their value,
    /// file items their contents, url and mcp items a reference line.
    pub async fn fragments_for(&mut self, query: &str) -> Result<Vec<String>, FlowError> {
        let words: Vec<String> = query
            .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        let matched: Vec<usize> = self
            .index
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.tags.iter().any(|t| words.contains(&t.to_lowercase())))
            .map(|(i, _)| i)
            .collect();
        let selected: Vec<usize> = if matched.is_empty() {
            (0..self.index.items.len()).collect()
        } else {
            matched
        };

        let mut fragments = Vec::with_capacity(selected.len());
        let now = Utc::now();
        for i in selected {
            let item = &mut self.index.items[i];
            let fragment = match item.item_type {
                KnowledgeItemType::Text => item.value.clone(),
                KnowledgeItemType::File => {
                    let content = tokio::fs::read_to_string(&item.value).await.map_err(|e| {
                        FlowError::Data(format!("Failed to read knowledge file {}: {}", item.value, e))
                    })?;
                    format!("=== {} ===\n{}", item.name, content)
                }
                KnowledgeItemType::Url | KnowledgeItemType::Mcp => {
                    format!("{} ({}): {}", item.name, item.item_type.as_str(), item.value)
                }
            };
            item.last_accessed_at = Some(now);
            fragments.push(fragment);
        }

        if self.persistence {
            self.persist_async().await?;
        }
        Ok(fragments)
    }
}

/// Fluent construction of an agent's knowledge.
#[derive(Debug)]
pub struct KnowledgeBuilder {
    knowledge: Knowledge,
}

impl KnowledgeBuilder {
    pub fn for_agent(root: impl Into<PathBuf>, agent: &Agent) -> Self {
        Self {
            knowledge: Knowledge::new(root, &agent.name, &agent.id),
        }
    }

    pub fn with_index(mut self, index: KnowledgeIndex) -> Self {
        self.knowledge.index = index;
        self
    }

    pub fn enable_persistence(mut self) -> Self {
        self.knowledge.persistence = true;
        self
    }

    pub fn disable_persistence(mut self) -> Self {
        self.knowledge.persistence = false;
        self
    }

    pub fn add_file(self, name: &str, path: &str, tags: &[&str]) -> Self {
        self.add_item(KnowledgeIndexItem::new(name, path, KnowledgeItemType::File, owned(tags)))
    }

    pub fn add_url(self, name: &str, url: &str, tags: &[&str]) -> Self {
        self.add_item(KnowledgeIndexItem::new(name, url, KnowledgeItemType::Url, owned(tags)))
    }

    pub fn add_text(self, name: &str, text: &str, tags: &[&str]) -> Self {
        self.add_item(KnowledgeIndexItem::new(name, text, KnowledgeItemType::Text, owned(tags)))
    }

    pub fn add_mcp(self, name: &str, server: &str, tags: &[&str]) -> Self {
        self.add_item(KnowledgeIndexItem::new(name, server, KnowledgeItemType::Mcp, owned(tags)))
    }

    pub fn add_item(mut self, item: KnowledgeIndexItem) -> Self {
        self.knowledge.index.add(item);
        self
    }

    pub fn add_items(mut self, items: impl IntoIterator<Item = KnowledgeIndexItem>) -> Self {
        for item in items {
            self.knowledge.index.add(item);
        }
        self
    }

    /// Finish building; writes the index when persistence is on and it has items.
    pub fn build(self) -> Result<Knowledge, FlowError> {
        if self.knowledge.persistence && !self.knowledge.index.is_empty() {
            self.knowledge.persist()?;
        }
        Ok(self.knowledge)
    }
}

fn owned(tags: &[&str]) -> Vec<String> {
    tags.iter().map(|t| t.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> Agent {
        Agent::builder()
            .with_id("a-1")
            .with_name("Librarian")
            .with_model("m")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn build_persists_and_load_restores() {
        let dir = tempfile::tempdir().unwrap();
        let knowledge = KnowledgeBuilder::for_agent(dir.path(), &agent())
            .add_text("motto", "Ship it", &["culture"])
            .add_url("docs", "https://docs.example.com", &["reference"])
            .build()
            .unwrap();

        let expected = dir.path().join("Knowledge").join("Librarian+a-1").join("index.json");
        assert_eq!(knowledge.index_path(), expected);
        assert!(expected.exists());

        let raw = std::fs::read_to_string(&expected).unwrap();
        assert!(raw.contains("\"createdAt\""));
        assert!(raw.contains("\n  "));

        let loaded = Knowledge::load_for(dir.path(), &agent()).await.unwrap();
        assert_eq!(loaded.index().count(), 2);
        assert_eq!(loaded.items_by_type(KnowledgeItemType::Url).len(), 1);
    }

    #[tokio::test]
    async fn load_missing_index_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Knowledge::load_for(dir.path(), &agent()).await.unwrap_err();
        assert!(matches!(err, FlowError::NotFound(_)));
    }

    #[test]
    fn disabled_persistence_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut knowledge = KnowledgeBuilder::for_agent(dir.path(), &agent())
            .disable_persistence()
            .add_text("a", "b", &[])
            .build()
            .unwrap();
        knowledge.remove_item_by_name("A").unwrap();
        assert!(!knowledge.index_path().exists());
    }

    #[tokio::test]
    async fn fragments_prefer_tag_matches() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("refunds.md");
        std::fs::write(&file, "Refunds take 5 days.").unwrap();

        let mut knowledge = KnowledgeBuilder::for_agent(dir.path(), &agent())
            .disable_persistence()
            .add_file("refunds", file.to_str().unwrap(), &["refund"])
            .add_text("shipping", "Ships in 2 days.", &["shipping"])
            .build()
            .unwrap();

        let fragments = knowledge.fragments_for("How long does a refund take?").await.unwrap();
        assert_eq!(fragments, vec!["=== refunds ===\nRefunds take 5 days."]);
        assert!(knowledge.index().items[0].last_accessed_at.is_some());

        let all = knowledge.fragments_for("hello there").await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn fragments_record_access_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        KnowledgeBuilder::for_agent(dir.path(), &agent())
            .add_text("motto", "Ship it", &["culture"])
            .build()
            .unwrap();

        let mut knowledge = Knowledge::load_for(dir.path(), &agent()).await.unwrap();
        knowledge.fragments_for("culture?").await.unwrap();

        let reloaded = Knowledge::load_for(dir.path(), &agent()).await.unwrap();
        assert!(reloaded.index().items[0].last_accessed_at.is_some());
    }
}
