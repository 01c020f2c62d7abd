use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KnowledgeItemType {
    File,
    Url,
    Text,
    Mcp,
}

impl KnowledgeItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "File",
            Self::Url => "Url",
            Self::Text => "Text",
            Self::Mcp => "Mcp",
        }
    }
}

/// One retrievable entry. Two items are the same entry when their name and
/// value match ignoring case; tags and timestamps do not take part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeIndexItem {
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub item_type: KnowledgeItemType,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl KnowledgeIndexItem {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        item_type: KnowledgeItemType,
        tags: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            item_type,
            tags,
            created_at: Utc::now(),
            last_accessed_at: None,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

impl PartialEq for KnowledgeIndexItem {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name) && self.value.eq_ignore_ascii_case(&other.value)
    }
}

impl Eq for KnowledgeIndexItem {}

impl Hash for KnowledgeIndexItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_ascii_lowercase().hash(state);
        self.value.to_ascii_lowercase().hash(state);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeIndex {
    #[serde(default)]
    pub items: Vec<KnowledgeIndexItem>,
}

impl KnowledgeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add an item unless an equal one is already present.
    pub fn add(&mut self, item: KnowledgeIndexItem) -> bool {
        if self.items.contains(&item) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn remove(&mut self, item: &KnowledgeIndexItem) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i != item);
        self.items.len() != before
    }

    pub fn remove_by_name(&mut self, name: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| !i.name.eq_ignore_ascii_case(name));
        self.items.len() != before
    }

    pub fn items_by_type(&self, item_type: KnowledgeItemType) -> Vec<&KnowledgeIndexItem> {
        self.items.iter().filter(|i| i.item_type == item_type).collect()
    }

    pub fn items_by_tag(&self, tag: &str) -> Vec<&KnowledgeIndexItem> {
        self.items.iter().filter(|i| i.has_tag(tag)).collect()
    }

    /// Distinct tags, compared and sorted case-insensitively. The first
    /// spelling seen wins.
    pub fn all_tags(&self) -> Vec<String> {
        let mut seen: BTreeMap<String, String> = BTreeMap::new();
        for tag in self.items.iter().flat_map(|i| i.tags.iter()) {
            seen.entry(tag.to_lowercase()).or_insert_with(|| tag.clone());
        }
        seen.into_values().collect()
    }

    /// Tag (lowercased) to the number of items carrying it.
    pub fn tag_usage_statistics(&self) -> BTreeMap<String, usize> {
        let mut stats = BTreeMap::new();
        for item in &self.items {
            let mut tags: Vec<String> = item.tags.iter().map(|t| t.to_lowercase()).collect();
            tags.sort();
            tags.dedup();
            for tag in tags {
                *stats.entry(tag).or_insert(0) += 1;
            }
        }
        stats
    }

    pub fn most_used_tags(&self, top: usize) -> Vec<(String, usize)> {
        let mut usage: Vec<(String, usize)> = self.tag_usage_statistics().into_iter().collect();
        usage.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        usage.truncate(top);
        usage
    }

    /// Human-readable listing, one item per line.
    pub fn as_string(&self) -> String {
        self.items
            .iter()
            .map(|i| {
                format!(
                    "- {} ({}): {} [{}]",
                    i.name,
                    i.item_type.as_str(),
                    i.value,
                    i.tags.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn item(name: &str, value: &str, tags: &[&str]) -> KnowledgeIndexItem {
        KnowledgeIndexItem::new(
            name,
            value,
            KnowledgeItemType::Text,
            tags.iter().map(|t| t.to_string()).collect(),
        )
    }

    #[test]
    fn equality_ignores_case_tags_and_type() {
        let a = item("Doc", "Hello", &["x"]);
        let mut b = item("doc", "HELLO", &["y", "z"]);
        b.item_type = KnowledgeItemType::Url;
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn different_value_is_different_item() {
        assert_ne!(item("doc", "a", &[]), item("doc", "b", &[]));
    }

    #[test]
    fn duplicate_items_are_not_added() {
        let mut index = KnowledgeIndex::new();
        assert!(index.add(item("a", "1", &[])));
        assert!(!index.add(item("A", "1", &["t"])));
        assert_eq!(index.count(), 1);
    }

    #[test]
    fn tag_queries() {
        let mut index = KnowledgeIndex::new();
        index.add(item("a", "1", &["Rust", "async"]));
        index.add(item("b", "2", &["rust"]));
        index.add(item("c", "3", &["Go", "ASYNC"]));

        assert_eq!(index.all_tags(), vec!["async", "Go", "Rust"]);
        assert_eq!(index.items_by_tag("RUST").len(), 2);
        assert_eq!(
            index.most_used_tags(2),
            vec![("async".to_string(), 2), ("rust".to_string(), 2)]
        );
        assert_eq!(index.tag_usage_statistics()["go"], 1);
    }

    #[test]
    fn remove_by_name_is_case_insensitive() {
        let mut index = KnowledgeIndex::new();
        index.add(item("Manual", "1", &[]));
        assert!(index.remove_by_name("manual"));
        assert!(index.is_empty());
    }
}
