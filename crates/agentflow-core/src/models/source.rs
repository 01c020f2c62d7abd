//! External data sources an agent can pull from with `FETCH_DATA`.

use serde::{Deserialize, Serialize};

/// Where an agent's external data comes from. Each variant only carries the
/// fields that make sense for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentSource {
    File(FileSource),
    Text(TextSource),
    Api(ApiSource),
    Sql(SqlSource),
    NoSql(NoSqlSource),
    Web(WebSource),
}

impl AgentSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::File(_) => "File",
            Self::Text(_) => "Text",
            Self::Api(_) => "Api",
            Self::Sql(_) => "Sql",
            Self::NoSql(_) => "NoSql",
            Self::Web(_) => "Web",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSource {
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSource {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSource {
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseType {
    #[default]
    Json,
    Html,
    Xml,
    Text,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "JSON",
            Self::Html => "HTML",
            Self::Xml => "XML",
            Self::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthType {
    Bearer,
    ApiKey,
    Basic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSource {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// JSON body; may contain `@filter@`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Appended verbatim to `url`, e.g. `?q=@filter@`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default)]
    pub response_type: ResponseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_type: Option<AuthType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_password: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl ApiSource {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            payload: None,
            query: None,
            response_type: ResponseType::Json,
            chunk_limit: None,
            authentication_type: None,
            authentication_token: None,
            user_name: None,
            user_password: None,
        }
    }
}

/// Relational source. `connection_string` is the path to a SQLite database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlSource {
    pub connection_string: String,
    #[serde(default)]
    pub table: String,
    pub query: String,
}

/// Document source. `query` is a JSON object matched against top-level fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoSqlSource {
    pub connection_string: String,
    pub db_name: String,
    pub collection: String,
    #[serde(default = "default_nosql_query")]
    pub query: String,
}

fn default_nosql_query() -> String {
    "{}".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_source_from_yaml_uses_defaults() {
        let yaml = r#"
type: Api
url: https://example.com/items
query: "?q=@filter@"
"#;
        let source: AgentSource = serde_yaml::from_str(yaml).unwrap();
        match source {
            AgentSource::Api(api) => {
                assert_eq!(api.method, "GET");
                assert_eq!(api.response_type, ResponseType::Json);
                assert_eq!(api.query.as_deref(), Some("?q=@filter@"));
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn file_source_keeps_order() {
        let json = r#"{"type":"File","files":[{"name":"b","path":"/b"},{"name":"a","path":"/a"}]}"#;
        let source: AgentSource = serde_json::from_str(json).unwrap();
        let AgentSource::File(files) = source else {
            panic!("expected file source");
        };
        assert_eq!(files.files[0].name, "b");
    }
}
