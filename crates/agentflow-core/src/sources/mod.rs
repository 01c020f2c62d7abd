//! Fetching external data for `FETCH_DATA`.
//!
//! Every source variant renders to plain text. `@filter@` in the API url,
//! query and payload, the SQL connection string and query, and the document
//! connection string, collection and query is replaced with the active data
//! filter before the request is made.

pub mod document;
pub mod html;
mod sql;

pub use document::{DocumentStore, JsonDirectoryStore};
pub use html::clean_html;

use reqwest::Method;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::FlowError;
use crate::models::{
    props, AgentSource, ApiSource, AuthType, FileSource, NoSqlSource, ResponseType, SqlSource,
    FILTER_PLACEHOLDER,
};

/// Text pulled from a source plus the properties to stamp on its message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedData {
    pub content: String,
    pub properties: HashMap<String, String>,
}

impl FetchedData {
    fn text(content: String) -> Self {
        Self {
            content,
            properties: HashMap::new(),
        }
    }
}

#[derive(Clone)]
pub struct DataSourceProvider {
    client: reqwest::Client,
    documents: Arc<dyn DocumentStore>,
}

impl DataSourceProvider {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            documents: Arc::new(JsonDirectoryStore),
        }
    }

    pub fn with_document_store(mut self, documents: Arc<dyn DocumentStore>) -> Self {
        self.documents = documents;
        self
    }

    pub async fn fetch(&self, source: &AgentSource, filter: &str) -> Result<FetchedData, FlowError> {
        tracing::debug!("[DataSource] Fetching {} source", source.kind());
        match source {
            AgentSource::File(files) => self.fetch_files(files).await,
            AgentSource::Text(text) => Ok(FetchedData::text(text.text.clone())),
            AgentSource::Api(api) => self.fetch_api(api, filter).await,
            AgentSource::Sql(sql) => self.fetch_sql(sql, filter).await,
            AgentSource::NoSql(nosql) => self.fetch_documents(nosql, filter).await,
            AgentSource::Web(web) => self.fetch_web(&web.url).await,
        }
    }

    async fn fetch_files(&self, source: &FileSource) -> Result<FetchedData, FlowError> {
        let mut content = String::new();
        for entry in &source.files {
            let text = tokio::fs::read_to_string(&entry.path).await.map_err(|e| {
                FlowError::Data(format!("Failed to read file '{}' ({}): {}", entry.name, entry.path, e))
            })?;
            content.push_str(&format!("=== {} ===\n{}\n", entry.name, text));
        }
        Ok(FetchedData::text(content))
    }

    async fn fetch_api(&self, api: &ApiSource, filter: &str) -> Result<FetchedData, FlowError> {
        let url = substitute(&api.url, filter);
        let query = api.query.as_deref().map(|q| substitute(q, filter)).unwrap_or_default();
        let payload = api.payload.as_deref().map(|p| substitute(p, filter));

        let method = Method::from_bytes(api.method.to_uppercase().as_bytes())
            .map_err(|_| FlowError::Configuration(format!("Invalid HTTP method '{}'", api.method)))?;

        let mut request = self.client.request(method, format!("{}{}", url, query));
        request = authorize(request, api)?;

        if let Some(payload) = payload.filter(|p| !p.trim().is_empty()) {
            serde_json::from_str::<serde_json::Value>(&payload)
                .map_err(|e| FlowError::Data(format!("Invalid JSON payload: {}", e)))?;
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(payload);
        }

        tracing::info!("[DataSource] {} {}{}", api.method, url, query);
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FlowError::Transport(format!(
                "API request failed with status {}: {}",
                status, body
            )));
        }

        let content = match api.response_type {
            ResponseType::Html => clean_html(&body),
            _ => body,
        };

        let mut properties = HashMap::new();
        properties.insert(props::API_RESPONSE_TYPE.to_string(), api.response_type.as_str().to_string());
        if let Some(limit) = api.chunk_limit {
            properties.insert(props::CHUNK_LIMIT.to_string(), limit.to_string());
        }
        Ok(FetchedData { content, properties })
    }

    async fn fetch_sql(&self, sql: &SqlSource, filter: &str) -> Result<FetchedData, FlowError> {
        let rows = sql::query_rows(
            substitute(&sql.connection_string, filter),
            substitute(&sql.query, filter),
        )
        .await?;
        Ok(FetchedData::text(to_pretty_json(&rows)?))
    }

    async fn fetch_documents(&self, source: &NoSqlSource, filter: &str) -> Result<FetchedData, FlowError> {
        let resolved = NoSqlSource {
            connection_string: substitute(&source.connection_string, filter),
            db_name: source.db_name.clone(),
            collection: substitute(&source.collection, filter),
            query: substitute(&source.query, filter),
        };
        let rows = self.documents.find(&resolved).await?;
        Ok(FetchedData::text(to_pretty_json(&rows)?))
    }

    async fn fetch_web(&self, url: &str) -> Result<FetchedData, FlowError> {
        tracing::info!("[DataSource] GET {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FlowError::Transport(format!("GET {} returned {}", url, status)));
        }
        let body = response.text().await?;
        Ok(FetchedData::text(clean_html(&body)))
    }
}

fn authorize(request: reqwest::RequestBuilder, api: &ApiSource) -> Result<reqwest::RequestBuilder, FlowError> {
    let token = api.authentication_token.as_deref().filter(|t| !t.is_empty());
    match (api.authentication_type, token) {
        (None, None) => Ok(request),
        (None, Some(_)) => Err(FlowError::Configuration(
            "authentication token given without an authentication type".into(),
        )),
        (Some(AuthType::Bearer), Some(token)) => Ok(request.bearer_auth(token)),
        (Some(AuthType::ApiKey), Some(token)) => {
            Ok(request.header(reqwest::header::AUTHORIZATION, format!("ApiKey {}", token)))
        }
        (Some(AuthType::Basic), _) => match (api.user_name.as_deref(), api.user_password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Ok(request.basic_auth(user, Some(password)))
            }
            _ => Err(FlowError::Configuration(
                "username and password are required for basic authentication".into(),
            )),
        },
        (Some(kind), None) => Err(FlowError::Configuration(format!(
            "{:?} authentication needs a token",
            kind
        ))),
    }
}

fn substitute(text: &str, filter: &str) -> String {
    text.replace(FILTER_PLACEHOLDER, filter)
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String, FlowError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| FlowError::Internal(format!("Failed to serialize rows: {}", e)))
}
