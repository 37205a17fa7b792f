//! Remote catalog access
//!
//! The catalog is the management service's REST API. Option categories list
//! the candidates a name can resolve to; instances are created, read, updated
//! and deleted through the same client.

mod http;

pub use http::HttpCatalogClient;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::payload::ProvisionRequest;
use crate::utils::normalize_identifier;

/// Query parameters for an option lookup, ordered for stable logging and tests
pub type QueryParams = BTreeMap<&'static str, String>;

/// Errors raised by the catalog client itself
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The requested object does not exist
    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    /// Non-2xx response other than not-found
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    /// The request never produced a response (connect, TLS, timeout)
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response body was not the expected shape
    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },

    /// The client could not be constructed
    #[error("catalog client configuration error: {0}")]
    Configuration(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// One row returned by the catalog for an option category
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Stringified `id`, or the integer-truncated `value` when the row has no `id`
    pub id: String,
    pub name: String,
    pub code: String,
    pub external_id: Option<String>,
    /// Raw `value` field; some categories carry the identifier only here, as a float
    pub value: Option<serde_json::Value>,
    /// Version of the row, carried by layouts
    pub version: Option<String>,
}

impl Candidate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            code: String::new(),
            external_id: None,
            value: None,
            version: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Build a candidate from a catalog row.
    ///
    /// Returns `None` for rows that carry neither an `id` nor a usable `value`.
    pub fn from_json(row: &serde_json::Value) -> Option<Self> {
        let id = row
            .get("id")
            .and_then(normalize_identifier)
            .or_else(|| row.get("value").and_then(normalize_identifier))?;

        let text = |key: &str| {
            row.get(key).and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
        };

        Some(Self {
            id,
            name: text("name").unwrap_or_default(),
            code: text("code").unwrap_or_default(),
            external_id: text("externalId"),
            value: row.get("value").filter(|v| !v.is_null()).cloned(),
            version: text("instanceVersion").or_else(|| text("version")),
        })
    }
}

/// Client for the remote catalog/management service
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// List the candidates of an option category, scoped by query parameters
    async fn list_options(
        &self,
        category: &str,
        query: &QueryParams,
    ) -> CatalogResult<Vec<Candidate>>;

    /// Fetch one object directly by kind and id
    async fn get(&self, kind: &str, id: &str) -> CatalogResult<serde_json::Value>;

    /// Submit a provisioning request; returns the created instance document
    async fn create_instance(&self, request: &ProvisionRequest)
    -> CatalogResult<serde_json::Value>;

    /// Read an instance; `None` if it no longer exists
    async fn get_instance(&self, id: &str) -> CatalogResult<Option<serde_json::Value>>;

    /// Update an instance in place
    async fn update_instance(
        &self,
        id: &str,
        body: &serde_json::Value,
    ) -> CatalogResult<serde_json::Value>;

    /// Delete an instance
    async fn delete_instance(&self, id: &str) -> CatalogResult<()>;
}
