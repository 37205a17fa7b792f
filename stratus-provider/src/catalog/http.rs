//! HTTP implementation of the catalog client

use async_trait::async_trait;
use reqwest::StatusCode;

use super::{Candidate, CatalogClient, CatalogError, CatalogResult, QueryParams};
use crate::config::ProviderConfig;
use crate::payload::ProvisionRequest;

const USER_AGENT: &str = concat!("stratus/", env!("CARGO_PKG_VERSION"));

/// Catalog client talking JSON over HTTP with bearer-token auth
pub struct HttpCatalogClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpCatalogClient {
    /// Create a client from provider configuration.
    ///
    /// The configured timeout applies to every request; nothing else in the
    /// provider imposes a deadline.
    pub fn new(config: &ProviderConfig) -> CatalogResult<Self> {
        config
            .validate()
            .map_err(|e| CatalogError::Configuration(e.to_string()))?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| {
                CatalogError::Configuration(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        api_url(&self.base_url, path)
    }

    /// Send a request; `Ok(None)` means the server answered 404
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> CatalogResult<Option<serde_json::Value>> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|source| CatalogError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let text = response
            .text()
            .await
            .map_err(|source| CatalogError::Request {
                url: url.to_string(),
                source,
            })?;

        if !status.is_success() {
            return Err(CatalogError::Http {
                status: status.as_u16(),
                url: url.to_string(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Some(serde_json::Value::Null));
        }

        let body: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| CatalogError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        check_success_flag(&body, url)?;
        Ok(Some(body))
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn list_options(
        &self,
        category: &str,
        query: &QueryParams,
    ) -> CatalogResult<Vec<Candidate>> {
        let url = self.url(&format!("options/{}", category));
        let body = self
            .send(self.client.get(&url).query(query), &url)
            .await?
            .ok_or_else(|| CatalogError::NotFound {
                kind: "option category".to_string(),
                id: category.to_string(),
            })?;

        let rows = extract_rows(&body).ok_or_else(|| CatalogError::Decode {
            url: url.clone(),
            message: "expected a list of options".to_string(),
        })?;

        let candidates: Vec<Candidate> = rows.iter().filter_map(Candidate::from_json).collect();
        if candidates.len() < rows.len() {
            log::warn!(
                "{}: dropped {} option rows without an identifier",
                category,
                rows.len() - candidates.len()
            );
        }
        Ok(candidates)
    }

    async fn get(&self, kind: &str, id: &str) -> CatalogResult<serde_json::Value> {
        let url = self.url(&format!("{}/{}", kind, id));
        match self.send(self.client.get(&url), &url).await? {
            Some(body) => Ok(unwrap_envelope(body)),
            None => Err(CatalogError::NotFound {
                kind: kind.to_string(),
                id: id.to_string(),
            }),
        }
    }

    async fn create_instance(
        &self,
        request: &ProvisionRequest,
    ) -> CatalogResult<serde_json::Value> {
        let url = self.url("instances");
        self.send(self.client.post(&url).json(request), &url)
            .await?
            .ok_or_else(|| CatalogError::Http {
                status: StatusCode::NOT_FOUND.as_u16(),
                url: url.clone(),
                body: "instance endpoint not found".to_string(),
            })
    }

    async fn get_instance(&self, id: &str) -> CatalogResult<Option<serde_json::Value>> {
        let url = self.url(&format!("instances/{}", id));
        Ok(self
            .send(self.client.get(&url), &url)
            .await?
            .map(unwrap_envelope))
    }

    async fn update_instance(
        &self,
        id: &str,
        body: &serde_json::Value,
    ) -> CatalogResult<serde_json::Value> {
        let url = self.url(&format!("instances/{}", id));
        match self.send(self.client.put(&url).json(body), &url).await? {
            Some(body) => Ok(unwrap_envelope(body)),
            None => Err(CatalogError::NotFound {
                kind: "instance".to_string(),
                id: id.to_string(),
            }),
        }
    }

    async fn delete_instance(&self, id: &str) -> CatalogResult<()> {
        let url = self.url(&format!("instances/{}", id));
        if self.send(self.client.delete(&url), &url).await?.is_none() {
            log::warn!("instance {} was already deleted", id);
        }
        Ok(())
    }
}

fn api_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/api/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Some endpoints answer 200 with `{"success": false, "msg": ...}`
fn check_success_flag(body: &serde_json::Value, url: &str) -> CatalogResult<()> {
    if body.get("success").and_then(|v| v.as_bool()) == Some(false) {
        let message = body
            .get("msg")
            .and_then(|v| v.as_str())
            .unwrap_or("request was rejected")
            .to_string();
        return Err(CatalogError::Decode {
            url: url.to_string(),
            message,
        });
    }
    Ok(())
}

/// Locate the row list in an options response: `{"data": [...]}`, a bare
/// array, or the first array-valued field of a collection response.
fn extract_rows(body: &serde_json::Value) -> Option<&Vec<serde_json::Value>> {
    match body {
        serde_json::Value::Array(rows) => Some(rows),
        serde_json::Value::Object(obj) => obj
            .get("data")
            .and_then(|v| v.as_array())
            .or_else(|| obj.values().find_map(|v| v.as_array())),
        _ => None,
    }
}

/// Strip a single-object envelope such as `{"instance": {...}}`
fn unwrap_envelope(body: serde_json::Value) -> serde_json::Value {
    if let serde_json::Value::Object(obj) = &body
        && !obj.contains_key("id")
    {
        let mut objects = obj.values().filter(|v| v.is_object());
        if let (Some(inner), None) = (objects.next(), objects.next()) {
            return inner.clone();
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_api_url() {
        assert_eq!(
            api_url("https://cmp.example.com/", "options/groups"),
            "https://cmp.example.com/api/options/groups"
        );
        assert_eq!(
            api_url("https://cmp.example.com", "/instances/3"),
            "https://cmp.example.com/api/instances/3"
        );
    }

    #[test]
    fn test_extract_rows() {
        let data = json!({"data": [{"value": 1}], "meta": {"total": 1}});
        assert_eq!(extract_rows(&data).unwrap().len(), 1);

        let bare = json!([{"id": 1}, {"id": 2}]);
        assert_eq!(extract_rows(&bare).unwrap().len(), 2);

        let collection = json!({"groups": [{"id": 1}], "meta": {"size": 1}});
        assert_eq!(extract_rows(&collection).unwrap().len(), 1);

        assert!(extract_rows(&json!({"meta": {}})).is_none());
        assert!(extract_rows(&json!("nope")).is_none());
    }

    #[test]
    fn test_unwrap_envelope() {
        let wrapped = json!({"servicePlan": {"id": 9, "code": "small"}, "success": true});
        assert_eq!(unwrap_envelope(wrapped), json!({"id": 9, "code": "small"}));

        let plain = json!({"id": 9, "config": {"a": 1}});
        assert_eq!(unwrap_envelope(plain.clone()), plain);

        let two = json!({"a": {}, "b": {}});
        assert_eq!(unwrap_envelope(two.clone()), two);
    }

    #[test]
    fn test_check_success_flag() {
        assert!(check_success_flag(&json!({"success": true}), "u").is_ok());
        assert!(check_success_flag(&json!({"instance": {}}), "u").is_ok());

        let err = check_success_flag(&json!({"success": false, "msg": "quota exceeded"}), "u")
            .unwrap_err();
        assert_eq!(err.to_string(), "unexpected response from u: quota exceeded");
    }

    #[test]
    fn test_new_rejects_missing_token() {
        let config = ProviderConfig {
            url: "https://cmp.example.com".to_string(),
            access_token: String::new(),
            timeout: Duration::from_secs(5),
            insecure: false,
        };
        assert!(matches!(
            HttpCatalogClient::new(&config),
            Err(CatalogError::Configuration(_))
        ));
    }
}
