//! In-memory catalog used by unit tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::catalog::{Candidate, CatalogClient, CatalogError, CatalogResult, QueryParams};
use crate::payload::ProvisionRequest;

/// A request the fake received, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List {
        category: String,
        query: QueryParams,
    },
    Get {
        kind: String,
        id: String,
    },
    Create,
    GetInstance(String),
    UpdateInstance(String),
    DeleteInstance(String),
}

#[derive(Default)]
pub struct MemoryCatalog {
    options: HashMap<String, Vec<Candidate>>,
    objects: HashMap<(String, String), serde_json::Value>,
    failing: HashMap<String, u16>,
    failing_reads: Option<u16>,
    create_response: Option<serde_json::Value>,
    instances: Mutex<HashMap<String, serde_json::Value>>,
    calls: Mutex<Vec<Call>>,
    submitted: Mutex<Vec<ProvisionRequest>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, category: &str, candidates: Vec<Candidate>) -> Self {
        self.options.insert(category.to_string(), candidates);
        self
    }

    pub fn with_object(mut self, kind: &str, id: &str, object: serde_json::Value) -> Self {
        self.objects.insert((kind.to_string(), id.to_string()), object);
        self
    }

    /// Make every list of `category` fail with the given HTTP status
    pub fn failing(mut self, category: &str, status: u16) -> Self {
        self.failing.insert(category.to_string(), status);
        self
    }

    /// Make every instance read fail with the given HTTP status
    pub fn failing_reads(mut self, status: u16) -> Self {
        self.failing_reads = Some(status);
        self
    }

    pub fn with_create_response(mut self, response: serde_json::Value) -> Self {
        self.create_response = Some(response);
        self
    }

    pub fn with_instance(self, id: &str, instance: serde_json::Value) -> Self {
        self.instances
            .lock()
            .unwrap()
            .insert(id.to_string(), instance);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Categories listed so far, in order
    pub fn listed_categories(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::List { category, .. } => Some(category),
                _ => None,
            })
            .collect()
    }

    pub fn query_for(&self, category: &str) -> Option<QueryParams> {
        self.calls().into_iter().find_map(|call| match call {
            Call::List { category: c, query } if c == category => Some(query),
            _ => None,
        })
    }

    pub fn submitted(&self) -> Vec<ProvisionRequest> {
        self.submitted.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CatalogClient for MemoryCatalog {
    async fn list_options(
        &self,
        category: &str,
        query: &QueryParams,
    ) -> CatalogResult<Vec<Candidate>> {
        self.record(Call::List {
            category: category.to_string(),
            query: query.clone(),
        });
        if let Some(status) = self.failing.get(category) {
            return Err(CatalogError::Http {
                status: *status,
                url: format!("memory://options/{}", category),
                body: "injected failure".to_string(),
            });
        }
        Ok(self.options.get(category).cloned().unwrap_or_default())
    }

    async fn get(&self, kind: &str, id: &str) -> CatalogResult<serde_json::Value> {
        self.record(Call::Get {
            kind: kind.to_string(),
            id: id.to_string(),
        });
        self.objects
            .get(&(kind.to_string(), id.to_string()))
            .cloned()
            .ok_or_else(|| CatalogError::NotFound {
                kind: kind.to_string(),
                id: id.to_string(),
            })
    }

    async fn create_instance(
        &self,
        request: &ProvisionRequest,
    ) -> CatalogResult<serde_json::Value> {
        self.record(Call::Create);
        self.submitted.lock().unwrap().push(request.clone());
        let response = self
            .create_response
            .clone()
            .unwrap_or_else(|| json!({"instance": {"id": 501, "name": request.instance.name}}));
        if let Some(id) = response.pointer("/instance/id").and_then(|v| v.as_i64()) {
            self.instances.lock().unwrap().insert(
                id.to_string(),
                json!({"id": id, "name": request.instance.name, "status": "provisioning"}),
            );
        }
        Ok(response)
    }

    async fn get_instance(&self, id: &str) -> CatalogResult<Option<serde_json::Value>> {
        self.record(Call::GetInstance(id.to_string()));
        if let Some(status) = self.failing_reads {
            return Err(CatalogError::Http {
                status,
                url: format!("memory://instances/{}", id),
                body: "injected failure".to_string(),
            });
        }
        Ok(self.instances.lock().unwrap().get(id).cloned())
    }

    async fn update_instance(
        &self,
        id: &str,
        body: &serde_json::Value,
    ) -> CatalogResult<serde_json::Value> {
        self.record(Call::UpdateInstance(id.to_string()));
        let mut instances = self.instances.lock().unwrap();
        let instance = instances
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound {
                kind: "instance".to_string(),
                id: id.to_string(),
            })?;
        if let (Some(target), Some(patch)) = (
            instance.as_object_mut(),
            body.get("instance").and_then(|v| v.as_object()),
        ) {
            for (k, v) in patch {
                target.insert(k.clone(), v.clone());
            }
        }
        Ok(instance.clone())
    }

    async fn delete_instance(&self, id: &str) -> CatalogResult<()> {
        self.record(Call::DeleteInstance(id.to_string()));
        self.instances.lock().unwrap().remove(id);
        Ok(())
    }
}

/// A catalog with one consistent group/cloud/type/layout/plan/pool/datastore/network set
pub fn standard_catalog() -> MemoryCatalog {
    MemoryCatalog::new()
        .with_options("groups", vec![Candidate::new("1", "prod").with_code("prod")])
        .with_options("clouds", vec![Candidate::new("2", "vmware-east")])
        .with_options(
            "instanceTypes",
            vec![
                Candidate::new("3", "Ubuntu").with_code("ubuntu"),
                Candidate::new("13", "CentOS").with_code("centos"),
            ],
        )
        .with_options(
            "layoutsForCloud",
            vec![
                Candidate::new("4", "web-template").with_version("22.04"),
                Candidate::new("5", "web-template").with_version("20.04"),
                Candidate::new("14", "web-template-v2").with_version("22.04"),
            ],
        )
        .with_options(
            "instanceServicePlans",
            vec![
                Candidate::from_json(&json!({"name": "Small", "value": 6.0})).unwrap(),
                Candidate::from_json(&json!({"name": "Large", "value": 16.0})).unwrap(),
            ],
        )
        .with_object(
            "servicePlans",
            "6",
            json!({"id": 6, "code": "vm-small", "name": "Small"}),
        )
        .with_options(
            "zonePools",
            vec![Candidate::new("7", "pool-a (cluster 1)")],
        )
        .with_options(
            "datastores",
            vec![
                Candidate::from_json(&json!({"name": "Datastore-A - 1.2TB Free", "value": 31.0}))
                    .unwrap(),
                Candidate::from_json(&json!({"name": "Datastore-A2 - 900GB Free", "value": 32.0}))
                    .unwrap(),
            ],
        )
        .with_options(
            "zoneNetworkOptions",
            vec![
                Candidate::new("network-12", "VLAN 12"),
                Candidate::new("network-13", "VLAN 13"),
            ],
        )
}
