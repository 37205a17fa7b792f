//! Instance provider implementation
//!
//! Maps the core resource lifecycle onto the catalog service: create runs the
//! resolution chain and submits one provisioning request, the other operations
//! address the instance by its remote id.

use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use serde_json::json;
use stratus_core::provider::{ProviderError, ProviderResult};
use stratus_core::resource::{Resource, ResourceId, State, Value};

use crate::catalog::{CatalogClient, HttpCatalogClient};
use crate::config::{InstanceConfig, ProviderConfig};
use crate::provision::{Orchestrator, ProvisionPlan};
use crate::resolve::{NetworkRef, ResolutionContext};
use crate::resources::INSTANCE_TYPE;

/// Provider for `instance` resources
pub struct InstanceProvider {
    catalog: Arc<dyn CatalogClient>,
}

impl InstanceProvider {
    /// Create a provider talking HTTP to the configured service
    pub fn new(config: &ProviderConfig) -> ProviderResult<Self> {
        let client = HttpCatalogClient::new(config).map_err(ProviderError::from_error)?;
        Ok(Self::with_catalog(Arc::new(client)))
    }

    pub fn with_catalog(catalog: Arc<dyn CatalogClient>) -> Self {
        Self { catalog }
    }

    fn ensure_instance(id: &ResourceId) -> ProviderResult<()> {
        if id.resource_type == INSTANCE_TYPE {
            Ok(())
        } else {
            Err(ProviderError::new(format!(
                "Unsupported resource type: {}",
                id.resource_type
            ))
            .for_resource(id.clone()))
        }
    }

    fn instance_config(resource: &Resource) -> ProviderResult<InstanceConfig> {
        InstanceConfig::from_resource(resource)
            .map_err(|e| ProviderError::from_error(e).for_resource(resource.id.clone()))
    }

    // =========================================================================
    // Instance operations
    // =========================================================================

    /// Run the resolution chain and assemble the request without submitting it
    pub async fn plan_instance(&self, resource: &Resource) -> ProviderResult<ProvisionPlan> {
        Self::ensure_instance(&resource.id)?;
        let config = Self::instance_config(resource)?;
        Orchestrator::new(self.catalog.as_ref())
            .plan(&config)
            .await
            .map_err(|e| ProviderError::from_error(e).for_resource(resource.id.clone()))
    }

    pub async fn read_instance(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        Self::ensure_instance(id)?;
        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };

        let instance = self
            .catalog
            .get_instance(identifier)
            .await
            .map_err(|e| ProviderError::from_error(e).for_resource(id.clone()))?;

        match instance {
            Some(instance) => {
                Ok(State::existing(id.clone(), instance_attributes(&instance))
                    .with_identifier(identifier))
            }
            None => Ok(State::not_found(id.clone())),
        }
    }

    pub async fn create_instance(&self, resource: Resource) -> ProviderResult<State> {
        Self::ensure_instance(&resource.id)?;
        let config = Self::instance_config(&resource)?;

        let outcome = Orchestrator::new(self.catalog.as_ref())
            .provision(&config)
            .await
            .map_err(|e| ProviderError::from_error(e).for_resource(resource.id.clone()))?;

        // The instance exists from here on; a failed read must not lose its id
        let mut state = match self
            .read_instance(&resource.id, Some(&outcome.instance_id))
            .await
        {
            Ok(state) if state.exists => state,
            Ok(_) => {
                warn!(
                    "{}: instance {} not readable yet after create",
                    resource.id, outcome.instance_id
                );
                State::existing(resource.id.clone(), HashMap::new())
                    .with_identifier(&outcome.instance_id)
            }
            Err(e) => {
                warn!(
                    "{}: reading instance {} after create failed: {}",
                    resource.id, outcome.instance_id, e
                );
                State::existing(resource.id.clone(), HashMap::new())
                    .with_identifier(&outcome.instance_id)
            }
        };
        state
            .attributes
            .extend(resolved_attributes(&outcome.context));
        Ok(state)
    }

    pub async fn update_instance(
        &self,
        id: ResourceId,
        identifier: &str,
        to: Resource,
    ) -> ProviderResult<State> {
        Self::ensure_instance(&id)?;
        let config = Self::instance_config(&to)?;

        let tags: Vec<serde_json::Value> = config
            .tags
            .iter()
            .map(|(name, value)| json!({"name": name, "value": value}))
            .collect();
        let mut instance = json!({
            "name": config.name,
            "labels": config.labels,
            "tags": tags,
        });
        if let Some(description) = &config.description {
            instance["description"] = json!(description);
        }

        info!("{}: updating instance {}", id, identifier);
        self.catalog
            .update_instance(identifier, &json!({ "instance": instance }))
            .await
            .map_err(|e| ProviderError::from_error(e).for_resource(id.clone()))?;

        self.read_instance(&id, Some(identifier)).await
    }

    pub async fn delete_instance(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        Self::ensure_instance(id)?;
        info!("{}: deleting instance {}", id, identifier);
        self.catalog
            .delete_instance(identifier)
            .await
            .map_err(|e| ProviderError::from_error(e).for_resource(id.clone()))
    }
}

/// Map an instance document to state attributes
fn instance_attributes(instance: &serde_json::Value) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();

    for key in ["name", "description", "status"] {
        if let Some(value) = instance.get(key).and_then(Value::from_json) {
            attributes.insert(key.to_string(), value);
        }
    }

    if let Some(labels) = instance.get("labels").and_then(|v| v.as_array()) {
        let labels = labels
            .iter()
            .filter_map(|l| l.as_str().map(|s| Value::String(s.to_string())))
            .collect();
        attributes.insert("labels".to_string(), Value::List(labels));
    }

    if let Some(tags) = instance.get("tags").and_then(|v| v.as_array()) {
        let tags: HashMap<String, Value> = tags
            .iter()
            .filter_map(|tag| {
                let name = tag.get("name")?.as_str()?;
                let value = tag.get("value").and_then(Value::from_json)?;
                Some((name.to_string(), value))
            })
            .collect();
        attributes.insert("tags".to_string(), Value::Map(tags));
    }

    let nested = [
        ("/group/id", "group_id"),
        ("/cloud/id", "cloud_id"),
        ("/layout/id", "layout_id"),
        ("/plan/id", "plan_id"),
        ("/instanceType/code", "instance_type"),
    ];
    for (pointer, key) in nested {
        if let Some(value) = instance.pointer(pointer).and_then(Value::from_json) {
            attributes.insert(key.to_string(), value);
        }
    }

    attributes
}

/// Attributes recording what each name resolved to.
///
/// `references` lists every looked-up object with its kind, id, code and name;
/// prefixed network references were never looked up and only appear in `network_ids`.
pub fn resolved_attributes(context: &ResolutionContext) -> HashMap<String, Value> {
    let placement = &context.placement;
    let mut attributes = HashMap::from([
        (
            "group_id".to_string(),
            Value::String(placement.group.id().to_string()),
        ),
        (
            "cloud_id".to_string(),
            Value::String(placement.cloud.id().to_string()),
        ),
        (
            "instance_type_id".to_string(),
            Value::String(placement.instance_type.id().to_string()),
        ),
        (
            "layout_id".to_string(),
            Value::String(placement.layout.id().to_string()),
        ),
        (
            "plan_id".to_string(),
            Value::String(placement.plan.id().to_string()),
        ),
    ]);
    if let Some(pool) = &context.resource_pool {
        attributes.insert(
            "resource_pool_id".to_string(),
            Value::String(pool.id().to_string()),
        );
    }
    let references: Vec<Value> = context
        .references()
        .into_iter()
        .map(|reference| {
            Value::Map(HashMap::from([
                ("kind".to_string(), Value::String(reference.kind.to_string())),
                ("id".to_string(), Value::String(reference.id.clone())),
                ("code".to_string(), Value::String(reference.code.clone())),
                ("name".to_string(), Value::String(reference.name.clone())),
            ]))
        })
        .collect();
    attributes.insert("references".to_string(), Value::List(references));

    let networks: Vec<Value> = context
        .networks
        .iter()
        .flatten()
        .map(|n| Value::String(NetworkRef::id(n).to_string()))
        .collect();
    if !networks.is_empty() {
        attributes.insert("network_ids".to_string(), Value::List(networks));
    }
    attributes
}
