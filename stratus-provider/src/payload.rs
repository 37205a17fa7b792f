//! Provisioning request assembly
//!
//! Folds the resolved identifiers and the user's raw settings into the body
//! of `POST /api/instances`.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::InstanceConfig;
use crate::resolve::{NetworkRef, ResolutionContext};
use crate::utils::identifier_to_json;

/// `{"id": ...}` reference to a catalog object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdRef {
    pub id: Value,
}

impl IdRef {
    pub fn new(id: &str) -> Self {
        Self {
            id: identifier_to_json(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeRef {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSection {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Labels as one comma-separated string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    pub instance_type: CodeRef,
    pub layout: IdRef,
    pub plan: IdRef,
    pub site: IdRef,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub root: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_type: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datastore_id: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<IdRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_interface_type_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evar {
    pub name: String,
    pub value: String,
    pub export: bool,
    pub masked: bool,
}

/// Body of an instance creation request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub zone_id: Value,
    pub instance: InstanceSection,
    pub layout: IdRef,
    pub plan: IdRef,
    pub config: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub network_interfaces: Vec<NetworkInterface>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evars: Vec<Evar>,
}

impl ProvisionRequest {
    pub fn to_json(&self) -> Value {
        // Serializing plain data with string keys cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Build the creation request from a completed resolution.
///
/// `context.datastores` and `context.networks` are positionally aligned with
/// `config.volumes` and `config.interfaces`.
pub fn assemble(context: &ResolutionContext, config: &InstanceConfig) -> ProvisionRequest {
    let placement = &context.placement;

    let mut options = config.custom_options.clone();
    if let Some(pool) = &context.resource_pool {
        let pool_id = identifier_to_json(pool.id());
        // Some provisioning types read `resourcePoolId`, others `poolId`
        options.insert("resourcePoolId".to_string(), pool_id.clone());
        options.insert("poolId".to_string(), pool_id);
    }

    let volumes = config
        .volumes
        .iter()
        .enumerate()
        .map(|(i, volume)| Volume {
            name: volume.name.clone(),
            root: volume.root,
            size: volume.size,
            size_id: volume.size_id,
            storage_type: volume.storage_type,
            datastore_id: context
                .datastores
                .get(i)
                .and_then(Option::as_ref)
                .map(|d| identifier_to_json(d.id())),
        })
        .collect();

    let network_interfaces = config
        .interfaces
        .iter()
        .enumerate()
        .map(|(i, interface)| NetworkInterface {
            network: context
                .networks
                .get(i)
                .and_then(Option::as_ref)
                .map(NetworkRef::id)
                .map(IdRef::new),
            ip_address: interface.ip_address.clone(),
            ip_mode: interface.ip_mode.clone(),
            network_interface_type_id: interface.network_interface_type_id,
        })
        .collect();

    let labels_joined = (!config.labels.is_empty()).then(|| config.labels.join(","));

    ProvisionRequest {
        zone_id: identifier_to_json(placement.cloud.id()),
        instance: InstanceSection {
            name: config.name.clone(),
            description: config.description.clone(),
            environment: config.environment.clone(),
            tags: labels_joined,
            instance_type: CodeRef {
                code: placement.instance_type.code().to_string(),
            },
            layout: IdRef::new(placement.layout.id()),
            plan: IdRef::new(placement.plan.id()),
            site: IdRef::new(placement.group.id()),
        },
        layout: IdRef::new(placement.layout.id()),
        plan: IdRef::new(placement.plan.id()),
        config: options,
        volumes,
        network_interfaces,
        labels: config.labels.clone(),
        tags: config
            .tags
            .iter()
            .map(|(name, value)| Tag {
                name: name.clone(),
                value: value.clone(),
            })
            .collect(),
        evars: config
            .evars
            .iter()
            .map(|e| Evar {
                name: e.name.clone(),
                value: e.value.clone(),
                export: e.export,
                masked: e.masked,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvVar, InterfaceConfig, VolumeConfig};
    use crate::resolve::ChainResolver;
    use crate::testing::standard_catalog;
    use serde_json::json;

    fn config() -> InstanceConfig {
        InstanceConfig {
            name: "web-01".to_string(),
            description: Some("frontend".to_string()),
            group: Some("prod".to_string()),
            cloud: Some("vmware-east".to_string()),
            instance_type: Some("ubuntu".to_string()),
            layout: Some("web-template".to_string()),
            version: Some("22.04".to_string()),
            plan: Some("Small".to_string()),
            resource_pool: Some("pool-a".to_string()),
            labels: vec!["web".to_string(), "blue".to_string()],
            tags: [("owner".to_string(), "ops".to_string())].into_iter().collect(),
            custom_options: json!({"poolId": 99, "flavor": "x"})
                .as_object()
                .cloned()
                .unwrap(),
            evars: vec![EnvVar {
                name: "ENV".to_string(),
                value: "prod".to_string(),
                export: true,
                masked: false,
            }],
            volumes: vec![
                VolumeConfig {
                    name: Some("root".to_string()),
                    root: true,
                    size: Some(40),
                    storage_type: Some(1),
                    datastore: Some("Datastore-A".to_string()),
                    ..Default::default()
                },
                VolumeConfig {
                    size: Some(100),
                    size_id: Some(7),
                    ..Default::default()
                },
            ],
            interfaces: vec![
                InterfaceConfig {
                    network: Some("VLAN 12".to_string()),
                    ip_mode: Some("dhcp".to_string()),
                    ..Default::default()
                },
                InterfaceConfig {
                    network: Some("subnet-5".to_string()),
                    ip_address: Some("10.0.0.5".to_string()),
                    network_interface_type_id: Some(2),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    async fn assembled() -> Value {
        let catalog = standard_catalog();
        let config = config();
        let context = ChainResolver::new(&catalog).resolve(&config).await.unwrap();
        assemble(&context, &config).to_json()
    }

    #[tokio::test]
    async fn test_resolved_ids_replace_tokens() {
        let body = assembled().await;
        assert_eq!(body["zoneId"], json!(2));
        assert_eq!(body["instance"]["site"], json!({"id": 1}));
        assert_eq!(body["instance"]["instanceType"], json!({"code": "ubuntu"}));
        assert_eq!(body["instance"]["layout"], json!({"id": 4}));
        assert_eq!(body["instance"]["plan"], json!({"id": 6}));
        assert_eq!(body["layout"], json!({"id": 4}));
        assert_eq!(body["plan"], json!({"id": 6}));
    }

    #[tokio::test]
    async fn test_pool_id_written_under_both_keys() {
        let body = assembled().await;
        assert_eq!(body["config"]["resourcePoolId"], json!(7));
        // resolved pool wins over the user's raw entry
        assert_eq!(body["config"]["poolId"], json!(7));
        assert_eq!(body["config"]["flavor"], json!("x"));
    }

    #[tokio::test]
    async fn test_volumes_keep_raw_fields_and_gain_datastore_ids() {
        let body = assembled().await;
        assert_eq!(
            body["volumes"],
            json!([
                {"name": "root", "root": true, "size": 40, "storageType": 1, "datastoreId": 31},
                {"root": false, "size": 100, "sizeId": 7}
            ])
        );
    }

    #[tokio::test]
    async fn test_interfaces_wrap_network_ids() {
        let body = assembled().await;
        assert_eq!(
            body["networkInterfaces"],
            json!([
                {"network": {"id": "network-12"}, "ipMode": "dhcp"},
                {"network": {"id": "subnet-5"}, "ipAddress": "10.0.0.5", "networkInterfaceTypeId": 2}
            ])
        );
    }

    #[tokio::test]
    async fn test_scalars_and_metadata_copy_through() {
        let body = assembled().await;
        assert_eq!(body["instance"]["name"], json!("web-01"));
        assert_eq!(body["instance"]["description"], json!("frontend"));
        assert_eq!(body["instance"]["tags"], json!("web,blue"));
        assert!(body["instance"].get("environment").is_none());
        assert_eq!(body["labels"], json!(["web", "blue"]));
        assert_eq!(body["tags"], json!([{"name": "owner", "value": "ops"}]));
        assert_eq!(
            body["evars"],
            json!([{"name": "ENV", "value": "prod", "export": true, "masked": false}])
        );
    }

    #[tokio::test]
    async fn test_minimal_request_omits_optional_sections() {
        let catalog = standard_catalog();
        let config = InstanceConfig {
            resource_pool: None,
            labels: Vec::new(),
            tags: Default::default(),
            custom_options: Map::new(),
            evars: Vec::new(),
            volumes: Vec::new(),
            interfaces: Vec::new(),
            ..config()
        };
        let context = ChainResolver::new(&catalog).resolve(&config).await.unwrap();
        let body = assemble(&context, &config).to_json();
        assert_eq!(body["config"], json!({}));
        for key in ["volumes", "networkInterfaces", "labels", "tags", "evars"] {
            assert!(body.get(key).is_none(), "{} should be omitted", key);
        }
        assert!(body["instance"].get("tags").is_none());
    }
}
