//! Provider and instance configuration
//!
//! `ProviderConfig` carries connection settings for the catalog service.
//! `InstanceConfig` is the typed view of an `instance` resource's attributes:
//! the mnemonic tokens the resolution chain consumes plus the raw volume,
//! interface and metadata settings the payload assembler folds in.

use std::collections::BTreeMap;
use std::time::Duration;

use stratus_core::resource::{Resource, Value};
use thiserror::Error;

/// Default request timeout for catalog calls
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("attribute `{attribute}` must be {expected}")]
    InvalidAttribute {
        attribute: String,
        expected: &'static str,
    },
}

/// Connection settings for the catalog service
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the management API (e.g. https://cmp.example.com)
    pub url: String,
    /// Bearer token
    pub access_token: String,
    pub timeout: Duration,
    /// Skip TLS certificate verification
    pub insecure: bool,
}

impl ProviderConfig {
    pub fn new(url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: access_token.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            insecure: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Missing("url"));
        }
        if self.access_token.trim().is_empty() {
            return Err(ConfigError::Missing("access_token"));
        }
        Ok(())
    }
}

/// One storage volume as declared by the user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeConfig {
    pub name: Option<String>,
    pub root: bool,
    pub size: Option<i64>,
    pub size_id: Option<i64>,
    pub storage_type: Option<i64>,
    /// Datastore name or id, resolved before submission
    pub datastore: Option<String>,
}

/// One network interface as declared by the user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfaceConfig {
    /// Network name, id, or prefixed reference
    pub network: Option<String>,
    pub ip_address: Option<String>,
    pub ip_mode: Option<String>,
    pub network_interface_type_id: Option<i64>,
}

/// Environment variable injected into the instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
    pub export: bool,
    pub masked: bool,
}

/// Typed configuration of an `instance` resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceConfig {
    pub name: String,
    pub description: Option<String>,
    pub environment: Option<String>,
    pub group: Option<String>,
    pub cloud: Option<String>,
    pub instance_type: Option<String>,
    pub layout: Option<String>,
    pub version: Option<String>,
    pub plan: Option<String>,
    pub resource_pool: Option<String>,
    pub labels: Vec<String>,
    pub tags: BTreeMap<String, String>,
    /// Free-form entries merged into the request's `config` map
    pub custom_options: serde_json::Map<String, serde_json::Value>,
    pub evars: Vec<EnvVar>,
    pub volumes: Vec<VolumeConfig>,
    pub interfaces: Vec<InterfaceConfig>,
}

impl InstanceConfig {
    /// Read the typed configuration out of a resource's attributes.
    ///
    /// Only shapes are checked here. Missing group or cloud tokens are
    /// reported by the resolution chain, before it issues any request.
    pub fn from_resource(resource: &Resource) -> Result<Self, ConfigError> {
        let attrs = Attributes(&resource.attributes);

        let name = attrs
            .token("name")?
            .unwrap_or_else(|| resource.id.name.clone());

        let volumes = attrs
            .maps("volumes")?
            .into_iter()
            .map(|m| {
                let volume = Attributes(m);
                Ok(VolumeConfig {
                    name: volume.token("name")?,
                    root: volume.bool("root")?.unwrap_or(false),
                    size: volume.int("size")?,
                    size_id: volume.int("size_id")?,
                    storage_type: volume.int("storage_type")?,
                    datastore: volume.token("datastore")?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let interfaces = attrs
            .maps("interfaces")?
            .into_iter()
            .map(|m| {
                let interface = Attributes(m);
                Ok(InterfaceConfig {
                    network: interface.token("network")?,
                    ip_address: interface.token("ip_address")?,
                    ip_mode: interface.token("ip_mode")?,
                    network_interface_type_id: interface.int("network_interface_type_id")?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let evars = attrs
            .maps("evars")?
            .into_iter()
            .map(|m| {
                let evar = Attributes(m);
                Ok(EnvVar {
                    name: evar.token("name")?.ok_or(ConfigError::InvalidAttribute {
                        attribute: "evars.name".to_string(),
                        expected: "a string",
                    })?,
                    value: evar.token("value")?.unwrap_or_default(),
                    export: evar.bool("export")?.unwrap_or(false),
                    masked: evar.bool("masked")?.unwrap_or(false),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            name,
            description: attrs.token("description")?,
            environment: attrs.token("environment")?,
            group: attrs.token("group")?,
            cloud: attrs.token("cloud")?,
            instance_type: attrs.token("instance_type")?,
            layout: attrs.token("layout")?,
            version: attrs.token("version")?,
            plan: attrs.token("plan")?,
            resource_pool: attrs.token("resource_pool")?,
            labels: attrs.strings("labels")?,
            tags: attrs.string_map("tags")?,
            custom_options: attrs.json_map("custom_options")?,
            evars,
            volumes,
            interfaces,
        })
    }
}

/// Typed accessors over a resource attribute map
struct Attributes<'a>(&'a std::collections::HashMap<String, Value>);

impl<'a> Attributes<'a> {
    fn invalid(key: &str, expected: &'static str) -> ConfigError {
        ConfigError::InvalidAttribute {
            attribute: key.to_string(),
            expected,
        }
    }

    /// A name-or-id token: strings as given, integers stringified
    fn token(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
            Some(Value::Int(i)) => Ok(Some(i.to_string())),
            Some(_) => Err(Self::invalid(key, "a string or an integer")),
        }
    }

    fn int(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_int()
                .map(Some)
                .ok_or_else(|| Self::invalid(key, "an integer")),
        }
    }

    fn bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_bool()
                .map(Some)
                .ok_or_else(|| Self::invalid(key, "a boolean")),
        }
    }

    fn strings(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        match self.0.get(key) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| Self::invalid(key, "a list of strings"))
                })
                .collect(),
            Some(_) => Err(Self::invalid(key, "a list of strings")),
        }
    }

    fn string_map(&self, key: &str) -> Result<BTreeMap<String, String>, ConfigError> {
        match self.0.get(key) {
            None => Ok(BTreeMap::new()),
            Some(Value::Map(map)) => map
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => Ok((k.clone(), s.clone())),
                    Value::Int(i) => Ok((k.clone(), i.to_string())),
                    Value::Bool(b) => Ok((k.clone(), b.to_string())),
                    _ => Err(Self::invalid(key, "a map of strings")),
                })
                .collect(),
            Some(_) => Err(Self::invalid(key, "a map of strings")),
        }
    }

    fn json_map(
        &self,
        key: &str,
    ) -> Result<serde_json::Map<String, serde_json::Value>, ConfigError> {
        match self.0.get(key) {
            None => Ok(serde_json::Map::new()),
            Some(Value::Map(map)) => Ok(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
            Some(_) => Err(Self::invalid(key, "a map")),
        }
    }

    fn maps(&self, key: &str) -> Result<Vec<&'a std::collections::HashMap<String, Value>>, ConfigError> {
        match self.0.get(key) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => items
                .iter()
                .map(|v| match v {
                    Value::Map(m) => Ok(m),
                    _ => Err(Self::invalid(key, "a list of objects")),
                })
                .collect(),
            Some(_) => Err(Self::invalid(key, "a list of objects")),
        }
    }
}
