//! Dependency-ordered resolution
//!
//! Stages run strictly in order:
//!
//! ```text
//! group -> cloud -> instance type -> (version filter) layout -> plan
//!       -> resource pool? -> datastore per volume? -> network per interface?
//! ```
//!
//! Each stage's query is built from the ids of the stages before it, so every
//! stage method takes those upstream results as arguments. Only one catalog
//! request is in flight at a time and the first failure ends the chain.

use log::{debug, info};

use super::matcher;
use super::stage::{self, Stage};
use super::{ReferenceKind, Resolved, ResolvedReference};
use crate::catalog::{Candidate, CatalogClient, CatalogError, QueryParams};
use crate::config::InstanceConfig;
use crate::error::ResolveError;
use crate::utils::{is_network_reference, non_empty};

/// Kind used to fetch a plan's full record after it is matched in the option list
const SERVICE_PLAN_KIND: &str = "servicePlans";

/// The mandatory placement of an instance
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub group: Resolved<stage::Group>,
    pub cloud: Resolved<stage::Cloud>,
    pub instance_type: Resolved<stage::InstanceType>,
    pub layout: Resolved<stage::Layout>,
    pub plan: Resolved<stage::Plan>,
}

impl Placement {
    /// Full scoping tuple used by pool, datastore and network lookups
    pub fn query(&self) -> QueryParams {
        let mut query = cloud_scope(&self.group, &self.cloud);
        query.insert("instanceTypeId", self.instance_type.id().to_string());
        query.insert("layoutId", self.layout.id().to_string());
        query.insert("planId", self.plan.id().to_string());
        query
    }
}

/// Network of one interface
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkRef {
    /// Looked up in the cloud's network options
    Resolved(Resolved<stage::Network>),
    /// Supplied as an already-prefixed reference such as `network-12`
    Reference(String),
}

impl NetworkRef {
    pub fn id(&self) -> &str {
        match self {
            NetworkRef::Resolved(resolved) => resolved.id(),
            NetworkRef::Reference(reference) => reference,
        }
    }
}

/// Everything resolved for one provisioning call
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionContext {
    pub placement: Placement,
    pub resource_pool: Option<Resolved<stage::ResourcePool>>,
    /// One entry per configured volume, `None` where no datastore was named
    pub datastores: Vec<Option<Resolved<stage::Datastore>>>,
    /// One entry per configured interface, `None` where no network was named
    pub networks: Vec<Option<NetworkRef>>,
}

impl ResolutionContext {
    /// Resolved references in pipeline order (prefixed network references are not listed)
    pub fn references(&self) -> Vec<&ResolvedReference> {
        let placement = &self.placement;
        let mut refs = vec![
            placement.group.reference(),
            placement.cloud.reference(),
            placement.instance_type.reference(),
            placement.layout.reference(),
            placement.plan.reference(),
        ];
        refs.extend(self.resource_pool.iter().map(Resolved::reference));
        refs.extend(self.datastores.iter().flatten().map(Resolved::reference));
        refs.extend(self.networks.iter().flatten().filter_map(|n| match n {
            NetworkRef::Resolved(resolved) => Some(resolved.reference()),
            NetworkRef::Reference(_) => None,
        }));
        refs
    }
}

fn group_scope(group: &Resolved<stage::Group>) -> QueryParams {
    let mut query = QueryParams::new();
    query.insert("groupId", group.id().to_string());
    query.insert("siteId", group.id().to_string());
    query
}

fn cloud_scope(group: &Resolved<stage::Group>, cloud: &Resolved<stage::Cloud>) -> QueryParams {
    let mut query = group_scope(group);
    query.insert("cloudId", cloud.id().to_string());
    query.insert("zoneId", cloud.id().to_string());
    query
}

fn required<'t>(
    stage: ReferenceKind,
    field: &'static str,
    token: Option<&'t str>,
) -> Result<&'t str, ResolveError> {
    non_empty(token).ok_or(ResolveError::Configuration { stage, field })
}

/// Runs the resolution stages against a catalog
pub struct ChainResolver<'a, C: CatalogClient + ?Sized> {
    catalog: &'a C,
}

impl<'a, C: CatalogClient + ?Sized> ChainResolver<'a, C> {
    pub fn new(catalog: &'a C) -> Self {
        Self { catalog }
    }

    async fn candidates(
        &self,
        kind: ReferenceKind,
        token: &str,
        query: &QueryParams,
    ) -> Result<Vec<Candidate>, ResolveError> {
        debug!("listing {} options from {} {:?}", kind, kind.category(), query);
        self.catalog
            .list_options(kind.category(), query)
            .await
            .map_err(|source| ResolveError::Transport {
                stage: kind,
                token: token.to_string(),
                source,
            })
    }

    async fn resolve_stage<K: Stage>(
        &self,
        token: &str,
        query: &QueryParams,
    ) -> Result<Resolved<K>, ResolveError> {
        let candidates = self.candidates(K::KIND, token, query).await?;
        let reference = matcher::resolve(K::KIND, token, &candidates)?;
        info!("resolved {} '{}' -> {}", K::KIND, token, reference.id);
        Ok(Resolved::new(reference))
    }

    pub async fn resolve_group(&self, token: &str) -> Result<Resolved<stage::Group>, ResolveError> {
        self.resolve_stage(token, &QueryParams::new()).await
    }

    pub async fn resolve_cloud(
        &self,
        group: &Resolved<stage::Group>,
        token: &str,
    ) -> Result<Resolved<stage::Cloud>, ResolveError> {
        self.resolve_stage(token, &group_scope(group)).await
    }

    pub async fn resolve_instance_type(
        &self,
        group: &Resolved<stage::Group>,
        cloud: &Resolved<stage::Cloud>,
        token: &str,
    ) -> Result<Resolved<stage::InstanceType>, ResolveError> {
        self.resolve_stage(token, &cloud_scope(group, cloud)).await
    }

    /// Resolve a layout among those offered for the group, cloud and instance type.
    ///
    /// The version is not an upstream filter: candidates are narrowed locally
    /// before matching, so a same-named layout of another version is not found.
    pub async fn resolve_layout(
        &self,
        group: &Resolved<stage::Group>,
        cloud: &Resolved<stage::Cloud>,
        instance_type: &Resolved<stage::InstanceType>,
        token: &str,
        version: Option<&str>,
    ) -> Result<Resolved<stage::Layout>, ResolveError> {
        let kind = ReferenceKind::Layout;
        let mut query = cloud_scope(group, cloud);
        query.insert("instanceTypeId", instance_type.id().to_string());

        let mut candidates = self.candidates(kind, token, &query).await?;
        let scope = match non_empty(version) {
            Some(version) => {
                candidates.retain(|c| c.version.as_deref() == Some(version));
                debug!("{} layouts offered at version {}", candidates.len(), version);
                format!("{} (version {})", kind.category(), version)
            }
            None => kind.category().to_string(),
        };

        let reference =
            matcher::resolve_with_policy(kind, token, &candidates, &kind.match_policy(), &scope)?;
        info!("resolved {} '{}' -> {}", kind, token, reference.id);
        Ok(Resolved::new(reference))
    }

    /// Resolve a plan offered for the layout, then fetch it directly for its code
    pub async fn resolve_plan(
        &self,
        group: &Resolved<stage::Group>,
        cloud: &Resolved<stage::Cloud>,
        layout: &Resolved<stage::Layout>,
        token: &str,
    ) -> Result<Resolved<stage::Plan>, ResolveError> {
        let kind = ReferenceKind::Plan;
        let mut query = cloud_scope(group, cloud);
        query.insert("layoutId", layout.id().to_string());

        let candidates = self.candidates(kind, token, &query).await?;
        let listed = matcher::resolve(kind, token, &candidates)?;

        let plan = self
            .catalog
            .get(SERVICE_PLAN_KIND, &listed.id)
            .await
            .map_err(|e| match e {
                CatalogError::NotFound { .. } => ResolveError::NotFound {
                    stage: kind,
                    token: token.to_string(),
                    category: SERVICE_PLAN_KIND.to_string(),
                },
                source => ResolveError::Transport {
                    stage: kind,
                    token: token.to_string(),
                    source,
                },
            })?;

        let field = |key: &str| plan.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let reference = ResolvedReference {
            code: field("code").unwrap_or_else(|| listed.code.clone()),
            name: field("name").unwrap_or_else(|| listed.name.clone()),
            ..listed
        };
        info!(
            "resolved {} '{}' -> {} ({})",
            kind, token, reference.id, reference.code
        );
        Ok(Resolved::new(reference))
    }

    pub async fn resolve_resource_pool(
        &self,
        placement: &Placement,
        token: &str,
    ) -> Result<Resolved<stage::ResourcePool>, ResolveError> {
        self.resolve_stage(token, &placement.query()).await
    }

    pub async fn resolve_datastore(
        &self,
        placement: &Placement,
        token: &str,
    ) -> Result<Resolved<stage::Datastore>, ResolveError> {
        self.resolve_stage(token, &placement.query()).await
    }

    /// Resolve an interface's network; prefixed references skip the lookup
    pub async fn resolve_network(
        &self,
        placement: &Placement,
        pool: Option<&Resolved<stage::ResourcePool>>,
        token: &str,
    ) -> Result<NetworkRef, ResolveError> {
        if is_network_reference(token) {
            debug!("network '{}' is already a reference", token);
            return Ok(NetworkRef::Reference(token.to_string()));
        }
        let mut query = placement.query();
        if let Some(pool) = pool {
            query.insert("poolId", pool.id().to_string());
        }
        Ok(NetworkRef::Resolved(self.resolve_stage(token, &query).await?))
    }

    /// Run the whole chain for an instance configuration
    pub async fn resolve(&self, config: &InstanceConfig) -> Result<ResolutionContext, ResolveError> {
        // Every mandatory token is checked before the first request
        let group_token = required(ReferenceKind::Group, "group", config.group.as_deref())?;
        let cloud_token = required(ReferenceKind::Cloud, "cloud", config.cloud.as_deref())?;
        let type_token = required(
            ReferenceKind::InstanceType,
            "instance_type",
            config.instance_type.as_deref(),
        )?;
        let layout_token = required(ReferenceKind::Layout, "layout", config.layout.as_deref())?;
        let plan_token = required(ReferenceKind::Plan, "plan", config.plan.as_deref())?;

        let group = self.resolve_group(group_token).await?;
        let cloud = self.resolve_cloud(&group, cloud_token).await?;
        let instance_type = self
            .resolve_instance_type(&group, &cloud, type_token)
            .await?;
        let layout = self
            .resolve_layout(
                &group,
                &cloud,
                &instance_type,
                layout_token,
                config.version.as_deref(),
            )
            .await?;
        let plan = self.resolve_plan(&group, &cloud, &layout, plan_token).await?;

        let placement = Placement {
            group,
            cloud,
            instance_type,
            layout,
            plan,
        };

        let resource_pool = match non_empty(config.resource_pool.as_deref()) {
            Some(token) => Some(self.resolve_resource_pool(&placement, token).await?),
            None => None,
        };

        let mut datastores = Vec::with_capacity(config.volumes.len());
        for volume in &config.volumes {
            datastores.push(match non_empty(volume.datastore.as_deref()) {
                Some(token) => Some(self.resolve_datastore(&placement, token).await?),
                None => None,
            });
        }

        let mut networks = Vec::with_capacity(config.interfaces.len());
        for interface in &config.interfaces {
            networks.push(match non_empty(interface.network.as_deref()) {
                Some(token) => Some(
                    self.resolve_network(&placement, resource_pool.as_ref(), token)
                        .await?,
                ),
                None => None,
            });
        }

        Ok(ResolutionContext {
            placement,
            resource_pool,
            datastores,
            networks,
        })
    }
}
