//! Stratus instance provider
//!
//! Provisions compute instances on a cloud management service. Users name
//! groups, clouds, layouts and plans the way they appear in the service's
//! console; the provider resolves those names to ids, in dependency order,
//! before submitting a single provisioning request.
//!
//! ## Module Structure
//!
//! - `catalog` - Catalog client trait and its HTTP implementation
//! - `resolve` - Tiered name-or-id matching and the dependency chain
//! - `payload` - Provisioning request assembly
//! - `provision` - Resolve, assemble, submit
//! - `provider` - InstanceProvider implementation
//! - `resources` - Resource type definitions
//! - `config` - Provider and instance configuration
//! - `utils` - Helper functions for identifier normalization

pub mod catalog;
pub mod config;
pub mod error;
pub mod payload;
pub mod provider;
pub mod provision;
pub mod resolve;
pub mod resources;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export main types
pub use catalog::{CatalogClient, CatalogError, HttpCatalogClient};
pub use config::{ConfigError, InstanceConfig, ProviderConfig};
pub use error::{ProvisionError, ResolveError};
pub use provider::InstanceProvider;
pub use provision::{Orchestrator, ProvisionOutcome, ProvisionPlan};
pub use resolve::{ReferenceKind, ResolutionContext, ResolvedReference};

use stratus_core::provider::{BoxFuture, Provider, ProviderResult};
use stratus_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for InstanceProvider {
    fn name(&self) -> &'static str {
        "stratus"
    }

    fn resource_types(&self) -> Vec<Box<dyn stratus_core::provider::ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move { self.read_instance(&id, identifier.as_deref()).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_instance(resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let to = to.clone();
        Box::pin(async move { self.update_instance(id, &identifier, to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_instance(&id, &identifier).await })
    }
}
