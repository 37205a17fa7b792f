//! Provisioning orchestration
//!
//! resolve -> assemble -> submit once. Nothing is submitted unless every
//! stage of the chain succeeded, and no step is retried.

use log::info;

use crate::catalog::CatalogClient;
use crate::config::InstanceConfig;
use crate::error::{ProvisionError, ResolveError};
use crate::payload::{ProvisionRequest, assemble};
use crate::resolve::{ChainResolver, ResolutionContext};
use crate::utils::normalize_identifier;

/// Result of a successful provisioning call
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    /// Identifier of the created instance
    pub instance_id: String,
    pub context: ResolutionContext,
    /// Raw creation response
    pub response: serde_json::Value,
}

/// Resolution and request of a dry run
#[derive(Debug, Clone)]
pub struct ProvisionPlan {
    pub context: ResolutionContext,
    pub request: ProvisionRequest,
}

pub struct Orchestrator<'a, C: CatalogClient + ?Sized> {
    catalog: &'a C,
}

impl<'a, C: CatalogClient + ?Sized> Orchestrator<'a, C> {
    pub fn new(catalog: &'a C) -> Self {
        Self { catalog }
    }

    /// Resolve and assemble without submitting
    pub async fn plan(&self, config: &InstanceConfig) -> Result<ProvisionPlan, ResolveError> {
        let context = ChainResolver::new(self.catalog).resolve(config).await?;
        let request = assemble(&context, config);
        Ok(ProvisionPlan { context, request })
    }

    /// Resolve, assemble, and submit exactly one creation request
    pub async fn provision(
        &self,
        config: &InstanceConfig,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let ProvisionPlan { context, request } = self.plan(config).await?;

        info!("submitting instance '{}'", request.instance.name);
        let response = self
            .catalog
            .create_instance(&request)
            .await
            .map_err(ProvisionError::Submit)?;

        let instance_id = response
            .pointer("/instance/id")
            .or_else(|| response.get("id"))
            .and_then(normalize_identifier)
            .ok_or(ProvisionError::MissingInstanceId)?;
        info!("instance '{}' created with id {}", request.instance.name, instance_id);

        Ok(ProvisionOutcome {
            instance_id,
            context,
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::ReferenceKind;
    use crate::testing::{Call, standard_catalog};
    use serde_json::json;

    fn config() -> InstanceConfig {
        InstanceConfig {
            name: "web-01".to_string(),
            group: Some("prod".to_string()),
            cloud: Some("vmware-east".to_string()),
            instance_type: Some("ubuntu".to_string()),
            layout: Some("web-template".to_string()),
            version: Some("22.04".to_string()),
            plan: Some("Small".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_provision_submits_once_and_returns_id() {
        let catalog = standard_catalog();
        let outcome = Orchestrator::new(&catalog).provision(&config()).await.unwrap();

        assert_eq!(outcome.instance_id, "501");
        assert_eq!(outcome.context.placement.layout.id(), "4");
        let creates = catalog
            .calls()
            .into_iter()
            .filter(|c| *c == Call::Create)
            .count();
        assert_eq!(creates, 1);
        assert_eq!(catalog.calls().last(), Some(&Call::Create));

        let submitted = catalog.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].instance.name, "web-01");
    }

    #[tokio::test]
    async fn test_resolution_failure_submits_nothing() {
        let catalog = standard_catalog();
        let config = InstanceConfig {
            version: Some("5.11".to_string()),
            ..config()
        };
        let err = Orchestrator::new(&catalog).provision(&config).await.unwrap_err();
        match err {
            ProvisionError::Resolve(e) => assert_eq!(e.stage(), ReferenceKind::Layout),
            other => panic!("expected resolution error, got {:?}", other),
        }
        assert!(catalog.submitted().is_empty());
        assert!(!catalog.calls().contains(&Call::Create));
    }

    #[tokio::test]
    async fn test_missing_instance_id_in_response() {
        let catalog = standard_catalog().with_create_response(json!({"success": true}));
        let err = Orchestrator::new(&catalog).provision(&config()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::MissingInstanceId));
        assert_eq!(catalog.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_plan_does_not_submit() {
        let catalog = standard_catalog();
        let plan = Orchestrator::new(&catalog).plan(&config()).await.unwrap();
        assert_eq!(plan.request.plan.id, json!(6));
        assert!(catalog.submitted().is_empty());
    }
}
