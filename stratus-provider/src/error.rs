//! Error types for resolution and provisioning

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::resolve::ReferenceKind;

/// Failure of one resolution stage. Every variant names the stage.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A required token was not supplied; raised before any request is made
    #[error("{stage}: `{field}` must be set")]
    Configuration {
        stage: ReferenceKind,
        field: &'static str,
    },

    #[error("{stage} '{token}' not found in {category}")]
    NotFound {
        stage: ReferenceKind,
        token: String,
        category: String,
    },

    #[error(
        "{stage} '{token}' is ambiguous: {count} matches in {category}; use a more specific name or the id"
    )]
    Ambiguous {
        stage: ReferenceKind,
        token: String,
        category: String,
        count: usize,
    },

    #[error("{stage} '{token}': catalog request failed: {source}")]
    Transport {
        stage: ReferenceKind,
        token: String,
        #[source]
        source: CatalogError,
    },
}

impl ResolveError {
    pub fn stage(&self) -> ReferenceKind {
        match self {
            ResolveError::Configuration { stage, .. }
            | ResolveError::NotFound { stage, .. }
            | ResolveError::Ambiguous { stage, .. }
            | ResolveError::Transport { stage, .. } => *stage,
        }
    }
}

/// Failure of a provisioning attempt
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("instance creation failed: {0}")]
    Submit(#[source] CatalogError),

    #[error("instance creation response carried no instance id")]
    MissingInstanceId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_message_names_stage_token_and_count() {
        let err = ResolveError::Ambiguous {
            stage: ReferenceKind::Group,
            token: "prod".to_string(),
            category: "groups".to_string(),
            count: 2,
        };
        assert_eq!(
            err.to_string(),
            "group 'prod' is ambiguous: 2 matches in groups; use a more specific name or the id"
        );
        assert_eq!(err.stage(), ReferenceKind::Group);
    }

    #[test]
    fn test_transport_message_names_token_and_cause() {
        let err = ResolveError::Transport {
            stage: ReferenceKind::Plan,
            token: "Small".to_string(),
            source: CatalogError::Http {
                status: 500,
                url: "https://cmp/api/options/instanceServicePlans".to_string(),
                body: "boom".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "plan 'Small': catalog request failed: HTTP 500 from https://cmp/api/options/instanceServicePlans: boom"
        );
    }

    #[test]
    fn test_provision_error_is_transparent_for_resolution() {
        let err: ProvisionError = ResolveError::Configuration {
            stage: ReferenceKind::Cloud,
            field: "cloud",
        }
        .into();
        assert_eq!(err.to_string(), "cloud: `cloud` must be set");
    }
}
