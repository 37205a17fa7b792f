//! Name-or-id resolution
//!
//! Turns the mnemonic tokens of an instance configuration into catalog
//! identifiers. `matcher` decides whether a token picks exactly one candidate;
//! `chain` runs the stages in dependency order.
//!
//! Stage results are typed: a `Resolved<stage::Layout>` can only come out of
//! the layout stage, and each stage takes the upstream results it is scoped by
//! as required arguments.

pub mod chain;
pub mod matcher;

pub use chain::{ChainResolver, NetworkRef, Placement, ResolutionContext};
pub use matcher::{MatchField, MatchOutcome, MatchPolicy, Tier};

use std::fmt;
use std::marker::PhantomData;

/// Kind of catalog object a stage resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Group,
    Cloud,
    InstanceType,
    Layout,
    Plan,
    ResourcePool,
    Datastore,
    Network,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Group => "group",
            ReferenceKind::Cloud => "cloud",
            ReferenceKind::InstanceType => "instance type",
            ReferenceKind::Layout => "layout",
            ReferenceKind::Plan => "plan",
            ReferenceKind::ResourcePool => "resource pool",
            ReferenceKind::Datastore => "datastore",
            ReferenceKind::Network => "network",
        }
    }

    /// Option category the stage lists candidates from
    pub fn category(&self) -> &'static str {
        match self {
            ReferenceKind::Group => "groups",
            ReferenceKind::Cloud => "clouds",
            ReferenceKind::InstanceType => "instanceTypes",
            ReferenceKind::Layout => "layoutsForCloud",
            ReferenceKind::Plan => "instanceServicePlans",
            ReferenceKind::ResourcePool => "zonePools",
            ReferenceKind::Datastore => "datastores",
            ReferenceKind::Network => "zoneNetworkOptions",
        }
    }

    /// Matching rules for this kind.
    ///
    /// Datastore and pool option names carry decorative suffixes such as
    /// free-space annotations, so only those fall back to prefix matching.
    pub fn match_policy(&self) -> MatchPolicy {
        match self {
            ReferenceKind::Datastore | ReferenceKind::ResourcePool => MatchPolicy::DECORATED_NAME,
            _ => MatchPolicy::STANDARD,
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one resolution step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    pub kind: ReferenceKind,
    pub id: String,
    pub code: String,
    pub name: String,
}

/// Stage markers for `Resolved`
pub mod stage {
    use super::ReferenceKind;

    /// A pipeline stage, identified by the kind it resolves
    pub trait Stage {
        const KIND: ReferenceKind;
    }

    macro_rules! define_stage {
        ($name:ident) => {
            #[derive(Debug)]
            pub enum $name {}
            impl Stage for $name {
                const KIND: ReferenceKind = ReferenceKind::$name;
            }
        };
    }

    define_stage!(Group);
    define_stage!(Cloud);
    define_stage!(InstanceType);
    define_stage!(Layout);
    define_stage!(Plan);
    define_stage!(ResourcePool);
    define_stage!(Datastore);
    define_stage!(Network);
}

use stage::Stage;

/// A reference produced by stage `K`.
///
/// Only the resolver constructs these, so holding one proves the stage ran.
pub struct Resolved<K: Stage> {
    reference: ResolvedReference,
    _stage: PhantomData<fn() -> K>,
}

impl<K: Stage> Resolved<K> {
    pub(crate) fn new(reference: ResolvedReference) -> Self {
        debug_assert_eq!(reference.kind, K::KIND);
        Self {
            reference,
            _stage: PhantomData,
        }
    }

    pub fn id(&self) -> &str {
        &self.reference.id
    }

    pub fn code(&self) -> &str {
        &self.reference.code
    }

    pub fn name(&self) -> &str {
        &self.reference.name
    }

    pub fn reference(&self) -> &ResolvedReference {
        &self.reference
    }

    pub fn into_reference(self) -> ResolvedReference {
        self.reference
    }
}

impl<K: Stage> Clone for Resolved<K> {
    fn clone(&self) -> Self {
        Self::new(self.reference.clone())
    }
}

impl<K: Stage> PartialEq for Resolved<K> {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
    }
}

impl<K: Stage> fmt::Debug for Resolved<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resolved").field(&self.reference).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(ReferenceKind::InstanceType.to_string(), "instance type");
        assert_eq!(ReferenceKind::ResourcePool.category(), "zonePools");
    }

    #[test]
    fn test_decorated_kinds_enable_prefix_matching() {
        assert!(ReferenceKind::Datastore.match_policy().name_prefix);
        assert!(ReferenceKind::ResourcePool.match_policy().name_prefix);
        assert!(!ReferenceKind::Layout.match_policy().name_prefix);
        assert!(!ReferenceKind::Network.match_policy().name_prefix);
    }

    #[test]
    fn test_resolved_accessors() {
        let resolved: Resolved<stage::Plan> = Resolved::new(ResolvedReference {
            kind: ReferenceKind::Plan,
            id: "9".to_string(),
            code: "small".to_string(),
            name: "Small".to_string(),
        });
        assert_eq!(resolved.id(), "9");
        assert_eq!(resolved.code(), "small");
        assert_eq!(resolved.clone(), resolved);
    }
}
