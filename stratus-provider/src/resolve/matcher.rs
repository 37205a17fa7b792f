//! Tiered name-or-id matching
//!
//! A token is compared against candidates one tier at a time, in the order of
//! [`TIERS`]. The first tier that matches anything decides: one match wins,
//! more than one is ambiguous. Later tiers are looser and are never consulted
//! once an earlier tier has matched.

use super::{ReferenceKind, ResolvedReference};
use crate::catalog::Candidate;
use crate::error::ResolveError;
use crate::utils::coerce_integer;

/// Candidate field compared in the exact tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchField {
    Id,
    Name,
    Code,
    ExternalId,
}

impl MatchField {
    fn read<'a>(&self, candidate: &'a Candidate) -> Option<&'a str> {
        match self {
            MatchField::Id => Some(candidate.id.as_str()),
            MatchField::Name => Some(candidate.name.as_str()),
            MatchField::Code => Some(candidate.code.as_str()),
            MatchField::ExternalId => candidate.external_id.as_deref(),
        }
    }
}

/// Which fields and tiers apply to a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPolicy {
    pub fields: &'static [MatchField],
    pub numeric_value: bool,
    pub name_prefix: bool,
}

impl MatchPolicy {
    pub const ALL_FIELDS: &'static [MatchField] = &[
        MatchField::Id,
        MatchField::Name,
        MatchField::Code,
        MatchField::ExternalId,
    ];

    pub const STANDARD: MatchPolicy = MatchPolicy {
        fields: Self::ALL_FIELDS,
        numeric_value: true,
        name_prefix: false,
    };

    pub const DECORATED_NAME: MatchPolicy = MatchPolicy {
        fields: Self::ALL_FIELDS,
        numeric_value: true,
        name_prefix: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Exact,
    NumericValue,
    NamePrefix,
}

impl Tier {
    fn enabled(&self, policy: &MatchPolicy) -> bool {
        match self {
            Tier::Exact => !policy.fields.is_empty(),
            Tier::NumericValue => policy.numeric_value,
            Tier::NamePrefix => policy.name_prefix,
        }
    }
}

type Matcher = fn(&Candidate, &str, &MatchPolicy) -> bool;

/// Matching tiers in the order they are tried
pub const TIERS: [(Tier, Matcher); 3] = [
    (Tier::Exact, exact_match),
    (Tier::NumericValue, numeric_value_match),
    (Tier::NamePrefix, name_prefix_match),
];

/// Case-sensitive equality against any configured field
pub fn exact_match(candidate: &Candidate, token: &str, policy: &MatchPolicy) -> bool {
    policy
        .fields
        .iter()
        .filter_map(|field| field.read(candidate))
        .any(|value| !value.is_empty() && value == token)
}

/// Integer token equal to the candidate's `value`, floats truncated
pub fn numeric_value_match(candidate: &Candidate, token: &str, _policy: &MatchPolicy) -> bool {
    let Ok(wanted) = token.trim().parse::<i64>() else {
        return false;
    };
    candidate.value.as_ref().and_then(coerce_integer) == Some(wanted)
}

/// Name starts with the token and the remainder is a whitespace-separated
/// suffix, e.g. `Datastore-A` matches `Datastore-A - 1.2TB Free` but not
/// `Datastore-A2 - 900GB Free`.
pub fn name_prefix_match(candidate: &Candidate, token: &str, _policy: &MatchPolicy) -> bool {
    if token.is_empty() {
        return false;
    }
    match candidate.name.strip_prefix(token) {
        Some(rest) => rest.starts_with(char::is_whitespace),
        None => false,
    }
}

/// Result of matching a token against a candidate set
#[derive(Debug, PartialEq)]
pub enum MatchOutcome<'a> {
    Unique {
        tier: Tier,
        candidate: &'a Candidate,
    },
    Ambiguous {
        tier: Tier,
        count: usize,
    },
    NoMatch,
}

/// Apply the tiers in order and stop at the first one that matches anything
pub fn find_match<'a>(
    token: &str,
    candidates: &'a [Candidate],
    policy: &MatchPolicy,
) -> MatchOutcome<'a> {
    for (tier, matcher) in TIERS {
        if !tier.enabled(policy) {
            continue;
        }
        let matches: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| matcher(*c, token, policy))
            .collect();
        match matches.as_slice() {
            [] => continue,
            [candidate] => {
                return MatchOutcome::Unique {
                    tier,
                    candidate: *candidate,
                };
            }
            many => {
                return MatchOutcome::Ambiguous {
                    tier,
                    count: many.len(),
                };
            }
        }
    }
    MatchOutcome::NoMatch
}

pub fn to_reference(kind: ReferenceKind, candidate: &Candidate) -> ResolvedReference {
    ResolvedReference {
        kind,
        id: candidate.id.clone(),
        code: candidate.code.clone(),
        name: candidate.name.clone(),
    }
}

/// Resolve `token` to exactly one candidate using the kind's policy
pub fn resolve(
    kind: ReferenceKind,
    token: &str,
    candidates: &[Candidate],
) -> Result<ResolvedReference, ResolveError> {
    resolve_with_policy(
        kind,
        token,
        candidates,
        &kind.match_policy(),
        kind.category(),
    )
}

/// Resolve with an explicit policy; `scope` names the candidate set in errors
pub fn resolve_with_policy(
    kind: ReferenceKind,
    token: &str,
    candidates: &[Candidate],
    policy: &MatchPolicy,
    scope: &str,
) -> Result<ResolvedReference, ResolveError> {
    match find_match(token, candidates, policy) {
        MatchOutcome::Unique { candidate, .. } => Ok(to_reference(kind, candidate)),
        MatchOutcome::Ambiguous { count, .. } => Err(ResolveError::Ambiguous {
            stage: kind,
            token: token.to_string(),
            category: scope.to_string(),
            count,
        }),
        MatchOutcome::NoMatch => Err(ResolveError::NotFound {
            stage: kind,
            token: token.to_string(),
            category: scope.to_string(),
        }),
    }
}
