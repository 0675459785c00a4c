//! # Grant Derivation
//!
//! All four sources are evaluated as an OR. [`explain`] reports the first
//! source that grants, in precedence order, for logging.
//!
//! ## Permission links
//!
//! A valid link grants READ_ONLY on shipment, tracking, telemetry and tags,
//! never documents or notes, and never write access. Write access for a link
//! holder comes only from an approved access request.
//!
//! ## Tags
//!
//! Tags are rendered inside the shipment, so tag access from access requests
//! additionally needs shipment READ_ONLY in the effective set.

use serde::Serialize;
use transmission_core::{Endpoint, PermissionLevel};
use transmission_state::PermissionSet;

use crate::link::LinkFact;

/// Pre-fetched facts about one caller and one shipment.
#[derive(Debug, Clone, Default)]
pub struct GrantFacts {
    /// Caller owns the shipment or belongs to the owning organization.
    pub is_owner: bool,
    /// Caller holds the shipper, carrier, or moderator wallet.
    pub is_party: bool,
    /// Permission link presented with the request.
    pub link: LinkFact,
    /// Permission sets of the caller's approved access requests.
    pub grants: Vec<PermissionSet>,
}

impl GrantFacts {
    /// Facts for an anonymous caller holding only a link.
    pub fn link_only(link: LinkFact) -> Self {
        Self {
            link,
            ..Self::default()
        }
    }

    /// Whether the caller is owner or party, which grants everything.
    pub fn is_owner_or_party(&self) -> bool {
        self.is_owner || self.is_party
    }
}

/// Which source produced a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantSource {
    Owner,
    Party,
    PermissionLink,
    AccessRequest,
}

impl std::fmt::Display for GrantSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Owner => "owner",
            Self::Party => "party",
            Self::PermissionLink => "permission_link",
            Self::AccessRequest => "access_request",
        };
        f.write_str(s)
    }
}

/// Per-endpoint maximum across approved grants.
pub fn effective_permissions(grants: &[PermissionSet]) -> PermissionSet {
    grants
        .iter()
        .fold(PermissionSet::default(), |acc, grant| acc.union(grant))
}

fn link_grants(link: LinkFact, endpoint: Endpoint, level: PermissionLevel) -> bool {
    link.is_valid()
        && level <= PermissionLevel::ReadOnly
        && matches!(
            endpoint,
            Endpoint::Shipment | Endpoint::Tracking | Endpoint::Telemetry | Endpoint::Tags
        )
}

fn access_requests_grant(grants: &[PermissionSet], endpoint: Endpoint, level: PermissionLevel) -> bool {
    if grants.is_empty() {
        return false;
    }
    let effective = effective_permissions(grants);
    if !effective.get(endpoint).satisfies(level) {
        return false;
    }
    endpoint != Endpoint::Tags || effective.shipment.satisfies(PermissionLevel::ReadOnly)
}

/// First source granting `level` on `endpoint`, in precedence order.
pub fn explain(facts: &GrantFacts, endpoint: Endpoint, level: PermissionLevel) -> Option<GrantSource> {
    if facts.is_owner {
        Some(GrantSource::Owner)
    } else if facts.is_party {
        Some(GrantSource::Party)
    } else if link_grants(facts.link, endpoint, level) {
        Some(GrantSource::PermissionLink)
    } else if access_requests_grant(&facts.grants, endpoint, level) {
        Some(GrantSource::AccessRequest)
    } else {
        None
    }
}

/// Whether the caller may access `endpoint` at `level`. Level NONE is
/// always granted.
pub fn authorize(facts: &GrantFacts, endpoint: Endpoint, level: PermissionLevel) -> bool {
    level == PermissionLevel::None || explain(facts, endpoint, level).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use PermissionLevel::{None as N, ReadOnly as RO, ReadWrite as RW};

    fn set(f: impl FnOnce(&mut PermissionSet)) -> PermissionSet {
        let mut s = PermissionSet::default();
        f(&mut s);
        s
    }

    #[test]
    fn nobody_gets_nothing() {
        let facts = GrantFacts::default();
        for endpoint in Endpoint::ALL {
            assert!(!authorize(&facts, endpoint, RO));
            assert!(authorize(&facts, endpoint, N));
        }
    }

    #[test]
    fn owner_and_party_get_everything() {
        for facts in [
            GrantFacts {
                is_owner: true,
                ..GrantFacts::default()
            },
            GrantFacts {
                is_party: true,
                ..GrantFacts::default()
            },
        ] {
            for endpoint in Endpoint::ALL {
                assert!(authorize(&facts, endpoint, RW));
            }
        }
    }

    #[test]
    fn valid_link_is_read_only_and_excludes_documents_and_notes() {
        let facts = GrantFacts::link_only(LinkFact::Valid);
        for endpoint in [
            Endpoint::Shipment,
            Endpoint::Tracking,
            Endpoint::Telemetry,
            Endpoint::Tags,
        ] {
            assert!(authorize(&facts, endpoint, RO), "{endpoint}");
            assert!(!authorize(&facts, endpoint, RW), "{endpoint}");
        }
        assert!(!authorize(&facts, Endpoint::Documents, RO));
        assert!(!authorize(&facts, Endpoint::Notes, RO));
        assert_eq!(
            explain(&facts, Endpoint::Shipment, RO),
            Some(GrantSource::PermissionLink)
        );
    }

    #[test]
    fn expired_link_grants_nothing() {
        let facts = GrantFacts::link_only(LinkFact::Expired);
        assert!(!authorize(&facts, Endpoint::Shipment, RO));
    }

    #[test]
    fn link_combines_with_access_request_for_write() {
        let facts = GrantFacts {
            link: LinkFact::Valid,
            grants: vec![set(|s| {
                s.shipment = RW;
            })],
            ..GrantFacts::default()
        };
        assert!(authorize(&facts, Endpoint::Shipment, RW));
        assert_eq!(
            explain(&facts, Endpoint::Shipment, RW),
            Some(GrantSource::AccessRequest)
        );
        assert_eq!(
            explain(&facts, Endpoint::Shipment, RO),
            Some(GrantSource::PermissionLink)
        );
    }

    #[test]
    fn access_request_levels() {
        let facts = GrantFacts {
            grants: vec![set(|s| {
                s.shipment = RO;
                s.documents = RW;
            })],
            ..GrantFacts::default()
        };
        assert!(authorize(&facts, Endpoint::Shipment, RO));
        assert!(!authorize(&facts, Endpoint::Shipment, RW));
        assert!(authorize(&facts, Endpoint::Documents, RW));
        assert!(!authorize(&facts, Endpoint::Notes, RO));
    }

    #[test]
    fn tags_require_shipment_read() {
        let without = GrantFacts {
            grants: vec![set(|s| s.tags = RW)],
            ..GrantFacts::default()
        };
        assert!(!authorize(&without, Endpoint::Tags, RO));

        let with = GrantFacts {
            grants: vec![set(|s| s.tags = RW), set(|s| s.shipment = RO)],
            ..GrantFacts::default()
        };
        assert!(authorize(&with, Endpoint::Tags, RW));
    }

    #[test]
    fn effective_is_union_of_grants() {
        let grants = vec![
            set(|s| {
                s.shipment = RO;
                s.notes = RW;
            }),
            set(|s| {
                s.shipment = RW;
                s.tracking = RO;
            }),
        ];
        let effective = effective_permissions(&grants);
        assert_eq!(effective.shipment, RW);
        assert_eq!(effective.notes, RW);
        assert_eq!(effective.tracking, RO);
        assert_eq!(effective.documents, N);
        assert_eq!(effective_permissions(&[]), PermissionSet::default());
    }

    fn arb_level() -> impl proptest::strategy::Strategy<Value = PermissionLevel> {
        proptest::prop_oneof![
            proptest::strategy::Just(N),
            proptest::strategy::Just(RO),
            proptest::strategy::Just(RW),
        ]
    }

    fn arb_set() -> impl proptest::strategy::Strategy<Value = PermissionSet> {
        use proptest::strategy::Strategy;
        proptest::collection::vec(arb_level(), 6).prop_map(|levels| {
            let mut s = PermissionSet::default();
            for (endpoint, level) in Endpoint::ALL.iter().zip(levels) {
                s.set(*endpoint, level);
            }
            s
        })
    }

    proptest::proptest! {
        #[test]
        fn effective_equals_per_endpoint_max(grants in proptest::collection::vec(arb_set(), 0..5)) {
            let effective = effective_permissions(&grants);
            for endpoint in Endpoint::ALL {
                let expected = grants.iter().map(|g| g.get(endpoint)).max().unwrap_or(N);
                proptest::prop_assert_eq!(effective.get(endpoint), expected);
            }
        }

        #[test]
        fn link_never_exceeds_read_only(level in arb_level()) {
            let facts = GrantFacts::link_only(LinkFact::Valid);
            for endpoint in Endpoint::ALL {
                if level == RW {
                    proptest::prop_assert!(!authorize(&facts, endpoint, level));
                }
            }
            proptest::prop_assert!(!authorize(&facts, Endpoint::Documents, RO));
        }

        #[test]
        fn adding_a_grant_never_removes_access(
            grants in proptest::collection::vec(arb_set(), 0..4),
            extra in arb_set(),
            level in arb_level(),
        ) {
            let before = GrantFacts { grants: grants.clone(), ..GrantFacts::default() };
            let mut more = grants;
            more.push(extra);
            let after = GrantFacts { grants: more, ..GrantFacts::default() };
            for endpoint in Endpoint::ALL {
                if authorize(&before, endpoint, level) {
                    proptest::prop_assert!(authorize(&after, endpoint, level));
                }
            }
        }
    }
}
