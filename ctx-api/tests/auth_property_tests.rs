//! Property tests over the auth layer as the tool surface uses it: the
//! capability matrix, the agent hard-delete ban, and author attribution.

use ctx_auth::{resolve_author, Capability, CapabilityMatrix, Principal};
use ctx_core::{AuthorType, Role};
use ctx_test_utils::generators::{arb_author_type, arb_principal, arb_role};
use proptest::prelude::*;

/// Every capability, for exhaustive matrix sweeps.
const ALL_CAPABILITIES: [Capability; 10] = [
    Capability::RetrieveContext,
    Capability::QueryGraphRead,
    Capability::QueryGraphWrite,
    Capability::Tools,
    Capability::Health,
    Capability::GetAgentState,
    Capability::StoreContext,
    Capability::UpdateScratchpad,
    Capability::ForgetContext,
    Capability::DeleteContext,
];

proptest! {
    /// No agent principal ever authorizes a hard delete, regardless of role.
    #[test]
    fn agents_never_authorize_hard_delete(principal in arb_principal()) {
        prop_assume!(principal.is_agent);
        prop_assert!(principal.authorize(Capability::DeleteContext).is_err());
    }

    /// A human admin is the only principal shape that can hard delete.
    #[test]
    fn only_human_admins_authorize_hard_delete(principal in arb_principal()) {
        let allowed = principal.authorize(Capability::DeleteContext).is_ok();
        prop_assert_eq!(allowed, principal.role == Role::Admin && !principal.is_agent);
    }

    /// Capabilities grow monotonically along guest < reader < writer < admin,
    /// hard-delete excepted (it also depends on `is_agent`).
    #[test]
    fn roles_are_monotonic_in_capability(role in arb_role()) {
        let wider = match role {
            Role::Guest => Role::Reader,
            Role::Reader => Role::Writer,
            Role::Writer => Role::Admin,
            Role::Admin => Role::Admin,
        };
        for capability in ALL_CAPABILITIES {
            if role.can(capability) {
                prop_assert!(
                    wider.can(capability),
                    "{:?} grants {:?} but {:?} does not",
                    role,
                    capability,
                    wider
                );
            }
        }
    }

    /// Guests hold exactly the tools/health capabilities.
    #[test]
    fn guests_hold_only_tools_and_health(is_agent in any::<bool>()) {
        let principal = Principal { id: "g".to_string(), role: Role::Guest, is_agent };
        for capability in ALL_CAPABILITIES {
            let expected = matches!(capability, Capability::Tools | Capability::Health);
            prop_assert_eq!(principal.authorize(capability).is_ok(), expected);
        }
    }

    /// An agent principal can never end up attributed as a human author,
    /// whatever it claims in the request payload.
    #[test]
    fn agent_authorship_claims_are_overridden(
        principal in arb_principal(),
        claimed in proptest::option::of(arb_author_type()),
        author in proptest::option::of("[a-z]{1,12}"),
    ) {
        prop_assume!(principal.is_agent);
        let (_, resolved_type) = resolve_author(&principal, author, claimed);
        prop_assert_eq!(resolved_type, AuthorType::Agent);
    }

    /// Absent an explicit author, attribution falls back to the principal.
    #[test]
    fn attribution_defaults_to_the_principal(principal in arb_principal()) {
        let (author, author_type) = resolve_author(&principal, None, None);
        prop_assert_eq!(author, principal.id.clone());
        prop_assert_eq!(author_type, principal.author_type());
    }
}
