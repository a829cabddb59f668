//! Access-Control Resolver (C7) — the heart of the system.
//!
//! A single pure function, `evaluate`, composing C1/C3/C4/C6. No I/O: every
//! input is fetched by the caller and handed in, so this stays trivially
//! unit-testable and the quantified invariant
//! (`evaluate(u,a).allow ⇒ u ∈ {...}`) can be checked directly against it.

use uuid::Uuid;

use crate::artifacts::model::Visibility;
use crate::workspace::{Role, Workspace};

use super::model::{AccessRequest, AccessRequestStatus, NdaSignature};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Sbom,
    Document,
}

/// Everything about the item itself the resolver needs. `effectively_public`
/// is precomputed by the caller per §4.2 rule 3's definition ("own
/// visibility public AND every enclosing container is public").
#[derive(Debug, Clone, Copy)]
pub struct ArtifactContext {
    pub item_kind: ItemKind,
    pub component_visibility: Visibility,
    pub component_is_global: bool,
    pub effectively_public: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    PaymentSuspended,
    NotAuthorized,
    AccessRequired,
    AccessPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
    RequireNdaSignature(Uuid),
}

impl Decision {
    pub fn is_allow(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// `evaluate(caller, artifact) -> {allow, deny(reason), require_nda_signature}`.
///
/// Rules are evaluated top-down; the first match wins (§4.2).
pub fn evaluate(
    caller_role: Option<Role>,
    workspace: &Workspace,
    artifact: ArtifactContext,
    access_request: Option<&AccessRequest>,
    nda_signature: Option<&NdaSignature>,
    current_nda_content_hash: Option<&str>,
) -> Decision {
    // Rule 1: workspace suspended for payment.
    if workspace.payment_blocks_non_admin() && !is_owner_or_admin(caller_role) {
        return Decision::Deny(DenyReason::PaymentSuspended);
    }

    // Rule 2: a global document's Component is treated as public outright
    // (workspace-wide trust-center documents bypass project scoping).
    let global_document_override =
        artifact.item_kind == ItemKind::Document && artifact.component_is_global;

    // Rule 3: effectively public.
    if global_document_override || artifact.effectively_public {
        return Decision::Allow;
    }

    // Rule 4: owner/admin short-circuit.
    if is_owner_or_admin(caller_role) {
        return Decision::Allow;
    }

    // Rule 5: private.
    if artifact.component_visibility == Visibility::Private {
        return Decision::Deny(DenyReason::NotAuthorized);
    }

    // Rule 6: gated — the hard case.
    debug_assert_eq!(artifact.component_visibility, Visibility::Gated);
    evaluate_gated(workspace, access_request, nda_signature, current_nda_content_hash)
}

fn is_owner_or_admin(role: Option<Role>) -> bool {
    matches!(role, Some(r) if r.is_owner_or_admin())
}

fn evaluate_gated(
    workspace: &Workspace,
    access_request: Option<&AccessRequest>,
    nda_signature: Option<&NdaSignature>,
    current_nda_content_hash: Option<&str>,
) -> Decision {
    let approved = matches!(access_request, Some(r) if r.status == AccessRequestStatus::Approved);

    let Some(nda_document_id) = workspace.company_nda_document_id else {
        // No company NDA: an approved request is sufficient on its own.
        return if approved {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::AccessRequired)
        };
    };

    // A signature is only valid against the NDA's *current* document id and
    // content hash (§4.2 rule 6) — a prior signature against a since-replaced
    // document must re-prompt, not just one against a different document id.
    let signature_valid = match (nda_signature, current_nda_content_hash) {
        (Some(sig), Some(hash)) => sig.is_valid_for(nda_document_id, hash),
        _ => false,
    };

    match access_request {
        None => Decision::Deny(DenyReason::AccessRequired),
        Some(request) => match request.status {
            AccessRequestStatus::Approved => {
                if signature_valid {
                    Decision::Allow
                } else {
                    Decision::RequireNdaSignature(nda_document_id)
                }
            }
            AccessRequestStatus::Revoked | AccessRequestStatus::Rejected => {
                Decision::Deny(DenyReason::AccessRequired)
            }
            AccessRequestStatus::Pending => {
                if nda_signature.is_some() && !signature_valid {
                    Decision::RequireNdaSignature(nda_document_id)
                } else if nda_signature.is_none() {
                    Decision::RequireNdaSignature(nda_document_id)
                } else {
                    Decision::Deny(DenyReason::AccessPending)
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::model::{PlanLimits, SubscriptionStatus};
    use chrono::Utc;

    fn workspace(company_nda: Option<Uuid>, status: SubscriptionStatus) -> Workspace {
        Workspace {
            id: Uuid::new_v4(),
            key: "wk".into(),
            name: "Acme".into(),
            billing_plan_key: "community".into(),
            plan_limits: PlanLimits {
                subscription_status: status,
                ..PlanLimits::community_defaults()
            },
            custom_domain: None,
            custom_domain_validated: false,
            custom_domain_last_checked_at: None,
            custom_domain_verification_failures: 0,
            branding: Default::default(),
            company_nda_document_id: company_nda,
            contacts: Default::default(),
            created_at: Utc::now(),
        }
    }

    fn public_artifact() -> ArtifactContext {
        ArtifactContext {
            item_kind: ItemKind::Sbom,
            component_visibility: Visibility::Public,
            component_is_global: false,
            effectively_public: true,
        }
    }

    fn private_artifact() -> ArtifactContext {
        ArtifactContext {
            item_kind: ItemKind::Sbom,
            component_visibility: Visibility::Private,
            component_is_global: false,
            effectively_public: false,
        }
    }

    fn gated_artifact() -> ArtifactContext {
        ArtifactContext {
            item_kind: ItemKind::Sbom,
            component_visibility: Visibility::Gated,
            component_is_global: false,
            effectively_public: false,
        }
    }

    #[test]
    fn public_is_always_allowed_even_anonymous() {
        let ws = workspace(None, SubscriptionStatus::Active);
        let decision = evaluate(None, &ws, public_artifact(), None, None, None);
        assert!(decision.is_allow());
    }

    #[test]
    fn private_denies_anonymous_and_guests() {
        let ws = workspace(None, SubscriptionStatus::Active);
        assert_eq!(
            evaluate(None, &ws, private_artifact(), None, None, None),
            Decision::Deny(DenyReason::NotAuthorized)
        );
        assert_eq!(
            evaluate(Some(Role::Guest), &ws, private_artifact(), None, None, None),
            Decision::Deny(DenyReason::NotAuthorized)
        );
    }

    #[test]
    fn owner_bypasses_private_and_gated() {
        let ws = workspace(None, SubscriptionStatus::Active);
        assert!(evaluate(Some(Role::Owner), &ws, private_artifact(), None, None, None).is_allow());
        assert!(evaluate(Some(Role::Owner), &ws, gated_artifact(), None, None, None).is_allow());
    }

    #[test]
    fn payment_suspended_blocks_non_admins_but_not_owner() {
        let ws = workspace(None, SubscriptionStatus::PastDue);
        assert_eq!(
            evaluate(Some(Role::Member), &ws, public_artifact(), None, None, None),
            Decision::Deny(DenyReason::PaymentSuspended)
        );
        assert!(evaluate(Some(Role::Owner), &ws, public_artifact(), None, None, None).is_allow());
    }

    #[test]
    fn gated_without_company_nda_allows_on_approved_request_alone() {
        let ws = workspace(None, SubscriptionStatus::Active);
        let request = AccessRequest {
            id: Uuid::new_v4(),
            workspace_id: ws.id,
            user_id: Uuid::new_v4(),
            status: AccessRequestStatus::Approved,
            requested_at: Utc::now(),
            decided_at: Some(Utc::now()),
            decided_by: None,
            revoked_at: None,
            revoked_by: None,
        };
        assert!(evaluate(Some(Role::Guest), &ws, gated_artifact(), Some(&request), None, None).is_allow());
    }

    #[test]
    fn gated_with_company_nda_requires_valid_signature() {
        let nda_id = Uuid::new_v4();
        let ws = workspace(Some(nda_id), SubscriptionStatus::Active);
        let request = AccessRequest {
            id: Uuid::new_v4(),
            workspace_id: ws.id,
            user_id: Uuid::new_v4(),
            status: AccessRequestStatus::Approved,
            requested_at: Utc::now(),
            decided_at: Some(Utc::now()),
            decided_by: None,
            revoked_at: None,
            revoked_by: None,
        };

        // No signature at all.
        assert_eq!(
            evaluate(Some(Role::Guest), &ws, gated_artifact(), Some(&request), None, Some("current-hash")),
            Decision::RequireNdaSignature(nda_id)
        );

        // Stale signature against a different (now-superseded) NDA document.
        let stale_signature = NdaSignature {
            access_request_id: request.id,
            nda_document_id: Uuid::new_v4(),
            nda_content_hash: "old-hash".into(),
            signed_name: "A Signer".into(),
            signed_at: Utc::now(),
            ip_address: "127.0.0.1".into(),
            user_agent: "test".into(),
        };
        assert_eq!(
            evaluate(
                Some(Role::Guest),
                &ws,
                gated_artifact(),
                Some(&request),
                Some(&stale_signature),
                Some("current-hash")
            ),
            Decision::RequireNdaSignature(nda_id)
        );

        // Same document id but content has since changed underneath it.
        let same_doc_stale_hash = NdaSignature {
            nda_document_id: nda_id,
            nda_content_hash: "old-hash".into(),
            ..stale_signature.clone()
        };
        assert_eq!(
            evaluate(
                Some(Role::Guest),
                &ws,
                gated_artifact(),
                Some(&request),
                Some(&same_doc_stale_hash),
                Some("current-hash")
            ),
            Decision::RequireNdaSignature(nda_id)
        );

        // Valid signature against the current NDA document and content hash.
        let valid_signature = NdaSignature {
            nda_document_id: nda_id,
            nda_content_hash: "current-hash".into(),
            ..stale_signature
        };
        assert!(evaluate(
            Some(Role::Guest),
            &ws,
            gated_artifact(),
            Some(&request),
            Some(&valid_signature),
            Some("current-hash")
        )
        .is_allow());
    }

    #[test]
    fn pending_request_denies_access_pending_when_no_nda_needed() {
        let ws = workspace(None, SubscriptionStatus::Active);
        let request = AccessRequest {
            id: Uuid::new_v4(),
            workspace_id: ws.id,
            user_id: Uuid::new_v4(),
            status: AccessRequestStatus::Pending,
            requested_at: Utc::now(),
            decided_at: None,
            decided_by: None,
            revoked_at: None,
            revoked_by: None,
        };
        assert_eq!(
            evaluate(None, &ws, gated_artifact(), Some(&request), None, None),
            Decision::Deny(DenyReason::AccessPending)
        );
    }

    #[test]
    fn revoked_request_always_denies() {
        let ws = workspace(None, SubscriptionStatus::Active);
        let request = AccessRequest {
            id: Uuid::new_v4(),
            workspace_id: ws.id,
            user_id: Uuid::new_v4(),
            status: AccessRequestStatus::Revoked,
            requested_at: Utc::now(),
            decided_at: Some(Utc::now()),
            decided_by: None,
            revoked_at: Some(Utc::now()),
            revoked_by: None,
        };
        assert_eq!(
            evaluate(None, &ws, gated_artifact(), Some(&request), None, None),
            Decision::Deny(DenyReason::AccessRequired)
        );
    }

    #[test]
    fn global_document_is_treated_as_public_regardless_of_visibility() {
        let ws = workspace(None, SubscriptionStatus::Active);
        let artifact = ArtifactContext {
            item_kind: ItemKind::Document,
            component_visibility: Visibility::Private,
            component_is_global: true,
            effectively_public: false,
        };
        assert!(evaluate(None, &ws, artifact, None, None, None).is_allow());
    }
}
