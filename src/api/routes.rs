//! Route table for the surface named in §6.
//!
//! `resolve_request_context` runs first (host admission + caller
//! resolution), ahead of the generic request-id/logging/security-header
//! layers so that downstream middleware can see the resolved caller if it
//! ever needs to.

use axum::{
    middleware::from_fn,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
    Router,
};

use super::handlers::*;
use super::middleware::{
    cors_layer, request_id_middleware, request_logging_middleware, request_size_limit_middleware,
    resolve_request_context, security_headers_middleware,
};
use super::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let artifact_routes = Router::new()
        .route("/artifact/cyclonedx/:component_id", post(upload_sbom))
        .route("/artifact/spdx/:component_id", post(upload_sbom))
        .route(
            "/artifact/document/:component_id",
            post(upload_document),
        )
        .route("/:sbom_id", get(get_sbom).delete(delete_sbom))
        .route("/:sbom_id/download", get(download_sbom))
        .route("/:sbom_id/download/signed", get(download_sbom_signed))
        .route("/documents/:document_id", get(get_document))
        .route("/documents/:document_id/download", get(download_document))
        .route("/documents/:document_id/download/signed", get(download_document_signed));

    let resource_routes = Router::new()
        .route("/teams/:team_key/products", post(create_product))
        .route("/teams/:team_key/projects", post(create_project))
        .route("/teams/:team_key/components", post(create_component))
        .route("/components/:component_id", delete(delete_component));

    let visibility_routes = Router::new()
        .route("/components/:id", patch(patch_component_visibility))
        .route("/projects/:id", patch(patch_project_public))
        .route("/products/:id", patch(patch_product_public));

    let access_routes = Router::new()
        .route("/teams/:team_key/access-request", post(create_access_request))
        .route(
            "/teams/:team_key/access-request/:id/sign-nda",
            post(sign_nda),
        )
        .route("/access-requests/:id/approve", post(approve_access_request))
        .route("/access-requests/:id/reject", post(reject_access_request))
        .route("/access-requests/:id/revoke", post(revoke_access_request));

    let billing_routes = Router::new()
        .route("/billing/webhook", post(billing_webhook))
        .route("/billing/checkout-return", get(checkout_return));

    let release_routes = Router::new()
        .route("/teams/:team_key/releases", post(create_release))
        .route(
            "/teams/:team_key/releases/:release_id",
            patch(update_release).delete(delete_release),
        )
        .route("/teams/:team_key/releases/:release_id/compose", get(compose_release))
        .route("/teams/:team_key/releases/:release_id/artifacts", post(add_release_artifact))
        .route(
            "/teams/:team_key/products/:product_id/releases/latest",
            get(get_latest_release),
        );

    let workspace_routes = Router::new()
        .route("/teams", post(create_workspace))
        .route("/teams/:team_key", patch(rename_workspace).delete(delete_workspace))
        .route("/teams/:team_key/default", post(set_default_workspace))
        .route("/teams/:team_key/invitations", post(create_invitation))
        .route("/invitations/accept", post(accept_invitation))
        .route("/invitations/decline", post(decline_invitation))
        .route("/teams/:team_key/members/role", post(change_role))
        .route("/teams/:team_key/members/:target_user_id", delete(remove_member))
        .route("/memberships", get(list_memberships));

    let internal_routes = Router::new()
        .route("/internal/domains", get(internal_domain_check))
        .route("/identity-webhook", post(identity_webhook));

    let api_v1 = Router::new()
        .merge(artifact_routes)
        .merge(resource_routes)
        .merge(visibility_routes)
        .merge(access_routes)
        .merge(billing_routes)
        .merge(release_routes)
        .merge(workspace_routes)
        .merge(internal_routes);

    Router::new()
        .nest("/api/v1", api_v1)
        .route(
            "/.well-known/com.sbomify.domain-check",
            get(domain_check_probe),
        )
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_logging_middleware))
        .layer(from_fn_with_state(state.clone(), resolve_request_context))
        .layer(from_fn(request_size_limit_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(cors_layer())
        .with_state(state)
}
