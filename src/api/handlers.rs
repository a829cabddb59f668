//! Request handlers for the `/api/v1/` surface named in §6.
//!
//! Every handler follows the same shape: resolve the caller's membership
//! role against the resource's owning workspace, run the relevant domain
//! operation, and let [`crate::error::AppError`]'s `IntoResponse` impl do
//! the status-code mapping. Handlers never duplicate invariant checks the
//! domain layer already owns.

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, State},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::{self, ArtifactContext, ItemKind};
use crate::artifacts::{self, Visibility};
use crate::error::{AppError, AppResult};
use crate::identity::Caller;
use crate::release;
use crate::signing;
use crate::workspace::{self, Role};

use super::responses::{ApiResponse, Created};
use super::state::AppState;

fn require_user(caller: &Caller) -> AppResult<Uuid> {
    caller.user_id().ok_or(AppError::NotAuthenticated)
}

async fn member_role(state: &AppState, workspace_id: Uuid, user_id: Uuid) -> AppResult<Role> {
    workspace::store::find_membership(&state.pool, workspace_id, user_id)
        .await?
        .map(|m| m.role)
        .ok_or_else(|| AppError::NotAuthorized("not a member of this workspace".into()))
}

// ---------------------------------------------------------------------
// SBOM / document upload (C8)
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub name: String,
    pub version: String,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "api".to_string()
}

#[derive(Debug, Serialize)]
pub struct IdBody {
    pub id: Uuid,
}

/// Shared by `POST /artifact/cyclonedx/{component_id}` and
/// `POST /artifact/spdx/{component_id}` — the format is detected from the
/// payload itself (§4.5), so both routes dispatch here identically.
pub async fn upload_sbom(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(component_id): Path<Uuid>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> AppResult<Created<IdBody>> {
    let user_id = require_user(&caller)?;
    let component = artifacts::store::fetch_component(&state.pool, component_id).await?;
    let role = member_role(&state, component.workspace_id, user_id).await?;
    if !role.allows(workspace::Action::CreateArtifacts) {
        return Err(AppError::NotAuthorized("cannot upload artifacts to this workspace".into()));
    }

    let sbom = artifacts::store::upload_sbom(
        &state.pool,
        state.object_store.as_ref(),
        state.broadcaster.as_ref(),
        component.workspace_id,
        component_id,
        &query.name,
        &query.version,
        &body,
        &query.source,
    )
    .await?;

    Ok(Created(IdBody { id: sbom.id }))
}

#[derive(Debug, Deserialize)]
pub struct UploadDocumentQuery {
    pub name: String,
    pub version: String,
    pub document_type: String,
    #[serde(default)]
    pub compliance_subcategory: Option<String>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

pub async fn upload_document(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(component_id): Path<Uuid>,
    Query(query): Query<UploadDocumentQuery>,
    body: Bytes,
) -> AppResult<Created<IdBody>> {
    let user_id = require_user(&caller)?;
    let component = artifacts::store::fetch_component(&state.pool, component_id).await?;
    let role = member_role(&state, component.workspace_id, user_id).await?;
    if !role.allows(workspace::Action::CreateArtifacts) {
        return Err(AppError::NotAuthorized("cannot upload artifacts to this workspace".into()));
    }

    let document = artifacts::store::upload_document(
        &state.pool,
        state.object_store.as_ref(),
        state.broadcaster.as_ref(),
        component.workspace_id,
        component_id,
        &query.name,
        &query.version,
        &query.document_type,
        query.compliance_subcategory.as_deref(),
        &query.content_type,
        &body,
        &query.source,
    )
    .await?;

    Ok(Created(IdBody { id: document.id }))
}

// ---------------------------------------------------------------------
// SBOM read / download (§4.2, §4.7)
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SbomBody {
    pub id: Uuid,
    pub component_id: Uuid,
    pub name: String,
    pub version: String,
    pub format: crate::artifacts::SbomFormat,
    pub format_version: String,
}

/// Shared by `authorize_sbom_read`/`authorize_document_read`: resolve the
/// caller's standing against a Component and run it through the resolver
/// (§4.2). Both items hang the same containment/visibility/gating rules off
/// their owning Component; only `item_kind` (the global-document override)
/// differs.
async fn authorize_component_read(
    state: &AppState,
    component: &artifacts::Component,
    item_kind: ItemKind,
    caller: &Caller,
) -> AppResult<()> {
    let workspace = workspace::store::fetch_workspace(&state.pool, component.workspace_id).await?;

    let caller_role = match caller.user_id() {
        Some(uid) => workspace::store::find_membership(&state.pool, workspace.id, uid).await?.map(|m| m.role),
        None => None,
    };
    let effectively_public = artifacts::store::is_effectively_public(&state.pool, component).await?;

    let access_request = match caller.user_id() {
        Some(uid) => access::request::fetch(&state.pool, workspace.id, uid).await?,
        None => None,
    };
    let nda_signature = match &access_request {
        Some(ar) => access::request::fetch_signature(&state.pool, ar.id).await?,
        None => None,
    };
    let current_nda_content_hash = match workspace.company_nda_document_id {
        Some(doc_id) => sqlx::query_scalar!("SELECT content_hash FROM documents WHERE id = $1", doc_id)
            .fetch_optional(&state.pool)
            .await?,
        None => None,
    };

    let ctx = ArtifactContext {
        item_kind,
        component_visibility: component.visibility,
        component_is_global: component.is_global,
        effectively_public,
    };
    let decision = access::evaluate(
        caller_role,
        &workspace,
        ctx,
        access_request.as_ref(),
        nda_signature.as_ref(),
        current_nda_content_hash.as_deref(),
    );
    if !decision.is_allow() {
        return Err(decision.into());
    }
    Ok(())
}

async fn authorize_sbom_read(
    state: &AppState,
    sbom_id: Uuid,
    caller: &Caller,
) -> AppResult<(artifacts::Sbom, artifacts::Component)> {
    let sbom = artifacts::store::fetch_sbom(&state.pool, sbom_id).await?;
    let component = artifacts::store::fetch_component(&state.pool, sbom.component_id).await?;
    authorize_component_read(state, &component, ItemKind::Sbom, caller).await?;
    Ok((sbom, component))
}

async fn authorize_document_read(
    state: &AppState,
    document_id: Uuid,
    caller: &Caller,
) -> AppResult<(artifacts::Document, artifacts::Component)> {
    let document = artifacts::store::fetch_document(&state.pool, document_id).await?;
    let component = artifacts::store::fetch_component(&state.pool, document.component_id).await?;
    authorize_component_read(state, &component, ItemKind::Document, caller).await?;
    Ok((document, component))
}

pub async fn get_sbom(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(sbom_id): Path<Uuid>,
) -> AppResult<ApiResponse<SbomBody>> {
    let (sbom, component) = authorize_sbom_read(&state, sbom_id, &caller).await?;
    Ok(ApiResponse::ok(SbomBody {
        id: sbom.id,
        component_id: component.id,
        name: sbom.name,
        version: sbom.version,
        format: sbom.format,
        format_version: sbom.format_version,
    }))
}

pub async fn download_sbom(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(sbom_id): Path<Uuid>,
) -> AppResult<Response> {
    let (sbom, _) = authorize_sbom_read(&state, sbom_id, &caller).await?;
    let bytes = state.object_store.get(&sbom.storage_filename).await.map_err(AppError::internal)?;
    Ok(bytes.into_response())
}

#[derive(Debug, Deserialize)]
pub struct SignedDownloadQuery {
    pub token: String,
}

/// `GET /{sbom_id}/download/signed?token=<T>` — no session required (§4.7).
/// The token only proves the URL was minted for a given user at mint time;
/// that account must still resolve and be active now.
pub async fn download_sbom_signed(
    State(state): State<AppState>,
    Path(sbom_id): Path<Uuid>,
    Query(query): Query<SignedDownloadQuery>,
) -> AppResult<Response> {
    let verified = signing::verify(&query.token, sbom_id, &state.config.signed_url_secret)?;

    let active: bool = sqlx::query_scalar!("SELECT is_active FROM users WHERE id = $1", verified.user_id)
        .fetch_optional(&state.pool)
        .await?
        .unwrap_or(false);
    if !active {
        return Err(AppError::NotAuthorized("invalid or expired link".into()));
    }

    let sbom = artifacts::store::fetch_sbom(&state.pool, sbom_id).await?;
    let bytes = state.object_store.get(&sbom.storage_filename).await.map_err(AppError::internal)?;
    Ok(bytes.into_response())
}

// ---------------------------------------------------------------------
// Document read / download (§4.2, §4.7)
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct DocumentBody {
    pub id: Uuid,
    pub component_id: Uuid,
    pub name: String,
    pub version: String,
    pub document_type: String,
    pub compliance_subcategory: Option<String>,
    pub content_type: String,
    pub file_size: i64,
}

pub async fn get_document(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(document_id): Path<Uuid>,
) -> AppResult<ApiResponse<DocumentBody>> {
    let (document, component) = authorize_document_read(&state, document_id, &caller).await?;
    Ok(ApiResponse::ok(DocumentBody {
        id: document.id,
        component_id: component.id,
        name: document.name,
        version: document.version,
        document_type: document.document_type,
        compliance_subcategory: document.compliance_subcategory,
        content_type: document.content_type,
        file_size: document.file_size,
    }))
}

pub async fn download_document(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Response> {
    let (document, _) = authorize_document_read(&state, document_id, &caller).await?;
    let bytes = state.object_store.get(&document.storage_filename).await.map_err(AppError::internal)?;
    Ok(bytes.into_response())
}

/// `GET /documents/{document_id}/download/signed?token=<T>` — mirrors
/// [`download_sbom_signed`] (§4.7).
pub async fn download_document_signed(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Query(query): Query<SignedDownloadQuery>,
) -> AppResult<Response> {
    let verified = signing::verify(&query.token, document_id, &state.config.signed_url_secret)?;

    let active: bool = sqlx::query_scalar!("SELECT is_active FROM users WHERE id = $1", verified.user_id)
        .fetch_optional(&state.pool)
        .await?
        .unwrap_or(false);
    if !active {
        return Err(AppError::NotAuthorized("invalid or expired link".into()));
    }

    let document = artifacts::store::fetch_document(&state.pool, document_id).await?;
    let bytes = state.object_store.get(&document.storage_filename).await.map_err(AppError::internal)?;
    Ok(bytes.into_response())
}

// ---------------------------------------------------------------------
// Product / Project / Component lifecycle (C8 write side)
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateNamedResource {
    pub name: String,
    pub slug: String,
}

pub async fn create_product(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(team_key): Path<String>,
    axum::Json(body): axum::Json<CreateNamedResource>,
) -> AppResult<Created<IdBody>> {
    let user_id = require_user(&caller)?;
    let workspace = workspace::store::fetch_workspace_by_key(&state.pool, &team_key).await?;
    let role = member_role(&state, workspace.id, user_id).await?;
    if !role.allows(workspace::Action::CreateArtifacts) {
        return Err(AppError::NotAuthorized("cannot create products in this workspace".into()));
    }
    let product =
        artifacts::store::create_product(&state.pool, state.config.billing_enabled, &workspace, &body.name, &body.slug)
            .await?;
    Ok(Created(IdBody { id: product.id }))
}

pub async fn create_project(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(team_key): Path<String>,
    axum::Json(body): axum::Json<CreateNamedResource>,
) -> AppResult<Created<IdBody>> {
    let user_id = require_user(&caller)?;
    let workspace = workspace::store::fetch_workspace_by_key(&state.pool, &team_key).await?;
    let role = member_role(&state, workspace.id, user_id).await?;
    if !role.allows(workspace::Action::CreateArtifacts) {
        return Err(AppError::NotAuthorized("cannot create projects in this workspace".into()));
    }
    let project =
        artifacts::store::create_project(&state.pool, state.config.billing_enabled, &workspace, &body.name, &body.slug)
            .await?;
    Ok(Created(IdBody { id: project.id }))
}

#[derive(Debug, Deserialize)]
pub struct CreateComponentBody {
    pub name: String,
    pub slug: String,
    pub component_type: artifacts::ComponentType,
    #[serde(default)]
    pub is_global: bool,
}

pub async fn create_component(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(team_key): Path<String>,
    axum::Json(body): axum::Json<CreateComponentBody>,
) -> AppResult<Created<IdBody>> {
    let user_id = require_user(&caller)?;
    let workspace = workspace::store::fetch_workspace_by_key(&state.pool, &team_key).await?;
    let role = member_role(&state, workspace.id, user_id).await?;
    if !role.allows(workspace::Action::CreateArtifacts) {
        return Err(AppError::NotAuthorized("cannot create components in this workspace".into()));
    }
    let component = artifacts::store::create_component(
        &state.pool,
        state.config.billing_enabled,
        &workspace,
        &body.name,
        &body.slug,
        body.component_type,
        body.is_global,
    )
    .await?;
    Ok(Created(IdBody { id: component.id }))
}

pub async fn delete_component(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(component_id): Path<Uuid>,
) -> AppResult<ApiResponse<()>> {
    let user_id = require_user(&caller)?;
    let component = artifacts::store::fetch_component(&state.pool, component_id).await?;
    let role = member_role(&state, component.workspace_id, user_id).await?;
    if !role.is_owner_or_admin() {
        return Err(AppError::NotAuthorized("only owners/admins may delete components".into()));
    }
    artifacts::store::delete_component(&state.pool, component_id).await?;
    Ok(ApiResponse::ok(()))
}

pub async fn delete_sbom(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(sbom_id): Path<Uuid>,
) -> AppResult<ApiResponse<()>> {
    let user_id = require_user(&caller)?;
    let sbom = artifacts::store::fetch_sbom(&state.pool, sbom_id).await?;
    let component = artifacts::store::fetch_component(&state.pool, sbom.component_id).await?;
    let role = member_role(&state, component.workspace_id, user_id).await?;
    if !role.allows(workspace::Action::CreateArtifacts) {
        return Err(AppError::NotAuthorized("cannot delete artifacts in this workspace".into()));
    }
    artifacts::store::delete_sbom(&state.pool, state.broadcaster.as_ref(), component.workspace_id, sbom_id).await?;
    Ok(ApiResponse::ok(()))
}

// ---------------------------------------------------------------------
// Visibility PATCH endpoints (§3.1)
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SetVisibility {
    pub visibility: Visibility,
}

#[derive(Debug, Deserialize)]
pub struct SetPublic {
    pub is_public: bool,
}

pub async fn patch_component_visibility(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(component_id): Path<Uuid>,
    axum::Json(body): axum::Json<SetVisibility>,
) -> AppResult<ApiResponse<()>> {
    let user_id = require_user(&caller)?;
    let component = artifacts::store::fetch_component(&state.pool, component_id).await?;
    let workspace = workspace::store::fetch_workspace(&state.pool, component.workspace_id).await?;
    let role = member_role(&state, workspace.id, user_id).await?;
    if !role.is_owner_or_admin() {
        return Err(AppError::NotAuthorized("only owners/admins may change visibility".into()));
    }
    artifacts::store::set_component_visibility(&state.pool, component_id, body.visibility, &workspace.billing_plan_key).await?;
    Ok(ApiResponse::ok(()))
}

pub async fn patch_project_public(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(project_id): Path<Uuid>,
    axum::Json(body): axum::Json<SetPublic>,
) -> AppResult<ApiResponse<()>> {
    let user_id = require_user(&caller)?;
    let workspace_id: Uuid = sqlx::query_scalar!("SELECT workspace_id FROM projects WHERE id = $1", project_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("project".into()))?;
    let workspace = workspace::store::fetch_workspace(&state.pool, workspace_id).await?;
    let role = member_role(&state, workspace_id, user_id).await?;
    if !role.is_owner_or_admin() {
        return Err(AppError::NotAuthorized("only owners/admins may change visibility".into()));
    }
    artifacts::store::set_project_public(&state.pool, project_id, body.is_public, &workspace.billing_plan_key).await?;
    Ok(ApiResponse::ok(()))
}

pub async fn patch_product_public(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(product_id): Path<Uuid>,
    axum::Json(body): axum::Json<SetPublic>,
) -> AppResult<ApiResponse<()>> {
    let user_id = require_user(&caller)?;
    let workspace_id: Uuid = sqlx::query_scalar!("SELECT workspace_id FROM products WHERE id = $1", product_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("product".into()))?;
    let workspace = workspace::store::fetch_workspace(&state.pool, workspace_id).await?;
    let role = member_role(&state, workspace_id, user_id).await?;
    if !role.is_owner_or_admin() {
        return Err(AppError::NotAuthorized("only owners/admins may change visibility".into()));
    }
    artifacts::store::set_product_public(&state.pool, product_id, body.is_public, &workspace.billing_plan_key).await?;
    Ok(ApiResponse::ok(()))
}

// ---------------------------------------------------------------------
// Access-request / NDA lifecycle (C6)
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct AccessRequestBody {
    pub id: Uuid,
    pub status: access::AccessRequestStatus,
}

pub async fn create_access_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(team_key): Path<String>,
) -> AppResult<Created<AccessRequestBody>> {
    let user_id = require_user(&caller)?;
    let workspace = workspace::store::fetch_workspace_by_key(&state.pool, &team_key).await?;
    let request = access::request::create(&state.pool, workspace.id, user_id).await?;
    Ok(Created(AccessRequestBody { id: request.id, status: request.status }))
}

#[derive(Debug, Deserialize)]
pub struct SignNdaBody {
    pub nda_document_id: Uuid,
    pub content_hash: String,
    pub signed_name: String,
    pub consent: bool,
}

pub async fn sign_nda(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Path((_team_key, access_request_id)): Path<(String, Uuid)>,
    axum::Json(body): axum::Json<SignNdaBody>,
) -> AppResult<ApiResponse<()>> {
    let ip_address = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    access::request::sign_nda(
        &state.pool,
        state.broadcaster.as_ref(),
        &state.pending_counts,
        access_request_id,
        body.nda_document_id,
        &body.content_hash,
        &body.signed_name,
        body.consent,
        &ip_address,
        &user_agent,
    )
    .await?;
    Ok(ApiResponse::ok(()))
}

async fn actor_role_for(state: &AppState, caller: &Caller, access_request_id: Uuid) -> AppResult<(Role, Uuid)> {
    let user_id = require_user(caller)?;
    let workspace_id: Uuid = sqlx::query_scalar!(
        "SELECT workspace_id FROM access_requests WHERE id = $1",
        access_request_id
    )
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("access request".into()))?;
    let role = member_role(state, workspace_id, user_id).await?;
    Ok((role, user_id))
}

pub async fn approve_access_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(access_request_id): Path<Uuid>,
) -> AppResult<ApiResponse<()>> {
    let (role, user_id) = actor_role_for(&state, &caller, access_request_id).await?;
    access::request::approve(&state.pool, state.broadcaster.as_ref(), &state.pending_counts, role, user_id, access_request_id).await?;
    Ok(ApiResponse::ok(()))
}

pub async fn reject_access_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(access_request_id): Path<Uuid>,
) -> AppResult<ApiResponse<()>> {
    let (role, user_id) = actor_role_for(&state, &caller, access_request_id).await?;
    access::request::reject(&state.pool, state.broadcaster.as_ref(), &state.pending_counts, role, user_id, access_request_id).await?;
    Ok(ApiResponse::ok(()))
}

pub async fn revoke_access_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(access_request_id): Path<Uuid>,
) -> AppResult<ApiResponse<()>> {
    let (role, user_id) = actor_role_for(&state, &caller, access_request_id).await?;
    access::request::revoke(&state.pool, state.broadcaster.as_ref(), &state.pending_counts, role, user_id, access_request_id).await?;
    Ok(ApiResponse::ok(()))
}

// ---------------------------------------------------------------------
// Billing webhook and checkout return (C5)
// ---------------------------------------------------------------------

pub async fn billing_webhook(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> AppResult<ApiResponse<()>> {
    let signature = headers
        .get("X-Webhook-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::NotAuthorized("missing webhook signature".into()))?;

    if !crate::billing::sync::verify_webhook_signature(&state.config.payments_webhook_secret, &body, signature) {
        return Err(AppError::NotAuthorized("bad webhook signature".into()));
    }

    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::InvalidInput(format!("malformed webhook body: {e}")))?;
    let event_type = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| AppError::InvalidInput("missing event type".into()))?;
    let event_body = value.get("data").unwrap_or(&value);

    crate::billing::sync::apply_webhook_event(
        &state.pool,
        crate::billing::sync::WebhookEvent { event_type, body: event_body },
    )
    .await?;

    Ok(ApiResponse::ok(()))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutReturnQuery {
    pub session_id: String,
}

pub async fn checkout_return(
    State(state): State<AppState>,
    Query(query): Query<CheckoutReturnQuery>,
) -> AppResult<ApiResponse<()>> {
    crate::billing::sync::handle_checkout_return(&state.pool, state.payments_provider.as_ref(), &query.session_id).await?;
    Ok(ApiResponse::ok(()))
}

// ---------------------------------------------------------------------
// Internal domain check (unauthenticated, edge layer)
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DomainQuery {
    pub domain: String,
}

/// `GET /api/v1/internal/domains?domain=<host>` — 200 if `host` is the
/// configured app base URL host or a paid-plan workspace's custom domain;
/// 404 otherwise (§6).
pub async fn internal_domain_check(
    State(state): State<AppState>,
    Query(query): Query<DomainQuery>,
) -> AppResult<ApiResponse<()>> {
    if state.config.static_host_allow_list().iter().any(|h| h == &query.domain) {
        return Ok(ApiResponse::ok(()));
    }

    let plan_key: Option<String> = sqlx::query_scalar!(
        "SELECT billing_plan_key FROM workspaces WHERE custom_domain = $1",
        query.domain
    )
    .fetch_optional(&state.pool)
    .await?;

    match plan_key {
        Some(key) if key != "community" => Ok(ApiResponse::ok(())),
        _ => Err(AppError::NotFound("domain".into())),
    }
}

/// `/.well-known/com.sbomify.domain-check` (§4.8).
pub async fn domain_check_probe(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> AppResult<Response> {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let response = state.host_admission.domain_check(host).await?;
    Ok(axum::Json(response).into_response())
}

// ---------------------------------------------------------------------
// Release composition (C9)
// ---------------------------------------------------------------------

pub async fn compose_release(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((team_key, release_id)): Path<(String, Uuid)>,
) -> AppResult<ApiResponse<release::ComposedRelease>> {
    let workspace = workspace::store::fetch_workspace_by_key(&state.pool, &team_key).await?;
    let caller_role = match caller.user_id() {
        Some(uid) => workspace::store::find_membership(&state.pool, workspace.id, uid).await?.map(|m| m.role),
        None => None,
    };
    let composed = release::compose(
        &state.pool,
        &state.config.signed_url_secret,
        &state.config.app_base_url,
        release_id,
        &workspace,
        caller_role,
        caller.user_id(),
    )
    .await?;
    Ok(ApiResponse::ok(composed))
}

#[derive(Debug, Deserialize)]
pub struct CreateReleaseBody {
    pub product_id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_prerelease: bool,
}

pub async fn create_release(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(team_key): Path<String>,
    axum::Json(body): axum::Json<CreateReleaseBody>,
) -> AppResult<Created<IdBody>> {
    let user_id = require_user(&caller)?;
    let workspace = workspace::store::fetch_workspace_by_key(&state.pool, &team_key).await?;
    let role = member_role(&state, workspace.id, user_id).await?;
    if !role.allows(workspace::Action::CreateArtifacts) {
        return Err(AppError::NotAuthorized("cannot create releases in this workspace".into()));
    }
    let release = release::store::create_release(
        &state.pool,
        state.broadcaster.as_ref(),
        workspace.id,
        body.product_id,
        &body.name,
        &body.slug,
        &body.description,
        body.is_prerelease,
    )
    .await?;
    Ok(Created(IdBody { id: release.id }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateReleaseBody {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_prerelease: bool,
}

pub async fn update_release(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((team_key, release_id)): Path<(String, Uuid)>,
    axum::Json(body): axum::Json<UpdateReleaseBody>,
) -> AppResult<ApiResponse<()>> {
    let user_id = require_user(&caller)?;
    let workspace = workspace::store::fetch_workspace_by_key(&state.pool, &team_key).await?;
    let role = member_role(&state, workspace.id, user_id).await?;
    if !role.allows(workspace::Action::CreateArtifacts) {
        return Err(AppError::NotAuthorized("cannot update releases in this workspace".into()));
    }
    release::store::update_release(
        &state.pool,
        state.broadcaster.as_ref(),
        workspace.id,
        release_id,
        &body.name,
        &body.description,
        body.is_prerelease,
    )
    .await?;
    Ok(ApiResponse::ok(()))
}

pub async fn delete_release(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((team_key, release_id)): Path<(String, Uuid)>,
) -> AppResult<ApiResponse<()>> {
    let user_id = require_user(&caller)?;
    let workspace = workspace::store::fetch_workspace_by_key(&state.pool, &team_key).await?;
    let role = member_role(&state, workspace.id, user_id).await?;
    if !role.is_owner_or_admin() {
        return Err(AppError::NotAuthorized("only owners/admins may delete releases".into()));
    }
    release::store::delete_release(&state.pool, state.broadcaster.as_ref(), workspace.id, release_id).await?;
    Ok(ApiResponse::ok(()))
}

#[derive(Debug, Deserialize)]
pub struct AddReleaseArtifactBody {
    pub sbom_id: Option<Uuid>,
    pub document_id: Option<Uuid>,
    #[serde(default)]
    pub replace: bool,
}

pub async fn add_release_artifact(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((team_key, release_id)): Path<(String, Uuid)>,
    axum::Json(body): axum::Json<AddReleaseArtifactBody>,
) -> AppResult<Created<IdBody>> {
    let user_id = require_user(&caller)?;
    let workspace = workspace::store::fetch_workspace_by_key(&state.pool, &team_key).await?;
    let role = member_role(&state, workspace.id, user_id).await?;
    if !role.allows(workspace::Action::CreateArtifacts) {
        return Err(AppError::NotAuthorized("cannot modify releases in this workspace".into()));
    }
    let artifact = match (body.sbom_id, body.document_id) {
        (Some(sbom_id), None) => release::store::add_sbom_artifact(&state.pool, release_id, sbom_id, body.replace).await?,
        (None, Some(document_id)) => {
            release::store::add_document_artifact(&state.pool, release_id, document_id, body.replace).await?
        }
        _ => return Err(AppError::InvalidInput("exactly one of sbom_id or document_id is required".into())),
    };
    Ok(Created(IdBody { id: artifact.id }))
}

/// `GET /teams/{team_key}/products/{product_id}/releases/latest` — lazily
/// materializes the implicit "latest" release (§3.1) and composes it.
pub async fn get_latest_release(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((team_key, product_id)): Path<(String, Uuid)>,
) -> AppResult<ApiResponse<release::ComposedRelease>> {
    let workspace = workspace::store::fetch_workspace_by_key(&state.pool, &team_key).await?;
    let release = release::store::get_or_create_latest_release(&state.pool, product_id).await?;
    let caller_role = match caller.user_id() {
        Some(uid) => workspace::store::find_membership(&state.pool, workspace.id, uid).await?.map(|m| m.role),
        None => None,
    };
    let composed = release::compose(
        &state.pool,
        &state.config.signed_url_secret,
        &state.config.app_base_url,
        release.id,
        &workspace,
        caller_role,
        caller.user_id(),
    )
    .await?;
    Ok(ApiResponse::ok(composed))
}

// ---------------------------------------------------------------------
// Workspace & membership lifecycle (C3)
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateWorkspaceBody {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct WorkspaceBody {
    pub id: Uuid,
    pub name: String,
    pub key: String,
}

pub async fn create_workspace(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    axum::Json(body): axum::Json<CreateWorkspaceBody>,
) -> AppResult<Created<WorkspaceBody>> {
    let user_id = require_user(&caller)?;
    let workspace =
        workspace::store::create_workspace(&state.pool, user_id, &body.name, &state.config.access_token_secret)
            .await?;
    Ok(Created(WorkspaceBody { id: workspace.id, name: workspace.name, key: workspace.key }))
}

#[derive(Debug, Deserialize)]
pub struct RenameWorkspaceBody {
    pub name: String,
}

pub async fn rename_workspace(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(team_key): Path<String>,
    axum::Json(body): axum::Json<RenameWorkspaceBody>,
) -> AppResult<ApiResponse<()>> {
    let user_id = require_user(&caller)?;
    let workspace = workspace::store::fetch_workspace_by_key(&state.pool, &team_key).await?;
    let role = member_role(&state, workspace.id, user_id).await?;
    if !role.is_owner_or_admin() {
        return Err(AppError::NotAuthorized("only owners/admins may rename a workspace".into()));
    }
    workspace::store::rename_workspace(&state.pool, workspace.id, &body.name).await?;
    Ok(ApiResponse::ok(()))
}

pub async fn set_default_workspace(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(team_key): Path<String>,
) -> AppResult<ApiResponse<()>> {
    let user_id = require_user(&caller)?;
    let workspace = workspace::store::fetch_workspace_by_key(&state.pool, &team_key).await?;
    member_role(&state, workspace.id, user_id).await?;
    workspace::store::set_default(&state.pool, user_id, workspace.id).await?;
    Ok(ApiResponse::ok(()))
}

pub async fn delete_workspace(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(team_key): Path<String>,
) -> AppResult<ApiResponse<()>> {
    let user_id = require_user(&caller)?;
    let workspace = workspace::store::fetch_workspace_by_key(&state.pool, &team_key).await?;
    workspace::store::delete_workspace(&state.pool, user_id, workspace.id).await?;
    Ok(ApiResponse::ok(()))
}

#[derive(Debug, Deserialize)]
pub struct CreateInvitationBody {
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct InvitationBody {
    pub id: Uuid,
    pub email: String,
    pub token: String,
}

pub async fn create_invitation(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(team_key): Path<String>,
    axum::Json(body): axum::Json<CreateInvitationBody>,
) -> AppResult<Created<InvitationBody>> {
    let user_id = require_user(&caller)?;
    let workspace = workspace::store::fetch_workspace_by_key(&state.pool, &team_key).await?;
    let role = member_role(&state, workspace.id, user_id).await?;
    if !role.allows(workspace::Action::ManageMembers) {
        return Err(AppError::NotAuthorized("cannot invite members to this workspace".into()));
    }
    let invitation =
        workspace::store::create_invitation(&state.pool, workspace.id, &body.email, body.role).await?;
    Ok(Created(InvitationBody { id: invitation.id, email: invitation.email, token: invitation.token }))
}

#[derive(Debug, Deserialize)]
pub struct InvitationTokenBody {
    pub token: String,
}

pub async fn accept_invitation(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    axum::Json(body): axum::Json<InvitationTokenBody>,
) -> AppResult<ApiResponse<()>> {
    let user = match caller {
        Caller::User(u) => u,
        Caller::Anonymous => return Err(AppError::NotAuthenticated),
    };
    workspace::store::accept_invitation(&state.pool, user.id, &user.email, &body.token).await?;
    Ok(ApiResponse::ok(()))
}

pub async fn decline_invitation(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<InvitationTokenBody>,
) -> AppResult<ApiResponse<()>> {
    workspace::store::decline_invitation(&state.pool, &body.token).await?;
    Ok(ApiResponse::ok(()))
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleBody {
    pub user_id: Uuid,
    pub role: Role,
}

pub async fn change_role(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(team_key): Path<String>,
    axum::Json(body): axum::Json<ChangeRoleBody>,
) -> AppResult<ApiResponse<()>> {
    let user_id = require_user(&caller)?;
    let workspace = workspace::store::fetch_workspace_by_key(&state.pool, &team_key).await?;
    let role = member_role(&state, workspace.id, user_id).await?;
    if !role.allows(workspace::Action::ManageMembers) {
        return Err(AppError::NotAuthorized("cannot manage members in this workspace".into()));
    }
    workspace::store::change_role(&state.pool, workspace.id, body.user_id, body.role).await?;
    Ok(ApiResponse::ok(()))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((team_key, target_user_id)): Path<(String, Uuid)>,
) -> AppResult<ApiResponse<()>> {
    let user_id = require_user(&caller)?;
    let workspace = workspace::store::fetch_workspace_by_key(&state.pool, &team_key).await?;
    let role = member_role(&state, workspace.id, user_id).await?;
    if !role.allows(workspace::Action::ManageMembers) && user_id != target_user_id {
        return Err(AppError::NotAuthorized("cannot remove members from this workspace".into()));
    }
    workspace::store::remove_member(&state.pool, workspace.id, target_user_id).await?;
    Ok(ApiResponse::ok(()))
}

#[derive(Debug, Serialize)]
pub struct MembershipBody {
    pub workspace_id: Uuid,
    pub role: Role,
    pub is_default: bool,
}

pub async fn list_memberships(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> AppResult<ApiResponse<Vec<MembershipBody>>> {
    let user_id = require_user(&caller)?;
    let memberships = workspace::store::list_memberships(&state.pool, user_id).await?;
    Ok(ApiResponse::ok(
        memberships
            .into_iter()
            .map(|m| MembershipBody { workspace_id: m.workspace_id, role: m.role, is_default: m.is_default })
            .collect(),
    ))
}

// ---------------------------------------------------------------------
// Identity-provider inbound webhook
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityWebhookEvent {
    DeleteAccount { user_id: Uuid },
    UpdateProfile { user_id: Uuid, email: String },
    Login { user_id: Uuid },
    Logout { user_id: Uuid },
}

/// Verified by a shared header secret, not HMAC — the identity provider is
/// a first-party system reachable only over the private network (§6).
pub async fn identity_webhook(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    axum::Json(event): axum::Json<IdentityWebhookEvent>,
) -> AppResult<ApiResponse<()>> {
    let provided = headers
        .get("X-Identity-Webhook-Secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if provided != state.config.identity_webhook_secret {
        return Err(AppError::NotAuthorized("bad webhook secret".into()));
    }

    match event {
        IdentityWebhookEvent::DeleteAccount { user_id } => {
            sqlx::query!("UPDATE users SET is_active = FALSE WHERE id = $1", user_id)
                .execute(&state.pool)
                .await?;
            tracing::info!(%user_id, "identity: account deactivated");
        }
        IdentityWebhookEvent::UpdateProfile { user_id, email } => {
            sqlx::query!("UPDATE users SET email = $1 WHERE id = $2", email, user_id)
                .execute(&state.pool)
                .await?;
        }
        IdentityWebhookEvent::Login { user_id } => {
            tracing::info!(%user_id, "identity: login audit event");
        }
        IdentityWebhookEvent::Logout { user_id } => {
            tracing::info!(%user_id, "identity: logout audit event");
        }
    }

    Ok(ApiResponse::ok(()))
}
