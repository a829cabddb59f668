//! Release Composer (C9).
//!
//! Builds the aggregate document for a release: dedupes leaves, orders them
//! deterministically by `(component.name, version)`, enforces the caller's
//! own read permission via [`crate::access::resolver::evaluate`] on every
//! leaf, and picks a plain or signed download URL per leaf depending on
//! whether it is effectively public (§4.2 rule 3).
//!
//! "Byte-identical output" (§4.6) refers to component ordering, not to the
//! literal bytes of minted signed-URL tokens — those necessarily vary with
//! `issued_at`/`expires_at` across invocations.

use std::collections::HashSet;

use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::access::{self, ArtifactContext, ItemKind};
use crate::artifacts::{self, ArtifactError, Component};
use crate::signing;
use crate::workspace::{Role, Workspace};

use super::model::{ComposedComponent, ComposedMetadata, ComposedRelease, ExternalReference, LeafKind, LeafRow};

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("release not found")]
    NotFound,
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

async fn fetch_leaves(pool: &PgPool, release_id: Uuid) -> Result<Vec<LeafRow>, sqlx::Error> {
    sqlx::query_as::<_, LeafRow>(
        r#"SELECT s.id AS leaf_id, 'sbom' AS kind, c.id AS component_id, c.name AS component_name,
                  c.visibility AS component_visibility, c.is_global AS component_is_global,
                  s.name AS name, s.version AS version
           FROM release_artifacts ra
           JOIN sboms s ON s.id = ra.sbom_id
           JOIN components c ON c.id = s.component_id
           WHERE ra.release_id = $1
           UNION ALL
           SELECT d.id, 'document', c.id, c.name,
                  c.visibility, c.is_global,
                  d.name, d.version
           FROM release_artifacts ra
           JOIN documents d ON d.id = ra.document_id
           JOIN components c ON c.id = d.component_id
           WHERE ra.release_id = $1"#,
    )
    .bind(release_id)
    .fetch_all(pool)
    .await
}

pub async fn compose(
    pool: &PgPool,
    signed_url_secret: &str,
    download_base_url: &str,
    release_id: Uuid,
    workspace: &Workspace,
    caller_role: Option<Role>,
    caller_user_id: Option<Uuid>,
) -> Result<ComposedRelease, ComposeError> {
    let release = sqlx::query!(
        "SELECT name, slug FROM releases WHERE id = $1 AND product_id IN (SELECT id FROM products WHERE workspace_id = $2)",
        release_id,
        workspace.id
    )
    .fetch_optional(pool)
    .await?
    .ok_or(ComposeError::NotFound)?;

    let access_request = match caller_user_id {
        Some(uid) => access::request::fetch(pool, workspace.id, uid).await?,
        None => None,
    };
    let nda_signature = match &access_request {
        Some(ar) => access::request::fetch_signature(pool, ar.id).await?,
        None => None,
    };
    let current_nda_content_hash = match workspace.company_nda_document_id {
        Some(doc_id) => sqlx::query_scalar!("SELECT content_hash FROM documents WHERE id = $1", doc_id)
            .fetch_optional(pool)
            .await?,
        None => None,
    };

    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut components = Vec::new();

    for leaf in fetch_leaves(pool, release_id).await? {
        if !seen.insert(leaf.leaf_id) {
            continue;
        }

        let component = Component {
            id: leaf.component_id,
            workspace_id: workspace.id,
            name: leaf.component_name.clone(),
            slug: String::new(),
            visibility: leaf.component_visibility,
            component_type: crate::artifacts::ComponentType::Sbom,
            is_global: leaf.component_is_global,
            metadata: serde_json::Value::Null,
            created_at: chrono::Utc::now(),
        };
        let effectively_public = artifacts::store::is_effectively_public(pool, &component).await?;

        let kind = if leaf.kind == "sbom" { LeafKind::Sbom } else { LeafKind::Document };
        let ctx = ArtifactContext {
            item_kind: if kind == LeafKind::Sbom { ItemKind::Sbom } else { ItemKind::Document },
            component_visibility: leaf.component_visibility,
            component_is_global: leaf.component_is_global,
            effectively_public,
        };

        let decision = access::evaluate(
            caller_role,
            workspace,
            ctx,
            access_request.as_ref(),
            nda_signature.as_ref(),
            current_nda_content_hash.as_deref(),
        );
        if !decision.is_allow() {
            continue;
        }

        // SBOMs and Documents are served from distinct route trees
        // (`/api/v1/{id}/...` vs `/api/v1/documents/{id}/...`); pick the one
        // matching this leaf's kind.
        let path_segment = match kind {
            LeafKind::Sbom => format!("{}", leaf.leaf_id),
            LeafKind::Document => format!("documents/{}", leaf.leaf_id),
        };
        let url = if effectively_public {
            format!("{download_base_url}/api/v1/{path_segment}/download")
        } else {
            let Some(user_id) = caller_user_id else {
                continue;
            };
            let token = signing::mint(leaf.leaf_id, user_id, signed_url_secret);
            format!("{download_base_url}/api/v1/{path_segment}/download/signed?token={token}")
        };

        components.push(ComposedComponent {
            name: leaf.component_name,
            version: leaf.version,
            kind: kind.as_str(),
            external_references: vec![ExternalReference { url, ref_type: "distribution" }],
        });
    }

    components.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));

    Ok(ComposedRelease {
        bom_format: "CycloneDX",
        spec_version: "1.5",
        serial_number: format!("urn:uuid:{release_id}"),
        version: 1,
        metadata: ComposedMetadata {
            release_name: release.name,
            release_slug: release.slug,
        },
        components,
    })
}
