//! Artifact Metadata Store (C8).
//!
//! Creation is structured per §4.5: open transaction → enforce plan limit
//! (C4) → enforce public/private invariants (§3.1) → insert → commit. There
//! is no `*_created` entry in §4.9's event list for Products/Projects/
//! Components, so creation does not broadcast — only SBOM/document upload
//! and the release lifecycle do.

use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::billing::plan::{check_creation_allowed, PlanError, ResourceKind};
use crate::events::{Broadcaster, Event, EventKind};
use crate::workspace::Workspace;

use super::model::{Component, ComponentType, Document, Product, Project, Sbom, Visibility};
use super::object_store::{ObjectStore, ObjectStoreError};
use super::sbom::{detect, SbomParseError};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    PlanLimit(#[from] PlanError),
    #[error("public container cannot hold a {0:?} item")]
    VisibilityInvariant(Visibility),
    #[error("duplicate upload")]
    Conflict,
    #[error(transparent)]
    SbomParse(#[from] SbomParseError),
    #[error(transparent)]
    Storage(#[from] ObjectStoreError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

pub async fn create_product(
    pool: &PgPool,
    billing_enabled: bool,
    workspace: &Workspace,
    name: &str,
    slug: &str,
) -> Result<Product, ArtifactError> {
    check_creation_allowed(pool, workspace, ResourceKind::Product, billing_enabled).await?;
    let mut tx = pool.begin().await?;
    let product = sqlx::query_as::<_, Product>(
        r#"INSERT INTO products (workspace_id, name, slug) VALUES ($1, $2, $3) RETURNING *"#,
    )
    .bind(workspace.id)
    .bind(name)
    .bind(slug)
    .fetch_one(&mut *tx)
    .await
    .map_err(map_unique_violation)?;
    tx.commit().await?;
    Ok(product)
}

pub async fn create_project(
    pool: &PgPool,
    billing_enabled: bool,
    workspace: &Workspace,
    name: &str,
    slug: &str,
) -> Result<Project, ArtifactError> {
    check_creation_allowed(pool, workspace, ResourceKind::Project, billing_enabled).await?;
    let mut tx = pool.begin().await?;
    let project = sqlx::query_as::<_, Project>(
        r#"INSERT INTO projects (workspace_id, name, slug) VALUES ($1, $2, $3) RETURNING *"#,
    )
    .bind(workspace.id)
    .bind(name)
    .bind(slug)
    .fetch_one(&mut *tx)
    .await
    .map_err(map_unique_violation)?;
    tx.commit().await?;
    Ok(project)
}

pub async fn create_component(
    pool: &PgPool,
    billing_enabled: bool,
    workspace: &Workspace,
    name: &str,
    slug: &str,
    component_type: ComponentType,
    is_global: bool,
) -> Result<Component, ArtifactError> {
    check_creation_allowed(pool, workspace, ResourceKind::Component, billing_enabled).await?;
    let mut tx = pool.begin().await?;
    // Workspaces on the free (community) plan may never set any item
    // non-public — so a new component always starts private, which is
    // always a legal choice regardless of plan.
    let component = sqlx::query_as::<_, Component>(
        r#"INSERT INTO components (workspace_id, name, slug, component_type, is_global)
           VALUES ($1, $2, $3, $4, $5) RETURNING *"#,
    )
    .bind(workspace.id)
    .bind(name)
    .bind(slug)
    .bind(component_type)
    .bind(is_global)
    .fetch_one(&mut *tx)
    .await
    .map_err(map_unique_violation)?;
    tx.commit().await?;
    Ok(component)
}

fn map_unique_violation(err: sqlx::Error) -> ArtifactError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => ArtifactError::Conflict,
        _ => ArtifactError::Db(err),
    }
}

/// `PATCH /components/{id}` visibility change — 400 on an invariant
/// violation (§3.1): a Component cannot go private while assigned to any
/// public Project.
pub async fn set_component_visibility(
    pool: &PgPool,
    component_id: Uuid,
    visibility: Visibility,
    plan_key: &str,
) -> Result<(), ArtifactError> {
    if plan_key == "community" && visibility != Visibility::Private {
        return Err(ArtifactError::VisibilityInvariant(visibility));
    }

    let mut tx = pool.begin().await?;
    if visibility != Visibility::Public {
        let in_public_project: bool = sqlx::query_scalar!(
            r#"SELECT EXISTS(
                   SELECT 1 FROM project_components pc
                   JOIN projects p ON p.id = pc.project_id
                   WHERE pc.component_id = $1 AND p.is_public
               )"#,
            component_id
        )
        .fetch_one(&mut *tx)
        .await?
        .unwrap_or(false);
        if in_public_project {
            return Err(ArtifactError::VisibilityInvariant(visibility));
        }
    }

    let result = sqlx::query!(
        "UPDATE components SET visibility = $1 WHERE id = $2",
        visibility as Visibility,
        component_id
    )
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ArtifactError::NotFound);
    }
    tx.commit().await?;
    Ok(())
}

/// `PATCH /projects/{id}` public flag — a public Project may not contain
/// private or gated Components (§3.1).
pub async fn set_project_public(pool: &PgPool, project_id: Uuid, is_public: bool, plan_key: &str) -> Result<(), ArtifactError> {
    if plan_key == "community" && is_public {
        return Err(ArtifactError::VisibilityInvariant(Visibility::Public));
    }
    let mut tx = pool.begin().await?;
    if is_public {
        let has_non_public: bool = sqlx::query_scalar!(
            r#"SELECT EXISTS(
                   SELECT 1 FROM project_components pc
                   JOIN components c ON c.id = pc.component_id
                   WHERE pc.project_id = $1 AND c.visibility != 'public'
               )"#,
            project_id
        )
        .fetch_one(&mut *tx)
        .await?
        .unwrap_or(false);
        if has_non_public {
            return Err(ArtifactError::VisibilityInvariant(Visibility::Private));
        }
    } else {
        let in_public_product: bool = sqlx::query_scalar!(
            r#"SELECT EXISTS(
                   SELECT 1 FROM product_projects pp
                   JOIN products p ON p.id = pp.product_id
                   WHERE pp.project_id = $1 AND p.is_public
               )"#,
            project_id
        )
        .fetch_one(&mut *tx)
        .await?
        .unwrap_or(false);
        if in_public_product {
            return Err(ArtifactError::VisibilityInvariant(Visibility::Private));
        }
    }
    let result = sqlx::query!("UPDATE projects SET is_public = $1 WHERE id = $2", is_public, project_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ArtifactError::NotFound);
    }
    tx.commit().await?;
    Ok(())
}

/// `PATCH /products/{id}` public flag — a public Product may not contain
/// private or gated Projects (§3.1).
pub async fn set_product_public(pool: &PgPool, product_id: Uuid, is_public: bool, plan_key: &str) -> Result<(), ArtifactError> {
    if plan_key == "community" && is_public {
        return Err(ArtifactError::VisibilityInvariant(Visibility::Public));
    }
    let mut tx = pool.begin().await?;
    if is_public {
        let has_non_public: bool = sqlx::query_scalar!(
            r#"SELECT EXISTS(
                   SELECT 1 FROM product_projects pp
                   JOIN projects p ON p.id = pp.project_id
                   WHERE pp.product_id = $1 AND NOT p.is_public
               )"#,
            product_id
        )
        .fetch_one(&mut *tx)
        .await?
        .unwrap_or(false);
        if has_non_public {
            return Err(ArtifactError::VisibilityInvariant(Visibility::Private));
        }
    }
    let result = sqlx::query!("UPDATE products SET is_public = $1 WHERE id = $2", is_public, product_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ArtifactError::NotFound);
    }
    tx.commit().await?;
    Ok(())
}

/// SBOM upload: detect format/version from the payload, content-address the
/// bytes, reject duplicates on `(component, version, format)`.
pub async fn upload_sbom(
    pool: &PgPool,
    object_store: &dyn ObjectStore,
    broadcaster: &dyn Broadcaster,
    workspace_id: Uuid,
    component_id: Uuid,
    name: &str,
    version: &str,
    bytes: &[u8],
    source: &str,
) -> Result<Sbom, ArtifactError> {
    let detected = detect(bytes)?;
    let storage_filename = object_store.put(bytes).await?;

    let sbom = sqlx::query_as::<_, Sbom>(
        r#"INSERT INTO sboms (component_id, name, version, format, format_version, storage_filename, source)
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           RETURNING *"#,
    )
    .bind(component_id)
    .bind(name)
    .bind(version)
    .bind(detected.format)
    .bind(&detected.format_version)
    .bind(&storage_filename)
    .bind(source)
    .fetch_one(pool)
    .await
    .map_err(map_unique_violation)?;

    broadcaster
        .publish(Event {
            workspace_id,
            kind: EventKind::SbomUploaded,
            payload: serde_json::json!({ "sbom_id": sbom.id, "component_id": component_id }),
        })
        .await;
    Ok(sbom)
}

pub async fn upload_document(
    pool: &PgPool,
    object_store: &dyn ObjectStore,
    broadcaster: &dyn Broadcaster,
    workspace_id: Uuid,
    component_id: Uuid,
    name: &str,
    version: &str,
    document_type: &str,
    compliance_subcategory: Option<&str>,
    content_type: &str,
    bytes: &[u8],
    source: &str,
) -> Result<Document, ArtifactError> {
    let content_hash = super::object_store::content_addressed_key(bytes);
    let storage_filename = object_store.put(bytes).await?;

    let document = sqlx::query_as::<_, Document>(
        r#"INSERT INTO documents
               (component_id, name, version, document_type, compliance_subcategory,
                storage_filename, content_hash, content_type, file_size, source)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
           RETURNING *"#,
    )
    .bind(component_id)
    .bind(name)
    .bind(version)
    .bind(document_type)
    .bind(compliance_subcategory)
    .bind(&storage_filename)
    .bind(&content_hash)
    .bind(content_type)
    .bind(bytes.len() as i64)
    .bind(source)
    .fetch_one(pool)
    .await
    .map_err(map_unique_violation)?;

    broadcaster
        .publish(Event {
            workspace_id,
            kind: EventKind::DocumentUploaded,
            payload: serde_json::json!({ "document_id": document.id, "component_id": component_id }),
        })
        .await;
    Ok(document)
}

/// Deletes a Component and, via `ON DELETE CASCADE` (§3.2), every SBOM,
/// Document, and ReleaseArtifact row hanging off it. §4.9 names no
/// `component_deleted` event, so this does not broadcast; call
/// [`delete_sbom`] directly when a single SBOM's removal needs to be
/// observable.
pub async fn delete_component(pool: &PgPool, component_id: Uuid) -> Result<(), ArtifactError> {
    let result = sqlx::query!("DELETE FROM components WHERE id = $1", component_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ArtifactError::NotFound);
    }
    Ok(())
}

pub async fn delete_sbom(pool: &PgPool, broadcaster: &dyn Broadcaster, workspace_id: Uuid, sbom_id: Uuid) -> Result<(), ArtifactError> {
    let result = sqlx::query!("DELETE FROM sboms WHERE id = $1", sbom_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ArtifactError::NotFound);
    }
    broadcaster
        .publish(Event {
            workspace_id,
            kind: EventKind::SbomDeleted,
            payload: serde_json::json!({ "sbom_id": sbom_id }),
        })
        .await;
    Ok(())
}

pub async fn fetch_component(pool: &PgPool, id: Uuid) -> Result<Component, ArtifactError> {
    sqlx::query_as::<_, Component>("SELECT * FROM components WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ArtifactError::NotFound)
}

pub async fn fetch_sbom(pool: &PgPool, id: Uuid) -> Result<Sbom, ArtifactError> {
    sqlx::query_as::<_, Sbom>("SELECT * FROM sboms WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ArtifactError::NotFound)
}

pub async fn fetch_document(pool: &PgPool, id: Uuid) -> Result<Document, ArtifactError> {
    sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ArtifactError::NotFound)
}

/// Whether a component is *effectively public*: its own visibility is
/// public and every enclosing Project (and that Project's enclosing
/// Product) is public (§4.2 rule 3). A component with no project
/// assignment at all is effectively public iff it is itself public —
/// there is no container to fail the chain.
pub async fn is_effectively_public(pool: &PgPool, component: &Component) -> Result<bool, ArtifactError> {
    if component.visibility != Visibility::Public {
        return Ok(false);
    }
    let non_public_containers: bool = sqlx::query_scalar!(
        r#"SELECT EXISTS(
               SELECT 1 FROM project_components pc
               JOIN projects p ON p.id = pc.project_id
               LEFT JOIN product_projects pp ON pp.project_id = p.id
               LEFT JOIN products prod ON prod.id = pp.product_id
               WHERE pc.component_id = $1
                 AND (NOT p.is_public OR (prod.id IS NOT NULL AND NOT prod.is_public))
           )"#,
        component.id
    )
    .fetch_one(pool)
    .await?
    .unwrap_or(false);
    Ok(!non_public_containers)
}
