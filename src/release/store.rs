//! Release lifecycle (C9, write side): create/update/delete a Release, add
//! a leaf to one, and lazily materialize the implicit "latest" release a
//! Product always has (§3.1, §3.2).
//!
//! Mirrors `src/artifacts/store.rs`'s creation shape: open transaction →
//! enforce invariants → insert/update → commit → broadcast.

use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::artifacts::{Release, ReleaseArtifact};
use crate::events::{Broadcaster, Event, EventKind};

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("not found")]
    NotFound,
    #[error("an artifact for this component already exists in the release")]
    Conflict,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

fn map_unique_violation(err: sqlx::Error) -> ReleaseError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => ReleaseError::Conflict,
        _ => ReleaseError::Db(err),
    }
}

pub async fn create_release(
    pool: &PgPool,
    broadcaster: &dyn Broadcaster,
    workspace_id: Uuid,
    product_id: Uuid,
    name: &str,
    slug: &str,
    description: &str,
    is_prerelease: bool,
) -> Result<Release, ReleaseError> {
    let mut tx = pool.begin().await?;
    let release = sqlx::query_as::<_, Release>(
        r#"INSERT INTO releases (product_id, name, slug, description, is_prerelease)
           VALUES ($1, $2, $3, $4, $5) RETURNING *"#,
    )
    .bind(product_id)
    .bind(name)
    .bind(slug)
    .bind(description)
    .bind(is_prerelease)
    .fetch_one(&mut *tx)
    .await
    .map_err(map_unique_violation)?;
    tx.commit().await?;

    broadcaster
        .publish(Event {
            workspace_id,
            kind: EventKind::ReleaseCreated,
            payload: serde_json::json!({ "release_id": release.id, "product_id": product_id }),
        })
        .await;
    Ok(release)
}

/// Every Product has one implicit "latest" release, materialized the first
/// time anything asks for it rather than at Product-creation time (§3.2).
pub async fn get_or_create_latest_release(pool: &PgPool, product_id: Uuid) -> Result<Release, ReleaseError> {
    let mut tx = pool.begin().await?;
    if let Some(existing) =
        sqlx::query_as::<_, Release>("SELECT * FROM releases WHERE product_id = $1 AND slug = 'latest'")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?
    {
        return Ok(existing);
    }

    let release = sqlx::query_as::<_, Release>(
        r#"INSERT INTO releases (product_id, name, slug, description, is_prerelease)
           VALUES ($1, 'Latest', 'latest', '', FALSE)
           ON CONFLICT (product_id, slug) DO UPDATE SET slug = EXCLUDED.slug
           RETURNING *"#,
    )
    .bind(product_id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(release)
}

pub async fn update_release(
    pool: &PgPool,
    broadcaster: &dyn Broadcaster,
    workspace_id: Uuid,
    release_id: Uuid,
    name: &str,
    description: &str,
    is_prerelease: bool,
) -> Result<Release, ReleaseError> {
    let mut tx = pool.begin().await?;
    let release = sqlx::query_as::<_, Release>(
        r#"UPDATE releases SET name = $1, description = $2, is_prerelease = $3
           WHERE id = $4 RETURNING *"#,
    )
    .bind(name)
    .bind(description)
    .bind(is_prerelease)
    .bind(release_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(ReleaseError::NotFound)?;
    tx.commit().await?;

    broadcaster
        .publish(Event {
            workspace_id,
            kind: EventKind::ReleaseUpdated,
            payload: serde_json::json!({ "release_id": release.id }),
        })
        .await;
    Ok(release)
}

pub async fn delete_release(
    pool: &PgPool,
    broadcaster: &dyn Broadcaster,
    workspace_id: Uuid,
    release_id: Uuid,
) -> Result<(), ReleaseError> {
    let result = sqlx::query!("DELETE FROM releases WHERE id = $1", release_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ReleaseError::NotFound);
    }

    broadcaster
        .publish(Event {
            workspace_id,
            kind: EventKind::ReleaseDeleted,
            payload: serde_json::json!({ "release_id": release_id }),
        })
        .await;
    Ok(())
}

/// Adds an SBOM to a release. §3.1: at most one SBOM of a given
/// `(component, format)` per release — a collision either fails or
/// replaces the existing row, depending on `replace`.
pub async fn add_sbom_artifact(
    pool: &PgPool,
    release_id: Uuid,
    sbom_id: Uuid,
    replace: bool,
) -> Result<ReleaseArtifact, ReleaseError> {
    let mut tx = pool.begin().await?;

    let existing: Option<Uuid> = sqlx::query_scalar!(
        r#"SELECT ra.id FROM release_artifacts ra
           JOIN sboms s ON s.id = ra.sbom_id
           JOIN sboms new_sbom ON new_sbom.id = $2
           WHERE ra.release_id = $1 AND s.component_id = new_sbom.component_id AND s.format = new_sbom.format"#,
        release_id,
        sbom_id
    )
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(existing_id) = existing {
        if !replace {
            return Err(ReleaseError::Conflict);
        }
        sqlx::query!("DELETE FROM release_artifacts WHERE id = $1", existing_id)
            .execute(&mut *tx)
            .await?;
    }

    let artifact = sqlx::query_as::<_, ReleaseArtifact>(
        r#"INSERT INTO release_artifacts (release_id, sbom_id) VALUES ($1, $2) RETURNING *"#,
    )
    .bind(release_id)
    .bind(sbom_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(map_unique_violation)?;
    tx.commit().await?;
    Ok(artifact)
}

/// Adds a Document to a release. §3.1: at most one Document of a given
/// `(component, document_type)` per release.
pub async fn add_document_artifact(
    pool: &PgPool,
    release_id: Uuid,
    document_id: Uuid,
    replace: bool,
) -> Result<ReleaseArtifact, ReleaseError> {
    let mut tx = pool.begin().await?;

    let existing: Option<Uuid> = sqlx::query_scalar!(
        r#"SELECT ra.id FROM release_artifacts ra
           JOIN documents d ON d.id = ra.document_id
           JOIN documents new_doc ON new_doc.id = $2
           WHERE ra.release_id = $1 AND d.component_id = new_doc.component_id AND d.document_type = new_doc.document_type"#,
        release_id,
        document_id
    )
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(existing_id) = existing {
        if !replace {
            return Err(ReleaseError::Conflict);
        }
        sqlx::query!("DELETE FROM release_artifacts WHERE id = $1", existing_id)
            .execute(&mut *tx)
            .await?;
    }

    let artifact = sqlx::query_as::<_, ReleaseArtifact>(
        r#"INSERT INTO release_artifacts (release_id, document_id) VALUES ($1, $2) RETURNING *"#,
    )
    .bind(release_id)
    .bind(document_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(map_unique_violation)?;
    tx.commit().await?;
    Ok(artifact)
}
