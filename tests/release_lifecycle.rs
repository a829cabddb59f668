//! Release lifecycle (C9 write side, §3.1/§3.2): the implicit "latest"
//! release is lazily materialized on first read, and adding a second SBOM
//! of the same `(component, format)` to a release either conflicts or
//! replaces depending on the caller's `replace` flag.

use sbom_trust_center::artifacts::{self, ComponentType};
use sbom_trust_center::events::LoggingBroadcaster;
use sbom_trust_center::release::store as release_store;
use sbom_trust_center::release::ReleaseError;
use sbom_trust_center::workspace::Workspace;
use sqlx::PgPool;
use uuid::Uuid;

async fn seed_workspace(pool: &PgPool) -> Workspace {
    let owner = Uuid::new_v4();
    sqlx::query!("INSERT INTO users (id, email) VALUES ($1, $2)", owner, format!("{owner}@example.com"))
        .execute(pool)
        .await
        .unwrap();
    sbom_trust_center::workspace::store::create_workspace(pool, owner, "Acme", "test-key-secret").await.unwrap()
}

#[sqlx::test]
async fn latest_release_is_materialized_lazily_and_only_once(pool: PgPool) {
    let workspace = seed_workspace(&pool).await;
    let product = artifacts::store::create_product(&pool, false, &workspace, "Widget", "widget").await.unwrap();

    let before: i64 = sqlx::query_scalar!("SELECT COUNT(*) FROM releases WHERE product_id = $1", product.id)
        .fetch_one(&pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before, 0, "creating a Product must not eagerly create a release");

    let first = release_store::get_or_create_latest_release(&pool, product.id).await.unwrap();
    let second = release_store::get_or_create_latest_release(&pool, product.id).await.unwrap();
    assert_eq!(first.id, second.id);

    let after: i64 = sqlx::query_scalar!("SELECT COUNT(*) FROM releases WHERE product_id = $1", product.id)
        .fetch_one(&pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after, 1);
}

#[sqlx::test]
async fn adding_a_second_sbom_of_the_same_component_and_format_conflicts_unless_replace(pool: PgPool) {
    let workspace = seed_workspace(&pool).await;
    let product = artifacts::store::create_product(&pool, false, &workspace, "Widget", "widget").await.unwrap();
    let component = artifacts::store::create_component(
        &pool, false, &workspace, "core", "core", ComponentType::Sbom, false,
    )
    .await
    .unwrap();

    let sbom_v1 = insert_sbom(&pool, component.id, "1.0.0").await;
    let sbom_v2 = insert_sbom(&pool, component.id, "2.0.0").await;

    let broadcaster = LoggingBroadcaster;
    let release = release_store::create_release(
        &pool, &broadcaster, workspace.id, product.id, "GA", "ga", "", false,
    )
    .await
    .unwrap();

    release_store::add_sbom_artifact(&pool, release.id, sbom_v1, false).await.unwrap();

    let conflict = release_store::add_sbom_artifact(&pool, release.id, sbom_v2, false).await;
    assert!(matches!(conflict, Err(ReleaseError::Conflict)));

    let replaced = release_store::add_sbom_artifact(&pool, release.id, sbom_v2, true).await.unwrap();
    assert_eq!(replaced.sbom_id, Some(sbom_v2));

    let row_count: i64 = sqlx::query_scalar!(
        "SELECT COUNT(*) FROM release_artifacts WHERE release_id = $1",
        release.id
    )
    .fetch_one(&pool)
    .await
    .unwrap()
    .unwrap();
    assert_eq!(row_count, 1, "replace must not leave the superseded artifact row behind");
}

async fn insert_sbom(pool: &PgPool, component_id: Uuid, version: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query!(
        r#"INSERT INTO sboms (id, component_id, name, version, format, format_version, storage_filename)
           VALUES ($1, $2, 'core', $3, 'cyclonedx', '1.5', 'core.json')"#,
        id,
        component_id,
        version,
    )
    .execute(pool)
    .await
    .unwrap();
    id
}
