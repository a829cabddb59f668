//! `test_nda_re_signing` (SPEC_FULL §8): re-signing after a workspace
//! rotates its NDA document replaces the caller's one NdaSignature row in
//! place rather than accumulating a history, and the stale signature no
//! longer validates against the new content hash.

use sbom_trust_center::access::request::{self, PendingCountCache};
use sbom_trust_center::events::LoggingBroadcaster;
use sqlx::PgPool;
use uuid::Uuid;

async fn seed_user(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query!("INSERT INTO users (id, email) VALUES ($1, $2)", id, format!("{id}@example.com"))
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn seed_workspace(pool: &PgPool, owner: Uuid) -> sbom_trust_center::workspace::Workspace {
    sbom_trust_center::workspace::store::create_workspace(pool, owner, "Acme", "test-key-secret").await.unwrap()
}

async fn seed_document(pool: &PgPool, workspace_id: Uuid, component_id: Uuid, content_hash: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query!(
        r#"INSERT INTO documents (id, component_id, name, version, document_type, storage_filename, content_hash, content_type, file_size)
           VALUES ($1, $2, 'NDA', '1', 'nda', 'nda.pdf', $3, 'application/pdf', 100)"#,
        id,
        component_id,
        content_hash,
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query!("UPDATE workspaces SET company_nda_document_id = $1 WHERE id = $2", id, workspace_id)
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn seed_component(pool: &PgPool, workspace_id: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query!(
        r#"INSERT INTO components (id, workspace_id, name, slug, component_type) VALUES ($1, $2, 'nda-holder', 'nda-holder', 'document')"#,
        id,
        workspace_id,
    )
    .execute(pool)
    .await
    .unwrap();
    id
}

#[sqlx::test]
async fn re_signing_after_nda_rotation_replaces_the_signature_row(pool: PgPool) {
    let owner = seed_user(&pool).await;
    let signer = seed_user(&pool).await;
    let workspace = seed_workspace(&pool, owner).await;
    let component_id = seed_component(&pool, workspace.id).await;
    let nda_v1 = seed_document(&pool, workspace.id, component_id, "hash-v1").await;

    let broadcaster = LoggingBroadcaster;
    let pending_counts = PendingCountCache::new();

    let access_request = request::create(&pool, workspace.id, signer).await.unwrap();
    request::sign_nda(
        &pool, &broadcaster, &pending_counts, access_request.id, nda_v1, "hash-v1", "Jane Signer", true,
        "127.0.0.1", "test-agent",
    )
    .await
    .unwrap();

    let first_signature = request::fetch_signature(&pool, access_request.id).await.unwrap().unwrap();
    assert!(first_signature.is_valid_for(nda_v1, "hash-v1"));

    // The workspace rotates its NDA document to a new version with a new hash.
    sqlx::query!("UPDATE documents SET content_hash = 'hash-v2' WHERE id = $1", nda_v1)
        .execute(&pool)
        .await
        .unwrap();

    assert!(!first_signature.is_valid_for(nda_v1, "hash-v2"));

    request::sign_nda(
        &pool, &broadcaster, &pending_counts, access_request.id, nda_v1, "hash-v2", "Jane Signer", true,
        "127.0.0.1", "test-agent",
    )
    .await
    .unwrap();

    let row_count: i64 = sqlx::query_scalar!(
        "SELECT COUNT(*) FROM nda_signatures WHERE access_request_id = $1",
        access_request.id
    )
    .fetch_one(&pool)
    .await
    .unwrap()
    .unwrap();
    assert_eq!(row_count, 1, "re-signing must replace the row, not append one");

    let second_signature = request::fetch_signature(&pool, access_request.id).await.unwrap().unwrap();
    assert!(second_signature.is_valid_for(nda_v1, "hash-v2"));
}
