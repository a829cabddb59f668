//! `test_access_requests_race_conditions` and `test_cache_invalidation`
//! (SPEC_FULL §8): concurrent `create` calls for the same `(workspace,
//! user)` collapse onto a single row, a `revoked -> pending` transition
//! reuses the original primary key, and the pending-count cache only
//! reflects a status change after its transaction has committed.

use sbom_trust_center::access::request::{self, PendingCountCache};
use sbom_trust_center::events::LoggingBroadcaster;
use sbom_trust_center::workspace::Role;
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

#[sqlx::test]
async fn concurrent_create_calls_collapse_onto_one_row(pool: PgPool) {
    let owner = seed_user(&pool).await;
    let requester = seed_user(&pool).await;
    let workspace = seed_workspace(&pool, owner).await;

    let (a, b, c) = tokio::join!(
        request::create(&pool, workspace.id, requester),
        request::create(&pool, workspace.id, requester),
        request::create(&pool, workspace.id, requester),
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_eq!(a.id, b.id);
    assert_eq!(b.id, c.id);

    let row_count: i64 = sqlx::query_scalar!(
        "SELECT COUNT(*) FROM access_requests WHERE workspace_id = $1 AND user_id = $2",
        workspace.id,
        requester
    )
    .fetch_one(&pool)
    .await
    .unwrap()
    .unwrap();
    assert_eq!(row_count, 1);
}

#[sqlx::test]
async fn revoked_request_reused_on_re_request_keeps_its_primary_key(pool: PgPool) {
    let owner = seed_user(&pool).await;
    let requester = seed_user(&pool).await;
    let workspace = seed_workspace(&pool, owner).await;
    let broadcaster = LoggingBroadcaster;
    let pending_counts = PendingCountCache::new();

    let original = request::create(&pool, workspace.id, requester).await.unwrap();
    request::approve(&pool, &broadcaster, &pending_counts, Role::Owner, owner, original.id).await.unwrap();
    request::revoke(&pool, &broadcaster, &pending_counts, Role::Owner, owner, original.id).await.unwrap();

    let re_requested = request::create(&pool, workspace.id, requester).await.unwrap();
    assert_eq!(re_requested.id, original.id, "re-request must reuse the row, not insert a new one");
}

#[sqlx::test]
async fn pending_count_cache_is_invalidated_only_after_commit(pool: PgPool) {
    let owner = seed_user(&pool).await;
    let requester = seed_user(&pool).await;
    let workspace = seed_workspace(&pool, owner).await;
    let broadcaster = LoggingBroadcaster;
    let pending_counts = PendingCountCache::new();

    let request = request::create(&pool, workspace.id, requester).await.unwrap();
    let count_before = pending_counts.count(&pool, workspace.id).await.unwrap();
    assert_eq!(count_before, 1);

    request::approve(&pool, &broadcaster, &pending_counts, Role::Owner, owner, request.id).await.unwrap();

    // `approve` invalidates the cache only once its transaction has
    // committed, so the very next read reflects the new count rather than
    // a cached stale value.
    let count_after = pending_counts.count(&pool, workspace.id).await.unwrap();
    assert_eq!(count_after, 0);
}
