//! Integration coverage for the checkout-return idempotency fix (§4.4b):
//! the lock acquired while checking whether a session was already applied
//! must be held through the write, not released and re-acquired across two
//! transactions.

use sbom_trust_center::billing::{sync, HttpPaymentsProvider};
use sbom_trust_center::workspace::store as workspace_store;
use sqlx::PgPool;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn seed_user_and_workspace(pool: &PgPool) -> sbom_trust_center::workspace::Workspace {
    let user_id = uuid::Uuid::new_v4();
    sqlx::query!("INSERT INTO users (id, email) VALUES ($1, $2)", user_id, format!("{user_id}@example.com"))
        .execute(pool)
        .await
        .unwrap();
    workspace_store::create_workspace(pool, user_id, "Acme", "test-key-secret").await.unwrap()
}

#[sqlx::test]
async fn handle_checkout_return_is_idempotent_across_concurrent_calls(pool: PgPool) {
    let workspace = seed_user_and_workspace(&pool).await;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/sess_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "sess_123",
            "subscription": "sub_abc",
            "customer": "cus_abc",
            "payment_status": "paid",
            "metadata": { "team_key": workspace.key, "price_id": "price_business_monthly" }
        })))
        .mount(&server)
        .await;

    let provider = HttpPaymentsProvider::new(server.uri(), "test-key".into());

    // Two concurrent visits to the same return URL, as a browser back-button
    // or a flaky redirect can produce.
    let (first, second) = tokio::join!(
        sync::handle_checkout_return(&pool, &provider, "sess_123"),
        sync::handle_checkout_return(&pool, &provider, "sess_123"),
    );
    first.unwrap();
    second.unwrap();

    let refreshed = workspace_store::fetch_workspace(&pool, workspace.id).await.unwrap();
    assert_eq!(refreshed.plan_limits.stripe_subscription_id.as_deref(), Some("sub_abc"));
    assert_eq!(refreshed.plan_limits.stripe_customer_id.as_deref(), Some("cus_abc"));
}

#[sqlx::test]
async fn handle_checkout_return_second_visit_is_a_no_op(pool: PgPool) {
    let workspace = seed_user_and_workspace(&pool).await;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/sess_456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "sess_456",
            "subscription": "sub_def",
            "customer": "cus_def",
            "payment_status": "paid",
            "metadata": { "team_key": workspace.key }
        })))
        .mount(&server)
        .await;

    let provider = HttpPaymentsProvider::new(server.uri(), "test-key".into());

    sync::handle_checkout_return(&pool, &provider, "sess_456").await.unwrap();
    let after_first = workspace_store::fetch_workspace(&pool, workspace.id).await.unwrap();

    sync::handle_checkout_return(&pool, &provider, "sess_456").await.unwrap();
    let after_second = workspace_store::fetch_workspace(&pool, workspace.id).await.unwrap();

    assert_eq!(after_first.plan_limits.last_updated, after_second.plan_limits.last_updated);
}
