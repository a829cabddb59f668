//! Subscription Sync Engine (C5).
//!
//! Three idempotent entry points reconciling `Workspace.plan_limits` with
//! the external payments provider: webhook consumer, checkout-return,
//! on-demand pull refresh. Row-lock discipline (`SELECT ... FOR UPDATE`)
//! mirrors the teacher's `src/database` transaction helpers.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::workspace::model::{BillingPeriod, PlanLimits, SubscriptionStatus, Workspace};

use super::plan::{fetch_plan, PlanError};
use super::provider::{PaymentsProvider, ProviderError, Subscription};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("webhook signature did not match")]
    BadSignature,
    #[error("unrecognized subscription status: {0}")]
    UnknownStatus(String),
    #[error("workspace not found for this webhook")]
    WorkspaceNotFound,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Verifies a webhook body against the pre-shared secret. Malformed or
/// mismatched signature → caller must respond 403 (§4.4a).
pub fn verify_webhook_signature(secret: &str, payload: &[u8], signature_header: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(expected.as_bytes(), signature_header.trim_start_matches("sha256=").as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Looks the workspace up by the `team_key` webhook metadata field first
/// (set at checkout time) and falls back to the stored stripe customer id.
async fn find_workspace_for_webhook(
    tx: &mut Transaction<'_, Postgres>,
    team_key: Option<&str>,
    customer_id: Option<&str>,
) -> Result<Workspace, BillingError> {
    if let Some(key) = team_key {
        if let Some(workspace) =
            sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces WHERE key = $1 FOR UPDATE")
                .bind(key)
                .fetch_optional(&mut **tx)
                .await?
        {
            return Ok(workspace);
        }
    }
    if let Some(customer_id) = customer_id {
        if let Some(workspace) = sqlx::query_as::<_, Workspace>(
            "SELECT * FROM workspaces WHERE plan_limits->>'stripe_customer_id' = $1 FOR UPDATE",
        )
        .bind(customer_id)
        .fetch_optional(&mut **tx)
        .await?
        {
            return Ok(workspace);
        }
    }
    Err(BillingError::WorkspaceNotFound)
}

async fn write_limits(
    tx: &mut Transaction<'_, Postgres>,
    workspace_id: Uuid,
    limits: &PlanLimits,
) -> Result<(), BillingError> {
    let json = serde_json::to_value(limits).expect("PlanLimits always serializes");
    sqlx::query!(
        "UPDATE workspaces SET plan_limits = $1 WHERE id = $2",
        json,
        workspace_id
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn resolve_plan_key_from_price(pool_tx: &mut Transaction<'_, Postgres>, price_id: &str) -> Option<String> {
    sqlx::query_scalar::<_, String>(
        "SELECT key FROM billing_plans WHERE stripe_monthly_price_id = $1 OR stripe_annual_price_id = $1",
    )
    .bind(price_id)
    .fetch_optional(&mut **pool_tx)
    .await
    .ok()
    .flatten()
}

/// The subset of the webhook's raw JSON payload this engine needs. Deriving
/// straight from `serde_json::Value` avoids depending on the provider SDK's
/// full event schema for a handful of fields.
pub struct WebhookEvent<'a> {
    pub event_type: &'a str,
    pub body: &'a Value,
}

/// Applies one accepted webhook event. Unrecognized `event_type`s are a
/// log-and-continue no-op per §7; unrecognized *status values* within a
/// recognized event are `BillingError::UnknownStatus` and mutate nothing.
pub async fn apply_webhook_event(pool: &PgPool, event: WebhookEvent<'_>) -> Result<(), BillingError> {
    match event.event_type {
        "checkout.session.completed" => apply_checkout_completed(pool, event.body).await,
        "customer.subscription.updated" => apply_subscription_updated(pool, event.body).await,
        "customer.subscription.deleted" => apply_subscription_deleted(pool, event.body).await,
        "invoice.payment_succeeded" => apply_invoice_succeeded(pool, event.body).await,
        "invoice.payment_failed" => apply_invoice_failed(pool, event.body).await,
        other => {
            tracing::warn!(event_type = other, "unrecognized webhook event type, ignoring");
            Ok(())
        }
    }
}

/// The write half of `checkout.session.completed`, taking an already-open
/// transaction so `handle_checkout_return` can run its idempotency check and
/// this write under the same lock (§4.4b) instead of releasing it in between.
async fn apply_checkout_completed_tx(
    tx: &mut Transaction<'_, Postgres>,
    team_key: Option<&str>,
    customer_id: Option<&str>,
    body: &Value,
) -> Result<(), BillingError> {
    if body.get("payment_status").and_then(Value::as_str) != Some("paid") {
        return Ok(());
    }
    let subscription_id = body.get("subscription").and_then(Value::as_str);
    let price_id = body.pointer("/metadata/price_id").and_then(Value::as_str);
    let billing_period = body.pointer("/metadata/billing_period").and_then(Value::as_str);

    let workspace = find_workspace_for_webhook(tx, team_key, customer_id).await?;

    let plan_key = match price_id {
        Some(p) => resolve_plan_key_from_price(tx, p).await,
        None => None,
    }
    .unwrap_or(workspace.billing_plan_key.clone());
    let plan = fetch_plan(&mut **tx, &plan_key).await?;

    let mut limits = workspace.plan_limits.clone();
    limits.max_products = plan.max_products;
    limits.max_projects = plan.max_projects;
    limits.max_components = plan.max_components;
    limits.max_users = plan.max_users;
    limits.stripe_customer_id = customer_id.map(str::to_string);
    limits.stripe_subscription_id = subscription_id.map(str::to_string);
    limits.billing_period = match billing_period {
        Some("annual") => Some(BillingPeriod::Annual),
        _ => Some(BillingPeriod::Monthly),
    };
    limits.subscription_status = SubscriptionStatus::Active;
    limits.last_updated = Utc::now();

    write_limits(tx, workspace.id, &limits).await?;
    sqlx::query!(
        "UPDATE workspaces SET billing_plan_key = $1 WHERE id = $2",
        plan.key,
        workspace.id
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn apply_checkout_completed(pool: &PgPool, body: &Value) -> Result<(), BillingError> {
    let team_key = body.pointer("/metadata/team_key").and_then(Value::as_str);
    let customer_id = body.get("customer").and_then(Value::as_str);

    let mut tx = pool.begin().await?;
    apply_checkout_completed_tx(&mut tx, team_key, customer_id, body).await?;
    tx.commit().await?;
    Ok(())
}

async fn apply_subscription_updated(pool: &PgPool, body: &Value) -> Result<(), BillingError> {
    let customer_id = body.get("customer").and_then(Value::as_str);
    let team_key = body.pointer("/metadata/team_key").and_then(Value::as_str);
    let status = body.get("status").and_then(Value::as_str).unwrap_or("");

    let mut tx = pool.begin().await?;
    let workspace = find_workspace_for_webhook(&mut tx, team_key, customer_id).await?;
    let mut limits = workspace.plan_limits.clone();

    match status {
        "trialing" => {
            limits.subscription_status = SubscriptionStatus::Trialing;
            let trial_end = body
                .get("trial_end")
                .and_then(Value::as_i64)
                .and_then(|secs| DateTime::from_timestamp(secs, 0));
            if let Some(trial_end) = trial_end {
                if trial_end < Utc::now() {
                    limits.subscription_status = SubscriptionStatus::Canceled;
                    tracing::info!(workspace_id = %workspace.id, "trial_expired");
                } else {
                    tracing::info!(workspace_id = %workspace.id, "trial_ending");
                }
            }
        }
        "active" => limits.subscription_status = SubscriptionStatus::Active,
        "past_due" => limits.subscription_status = SubscriptionStatus::PastDue,
        "canceled" => limits.subscription_status = SubscriptionStatus::Canceled,
        other => return Err(BillingError::UnknownStatus(other.to_string())),
    }
    limits.cancel_at_period_end = body
        .get("cancel_at_period_end")
        .and_then(Value::as_bool)
        .unwrap_or(limits.cancel_at_period_end);
    limits.last_updated = Utc::now();

    write_limits(&mut tx, workspace.id, &limits).await?;
    tx.commit().await?;
    Ok(())
}

async fn apply_subscription_deleted(pool: &PgPool, body: &Value) -> Result<(), BillingError> {
    let customer_id = body.get("customer").and_then(Value::as_str);
    let team_key = body.pointer("/metadata/team_key").and_then(Value::as_str);

    let mut tx = pool.begin().await?;
    let workspace = find_workspace_for_webhook(&mut tx, team_key, customer_id).await?;
    let mut limits = workspace.plan_limits.clone();
    limits.subscription_status = SubscriptionStatus::Canceled;
    limits.last_updated = Utc::now();
    write_limits(&mut tx, workspace.id, &limits).await?;
    tx.commit().await?;
    Ok(())
}

async fn apply_invoice_succeeded(pool: &PgPool, body: &Value) -> Result<(), BillingError> {
    let customer_id = body.get("customer").and_then(Value::as_str);
    let team_key = body.pointer("/metadata/team_key").and_then(Value::as_str);

    let mut tx = pool.begin().await?;
    let workspace = find_workspace_for_webhook(&mut tx, team_key, customer_id).await?;
    let mut limits = workspace.plan_limits.clone();
    limits.subscription_status = SubscriptionStatus::Active;
    limits.last_payment_amount = body.get("amount_paid").and_then(Value::as_i64);
    limits.last_payment_currency = body
        .get("currency")
        .and_then(Value::as_str)
        .map(str::to_string);
    limits.next_billing_date = body
        .get("next_payment_attempt")
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0));
    limits.last_updated = Utc::now();
    write_limits(&mut tx, workspace.id, &limits).await?;
    tx.commit().await?;
    Ok(())
}

async fn apply_invoice_failed(pool: &PgPool, body: &Value) -> Result<(), BillingError> {
    let customer_id = body.get("customer").and_then(Value::as_str);
    let team_key = body.pointer("/metadata/team_key").and_then(Value::as_str);

    let mut tx = pool.begin().await?;
    let workspace = find_workspace_for_webhook(&mut tx, team_key, customer_id).await?;
    let mut limits = workspace.plan_limits.clone();
    limits.subscription_status = SubscriptionStatus::PastDue;
    limits.last_updated = Utc::now();
    write_limits(&mut tx, workspace.id, &limits).await?;
    tracing::warn!(workspace_id = %workspace.id, "payment_failed");
    tx.commit().await?;
    Ok(())
}

/// Checkout-return endpoint (§4.4b). Idempotent against re-visits of the
/// same return URL: if the subscription is already recorded, this is a
/// no-op.
pub async fn handle_checkout_return(
    pool: &PgPool,
    provider: &dyn PaymentsProvider,
    session_id: &str,
) -> Result<(), BillingError> {
    let session = provider.fetch_checkout_session(session_id).await?;
    let team_key = session.metadata.get("team_key").cloned();

    let mut tx = pool.begin().await?;
    let workspace = find_workspace_for_webhook(&mut tx, team_key.as_deref(), Some(&session.customer)).await?;

    if workspace.plan_limits.stripe_subscription_id.as_deref() == session.subscription.as_deref()
        && session.subscription.is_some()
    {
        tx.commit().await?;
        return Ok(());
    }

    let body = serde_json::json!({
        "payment_status": session.payment_status,
        "customer": session.customer,
        "subscription": session.subscription,
        "metadata": session.metadata,
    });
    apply_checkout_completed_tx(&mut tx, team_key.as_deref(), Some(&session.customer), &body).await?;
    tx.commit().await?;
    Ok(())
}

/// On-demand pull refresh: silently patches the snapshot if it has drifted
/// from what the provider currently reports (§4.4c).
pub async fn pull_refresh(
    pool: &PgPool,
    provider: &dyn PaymentsProvider,
    workspace: &Workspace,
) -> Result<(), BillingError> {
    let Some(subscription_id) = workspace.plan_limits.stripe_subscription_id.as_deref() else {
        return Ok(());
    };
    let subscription: Subscription = provider.fetch_subscription(subscription_id).await?;
    apply_subscription_updated(
        pool,
        &serde_json::json!({
            "customer": subscription.customer,
            "status": subscription.status,
            "cancel_at_period_end": subscription.cancel_at_period_end,
            "metadata": { "team_key": workspace.key },
        }),
    )
    .await
}

/// Downgrade protection (§4.4): while a downgrade is scheduled, resource
/// creation is checked against the *target* plan's limits, not the current
/// one.
pub async fn effective_limits(pool: &PgPool, workspace: &Workspace) -> Result<PlanLimits, PlanError> {
    match &workspace.plan_limits.scheduled_downgrade_plan {
        Some(target_key) if workspace.plan_limits.cancel_at_period_end => {
            let target_plan = fetch_plan(pool, target_key).await?;
            let mut limits = workspace.plan_limits.clone();
            limits.max_products = target_plan.max_products;
            limits.max_projects = target_plan.max_projects;
            limits.max_components = target_plan.max_components;
            limits.max_users = target_plan.max_users;
            Ok(limits)
        }
        _ => Ok(workspace.plan_limits.clone()),
    }
}

/// Clears a scheduled downgrade once the provider reports reactivation
/// (`cancel_at_period_end` flipped back to `false`).
pub async fn clear_downgrade_if_reactivated(pool: &PgPool, workspace: &Workspace) -> Result<(), BillingError> {
    if workspace.plan_limits.scheduled_downgrade_plan.is_some() && !workspace.plan_limits.cancel_at_period_end {
        let mut limits = workspace.plan_limits.clone();
        limits.scheduled_downgrade_plan = None;
        let json = serde_json::to_value(&limits).expect("PlanLimits always serializes");
        sqlx::query!(
            "UPDATE workspaces SET plan_limits = $1 WHERE id = $2",
            json,
            workspace.id
        )
        .execute(pool)
        .await?;
    }
    Ok(())
}
