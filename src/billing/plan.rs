//! Plan & Entitlement Store (C4).
//!
//! `BillingPlan` rows plus the pre-creation gate from §4.4: "counts the
//! workspace's current resources of that type and rejects if
//! `current + 1 > max_allowed`".

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::workspace::model::Workspace;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BillingPlan {
    pub key: String,
    pub name: String,
    pub max_products: Option<i64>,
    pub max_projects: Option<i64>,
    pub max_components: Option<i64>,
    pub max_users: Option<i64>,
    pub stripe_monthly_price_id: Option<String>,
    pub stripe_annual_price_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Product,
    Project,
    Component,
}

impl ResourceKind {
    fn table(self) -> &'static str {
        match self {
            Self::Product => "products",
            Self::Project => "projects",
            Self::Component => "components",
        }
    }

    fn limit(self, limits: &crate::workspace::model::PlanLimits) -> Option<i64> {
        match self {
            Self::Product => limits.max_products,
            Self::Project => limits.max_projects,
            Self::Component => limits.max_components,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Product => "products",
            Self::Project => "projects",
            Self::Component => "components",
        }
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("plan not found")]
    NotFound,
    #[error("would exceed plan limit for {resource}: {current}/{max}")]
    LimitExceeded { resource: String, current: i64, max: i64 },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Generic over the executor so a caller already holding a transaction
/// (see `billing::sync::apply_checkout_completed_tx`) can look up a plan
/// without opening a second one.
pub async fn fetch_plan<'c, E>(executor: E, key: &str) -> Result<BillingPlan, PlanError>
where
    E: sqlx::PgExecutor<'c>,
{
    sqlx::query_as::<_, BillingPlan>("SELECT * FROM billing_plans WHERE key = $1")
        .bind(key)
        .fetch_optional(executor)
        .await?
        .ok_or(PlanError::NotFound)
}

/// The pre-creation gate of §4.4: bypassed entirely when billing is
/// globally disabled, and when the *effective* plan (the downgrade target,
/// if one is scheduled — see [`super::sync::effective_limits`]) has no cap
/// or is `enterprise`.
pub async fn check_creation_allowed(
    pool: &PgPool,
    workspace: &Workspace,
    resource: ResourceKind,
    billing_enabled: bool,
) -> Result<(), PlanError> {
    if !billing_enabled {
        return Ok(());
    }
    if workspace.billing_plan_key == "enterprise" {
        return Ok(());
    }

    let limits = super::sync::effective_limits(pool, workspace).await?;
    let Some(max) = resource.limit(&limits) else {
        return Ok(());
    };

    let current: i64 = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM {} WHERE workspace_id = $1",
        resource.table()
    ))
    .bind(workspace.id)
    .fetch_one(pool)
    .await?;

    if current + 1 > max {
        return Err(PlanError::LimitExceeded {
            resource: resource.name().to_string(),
            current,
            max,
        });
    }
    Ok(())
}
