//! Workspace, Member, Invitation, and PlanLimits row shapes.
//!
//! `#[derive(sqlx::FromRow)]` plus `#[sqlx(json)]` wrapper fields for the
//! JSONB columns, the way the teacher's `src/saas/tenant.rs` maps `Tenant`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Suspended,
}

impl SubscriptionStatus {
    /// Rule 1 of §4.2: owners/admins keep read access to fix billing, but
    /// anyone else is locked out while the workspace is in one of these.
    pub fn blocks_non_admin_reads(self) -> bool {
        matches!(self, Self::PastDue | Self::Suspended)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billing_period", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Monthly,
    Annual,
}

/// Mutable snapshot embedded in `Workspace.plan_limits`, kept current by C5
/// so limit checks never need to call the payments provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanLimits {
    pub max_products: Option<i64>,
    pub max_projects: Option<i64>,
    pub max_components: Option<i64>,
    pub max_users: Option<i64>,
    pub subscription_status: SubscriptionStatus,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub billing_period: Option<BillingPeriod>,
    pub cancel_at_period_end: bool,
    pub scheduled_downgrade_plan: Option<String>,
    pub last_payment_amount: Option<i64>,
    pub last_payment_currency: Option<String>,
    pub next_billing_date: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl PlanLimits {
    pub fn community_defaults() -> Self {
        Self {
            max_products: Some(1),
            max_projects: Some(5),
            max_components: Some(20),
            max_users: Some(3),
            subscription_status: SubscriptionStatus::Active,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            billing_period: None,
            cancel_at_period_end: false,
            scheduled_downgrade_plan: None,
            last_payment_amount: None,
            last_payment_currency: None,
            next_billing_date: None,
            last_updated: Utc::now(),
        }
    }
}

/// Supplemented per the original's `teams/branding.py` and the teacher's
/// `BrandingSettings` — purely cosmetic, never consulted by C7.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Branding {
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub secondary_color: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub support_email: Option<String>,
}

/// Supplemented three-level contact hierarchy, grounded in the original's
/// `test_contact_profiles.py`. Metadata only; never consulted by C7.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contacts {
    #[serde(default)]
    pub billing: Option<ContactProfile>,
    #[serde(default)]
    pub technical: Option<ContactProfile>,
    #[serde(default)]
    pub security: Option<ContactProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactProfile {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Workspace {
    pub id: Uuid,
    pub key: String,
    pub name: String,
    pub billing_plan_key: String,
    #[sqlx(json)]
    pub plan_limits: PlanLimits,
    pub custom_domain: Option<String>,
    pub custom_domain_validated: bool,
    pub custom_domain_last_checked_at: Option<DateTime<Utc>>,
    pub custom_domain_verification_failures: i32,
    #[sqlx(json)]
    pub branding: Branding,
    pub company_nda_document_id: Option<Uuid>,
    #[sqlx(json)]
    pub contacts: Contacts,
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    /// Whether a non-owner/admin caller is currently locked out by billing
    /// status (§4.2 rule 1).
    pub fn payment_blocks_non_admin(&self) -> bool {
        self.plan_limits.subscription_status.blocks_non_admin_reads()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Member {
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Invitation {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub email: String,
    pub role: Role,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Derives the obfuscated, non-enumerable `Workspace.key` from its `id`.
///
/// A keyed XOR over the UUID's bytes followed by URL-safe base64 (the
/// original's `number_to_random_token` base32-encodes instead; base64 is
/// used here since it is already on the dependency list and the exact
/// alphabet has no bearing on the non-enumerability property). Reversible
/// given the secret, never derivable without it.
pub fn derive_workspace_key(id: Uuid, secret: &str) -> String {
    let mut bytes = *id.as_bytes();
    let key_bytes = secret.as_bytes();
    for (i, b) in bytes.iter_mut().enumerate() {
        *b ^= key_bytes[i % key_bytes.len()];
    }
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_derivation_is_deterministic_and_reversible_with_the_secret() {
        let id = Uuid::new_v4();
        let key_a = derive_workspace_key(id, "secret");
        let key_b = derive_workspace_key(id, "secret");
        assert_eq!(key_a, key_b);
        assert_ne!(key_a, id.to_string());
    }

    #[test]
    fn different_secrets_yield_different_keys() {
        let id = Uuid::new_v4();
        assert_ne!(
            derive_workspace_key(id, "secret-a"),
            derive_workspace_key(id, "secret-b")
        );
    }
}
