//! Plan & Entitlement Store (C4) and Subscription Sync Engine (C5).
//!
//! Grounded in `src/saas/billing.rs` and `src/saas/subscription.rs` for the
//! persistence shape, and the original's `billing/stripe_client.py` for the
//! provider error-translation discipline.

pub mod plan;
pub mod provider;
pub mod sync;

pub use plan::{BillingPlan, PlanError, ResourceKind};
pub use provider::{HttpPaymentsProvider, PaymentsProvider, ProviderError};
pub use sync::BillingError;
