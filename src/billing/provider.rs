//! The external payments provider boundary.
//!
//! Grounded in the original's `billing/stripe_client.py`, which wraps every
//! provider call and funnels `CardError`/`RateLimitError`/
//! `InvalidRequestError`/`AuthenticationError`/`APIConnectionError`/generic
//! `StripeError` into one domain error type. We do the same with a single
//! `ProviderError::Upstream` variant — the caller never needs to discriminate
//! further, it just retries or surfaces *provider-error* (§7).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("upstream payments provider error: {0}")]
    Upstream(String),
    #[error("request to payments provider timed out")]
    Timeout,
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Upstream(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub subscription: Option<String>,
    pub customer: String,
    pub payment_status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    pub cancel_at_period_end: bool,
    pub current_period_end: DateTime<Utc>,
    pub trial_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<SubscriptionItem>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
}

/// Every entry point in C5 (webhook, checkout-return, pull-refresh) goes
/// through this trait so tests substitute an in-memory double instead of
/// calling out to a real provider.
#[async_trait]
pub trait PaymentsProvider: Send + Sync {
    async fn fetch_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, ProviderError>;
    async fn fetch_subscription(&self, subscription_id: &str) -> Result<Subscription, ProviderError>;
    async fn fetch_customer(&self, customer_id: &str) -> Result<Customer, ProviderError>;
}

/// Talks to the real provider's REST API over `reqwest`, matching the
/// teacher's `reqwest::Client` usage elsewhere in the enterprise stack.
pub struct HttpPaymentsProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl HttpPaymentsProvider {
    pub fn new(api_base: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client builds with a finite timeout");
        Self { client, api_base, api_key }
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ProviderError> {
        let response = self
            .client
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::Upstream(format!(
                "provider returned {}",
                response.status()
            )));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl PaymentsProvider for HttpPaymentsProvider {
    async fn fetch_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, ProviderError> {
        self.get(&format!("/v1/checkout/sessions/{session_id}")).await
    }

    async fn fetch_subscription(&self, subscription_id: &str) -> Result<Subscription, ProviderError> {
        self.get(&format!("/v1/subscriptions/{subscription_id}")).await
    }

    async fn fetch_customer(&self, customer_id: &str) -> Result<Customer, ProviderError> {
        self.get(&format!("/v1/customers/{customer_id}")).await
    }
}
