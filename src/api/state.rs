//! Shared application state threaded through every handler via axum's
//! `State` extractor. Grounded in `src/saas_app.rs`'s `AppState` shape —
//! one `Arc`-wrapped struct holding the pool and every trait-object
//! collaborator a handler might need.

use std::sync::Arc;

use sqlx::PgPool;

use crate::access::request::SharedPendingCountCache;
use crate::artifacts::ObjectStore;
use crate::billing::PaymentsProvider;
use crate::config::Config;
use crate::events::Broadcaster;
use crate::host_admission::SharedHostAdmission;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub host_admission: SharedHostAdmission,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub object_store: Arc<dyn ObjectStore>,
    pub payments_provider: Arc<dyn PaymentsProvider>,
    pub pending_counts: SharedPendingCountCache,
}
