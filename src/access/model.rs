//! AccessRequest / NDASignature row shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "access_request_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccessRequestStatus {
    Pending,
    Approved,
    Rejected,
    Revoked,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccessRequest {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub status: AccessRequestStatus,
    pub requested_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<Uuid>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<Uuid>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NdaSignature {
    pub access_request_id: Uuid,
    pub nda_document_id: Uuid,
    pub nda_content_hash: String,
    pub signed_name: String,
    pub signed_at: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: String,
}

impl NdaSignature {
    /// Valid iff it was signed against the workspace's *current* NDA
    /// content hash and document id (§4.2 rule 6).
    pub fn is_valid_for(&self, current_nda_document_id: Uuid, current_content_hash: &str) -> bool {
        self.nda_document_id == current_nda_document_id && self.nda_content_hash == current_content_hash
    }
}
