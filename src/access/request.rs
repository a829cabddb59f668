//! Access-Request & NDA Lifecycle (C6).
//!
//! Race semantics: every mutating entry point takes `SELECT ... FOR UPDATE`
//! on the `AccessRequest` row (or a placeholder row for creation) before
//! checking status, per §4.3 and §5's ordering guarantees.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::events::{Broadcaster, EventKind};
use crate::workspace::Role;

use super::model::{AccessRequest, AccessRequestStatus, NdaSignature};

#[derive(Debug, Error)]
pub enum AccessRequestError {
    #[error("access request not found")]
    NotFound,
    #[error("access request is not in the expected state")]
    WrongState,
    #[error("the NDA document has changed since you fetched it; please re-review and re-sign")]
    DocumentModified,
    #[error("consent must be given to sign")]
    ConsentRequired,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Caches the pending-access-request count per `(workspace, admin_user)`
/// (§5) — invalidated transactionally-on-commit after any status change.
pub struct PendingCountCache {
    cache: Cache<Uuid, i64>,
}

impl PendingCountCache {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().time_to_live(Duration::from_secs(300)).build(),
        }
    }

    pub async fn invalidate(&self, workspace_id: Uuid) {
        self.cache.invalidate(&workspace_id).await;
    }

    pub async fn count(&self, pool: &PgPool, workspace_id: Uuid) -> Result<i64, sqlx::Error> {
        if let Some(count) = self.cache.get(&workspace_id).await {
            return Ok(count);
        }
        let count: i64 = sqlx::query_scalar!(
            "SELECT COUNT(*) FROM access_requests WHERE workspace_id = $1 AND status = 'pending'",
            workspace_id
        )
        .fetch_one(pool)
        .await?
        .unwrap_or(0);
        self.cache.insert(workspace_id, count).await;
        Ok(count)
    }
}

impl Default for PendingCountCache {
    fn default() -> Self {
        Self::new()
    }
}

/// `create(workspace, user)` — row re-use for `revoked`/`rejected` →
/// `pending`; idempotent return for `approved`/`pending` (§4.3).
pub async fn create(pool: &PgPool, workspace_id: Uuid, user_id: Uuid) -> Result<AccessRequest, AccessRequestError> {
    let mut tx = pool.begin().await?;
    let existing = sqlx::query_as::<_, AccessRequest>(
        "SELECT * FROM access_requests WHERE workspace_id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(workspace_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    let request = match existing {
        Some(request) if matches!(request.status, AccessRequestStatus::Revoked | AccessRequestStatus::Rejected) => {
            sqlx::query_as::<_, AccessRequest>(
                r#"UPDATE access_requests
                   SET status = 'pending', decided_at = NULL, decided_by = NULL,
                       revoked_at = NULL, revoked_by = NULL, requested_at = now()
                   WHERE id = $1
                   RETURNING *"#,
            )
            .bind(request.id)
            .fetch_one(&mut *tx)
            .await?
        }
        Some(request) => request,
        None => insert_request(&mut tx, workspace_id, user_id).await?,
    };
    tx.commit().await?;
    Ok(request)
}

async fn insert_request(
    tx: &mut Transaction<'_, Postgres>,
    workspace_id: Uuid,
    user_id: Uuid,
) -> Result<AccessRequest, AccessRequestError> {
    // A concurrent creator can win the unique-violation race; one retry
    // picks up whichever row committed first (§4.3, §8 idempotence law).
    let inserted = sqlx::query_as::<_, AccessRequest>(
        r#"INSERT INTO access_requests (workspace_id, user_id)
           VALUES ($1, $2)
           ON CONFLICT (workspace_id, user_id) DO NOTHING
           RETURNING *"#,
    )
    .bind(workspace_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;

    match inserted {
        Some(request) => Ok(request),
        None => sqlx::query_as::<_, AccessRequest>(
            "SELECT * FROM access_requests WHERE workspace_id = $1 AND user_id = $2",
        )
        .bind(workspace_id)
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(Into::into),
    }
}

/// `sign_nda(access_request, name, consent)` — pins the signature to the
/// NDA's content hash at signing time so a later document replacement
/// invalidates it uniformly (§4.2, §4.3).
pub async fn sign_nda(
    pool: &PgPool,
    broadcaster: &dyn Broadcaster,
    pending_counts: &PendingCountCache,
    access_request_id: Uuid,
    nda_document_id: Uuid,
    fetched_content_hash: &str,
    signed_name: &str,
    consent: bool,
    ip_address: &str,
    user_agent: &str,
) -> Result<NdaSignature, AccessRequestError> {
    if !consent {
        return Err(AccessRequestError::ConsentRequired);
    }

    let mut tx = pool.begin().await?;
    let request = sqlx::query_as::<_, AccessRequest>(
        "SELECT * FROM access_requests WHERE id = $1 FOR UPDATE",
    )
    .bind(access_request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AccessRequestError::NotFound)?;

    let current_hash: String = sqlx::query_scalar!(
        "SELECT content_hash FROM documents WHERE id = $1",
        nda_document_id
    )
    .fetch_one(&mut *tx)
    .await?;

    if current_hash != fetched_content_hash {
        return Err(AccessRequestError::DocumentModified);
    }

    let signature = sqlx::query_as::<_, NdaSignature>(
        r#"INSERT INTO nda_signatures
               (access_request_id, nda_document_id, nda_content_hash, signed_name, ip_address, user_agent)
           VALUES ($1, $2, $3, $4, $5, $6)
           ON CONFLICT (access_request_id) DO UPDATE SET
               nda_document_id = EXCLUDED.nda_document_id,
               nda_content_hash = EXCLUDED.nda_content_hash,
               signed_name = EXCLUDED.signed_name,
               signed_at = now(),
               ip_address = EXCLUDED.ip_address,
               user_agent = EXCLUDED.user_agent
           RETURNING *"#,
    )
    .bind(request.id)
    .bind(nda_document_id)
    .bind(&current_hash)
    .bind(signed_name)
    .bind(ip_address)
    .bind(user_agent)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    pending_counts.invalidate(request.workspace_id).await;
    broadcaster
        .publish(crate::events::Event {
            workspace_id: request.workspace_id,
            kind: EventKind::AccessRequestUpdated,
            payload: serde_json::json!({ "access_request_id": request.id, "event": "nda_signed" }),
        })
        .await;
    Ok(signature)
}

/// `approve(actor, request)` — must be owner/admin. Upserts a `guest`
/// Member, invalidates the pending-count cache, broadcasts.
pub async fn approve(
    pool: &PgPool,
    broadcaster: &dyn Broadcaster,
    pending_counts: &PendingCountCache,
    actor_role: Role,
    actor_id: Uuid,
    access_request_id: Uuid,
) -> Result<(), AccessRequestError> {
    if !actor_role.is_owner_or_admin() {
        return Err(AccessRequestError::WrongState);
    }

    let mut tx = pool.begin().await?;
    let request = sqlx::query_as::<_, AccessRequest>(
        "SELECT * FROM access_requests WHERE id = $1 FOR UPDATE",
    )
    .bind(access_request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AccessRequestError::NotFound)?;

    if request.status != AccessRequestStatus::Pending {
        return Err(AccessRequestError::WrongState);
    }

    sqlx::query!(
        "UPDATE access_requests SET status = 'approved', decided_at = now(), decided_by = $1 WHERE id = $2",
        actor_id,
        request.id
    )
    .execute(&mut *tx)
    .await?;

    let has_default: bool = sqlx::query_scalar!(
        "SELECT EXISTS(SELECT 1 FROM members WHERE user_id = $1 AND is_default)",
        request.user_id
    )
    .fetch_one(&mut *tx)
    .await?
    .unwrap_or(false);

    sqlx::query!(
        r#"INSERT INTO members (workspace_id, user_id, role, is_default)
           VALUES ($1, $2, 'guest', $3)
           ON CONFLICT (workspace_id, user_id) DO NOTHING"#,
        request.workspace_id,
        request.user_id,
        !has_default,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    pending_counts.invalidate(request.workspace_id).await;
    broadcaster
        .publish(crate::events::Event {
            workspace_id: request.workspace_id,
            kind: EventKind::AccessRequestUpdated,
            payload: serde_json::json!({ "access_request_id": request.id, "event": "approved" }),
        })
        .await;
    Ok(())
}

pub async fn reject(
    pool: &PgPool,
    broadcaster: &dyn Broadcaster,
    pending_counts: &PendingCountCache,
    actor_role: Role,
    actor_id: Uuid,
    access_request_id: Uuid,
) -> Result<(), AccessRequestError> {
    if !actor_role.is_owner_or_admin() {
        return Err(AccessRequestError::WrongState);
    }
    let mut tx = pool.begin().await?;
    let request = sqlx::query_as::<_, AccessRequest>(
        "SELECT * FROM access_requests WHERE id = $1 FOR UPDATE",
    )
    .bind(access_request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AccessRequestError::NotFound)?;
    if request.status != AccessRequestStatus::Pending {
        return Err(AccessRequestError::WrongState);
    }
    sqlx::query!(
        "UPDATE access_requests SET status = 'rejected', decided_at = now(), decided_by = $1 WHERE id = $2",
        actor_id,
        request.id
    )
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    pending_counts.invalidate(request.workspace_id).await;
    broadcaster
        .publish(crate::events::Event {
            workspace_id: request.workspace_id,
            kind: EventKind::AccessRequestUpdated,
            payload: serde_json::json!({ "access_request_id": request.id, "event": "rejected" }),
        })
        .await;
    Ok(())
}

/// `revoke` additionally deletes the guest Member row and the
/// NDASignature, so a future re-request re-prompts NDA (§4.3).
pub async fn revoke(
    pool: &PgPool,
    broadcaster: &dyn Broadcaster,
    pending_counts: &PendingCountCache,
    actor_role: Role,
    actor_id: Uuid,
    access_request_id: Uuid,
) -> Result<(), AccessRequestError> {
    if !actor_role.is_owner_or_admin() {
        return Err(AccessRequestError::WrongState);
    }
    let mut tx = pool.begin().await?;
    let request = sqlx::query_as::<_, AccessRequest>(
        "SELECT * FROM access_requests WHERE id = $1 FOR UPDATE",
    )
    .bind(access_request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AccessRequestError::NotFound)?;

    sqlx::query!(
        "UPDATE access_requests SET status = 'revoked', revoked_at = now(), revoked_by = $1 WHERE id = $2",
        actor_id,
        request.id
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query!(
        "DELETE FROM nda_signatures WHERE access_request_id = $1",
        request.id
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query!(
        "DELETE FROM members WHERE workspace_id = $1 AND user_id = $2 AND role = 'guest'",
        request.workspace_id,
        request.user_id
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    pending_counts.invalidate(request.workspace_id).await;
    broadcaster
        .publish(crate::events::Event {
            workspace_id: request.workspace_id,
            kind: EventKind::AccessRequestUpdated,
            payload: serde_json::json!({ "access_request_id": request.id, "event": "revoked" }),
        })
        .await;
    Ok(())
}

pub async fn fetch(pool: &PgPool, workspace_id: Uuid, user_id: Uuid) -> Result<Option<AccessRequest>, sqlx::Error> {
    sqlx::query_as::<_, AccessRequest>(
        "SELECT * FROM access_requests WHERE workspace_id = $1 AND user_id = $2",
    )
    .bind(workspace_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_signature(pool: &PgPool, access_request_id: Uuid) -> Result<Option<NdaSignature>, sqlx::Error> {
    sqlx::query_as::<_, NdaSignature>("SELECT * FROM nda_signatures WHERE access_request_id = $1")
        .bind(access_request_id)
        .fetch_optional(pool)
        .await
}

pub type SharedPendingCountCache = Arc<PendingCountCache>;
