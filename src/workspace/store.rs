//! Workspace/Member/Invitation operations (C3).
//!
//! Transaction shapes follow the teacher's `src/saas/tenant.rs` manager
//! methods (`PgPool` in, `sqlx::query!`/`query_as!` with an explicit
//! `Transaction` for anything that touches more than one row atomically).

use chrono::{Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use super::model::{derive_workspace_key, Invitation, Member, PlanLimits, Workspace};
use super::role::Role;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace not found")]
    NotFound,
    #[error("workspace is the caller's default and cannot be deleted")]
    DefaultWorkspace,
    #[error("owner has no other workspace to fall back to")]
    LastWorkspace,
    #[error("target is the only remaining owner")]
    LastOwner,
    #[error("invitation has expired")]
    InvitationExpired,
    #[error("invitation email does not match the accepting user")]
    EmailMismatch,
    #[error("user is already a member of this workspace")]
    AlreadyMember,
    #[error("workspace has reached its seat limit")]
    SeatLimit,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

pub async fn create_workspace(
    pool: &PgPool,
    owner_user_id: Uuid,
    name: &str,
    key_secret: &str,
) -> Result<Workspace, WorkspaceError> {
    let mut tx = pool.begin().await?;
    let id = Uuid::new_v4();
    let key = derive_workspace_key(id, key_secret);
    let limits = PlanLimits::community_defaults();
    let limits_json = serde_json::to_value(&limits).map_err(|e| WorkspaceError::Db(sqlx::Error::Decode(Box::new(e))))?;

    sqlx::query!(
        r#"INSERT INTO workspaces (id, key, name, billing_plan_key, plan_limits)
           VALUES ($1, $2, $3, 'community', $4)"#,
        id,
        key,
        name,
        limits_json,
    )
    .execute(&mut *tx)
    .await?;

    let has_existing_default: bool = sqlx::query_scalar!(
        "SELECT EXISTS(SELECT 1 FROM members WHERE user_id = $1 AND is_default)",
        owner_user_id
    )
    .fetch_one(&mut *tx)
    .await?
    .unwrap_or(false);

    sqlx::query!(
        r#"INSERT INTO members (workspace_id, user_id, role, is_default)
           VALUES ($1, $2, 'owner', $3)"#,
        id,
        owner_user_id,
        !has_existing_default,
    )
    .execute(&mut *tx)
    .await?;

    let workspace = fetch_workspace_tx(&mut tx, id).await?;
    tx.commit().await?;
    Ok(workspace)
}

async fn fetch_workspace_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Workspace, WorkspaceError> {
    sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(WorkspaceError::NotFound)
}

pub async fn fetch_workspace(pool: &PgPool, id: Uuid) -> Result<Workspace, WorkspaceError> {
    sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(WorkspaceError::NotFound)
}

pub async fn fetch_workspace_by_key(pool: &PgPool, key: &str) -> Result<Workspace, WorkspaceError> {
    sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await?
        .ok_or(WorkspaceError::NotFound)
}

pub async fn rename_workspace(
    pool: &PgPool,
    workspace_id: Uuid,
    name: &str,
) -> Result<(), WorkspaceError> {
    let result = sqlx::query!(
        "UPDATE workspaces SET name = $1 WHERE id = $2",
        name,
        workspace_id
    )
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(WorkspaceError::NotFound);
    }
    Ok(())
}

/// Clears any prior default for the user and sets the new one, in one
/// transaction. Idempotent: setting the already-default workspace as
/// default again is a no-op.
pub async fn set_default(
    pool: &PgPool,
    user_id: Uuid,
    workspace_id: Uuid,
) -> Result<(), WorkspaceError> {
    let mut tx = pool.begin().await?;
    sqlx::query!(
        "UPDATE members SET is_default = FALSE WHERE user_id = $1 AND is_default",
        user_id
    )
    .execute(&mut *tx)
    .await?;
    let result = sqlx::query!(
        "UPDATE members SET is_default = TRUE WHERE user_id = $1 AND workspace_id = $2",
        user_id,
        workspace_id
    )
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(WorkspaceError::NotFound);
    }
    tx.commit().await?;
    Ok(())
}

/// `delete(workspace)` by owner — fails with *default-workspace* or
/// *last-workspace* per §4.1.
pub async fn delete_workspace(
    pool: &PgPool,
    owner_user_id: Uuid,
    workspace_id: Uuid,
) -> Result<(), WorkspaceError> {
    let mut tx = pool.begin().await?;

    let membership = sqlx::query_as::<_, Member>(
        "SELECT * FROM members WHERE workspace_id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(workspace_id)
    .bind(owner_user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(WorkspaceError::NotFound)?;

    if membership.is_default {
        return Err(WorkspaceError::DefaultWorkspace);
    }

    let other_workspace_count: i64 = sqlx::query_scalar!(
        "SELECT COUNT(*) FROM members WHERE user_id = $1 AND workspace_id != $2",
        owner_user_id,
        workspace_id
    )
    .fetch_one(&mut *tx)
    .await?
    .unwrap_or(0);

    if other_workspace_count == 0 {
        return Err(WorkspaceError::LastWorkspace);
    }

    sqlx::query!("DELETE FROM workspaces WHERE id = $1", workspace_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn create_invitation(
    pool: &PgPool,
    workspace_id: Uuid,
    email: &str,
    role: Role,
) -> Result<Invitation, WorkspaceError> {
    let token = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(7);
    let invitation = sqlx::query_as::<_, Invitation>(
        r#"INSERT INTO invitations (workspace_id, email, role, token, expires_at)
           VALUES ($1, $2, $3, $4, $5)
           RETURNING *"#,
    )
    .bind(workspace_id)
    .bind(email)
    .bind(role)
    .bind(&token)
    .bind(expires_at)
    .fetch_one(pool)
    .await?;
    Ok(invitation)
}

/// `accept_invitation(user, token)` — fails with *expired*,
/// *email-mismatch*, *already-member*, or *seat-limit* per §4.1.
pub async fn accept_invitation(
    pool: &PgPool,
    user_id: Uuid,
    user_email: &str,
    token: &str,
) -> Result<Member, WorkspaceError> {
    let mut tx = pool.begin().await?;

    let invitation = sqlx::query_as::<_, Invitation>(
        "SELECT * FROM invitations WHERE token = $1 FOR UPDATE",
    )
    .bind(token)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(WorkspaceError::NotFound)?;

    if invitation.expires_at < Utc::now() {
        sqlx::query!("DELETE FROM invitations WHERE id = $1", invitation.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        return Err(WorkspaceError::InvitationExpired);
    }

    if !invitation.email.eq_ignore_ascii_case(user_email) {
        return Err(WorkspaceError::EmailMismatch);
    }

    let already_member: bool = sqlx::query_scalar!(
        "SELECT EXISTS(SELECT 1 FROM members WHERE workspace_id = $1 AND user_id = $2)",
        invitation.workspace_id,
        user_id
    )
    .fetch_one(&mut *tx)
    .await?
    .unwrap_or(false);
    if already_member {
        return Err(WorkspaceError::AlreadyMember);
    }

    let workspace = fetch_workspace_tx(&mut tx, invitation.workspace_id).await?;
    if let Some(max_users) = workspace.plan_limits.max_users {
        let current_users: i64 = sqlx::query_scalar!(
            "SELECT COUNT(*) FROM members WHERE workspace_id = $1",
            invitation.workspace_id
        )
        .fetch_one(&mut *tx)
        .await?
        .unwrap_or(0);
        if current_users + 1 > max_users {
            return Err(WorkspaceError::SeatLimit);
        }
    }

    let has_default: bool = sqlx::query_scalar!(
        "SELECT EXISTS(SELECT 1 FROM members WHERE user_id = $1 AND is_default)",
        user_id
    )
    .fetch_one(&mut *tx)
    .await?
    .unwrap_or(false);

    let member = sqlx::query_as::<_, Member>(
        r#"INSERT INTO members (workspace_id, user_id, role, is_default)
           VALUES ($1, $2, $3, $4)
           RETURNING *"#,
    )
    .bind(invitation.workspace_id)
    .bind(user_id)
    .bind(invitation.role)
    .bind(!has_default)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query!("DELETE FROM invitations WHERE id = $1", invitation.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(member)
}

pub async fn decline_invitation(pool: &PgPool, token: &str) -> Result<(), WorkspaceError> {
    sqlx::query!("DELETE FROM invitations WHERE token = $1", token)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn change_role(
    pool: &PgPool,
    workspace_id: Uuid,
    target_user_id: Uuid,
    new_role: Role,
) -> Result<(), WorkspaceError> {
    let mut tx = pool.begin().await?;
    let current = sqlx::query_as::<_, Member>(
        "SELECT * FROM members WHERE workspace_id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(workspace_id)
    .bind(target_user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(WorkspaceError::NotFound)?;

    if current.role == Role::Owner && new_role != Role::Owner {
        ensure_not_last_owner(&mut tx, workspace_id, target_user_id).await?;
    }

    sqlx::query!(
        "UPDATE members SET role = $1 WHERE workspace_id = $2 AND user_id = $3",
        new_role as Role,
        workspace_id,
        target_user_id
    )
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

/// `remove_member(actor, target)` — fails with *last-owner* if target is
/// the only owner (§4.1).
pub async fn remove_member(
    pool: &PgPool,
    workspace_id: Uuid,
    target_user_id: Uuid,
) -> Result<(), WorkspaceError> {
    let mut tx = pool.begin().await?;
    let target = sqlx::query_as::<_, Member>(
        "SELECT * FROM members WHERE workspace_id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(workspace_id)
    .bind(target_user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(WorkspaceError::NotFound)?;

    if target.role == Role::Owner {
        ensure_not_last_owner(&mut tx, workspace_id, target_user_id).await?;
    }

    sqlx::query!(
        "DELETE FROM members WHERE workspace_id = $1 AND user_id = $2",
        workspace_id,
        target_user_id
    )
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

async fn ensure_not_last_owner(
    tx: &mut Transaction<'_, Postgres>,
    workspace_id: Uuid,
    excluding_user_id: Uuid,
) -> Result<(), WorkspaceError> {
    let other_owners: i64 = sqlx::query_scalar!(
        r#"SELECT COUNT(*) FROM members
           WHERE workspace_id = $1 AND role = 'owner' AND user_id != $2"#,
        workspace_id,
        excluding_user_id
    )
    .fetch_one(&mut **tx)
    .await?
    .unwrap_or(0);
    if other_owners == 0 {
        return Err(WorkspaceError::LastOwner);
    }
    Ok(())
}

pub async fn list_memberships(pool: &PgPool, user_id: Uuid) -> Result<Vec<Member>, WorkspaceError> {
    let members = sqlx::query_as::<_, Member>("SELECT * FROM members WHERE user_id = $1")
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(members)
}

pub async fn find_membership(
    pool: &PgPool,
    workspace_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Member>, WorkspaceError> {
    let member = sqlx::query_as::<_, Member>(
        "SELECT * FROM members WHERE workspace_id = $1 AND user_id = $2",
    )
    .bind(workspace_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(member)
}
