//! Identity & Token Verifier (C1).
//!
//! Resolves callers from a bearer token or session cookie. Makes no
//! authorization decisions — that is entirely C7's job
//! ([`crate::access::resolver`]).

pub mod token;

use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use self::token::{decode_personal_token, encode_personal_token, TokenError};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub is_active: bool,
}

/// The resolved caller for a request. Never carries capability claims —
/// every authorization check re-derives membership/role from storage.
#[derive(Debug, Clone)]
pub enum Caller {
    Anonymous,
    User(User),
}

impl Caller {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Caller::Anonymous => None,
            Caller::User(u) => Some(u.id),
        }
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid or expired credential")]
    InvalidCredential,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Resolves a caller from an `Authorization: Bearer <token>` header or a
/// `session` cookie value. Both encode the same envelope
/// (`{sub, iss, salt}`) signed with `access_token_secret` — a personal
/// token is simply a session that never expires and is stored so it can be
/// individually revoked.
pub async fn resolve_caller(
    pool: &PgPool,
    bearer: Option<&str>,
    session_cookie: Option<&str>,
    access_token_secret: &str,
) -> Result<Caller, IdentityError> {
    let Some(token) = bearer.or(session_cookie) else {
        return Ok(Caller::Anonymous);
    };

    let user_id = match decode_personal_token(token, access_token_secret) {
        Ok(id) => id,
        Err(TokenError::Invalid) => return Err(IdentityError::InvalidCredential),
    };

    // Bearer tokens must additionally exist as a live AccessToken row —
    // deleting the row is how a personal token is revoked. Session cookies
    // (not persisted) skip this check.
    if bearer.is_some() {
        let exists = sqlx::query_scalar!(
            "SELECT EXISTS(SELECT 1 FROM access_tokens WHERE encoded_token = $1)",
            token
        )
        .fetch_one(pool)
        .await?
        .unwrap_or(false);
        if !exists {
            return Err(IdentityError::InvalidCredential);
        }
    }

    let user = sqlx::query_as!(
        User,
        "SELECT id, email, is_active FROM users WHERE id = $1",
        user_id
    )
    .fetch_optional(pool)
    .await?;

    match user {
        Some(u) if u.is_active => Ok(Caller::User(u)),
        _ => Err(IdentityError::InvalidCredential),
    }
}

/// Creates and persists a new personal access token for a user.
pub async fn create_personal_token(
    pool: &PgPool,
    user_id: Uuid,
    description: &str,
    access_token_secret: &str,
) -> Result<(Uuid, String), IdentityError> {
    let encoded = encode_personal_token(user_id, access_token_secret)
        .map_err(|_| IdentityError::InvalidCredential)?;
    let id = sqlx::query_scalar!(
        "INSERT INTO access_tokens (user_id, encoded_token, description) VALUES ($1, $2, $3) RETURNING id",
        user_id,
        encoded,
        description
    )
    .fetch_one(pool)
    .await?;
    Ok((id, encoded))
}

pub async fn revoke_personal_token(
    pool: &PgPool,
    user_id: Uuid,
    token_id: Uuid,
) -> Result<(), IdentityError> {
    sqlx::query!(
        "DELETE FROM access_tokens WHERE id = $1 AND user_id = $2",
        token_id,
        user_id
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::token::*;

    #[test]
    fn round_trips_user_id() {
        let secret = "test-secret";
        let user_id = uuid::Uuid::new_v4();
        let encoded = encode_personal_token(user_id, secret).unwrap();
        let decoded = decode_personal_token(&encoded, secret).unwrap();
        assert_eq!(decoded, user_id);
    }

    #[test]
    fn rejects_token_signed_with_a_different_secret() {
        let user_id = uuid::Uuid::new_v4();
        let encoded = encode_personal_token(user_id, "secret-a").unwrap();
        assert!(decode_personal_token(&encoded, "secret-b").is_err());
    }
}
