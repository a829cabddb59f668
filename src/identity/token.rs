//! Personal access token envelope.
//!
//! Grounded in `enterprise/auth/jwt.rs`'s `JwtConfig`/HS256 approach, narrowed
//! to the single claim shape the platform actually needs: `{sub, iss, salt}`
//! with no capability claims, since authorization is always re-derived from
//! the resolved user rather than trusted from the token (§3.1).

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const ISSUER: &str = "sbom-trust-center";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed or unverifiable token")]
    Invalid,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    iss: String,
    salt: String,
    exp: i64,
}

/// Mints the `encoded_token` stored verbatim on the `AccessToken` row.
///
/// There is no expiry on personal tokens (they live until revoked by row
/// deletion) so `exp` is set far in the future purely to satisfy
/// `jsonwebtoken`'s mandatory expiry validation.
pub fn encode_personal_token(user_id: Uuid, secret: &str) -> Result<String, TokenError> {
    let claims = Claims {
        sub: user_id,
        iss: ISSUER.to_string(),
        salt: Uuid::new_v4().to_string(),
        exp: (Utc::now() + chrono::Duration::days(365 * 20)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| TokenError::Invalid)
}

/// Recovers the `sub` claim (the owning user id) from an encoded token,
/// without consulting storage. Callers still need to check the token row
/// exists (revocation is "delete the row", not a blacklist).
pub fn decode_personal_token(token: &str, secret: &str) -> Result<Uuid, TokenError> {
    let mut validation = Validation::default();
    validation.set_issuer(&[ISSUER]);
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|_| TokenError::Invalid)?;
    Ok(data.claims.sub)
}
