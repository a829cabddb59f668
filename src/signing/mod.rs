//! Signed-URL Mint/Verify (C10).
//!
//! HMAC-SHA256 envelope, grounded in `src/api/webhooks.rs`'s
//! `type HmacSha256 = Hmac<Sha256>;` signature scheme and constant-time
//! comparison helper.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_TTL_DAYS: i64 = 7;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    artifact_id: Uuid,
    user_id: Uuid,
    issued_at: i64,
    expires_at: i64,
}

/// Mints a signed, time-boxed token scoped to one artifact and one user.
/// Default TTL is 7 days (§4.7).
pub fn mint(artifact_id: Uuid, user_id: Uuid, secret: &str) -> String {
    mint_with_ttl(artifact_id, user_id, secret, Duration::days(DEFAULT_TTL_DAYS))
}

pub fn mint_with_ttl(artifact_id: Uuid, user_id: Uuid, secret: &str, ttl: Duration) -> String {
    let now = Utc::now();
    let envelope = Envelope {
        artifact_id,
        user_id,
        issued_at: now.timestamp(),
        expires_at: (now + ttl).timestamp(),
    };
    let payload = serde_json::to_vec(&envelope).expect("envelope always serializes");
    let payload_b64 = URL_SAFE_NO_PAD.encode(&payload);
    let signature = sign(secret, payload_b64.as_bytes());
    format!("{payload_b64}.{signature}")
}

/// Outcome of verification. Every failure maps to the same generic 403 at
/// the HTTP layer (§4.7) — the specific reason is only for server logs.
#[derive(Debug, PartialEq, Eq)]
pub enum VerifyFailure {
    Malformed,
    BadSignature,
    Expired,
    ArtifactMismatch,
    UserInactive,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Verified {
    pub user_id: Uuid,
}

/// Verifies a token against the current secret, expiry, and the artifact id
/// named in the URL path. Caller is responsible for the fourth check (the
/// user still resolving to an active account).
pub fn verify(token: &str, expected_artifact_id: Uuid, secret: &str) -> Result<Verified, VerifyFailure> {
    let (payload_b64, signature) = token.split_once('.').ok_or(VerifyFailure::Malformed)?;

    let expected_signature = sign(secret, payload_b64.as_bytes());
    if !constant_time_eq(expected_signature.as_bytes(), signature.as_bytes()) {
        return Err(VerifyFailure::BadSignature);
    }

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| VerifyFailure::Malformed)?;
    let envelope: Envelope =
        serde_json::from_slice(&payload).map_err(|_| VerifyFailure::Malformed)?;

    if envelope.expires_at <= Utc::now().timestamp() {
        return Err(VerifyFailure::Expired);
    }
    if envelope.artifact_id != expected_artifact_id {
        return Err(VerifyFailure::ArtifactMismatch);
    }

    Ok(Verified {
        user_id: envelope.user_id,
    })
}

fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison, same shape as `src/api/webhooks.rs`'s helper.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_valid_token() {
        let secret = "url-secret";
        let artifact_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let token = mint(artifact_id, user_id, secret);
        let verified = verify(&token, artifact_id, secret).unwrap();
        assert_eq!(verified.user_id, user_id);
    }

    #[test]
    fn rejects_mismatched_artifact_id() {
        let secret = "url-secret";
        let token = mint(Uuid::new_v4(), Uuid::new_v4(), secret);
        assert_eq!(verify(&token, Uuid::new_v4(), secret), Err(VerifyFailure::ArtifactMismatch));
    }

    #[test]
    fn rejects_tampered_signature() {
        let secret = "url-secret";
        let artifact_id = Uuid::new_v4();
        let token = mint(artifact_id, Uuid::new_v4(), secret);
        let mut tampered = token.clone();
        tampered.push('x');
        assert_eq!(verify(&tampered, artifact_id, secret), Err(VerifyFailure::BadSignature));
    }

    #[test]
    fn rejects_expired_token() {
        let secret = "url-secret";
        let artifact_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let token = mint_with_ttl(artifact_id, user_id, secret, Duration::seconds(-1));
        assert_eq!(verify(&token, artifact_id, secret), Err(VerifyFailure::Expired));
    }

    #[test]
    fn rejects_wrong_secret() {
        let artifact_id = Uuid::new_v4();
        let token = mint(artifact_id, Uuid::new_v4(), "secret-a");
        assert_eq!(verify(&token, artifact_id, "secret-b"), Err(VerifyFailure::BadSignature));
    }
}
