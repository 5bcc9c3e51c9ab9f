//! Password filter for the director API.
//!
//! `AG_WEB_PASSWORD` is read once at startup and stored as a SHA-256
//! digest; requests present the password as a bearer token and the digests
//! are compared in constant time. No password ⇒ the filter admits
//! everything (dev mode). `/status` is never behind the filter — discovery
//! probes must stay unauthenticated.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use ag_domain::Error;

use crate::api::error_response;
use crate::state::DirectorState;

/// Hash a password for startup storage.
pub fn hash_password(password: &str) -> Vec<u8> {
    Sha256::digest(password.as_bytes()).to_vec()
}

/// Check a presented `Authorization: Bearer <password>` header against the
/// stored digest.
pub fn check_bearer(expected_hash: &[u8], header: Option<&str>) -> bool {
    let Some(value) = header else {
        return false;
    };
    let Some(presented) = value.strip_prefix("Bearer ") else {
        return false;
    };
    let presented_hash = Sha256::digest(presented.as_bytes());
    presented_hash.as_slice().ct_eq(expected_hash).into()
}

/// Axum middleware guarding the `/api` routes.
pub async fn require_password(
    State(state): State<DirectorState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = state.password_hash.as_ref() {
        let header = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if !check_bearer(expected, header) {
            return error_response(&Error::Unauthorized);
        }
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_right_password() {
        let hash = hash_password("hunter2");
        assert!(check_bearer(&hash, Some("Bearer hunter2")));
    }

    #[test]
    fn rejects_wrong_or_malformed_credentials() {
        let hash = hash_password("hunter2");
        assert!(!check_bearer(&hash, Some("Bearer wrong")));
        assert!(!check_bearer(&hash, Some("hunter2")));
        assert!(!check_bearer(&hash, Some("Basic hunter2")));
        assert!(!check_bearer(&hash, None));
    }
}
