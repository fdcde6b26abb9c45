//! Identity middleware and access-token verification
//!
//! Every surface accepts either a signed access token (a registered player)
//! or no token at all (an ephemeral guest). Identity issuance itself is an
//! external collaborator; only verification happens here.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::app::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by a player access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (player ID)
    pub sub: Uuid,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: u64,
    /// Display name (if available)
    #[serde(default)]
    pub name: Option<String>,
}

/// Verify an access token and extract claims
pub fn verify_token(token: &str, secret: &str) -> Result<TokenClaims, AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::InvalidToken);
    }

    let header_b64 = parts[0];
    let payload_b64 = parts[1];
    let signature_b64 = parts[2];

    // Verify signature (HMAC-SHA256)
    let message = format!("{}.{}", header_b64, payload_b64);

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(message.as_bytes());

    let expected_signature = mac.finalize().into_bytes();
    let provided_signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::InvalidToken)?;

    if expected_signature.as_slice() != provided_signature.as_slice() {
        return Err(AuthError::InvalidToken);
    }

    // Decode payload
    let payload_json = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AuthError::InvalidToken)?;

    let claims: TokenClaims =
        serde_json::from_slice(&payload_json).map_err(|_| AuthError::InvalidToken)?;

    // Check expiration
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    if claims.exp < now {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims)
}

/// Extract a bearer token from an Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,
}

/// A resolved connection identity: a registered player or an ephemeral guest
#[derive(Debug, Clone)]
pub struct PlayerIdentity {
    pub player_id: Uuid,
    pub is_guest: bool,
}

/// Resolve a player-or-guest identity from an optional token
///
/// Invalid and absent tokens both resolve to a fresh guest; identity never
/// blocks a connection.
pub fn resolve_identity(token: Option<&str>, secret: &str) -> PlayerIdentity {
    match token.and_then(|t| verify_token(t, secret).ok()) {
        Some(claims) => PlayerIdentity {
            player_id: claims.sub,
            is_guest: false,
        },
        None => PlayerIdentity {
            player_id: Uuid::new_v4(),
            is_guest: true,
        },
    }
}

/// Middleware attaching a player-or-guest identity to every request
pub async fn with_identity(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token);

    let identity = resolve_identity(token, &state.config.access_token_secret);
    request.extensions_mut().insert(identity);

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn sign_token(claims: &TokenClaims, secret: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        let message = format!("{}.{}", header, payload);

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{}.{}", message, signature)
    }

    #[test]
    fn valid_tokens_resolve_to_their_subject() {
        let player_id = Uuid::new_v4();
        let claims = TokenClaims {
            sub: player_id,
            exp: u64::MAX,
            iat: 0,
            name: Some("ada".to_string()),
        };
        let token = sign_token(&claims, "secret");

        let identity = resolve_identity(Some(&token), "secret");
        assert_eq!(identity.player_id, player_id);
        assert!(!identity.is_guest);
    }

    #[test]
    fn bad_signatures_fall_back_to_guest() {
        let claims = TokenClaims {
            sub: Uuid::new_v4(),
            exp: u64::MAX,
            iat: 0,
            name: None,
        };
        let token = sign_token(&claims, "secret");

        let identity = resolve_identity(Some(&token), "other-secret");
        assert!(identity.is_guest);
        assert_ne!(identity.player_id, claims.sub);
    }

    #[test]
    fn expired_tokens_fall_back_to_guest() {
        let claims = TokenClaims {
            sub: Uuid::new_v4(),
            exp: 1,
            iat: 0,
            name: None,
        };
        let token = sign_token(&claims, "secret");
        assert!(matches!(
            verify_token(&token, "secret"),
            Err(AuthError::TokenExpired)
        ));
        assert!(resolve_identity(Some(&token), "secret").is_guest);
    }

    #[test]
    fn missing_tokens_are_guests_with_fresh_ids() {
        let a = resolve_identity(None, "secret");
        let b = resolve_identity(None, "secret");
        assert!(a.is_guest && b.is_guest);
        assert_ne!(a.player_id, b.player_id);
    }
}
