//! Credential verification shared by the REST middleware and the socket
//! handshake.
//!
//! Tokens are HS256 JWTs carrying the user's id in an `id` claim, the same
//! shape the storefront's login endpoint issues. [`authenticate`] is the only
//! place a token is turned into a [`User`]; nothing else in the server reads
//! credentials directly.

use crate::AppState;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use souk_messages::{find_user, User};
use souk_types::ObjectId;
use thiserror::Error;

/// Reasons a credential is rejected. The `Display` text is what the client
/// sees in the `AUTH_FAILURE` response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authentication error")]
    Missing,
    #[error("Invalid authentication token")]
    Malformed,
    #[error("Authentication token expired")]
    Expired,
    /// The token verified but carries no usable user id.
    #[error("Invalid token format")]
    InvalidPayload,
    #[error("The authenticated user no longer exists")]
    UserNotFound,
    #[error("Authentication failed")]
    Failed,
}

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// Extracts the user id, rejecting tokens whose `id` is absent or not a
    /// well-formed identifier.
    pub fn user_id(&self) -> Result<ObjectId, AuthError> {
        let raw = self.id.as_deref().ok_or(AuthError::InvalidPayload)?;
        ObjectId::parse(raw).map_err(|_| AuthError::InvalidPayload)
    }
}

/// Verifies a bearer credential.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

/// HS256 verifier and issuer.
pub struct JwtVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtVerifier {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            ttl: Duration::days(ttl_days),
        }
    }

    /// Issues a token for `user_id` valid for the configured lifetime.
    pub fn issue(&self, user_id: &ObjectId) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            id: Some(user_id.to_string()),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }
}

impl CredentialVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                // Signed by us but the claims do not deserialize.
                ErrorKind::Json(_) => AuthError::InvalidPayload,
                _ => AuthError::Malformed,
            }
        })?;
        Ok(data.claims)
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verifies `token` and resolves the user it names.
///
/// # Errors
///
/// Returns the [`AuthError`] describing why the caller is not authenticated.
pub async fn authenticate(state: &AppState, token: Option<&str>) -> Result<User, AuthError> {
    let token = token.filter(|t| !t.trim().is_empty()).ok_or(AuthError::Missing)?;
    let user_id = state.verifier.verify(token)?.user_id()?;

    let pool = state.pool.clone();
    let lookup_id = user_id.clone();
    let found = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| e.to_string())?;
        find_user(&conn, &lookup_id).map_err(|e| e.to_string())
    })
    .await;

    match found {
        Ok(Ok(Some(user))) => Ok(user),
        Ok(Ok(None)) => Err(AuthError::UserNotFound),
        Ok(Err(e)) => {
            tracing::error!(user_id = %user_id, "user lookup failed during authentication: {}", e);
            Err(AuthError::Failed)
        }
        Err(e) => {
            tracing::error!(user_id = %user_id, "authentication task failed: {}", e);
            Err(AuthError::Failed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret";

    fn encode_claims(claims: &serde_json::Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn issued_token_verifies_to_same_user() {
        let verifier = JwtVerifier::new(SECRET, 30);
        let id = ObjectId::generate();
        let token = verifier.issue(&id).unwrap();

        let claims = verifier.verify(&token).unwrap();
        assert_eq!(claims.user_id().unwrap(), id);
        assert!(claims.exp - claims.iat >= 30 * 24 * 3600 - 1);
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let verifier = JwtVerifier::new(SECRET, 30);
        let now = Utc::now().timestamp();
        let token = encode_claims(
            &serde_json::json!({ "id": ObjectId::generate().as_str(), "iat": now - 7200, "exp": now - 3600 }),
            SECRET,
        );
        assert_eq!(verifier.verify(&token), Err(AuthError::Expired));
        assert_eq!(AuthError::Expired.to_string(), "Authentication token expired");
    }

    #[test]
    fn foreign_signature_is_malformed() {
        let verifier = JwtVerifier::new(SECRET, 30);
        let token = JwtVerifier::new("other-secret", 30)
            .issue(&ObjectId::generate())
            .unwrap();
        assert_eq!(verifier.verify(&token), Err(AuthError::Malformed));
        assert_eq!(verifier.verify("not-a-jwt"), Err(AuthError::Malformed));
    }

    #[test]
    fn token_without_id_has_invalid_payload() {
        let verifier = JwtVerifier::new(SECRET, 30);
        let exp = Utc::now().timestamp() + 600;

        let no_id = encode_claims(&serde_json::json!({ "exp": exp }), SECRET);
        let claims = verifier.verify(&no_id).unwrap();
        assert_eq!(claims.user_id(), Err(AuthError::InvalidPayload));

        let bad_id = encode_claims(&serde_json::json!({ "id": "xyz", "exp": exp }), SECRET);
        let claims = verifier.verify(&bad_id).unwrap();
        assert_eq!(claims.user_id(), Err(AuthError::InvalidPayload));

        let numeric_id = encode_claims(&serde_json::json!({ "id": 42, "exp": exp }), SECRET);
        assert_eq!(verifier.verify(&numeric_id), Err(AuthError::InvalidPayload));
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
