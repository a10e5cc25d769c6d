//! Bearer token verification and issuance.
//!
//! Tokens are HS256 JWTs whose payload nests the identity under a `user`
//! object:
//!
//! ```json
//! { "user": { "uid": "u1", "email": "a@b.com", "role": "staff" }, "iat": 1700000000, "exp": 1700003600 }
//! ```
//!
//! Verification decodes the payload as untyped JSON first and then checks each
//! identity field explicitly, so a signed token with a missing or mistyped
//! field becomes an [`AuthError`] instead of a deserialization fault.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AppError, AuthError};
use crate::models::Claims;

/// Authorization scheme accepted by [`parse_credential`].
pub const BEARER_SCHEME: &str = "Bearer";

/// Payload key holding the nested identity object.
const USER_CLAIM: &str = "user";

/// Split an `Authorization` header value into its bearer token.
///
/// The scheme comparison is case-insensitive. Anything other than exactly
/// two whitespace-separated parts with a `Bearer` scheme is
/// [`AuthError::Malformed`].
pub fn parse_credential(credential: &str) -> Result<&str, AuthError> {
    let (scheme, token) = credential
        .trim()
        .split_once(' ')
        .ok_or(AuthError::Malformed)?;

    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return Err(AuthError::Malformed);
    }

    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::Malformed);
    }

    Ok(token)
}

/// Verifies bearer credentials against the process-wide secret.
///
/// Cheap to clone; the decoding key is reference-counted internally by
/// `jsonwebtoken`.
#[derive(Clone)]
pub struct TokenVerifier {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl TokenVerifier {
    /// Build a verifier. An absent or empty secret yields a verifier that
    /// fails every call with [`AuthError::SecretUnavailable`].
    pub fn new(secret: Option<&str>) -> Self {
        let key = secret
            .filter(|s| !s.is_empty())
            .map(|s| DecodingKey::from_secret(s.as_bytes()));

        // `exp` is checked when present but not demanded
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();

        Self { key, validation }
    }

    /// Whether a verification secret is available.
    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    /// Verify a raw `Authorization` header value and extract its claims.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Malformed`] if the value is not `Bearer <token>`
    /// - [`AuthError::SecretUnavailable`] if no secret is configured
    /// - [`AuthError::Invalid`] on signature, expiry, or payload shape failure
    /// - [`AuthError::MissingClaims`] if `uid`, `email`, or `role` is absent
    pub async fn verify(&self, credential: &str) -> Result<Claims, AuthError> {
        let token = parse_credential(credential)?;
        let key = self.key.as_ref().ok_or(AuthError::SecretUnavailable)?;

        let data =
            decode::<Value>(token, key, &self.validation).map_err(|_| AuthError::Invalid)?;

        claims_from_payload(data.claims)
    }
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("configured", &self.is_configured())
            .finish_non_exhaustive()
    }
}

/// Extract the required identity fields from a verified payload.
fn claims_from_payload(payload: Value) -> Result<Claims, AuthError> {
    let Value::Object(mut body) = payload else {
        return Err(AuthError::Invalid);
    };

    let user = match body.remove(USER_CLAIM) {
        None | Some(Value::Null) => return Err(AuthError::MissingClaims),
        Some(Value::Object(user)) => user,
        Some(_) => return Err(AuthError::Invalid),
    };

    Ok(Claims {
        subject_id: required_claim(&user, "uid")?,
        email: required_claim(&user, "email")?,
        role: required_claim(&user, "role")?,
    })
}

fn required_claim(user: &Map<String, Value>, field: &str) -> Result<String, AuthError> {
    match user.get(field) {
        None | Some(Value::Null) => Err(AuthError::MissingClaims),
        Some(Value::String(s)) if s.is_empty() => Err(AuthError::MissingClaims),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(AuthError::Invalid),
    }
}

#[derive(Serialize)]
struct UserClaim<'a> {
    uid: &'a str,
    email: &'a str,
    role: &'a str,
}

#[derive(Serialize)]
struct TokenPayload<'a> {
    user: UserClaim<'a>,
    iat: i64,
    exp: i64,
}

/// A freshly signed token and its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs tokens in the format [`TokenVerifier`] accepts.
#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Sign a token for `claims`, valid for the configured TTL.
    pub fn issue(&self, claims: &Claims) -> Result<IssuedToken, AppError> {
        let ttl = TimeDelta::from_std(self.ttl)
            .map_err(|e| AppError::ConfigError(format!("Token TTL out of range: {e}")))?;
        let issued_at = Utc::now();
        let expires_at = issued_at + ttl;

        let payload = TokenPayload {
            user: UserClaim {
                uid: &claims.subject_id,
                email: &claims.email,
                role: &claims.role,
            },
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &payload, &self.key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))?;

        Ok(IssuedToken { token, expires_at })
    }
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "unit-test-secret";

    fn sign(payload: &Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            payload,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn future_exp() -> i64 {
        Utc::now().timestamp() + 3600
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    fn staff_claims() -> Claims {
        Claims {
            subject_id: "u1".to_string(),
            email: "a@b.com".to_string(),
            role: "staff".to_string(),
        }
    }

    #[test]
    fn test_parse_credential_bearer() {
        assert_eq!(parse_credential("Bearer abc.def.ghi").unwrap(), "abc.def.ghi");
        assert_eq!(parse_credential("bearer abc").unwrap(), "abc");
    }

    #[test]
    fn test_parse_credential_malformed() {
        assert_eq!(parse_credential("abc.def.ghi"), Err(AuthError::Malformed));
        assert_eq!(parse_credential("Bearer"), Err(AuthError::Malformed));
        assert_eq!(parse_credential("Bearer "), Err(AuthError::Malformed));
        assert_eq!(parse_credential("Basic dXNlcjpwYXNz"), Err(AuthError::Malformed));
        assert_eq!(parse_credential("Bearer a b"), Err(AuthError::Malformed));
        assert_eq!(parse_credential(""), Err(AuthError::Malformed));
    }

    #[tokio::test]
    async fn test_verify_valid_token() {
        let token = sign(
            &json!({
                "user": { "uid": "u1", "email": "a@b.com", "role": "staff", "theme": "dark" },
                "exp": future_exp(),
            }),
            SECRET,
        );

        let claims = TokenVerifier::new(Some(SECRET))
            .verify(&bearer(&token))
            .await
            .unwrap();
        assert_eq!(claims, staff_claims());
    }

    #[tokio::test]
    async fn test_verify_without_secret() {
        let token = sign(&json!({ "user": {} }), SECRET);

        let verifier = TokenVerifier::new(None);
        assert!(!verifier.is_configured());
        assert_eq!(
            verifier.verify(&bearer(&token)).await,
            Err(AuthError::SecretUnavailable)
        );

        let empty = TokenVerifier::new(Some(""));
        assert_eq!(
            empty.verify(&bearer(&token)).await,
            Err(AuthError::SecretUnavailable)
        );
    }

    #[tokio::test]
    async fn test_verify_malformed_before_secret_check() {
        let verifier = TokenVerifier::new(None);
        assert_eq!(verifier.verify("Token abc").await, Err(AuthError::Malformed));
    }

    #[tokio::test]
    async fn test_verify_wrong_secret() {
        let token = sign(
            &json!({ "user": { "uid": "u1", "email": "a@b.com", "role": "staff" } }),
            "some-other-secret",
        );

        let result = TokenVerifier::new(Some(SECRET)).verify(&bearer(&token)).await;
        assert_eq!(result, Err(AuthError::Invalid));
    }

    #[tokio::test]
    async fn test_verify_tampered_payload() {
        let token = sign(
            &json!({ "user": { "uid": "u1", "email": "a@b.com", "role": "staff" } }),
            SECRET,
        );
        let forged = sign(
            &json!({ "user": { "uid": "u1", "email": "a@b.com", "role": "admin" } }),
            "attacker",
        );

        // Original header and signature around a different payload segment
        let parts: Vec<&str> = token.split('.').collect();
        let forged_parts: Vec<&str> = forged.split('.').collect();
        let tampered = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);

        let result = TokenVerifier::new(Some(SECRET))
            .verify(&bearer(&tampered))
            .await;
        assert_eq!(result, Err(AuthError::Invalid));
    }

    #[tokio::test]
    async fn test_verify_expired_token() {
        let token = sign(
            &json!({
                "user": { "uid": "u1", "email": "a@b.com", "role": "staff" },
                "exp": Utc::now().timestamp() - 3600,
            }),
            SECRET,
        );

        let result = TokenVerifier::new(Some(SECRET)).verify(&bearer(&token)).await;
        assert_eq!(result, Err(AuthError::Invalid));
    }

    #[tokio::test]
    async fn test_verify_garbage_token() {
        let result = TokenVerifier::new(Some(SECRET))
            .verify("Bearer not-a-jwt")
            .await;
        assert_eq!(result, Err(AuthError::Invalid));
    }

    #[tokio::test]
    async fn test_verify_missing_each_claim() {
        let verifier = TokenVerifier::new(Some(SECRET));

        for missing in ["uid", "email", "role"] {
            let mut user = json!({ "uid": "u1", "email": "a@b.com", "role": "staff" });
            user.as_object_mut().unwrap().remove(missing);
            let token = sign(&json!({ "user": user, "exp": future_exp() }), SECRET);

            assert_eq!(
                verifier.verify(&bearer(&token)).await,
                Err(AuthError::MissingClaims),
                "missing {missing}"
            );
        }
    }

    #[tokio::test]
    async fn test_verify_empty_claim_is_missing() {
        let token = sign(
            &json!({ "user": { "uid": "", "email": "a@b.com", "role": "staff" } }),
            SECRET,
        );

        let result = TokenVerifier::new(Some(SECRET)).verify(&bearer(&token)).await;
        assert_eq!(result, Err(AuthError::MissingClaims));
    }

    #[tokio::test]
    async fn test_verify_missing_user_object() {
        let token = sign(
            &json!({ "uid": "u1", "email": "a@b.com", "role": "staff" }),
            SECRET,
        );

        let result = TokenVerifier::new(Some(SECRET)).verify(&bearer(&token)).await;
        assert_eq!(result, Err(AuthError::MissingClaims));
    }

    #[tokio::test]
    async fn test_verify_mistyped_claims_are_invalid() {
        let verifier = TokenVerifier::new(Some(SECRET));

        let numeric_uid = sign(
            &json!({ "user": { "uid": 42, "email": "a@b.com", "role": "staff" } }),
            SECRET,
        );
        assert_eq!(
            verifier.verify(&bearer(&numeric_uid)).await,
            Err(AuthError::Invalid)
        );

        let user_as_string = sign(&json!({ "user": "u1" }), SECRET);
        assert_eq!(
            verifier.verify(&bearer(&user_as_string)).await,
            Err(AuthError::Invalid)
        );
    }

    #[tokio::test]
    async fn test_issued_token_verifies() {
        let issuer = TokenIssuer::new(SECRET, Duration::from_secs(600));
        let issued = issuer.issue(&staff_claims()).unwrap();

        assert!(issued.expires_at > Utc::now());

        let claims = TokenVerifier::new(Some(SECRET))
            .verify(&bearer(&issued.token))
            .await
            .unwrap();
        assert_eq!(claims, staff_claims());
    }
}
