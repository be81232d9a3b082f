//! src/auth.rs
//!
//! Stateless issuance and validation of signed, time-bounded access tokens,
//! plus the domain authorization predicate. Tokens are standard JWTs (three
//! dot-separated base64url segments) so anything issued here keeps validating
//! against off-the-shelf verifiers.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::ExposeSecret;

use crate::configuration::AuthSettings;
use crate::error::error_chain_fmt;

/// The set of assertions embedded in a token: claim name to JSON value
/// (string, number, boolean, nested array/object).
///
/// The issuer always sets the `exp` claim itself; a caller-supplied `exp`
/// is overwritten and never trusted.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Claims(serde_json::Map<String, serde_json::Value>);

impl Claims {
    pub fn new() -> Self {
        Self(serde_json::Map::new())
    }

    pub fn with(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    /// Expiry as seconds since the Unix epoch, if present.
    pub fn exp(&self) -> Option<i64> {
        self.0.get("exp").and_then(serde_json::Value::as_i64)
    }
}

impl Default for Claims {
    fn default() -> Self {
        Self::new()
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Claims {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

/// Token failures are distinguishable so the caller can pick the right
/// response: a bad credential forces re-login, an expired one may be
/// silently refreshed.
#[derive(thiserror::Error)]
pub enum TokenError {
    #[error("Token signing requires a non-empty secret key.")]
    MissingSecret,
    #[error("Unknown signing algorithm: {0}.")]
    UnknownAlgorithm(String),
    #[error("Failed to serialize token claims.")]
    Encoding(#[source] jsonwebtoken::errors::Error),
    #[error("Token signature does not match.")]
    InvalidSignature,
    #[error("Token has expired.")]
    Expired,
    #[error("Token is not well-formed.")]
    Malformed(#[source] jsonwebtoken::errors::Error),
}

impl std::fmt::Debug for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

fn signing_algorithm(settings: &AuthSettings) -> Result<Algorithm, TokenError> {
    settings
        .algorithm
        .parse()
        .map_err(|_| TokenError::UnknownAlgorithm(settings.algorithm.clone()))
}

/// Sign `claims` into a compact token string.
///
/// `exp` is set to `now + expires_in`, falling back to the configured
/// `access_token_expire_minutes`. Pure CPU-bound work, no I/O.
pub fn issue_token(
    claims: &Claims,
    settings: &AuthSettings,
    expires_in: Option<Duration>,
) -> Result<String, TokenError> {
    if settings.secret_key.expose_secret().is_empty() {
        return Err(TokenError::MissingSecret);
    }
    let algorithm = signing_algorithm(settings)?;
    let expire_at = Utc::now()
        + expires_in.unwrap_or_else(|| {
            Duration::minutes(settings.access_token_expire_minutes as i64)
        });

    let mut to_encode = claims.clone();
    to_encode.insert("exp", expire_at.timestamp());

    encode(
        &Header::new(algorithm),
        &to_encode,
        &EncodingKey::from_secret(settings.secret_key.expose_secret().as_bytes()),
    )
    .map_err(TokenError::Encoding)
}

/// Verify the signature and expiry of `token` and hand back the exact claim
/// set that was signed, `exp` included.
pub fn validate_token(
    token: &str,
    settings: &AuthSettings,
) -> Result<Claims, TokenError> {
    let algorithm = signing_algorithm(settings)?;
    let mut validation = Validation::new(algorithm);
    // No leeway: a token one second past its expiry is expired.
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.secret_key.expose_secret().as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName => TokenError::InvalidSignature,
        _ => TokenError::Malformed(e),
    })
}

/// True iff `email` ends with the literal suffix `"@" + allowed_domain`.
///
/// Case-sensitive, no normalization, no subdomain matching; callers wanting
/// case-insensitive behaviour must normalize before calling. Anchoring on
/// the `@` keeps `x@evilcorp.com` from matching `corp.com`.
pub fn is_authorized_domain(email: &str, allowed_domain: &str) -> bool {
    email.ends_with(&format!("@{}", allowed_domain))
}
