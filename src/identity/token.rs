//! Server-side identity token verification.

use axum::http::HeaderMap;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::model::{Identity, SubjectId};
use crate::config::AuthConfig;
use crate::error::AuthError;

/// Claims carried by an identity token.
///
/// `iss`/`aud` are checked by the decoder against the configured values and
/// are not needed afterwards, so they are not captured here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    pub exp: i64,
}

impl IdentityClaims {
    fn into_identity(self) -> Result<Identity, AuthError> {
        let subject = SubjectId::new(self.sub)
            .ok_or_else(|| AuthError::InvalidToken("empty subject".to_string()))?;
        Ok(Identity {
            subject,
            display_name: self.name,
            email: self.email,
            photo_url: self.picture,
        })
    }
}

/// Verifies identity tokens presented by callers.
///
/// The subject of every write comes from here, never from the request body.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// HS256 token verifier.
pub struct Hs256Verifier {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256Verifier {
    pub fn new(secret: &[u8], issuer: Option<&str>, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.jwt_secret.expose_secret().as_bytes(),
            config.issuer.as_deref(),
            config.audience.as_deref(),
        )
    }
}

impl TokenVerifier for Hs256Verifier {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = jsonwebtoken::decode::<IdentityClaims>(token, &self.key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                kind => AuthError::InvalidToken(format!("{kind:?}")),
            })?;
        data.claims.into_identity()
    }
}

/// Extract the bearer token from an `Authorization` header.
///
/// The scheme name is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?;

    let header = header.to_str().map_err(|_| AuthError::MalformedHeader)?;

    let (scheme, token) = header
        .trim_start()
        .split_once(' ')
        .ok_or(AuthError::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedHeader);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }

    Ok(token)
}
