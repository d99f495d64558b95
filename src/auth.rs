use crate::config;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use jwt_simple::algorithms::MACLike;
use jwt_simple::prelude::{HS256Key, NoCustomClaims, VerificationOptions};
use thiserror::Error;

use std::collections::HashSet;

/// Verifies bearer tokens issued by the identity service (HS256, shared
/// project secret). The token subject is the user id.
#[derive(Debug, Clone)]
pub struct AuthState {
    key: HS256Key,
    issuer: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("jwt secret must be non-empty without surrounding whitespace")]
    InvalidKey,
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid bearer token")]
    InvalidToken,
    #[error("bearer token missing expiry")]
    MissingExpiry,
    #[error("bearer token missing subject")]
    MissingSubject,
}

impl AuthState {
    pub fn from_config(config: &config::AppConfig) -> Result<Option<Self>, AuthError> {
        let Some(auth) = config.auth.as_ref() else {
            return Ok(None);
        };

        // The secret is the raw HMAC key; padded values are rejected, not trimmed.
        let secret = auth.jwt_secret.as_str();
        if secret.trim().is_empty() || secret.trim() != secret {
            return Err(AuthError::InvalidKey);
        }

        Ok(Some(Self {
            key: HS256Key::from_bytes(secret.as_bytes()),
            issuer: auth.issuer.clone(),
        }))
    }

    /// Resolves the user id from an `Authorization: Bearer` header.
    pub fn user_from_headers(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::MissingToken)?;
        self.verify_token(token)
    }

    pub fn verify_token(&self, token: &str) -> Result<String, AuthError> {
        let mut options = VerificationOptions::default();
        if let Some(issuer) = &self.issuer {
            let mut issuers = HashSet::new();
            issuers.insert(issuer.clone());
            options.allowed_issuers = Some(issuers);
        }

        let claims = self
            .key
            .verify_token::<NoCustomClaims>(token, Some(options))
            .map_err(|_| AuthError::InvalidToken)?;

        if claims.expires_at.is_none() {
            return Err(AuthError::MissingExpiry);
        }

        let subject = claims.subject.ok_or(AuthError::MissingSubject)?;
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(AuthError::MissingSubject);
        }

        Ok(subject.to_string())
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}


#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::testing::token_for;
    use super::*;
    use axum::http::HeaderValue;

    fn auth_state(secret: &str, issuer: Option<&str>) -> AuthState {
        let config = config::AppConfig {
            auth: Some(config::AuthConfig {
                jwt_secret: secret.to_string(),
                issuer: issuer.map(str::to_string),
            }),
            ..Default::default()
        };
        AuthState::from_config(&config)
            .expect("auth config")
            .expect("auth enabled")
    }

    #[test]
    fn user_from_headers__should_return_subject_for_valid_token() {
        // Given
        let auth = auth_state("project-secret", None);
        let mut headers = HeaderMap::new();
        let value = format!("Bearer {}", token_for("project-secret", "vendor-1"));
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&value).unwrap());

        // When
        let user = auth.user_from_headers(&headers).expect("user");

        // Then
        assert_eq!(user, "vendor-1");
    }

    #[test]
    fn user_from_headers__should_reject_missing_and_foreign_tokens() {
        // Given
        let auth = auth_state("project-secret", None);
        let mut foreign = HeaderMap::new();
        let value = format!("Bearer {}", token_for("other-secret", "vendor-1"));
        foreign.insert(AUTHORIZATION, HeaderValue::from_str(&value).unwrap());

        // Then
        assert!(matches!(
            auth.user_from_headers(&HeaderMap::new()),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            auth.user_from_headers(&foreign),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn verify_token__should_enforce_configured_issuer() {
        let auth = auth_state("project-secret", Some("https://auth.umkm.example"));

        assert!(matches!(
            auth.verify_token(&token_for("project-secret", "vendor-1")),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn bearer_token__should_require_bearer_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
    }

    #[test]
    fn from_config__should_reject_blank_secret() {
        let config = config::AppConfig {
            auth: Some(config::AuthConfig {
                jwt_secret: " ".to_string(),
                issuer: None,
            }),
            ..Default::default()
        };

        assert!(matches!(
            AuthState::from_config(&config),
            Err(AuthError::InvalidKey)
        ));
    }

    #[test]
    fn from_config__should_reject_secret_with_surrounding_whitespace() {
        for secret in ["project-secret\n", " project-secret", "project-secret\t"] {
            // Given
            let config = config::AppConfig {
                auth: Some(config::AuthConfig {
                    jwt_secret: secret.to_string(),
                    issuer: None,
                }),
                ..Default::default()
            };

            // When
            let result = AuthState::from_config(&config);

            // Then
            assert!(matches!(result, Err(AuthError::InvalidKey)), "{secret:?}");
        }
    }
}
