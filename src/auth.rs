//! Request authentication for the `/api` routes.
//!
//! A caller presents either the shared key in `X-API-Key` or an HS256
//! bearer token signed with the configured secret.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Actor name recorded in the audit log for API key callers.
pub const API_KEY_ACTOR: &str = "api-key";

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub api_key: String,
    /// Bearer tokens are rejected when unset.
    pub jwt_secret: Option<String>,
}

/// JWT claims accepted on bearer tokens.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Actor recorded in the audit log
    pub sub: String,
    /// Expiration time (UTC Unix timestamp)
    pub exp: i64,
}

/// Sign a bearer token for `subject`, valid for `ttl_secs`.
pub fn issue_token(secret: &str, subject: &str, ttl_secs: i64) -> Result<String, ApiError> {
    let claims = Claims {
        sub: subject.to_string(),
        exp: chrono::Utc::now().timestamp() + ttl_secs,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Unauthorized(format!("Failed to sign token: {e}")))
}

fn validate_token(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .ok()
    .map(|data| data.claims)
}

fn keys_match(given: &str, expected: &str) -> bool {
    let (a, b) = (given.as_bytes(), expected.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Authenticated caller; use as an extractor on protected handlers.
#[derive(Debug, Clone)]
pub struct ApiAuth {
    pub actor: String,
}

impl ApiAuth {
    pub fn authenticate(parts: &Parts, config: &AuthConfig) -> Result<Self, ApiError> {
        if let Some(key) = parts.headers.get(API_KEY_HEADER) {
            let key = key.to_str().unwrap_or_default();
            if !config.api_key.is_empty() && keys_match(key, &config.api_key) {
                return Ok(Self {
                    actor: API_KEY_ACTOR.to_string(),
                });
            }
            return Err(ApiError::Unauthorized("Invalid API key".into()));
        }

        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing credentials".into()))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::Unauthorized("Invalid Authorization format. Expected: Bearer <token>".into())
        })?;

        let secret = config
            .jwt_secret
            .as_deref()
            .ok_or_else(|| ApiError::Unauthorized("Bearer tokens are not accepted".into()))?;

        let claims = validate_token(token, secret)
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".into()))?;

        Ok(Self { actor: claims.sub })
    }
}

impl FromRequestParts<AppState> for ApiAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Self::authenticate(parts, &state.auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn config() -> AuthConfig {
        AuthConfig {
            api_key: "front-desk-key".to_string(),
            jwt_secret: Some("signing-secret".to_string()),
        }
    }

    fn parts(header: Option<(&str, &str)>) -> Parts {
        let mut builder = Request::builder().uri("/api/assets");
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_api_key() {
        let auth = ApiAuth::authenticate(&parts(Some(("x-api-key", "front-desk-key"))), &config())
            .unwrap();
        assert_eq!(auth.actor, API_KEY_ACTOR);

        let denied = ApiAuth::authenticate(&parts(Some(("x-api-key", "guess"))), &config());
        assert!(matches!(denied, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn test_bearer_token() {
        let token = issue_token("signing-secret", "manager@gym", 60).unwrap();
        let header = format!("Bearer {token}");
        let auth =
            ApiAuth::authenticate(&parts(Some(("authorization", &header))), &config()).unwrap();
        assert_eq!(auth.actor, "manager@gym");
    }

    #[test]
    fn test_rejections() {
        let forged = issue_token("other-secret", "intruder", 60).unwrap();
        let expired = issue_token("signing-secret", "manager@gym", -3600).unwrap();
        for header in [format!("Bearer {forged}"), format!("Bearer {expired}"), "Basic abc".into()] {
            let result = ApiAuth::authenticate(&parts(Some(("authorization", &header))), &config());
            assert!(matches!(result, Err(ApiError::Unauthorized(_))), "{header}");
        }

        assert!(ApiAuth::authenticate(&parts(None), &config()).is_err());
    }

    #[test]
    fn test_bearer_disabled_without_secret() {
        let token = issue_token("signing-secret", "manager@gym", 60).unwrap();
        let header = format!("Bearer {token}");
        let config = AuthConfig {
            jwt_secret: None,
            ..config()
        };
        assert!(ApiAuth::authenticate(&parts(Some(("authorization", &header))), &config).is_err());
    }
}
