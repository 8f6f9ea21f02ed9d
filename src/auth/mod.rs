use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::PortalError;
use crate::shared::state::AppState;

const SESSION_COOKIE: &str = "session";

/// Authenticated caller identity extracted from the identity provider's
/// session token. Re-derived on every request; nothing is trusted across
/// calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

/// Validate the session token (bearer header or session cookie) and stash
/// the caller identity in request extensions. Requests without a valid
/// token pass through anonymously; handlers that extract
/// `AuthenticatedUser` reject them with 401.
pub async fn authentication_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match extract_user(request.headers(), &state.config.auth.jwt_secret) {
        Ok(user) => {
            request.extensions_mut().insert(user);
        }
        Err(err) => {
            debug!("request is anonymous: {err}");
        }
    }

    next.run(request).await
}

fn extract_user(headers: &HeaderMap, secret: &str) -> Result<AuthenticatedUser, AuthError> {
    let token = bearer_token(headers)
        .or_else(|| session_cookie(headers))
        .ok_or(AuthError::MissingToken)?;

    let claims = validate_session_token(&token, secret)?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AuthError::InvalidToken("subject is not a user id".to_string()))?;

    Ok(AuthenticatedUser {
        user_id,
        email: claims.email,
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

pub fn validate_session_token(token: &str, secret: &str) -> Result<SessionClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.validate_nbf = false;
    validation.set_required_spec_claims(&["sub", "exp"]);

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());

    match decode::<SessionClaims>(token, &decoding_key, &validation) {
        Ok(token_data) => Ok(token_data.claims),
        Err(e) => match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(AuthError::TokenExpired),
            _ => Err(AuthError::InvalidToken(e.to_string())),
        },
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken(String),
    TokenExpired,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingToken => write!(f, "missing session token"),
            Self::InvalidToken(msg) => write!(f, "invalid token: {msg}"),
            Self::TokenExpired => write!(f, "token expired"),
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = PortalError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(PortalError::signed_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn make_token(secret: &str, exp_offset: i64) -> String {
        let claims = SessionClaims {
            sub: Uuid::new_v4().to_string(),
            email: "user@example.com".to_string(),
            exp: chrono::Utc::now().timestamp() + exp_offset,
            iat: chrono::Utc::now().timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_yields_claims() {
        let token = make_token("test-secret", 3600);
        let claims = validate_session_token(&token, "test-secret").unwrap();
        assert_eq!(claims.email, "user@example.com");
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = make_token("test-secret", -3600);
        assert!(matches!(
            validate_session_token(&token, "test-secret"),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = make_token("test-secret", 3600);
        assert!(matches!(
            validate_session_token(&token, "other-secret"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn session_cookie_is_parsed_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            "theme=dark; session=abc123; lang=en".parse().unwrap(),
        );
        assert_eq!(session_cookie(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn bearer_header_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer tok".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("tok".to_string()));
    }
}
