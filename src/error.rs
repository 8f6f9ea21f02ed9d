use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use thiserror::Error;

/// Failure taxonomy for every portal operation. Each variant carries the
/// user-safe message returned to the client; upstream causes are logged
/// server-side only.
#[derive(Debug, Clone, Error)]
pub enum PortalError {
    #[error("{0}")]
    AuthenticationRequired(String),
    #[error("{0}")]
    AuthorizationDenied(String),
    #[error("{0}")]
    ValidationFailed(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Upstream(String),
}

impl PortalError {
    pub fn signed_out() -> Self {
        Self::AuthenticationRequired("You must be signed in.".to_string())
    }

    /// Log the real cause, hand the caller the generic message.
    pub fn upstream(user_message: &str, cause: impl std::fmt::Display) -> Self {
        error!("{user_message} ({cause})");
        Self::Upstream(user_message.to_string())
    }

    fn code(&self) -> (&'static str, &'static str) {
        match self {
            Self::AuthenticationRequired(_) => ("unauthorized", "UNAUTHORIZED"),
            Self::AuthorizationDenied(_) => ("forbidden", "FORBIDDEN"),
            Self::ValidationFailed(_) => ("validation_failed", "VALIDATION_FAILED"),
            Self::NotFound(_) => ("not_found", "NOT_FOUND"),
            Self::Upstream(_) => ("upstream_failure", "UPSTREAM_FAILURE"),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired(_) => StatusCode::UNAUTHORIZED,
            Self::AuthorizationDenied(_) => StatusCode::FORBIDDEN,
            Self::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<diesel::result::Error> for PortalError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => Self::NotFound("Record not found.".to_string()),
            other => Self::upstream("The request could not be completed.", other),
        }
    }
}

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        let (err, code) = self.code();
        let body = serde_json::json!({
            "error": err,
            "message": self.to_string(),
            "code": code
        });

        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(
            PortalError::signed_out().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            PortalError::AuthorizationDenied("no".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            PortalError::ValidationFailed("bad".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            PortalError::NotFound("gone".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            PortalError::Upstream("oops".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn missing_row_maps_to_not_found() {
        let err: PortalError = diesel::result::Error::NotFound.into();
        assert!(matches!(err, PortalError::NotFound(_)));
    }
}
