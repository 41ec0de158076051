use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common_http_errors::ApiError;
use serde::Serialize;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header missing")]
    MissingAuthorization,
    #[error("authorization header malformed")]
    InvalidAuthorization,
    #[error("token expired")]
    Expired,
    #[error("token verification failed: {0}")]
    Verification(String),
    #[error("token invalidated, log in again")]
    Revoked,
    #[error("invalid claim '{0}' with value '{1}'")]
    InvalidClaim(&'static str, String),
    #[error("malformed claim payload: {0}")]
    InvalidJson(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Verification(value.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuthError::MissingAuthorization | AuthError::InvalidAuthorization => {
                (StatusCode::UNAUTHORIZED, "AUTH_HEADER")
            }
            AuthError::Expired | AuthError::Verification(_) => {
                (StatusCode::UNAUTHORIZED, "AUTH_TOKEN")
            }
            AuthError::Revoked => (StatusCode::UNAUTHORIZED, "AUTH_REVOKED"),
            AuthError::InvalidClaim(_, _) | AuthError::InvalidJson(_) => {
                (StatusCode::BAD_REQUEST, "AUTH_CLAIMS")
            }
            AuthError::Signing(_) => (StatusCode::INTERNAL_SERVER_ERROR, "AUTH_SIGNING"),
        };

        let body = ErrorBody {
            code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::MissingAuthorization => ApiError::MissingCredential {
                what: "access token",
            },
            AuthError::Revoked => ApiError::RevokedSession,
            AuthError::Signing(message) => ApiError::Internal {
                message: Some(message),
            },
            AuthError::Expired | AuthError::Verification(_) => ApiError::InvalidCredential {
                message: "invalid or expired token".to_string(),
            },
            other => ApiError::InvalidCredential {
                message: other.to_string(),
            },
        }
    }
}
