use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Shared HTTP error taxonomy. Credential and authorization failures are
/// terminal for the request; state-machine and OTP failures carry a code the
/// client can branch on to decide between re-prompting and blocking.
#[derive(Debug)]
pub enum ApiError {
    /// No bearer token presented at all.
    MissingCredential { what: &'static str },
    /// Bad signature, expired, malformed token or claims.
    InvalidCredential { message: String },
    /// Token version no longer matches the identity's current version.
    RevokedSession,
    /// No `x-api-key` header presented.
    MissingApiKey,
    /// `x-api-key` value is not on the allow-list.
    InvalidApiKey,
    /// Authenticated, but the wrong role for this route.
    Forbidden { required: &'static str },
    /// Account exists but has been deactivated.
    AccountDisabled,
    /// Too many failed logins; locked until the given time.
    AccountLocked { until: Option<String> },
    /// Wrong one-time code for the given transition stage.
    OtpMismatch { stage: &'static str },
    /// Too many failed one-time code attempts for this booking.
    OtpLocked,
    /// The requested transition is not valid from the current state.
    InvalidState { current: String, action: &'static str },
    BadRequest { code: &'static str, message: Option<String> },
    NotFound { what: &'static str },
    Internal { message: Option<String> },
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal { message: Some(e.to_string()) }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest { code, message: Some(message.into()) }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::MissingCredential { what } => (
                StatusCode::UNAUTHORIZED,
                "missing_credential",
                Some(format!("{what} missing")),
            ),
            ApiError::InvalidCredential { message } => {
                (StatusCode::UNAUTHORIZED, "invalid_credential", Some(message))
            }
            ApiError::RevokedSession => (
                StatusCode::UNAUTHORIZED,
                "session_revoked",
                Some("token invalidated, log in again".to_string()),
            ),
            ApiError::MissingApiKey => (
                StatusCode::FORBIDDEN,
                "missing_api_key",
                Some("api key missing".to_string()),
            ),
            ApiError::InvalidApiKey => (
                StatusCode::FORBIDDEN,
                "invalid_api_key",
                Some("invalid API key".to_string()),
            ),
            ApiError::Forbidden { required } => (
                StatusCode::FORBIDDEN,
                "missing_role",
                Some(format!("{required} only")),
            ),
            ApiError::AccountDisabled => (
                StatusCode::FORBIDDEN,
                "account_disabled",
                Some("account has been deactivated".to_string()),
            ),
            ApiError::AccountLocked { until } => (
                StatusCode::LOCKED,
                "account_locked",
                Some(match until {
                    Some(until) => format!("account locked until {until}"),
                    None => "account locked".to_string(),
                }),
            ),
            ApiError::OtpMismatch { stage } => (
                StatusCode::BAD_REQUEST,
                "otp_mismatch",
                Some(format!("wrong {stage} code")),
            ),
            ApiError::OtpLocked => (
                StatusCode::TOO_MANY_REQUESTS,
                "otp_locked",
                Some("too many failed code attempts".to_string()),
            ),
            ApiError::InvalidState { current, action } => (
                StatusCode::BAD_REQUEST,
                "invalid_state",
                Some(format!("booking is {current}, cannot {action}")),
            ),
            ApiError::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message),
            ApiError::NotFound { what } => (
                StatusCode::NOT_FOUND,
                "not_found",
                Some(format!("{what} not found")),
            ),
            ApiError::Internal { message } => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message),
        };

        let body = ErrorBody { code: code.into(), message };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
