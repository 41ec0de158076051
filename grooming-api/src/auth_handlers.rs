use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, Json};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;
use tracing::{info, warn};
use uuid::Uuid;

use common_auth::{Role, TokenSubject};
use common_http_errors::{ApiError, ApiResult};

use crate::app::AppState;
use crate::epoch;
use crate::guards::{AdminSession, Session};

const MAX_FAILED_LOGINS: i16 = 5;
const LOCKOUT_MINUTES: i64 = 15;

#[derive(Debug, Serialize, FromRow)]
pub struct UserInfo {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
}

#[derive(FromRow)]
struct AuthRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    password_hash: String,
    token_version: i32,
    is_active: bool,
    failed_attempts: i16,
    locked_until: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
    pub token_type: &'static str,
    pub expires_at: String,
    pub user: UserInfo,
}

pub async fn login(
    State(state): State<AppState>,
    Json(login): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let LoginRequest { email, password } = login;

    let mut auth_data = match sqlx::query_as::<_, AuthRow>(
        "SELECT id, name, email, role, password_hash, token_version, is_active, \
         failed_attempts, locked_until FROM users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::internal)?
    {
        Some(row) => row,
        None => {
            return Err(ApiError::InvalidCredential {
                message: "invalid credentials".to_string(),
            })
        }
    };

    let now = Utc::now();

    if let Some(locked_until) = auth_data.locked_until {
        if locked_until > now {
            return Err(locked_error(locked_until));
        }

        // Lockout window has lapsed; clear it before re-evaluating.
        if auth_data.failed_attempts >= MAX_FAILED_LOGINS {
            if let Err(err) = sqlx::query(
                "UPDATE users SET failed_attempts = 0, locked_until = NULL WHERE id = $1",
            )
            .bind(auth_data.id)
            .execute(&state.db)
            .await
            {
                warn!(user_id = %auth_data.id, error = ?err, "Failed to reset expired lockout");
            } else {
                auth_data.failed_attempts = 0;
                auth_data.locked_until = None;
            }
        }
    }

    let password_valid = PasswordHash::new(&auth_data.password_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false);

    if !password_valid {
        let new_attempts = auth_data.failed_attempts.saturating_add(1);
        let lock_until = if new_attempts >= MAX_FAILED_LOGINS {
            Some(now + Duration::minutes(LOCKOUT_MINUTES))
        } else {
            None
        };

        if let Err(err) =
            sqlx::query("UPDATE users SET failed_attempts = $1, locked_until = $2 WHERE id = $3")
                .bind(new_attempts)
                .bind(lock_until)
                .bind(auth_data.id)
                .execute(&state.db)
                .await
        {
            warn!(user_id = %auth_data.id, error = ?err, "Failed to record failed login attempt");
        }

        if let Some(until) = lock_until {
            return Err(locked_error(until));
        }
        return Err(ApiError::InvalidCredential {
            message: "invalid credentials".to_string(),
        });
    }

    if !auth_data.is_active {
        return Err(ApiError::AccountDisabled);
    }

    if auth_data.failed_attempts != 0 || auth_data.locked_until.is_some() {
        if let Err(err) =
            sqlx::query("UPDATE users SET failed_attempts = 0, locked_until = NULL WHERE id = $1")
                .bind(auth_data.id)
                .execute(&state.db)
                .await
        {
            warn!(user_id = %auth_data.id, error = ?err, "Failed to reset failed attempts");
        }
    }

    let role = Role::parse(&auth_data.role)
        .ok_or_else(|| ApiError::internal(format!("user has unknown role '{}'", auth_data.role)))?;

    // Admin tokens carry the shared epoch so one bump logs out every admin;
    // everyone else carries their per-user version.
    let token_version = match role {
        Role::Admin => epoch::current_epoch(&state.db)
            .await
            .map_err(ApiError::internal)?,
        _ => auth_data.token_version,
    };

    let issued = state
        .issuer
        .issue(TokenSubject {
            user_id: auth_data.id,
            role,
            token_version,
        })
        .map_err(ApiError::from)?;

    info!(user_id = %auth_data.id, role = %role, "user logged in");

    Ok(Json(LoginResponse {
        token: issued.token,
        expires_in: issued.expires_in,
        token_type: issued.token_type,
        expires_at: issued.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        user: UserInfo {
            id: auth_data.id,
            name: auth_data.name,
            email: auth_data.email,
            role: auth_data.role,
        },
    }))
}

fn locked_error(until: DateTime<Utc>) -> ApiError {
    ApiError::AccountLocked {
        until: Some(until.to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Rotating the password bumps `token_version`, which invalidates every
/// outstanding session for the account, including the one making this call.
pub async fn change_password(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<ChangePasswordRequest>,
) -> ApiResult<Json<Value>> {
    let stored = sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE id = $1")
        .bind(session.claims.subject)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound { what: "user" })?;

    let current_valid = PasswordHash::new(&stored)
        .map(|parsed| {
            Argon2::default()
                .verify_password(body.current_password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false);
    if !current_valid {
        return Err(ApiError::InvalidCredential {
            message: "current password is incorrect".to_string(),
        });
    }

    let new_hash = hash_password(&body.new_password)?;
    sqlx::query(
        "UPDATE users SET password_hash = $1, token_version = token_version + 1, \
         updated_at = now() WHERE id = $2",
    )
    .bind(new_hash)
    .bind(session.claims.subject)
    .execute(&state.db)
    .await
    .map_err(ApiError::internal)?;

    info!(user_id = %session.claims.subject, "password changed, sessions invalidated");
    Ok(Json(json!({
        "message": "password updated, log in again"
    })))
}

/// Explicit logout-everywhere for customers and groomers.
pub async fn logout_all(State(state): State<AppState>, session: Session) -> ApiResult<Json<Value>> {
    if session.claims.is_role(Role::Admin) {
        return Err(ApiError::Forbidden {
            required: "customer or groomer",
        });
    }

    sqlx::query("UPDATE users SET token_version = token_version + 1, updated_at = now() WHERE id = $1")
        .bind(session.claims.subject)
        .execute(&state.db)
        .await
        .map_err(ApiError::internal)?;

    info!(user_id = %session.claims.subject, "all sessions invalidated");
    Ok(Json(json!({
        "message": "logged out everywhere"
    })))
}

/// Administrative epoch bump: one write revokes every admin session at once,
/// including the caller's own.
pub async fn bump_admin_epoch(
    State(state): State<AppState>,
    session: AdminSession,
) -> ApiResult<Json<Value>> {
    let epoch = epoch::bump_epoch(&state.db)
        .await
        .map_err(ApiError::internal)?;

    warn!(admin_id = %session.claims.subject, epoch, "admin token epoch bumped");
    Ok(Json(json!({
        "epoch": epoch,
        "message": "all admin sessions invalidated"
    })))
}

fn hash_password(password: &str) -> ApiResult<String> {
    if password.trim().is_empty() {
        return Err(ApiError::bad_request(
            "empty_password",
            "Password must not be empty",
        ));
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ApiError::internal(format!("Failed to hash password: {err}")))
}
