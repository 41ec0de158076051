use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use common_auth::{ensure_token_current, AuthContext, Claims, Role};
use common_http_errors::ApiError;

use crate::app::AppState;
use crate::epoch;

/// Customer-scoped session: verified token, customer role, and a live
/// per-user token version.
pub struct CustomerSession {
    pub claims: Claims,
}

/// Groomer-scoped session; same checks as the customer variant.
pub struct GroomerSession {
    pub claims: Claims,
}

/// Admin-scoped session. Currency is checked against the process-wide admin
/// epoch, not a per-user row, so one bump revokes every admin at once.
pub struct AdminSession {
    pub claims: Claims,
}

/// Session for routes open to any authenticated role (e.g. password change).
pub struct Session {
    pub claims: Claims,
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    token_version: i32,
    is_active: bool,
}

/// Shared guard algorithm: pure verification first (signature, expiry,
/// claims), then the store-backed currency check against whatever counter
/// governs the role.
async fn verified_claims(parts: &mut Parts, state: &AppState) -> Result<Claims, ApiError> {
    let auth = AuthContext::from_request_parts(parts, state).await?;
    Ok(auth.into_claims())
}

async fn check_user_currency(state: &AppState, claims: &Claims) -> Result<(), ApiError> {
    let row = sqlx::query_as::<_, IdentityRow>(
        "SELECT token_version, is_active FROM users WHERE id = $1",
    )
    .bind(claims.subject)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::internal)?;

    let Some(row) = row else {
        return Err(ApiError::InvalidCredential {
            message: "unknown user".to_string(),
        });
    };
    if !row.is_active {
        return Err(ApiError::AccountDisabled);
    }
    ensure_token_current(claims, row.token_version)?;
    Ok(())
}

async fn check_admin_currency(state: &AppState, claims: &Claims) -> Result<(), ApiError> {
    let current = epoch::current_epoch(&state.db)
        .await
        .map_err(ApiError::internal)?;
    ensure_token_current(claims, current)?;
    Ok(())
}

async fn role_session(
    parts: &mut Parts,
    state: &AppState,
    required: Role,
) -> Result<Claims, ApiError> {
    let claims = verified_claims(parts, state).await?;
    if !claims.is_role(required) {
        return Err(ApiError::Forbidden {
            required: required.as_str(),
        });
    }
    match required {
        Role::Admin => check_admin_currency(state, &claims).await?,
        _ => check_user_currency(state, &claims).await?,
    }
    Ok(claims)
}

#[async_trait]
impl FromRequestParts<AppState> for CustomerSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = role_session(parts, state, Role::Customer).await?;
        Ok(Self { claims })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for GroomerSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = role_session(parts, state, Role::Groomer).await?;
        Ok(Self { claims })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = role_session(parts, state, Role::Admin).await?;
        Ok(Self { claims })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = verified_claims(parts, state).await?;
        match claims.role {
            Role::Admin => check_admin_currency(state, &claims).await?,
            _ => check_user_currency(state, &claims).await?,
        }
        Ok(Self { claims })
    }
}
