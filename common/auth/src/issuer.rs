use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::error::{AuthError, AuthResult};
use crate::roles::Role;

/// Identity snapshot a token is minted for. `token_version` must be the
/// identity's current value (or the admin epoch for admin subjects); the
/// issuer embeds it verbatim and never touches the stored counter.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: Uuid,
    pub role: Role,
    pub token_version: i32,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
    pub token_type: &'static str,
}

pub struct TokenIssuer {
    config: TokenConfig,
    encoding_key: EncodingKey,
}

impl TokenIssuer {
    pub fn new(config: TokenConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding_key,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn issue(&self, subject: TokenSubject) -> AuthResult<IssuedToken> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.access_ttl_seconds);

        let claims = AccessClaims {
            sub: subject.user_id.to_string(),
            role: subject.role.as_str(),
            tver: subject.token_version,
            iss: &self.config.issuer,
            aud: &self.config.audience,
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| AuthError::Signing(err.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_at,
            expires_in: self.config.access_ttl_seconds,
            token_type: "Bearer",
        })
    }
}

#[derive(Serialize)]
struct AccessClaims<'a> {
    sub: String,
    role: &'static str,
    tver: i32,
    iss: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
    jti: String,
}
