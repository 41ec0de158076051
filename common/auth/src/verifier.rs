use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::debug;

use crate::claims::Claims;
use crate::config::TokenConfig;
use crate::error::{AuthError, AuthResult};

/// Pure cryptographic verification stage: signature, expiry, issuer and
/// audience. Version currency is deliberately NOT checked here — the current
/// version must be read from the identity store at request time, which is the
/// guard's job.
#[derive(Clone)]
pub struct TokenVerifier {
    config: TokenConfig,
    decoding_key: DecodingKey,
}

impl TokenVerifier {
    pub fn new(config: TokenConfig) -> Self {
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            decoding_key,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.issuer.clone()]);
        validation.set_audience(&[self.config.audience.clone()]);
        validation.leeway = self.config.leeway_seconds.into();

        let token_data = decode::<Value>(token, &self.decoding_key, &validation)?;
        let claims = Claims::try_from(token_data.claims)?;
        debug!(subject = %claims.subject, role = %claims.role, "verified token successfully");
        Ok(claims)
    }
}

/// Store-backed currency rule, factored out so it is unit-testable without a
/// database: a token is live only while its embedded version matches the
/// identity's current one (or the admin epoch for admin tokens).
pub fn ensure_token_current(claims: &Claims, current_version: i32) -> AuthResult<()> {
    if claims.token_version == current_version {
        Ok(())
    } else {
        Err(AuthError::Revoked)
    }
}
