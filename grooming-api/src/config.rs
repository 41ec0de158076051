use anyhow::{Context, Result};
use std::env;

use common_auth::TokenConfig;

/// Load token settings from the environment. `TOKEN_SECRET` is the only
/// mandatory value; issuer/audience default to the deployment's own names so
/// local setups need a single variable.
pub fn load_token_config() -> Result<TokenConfig> {
    let secret = env::var("TOKEN_SECRET").context("TOKEN_SECRET must be set")?;
    let issuer =
        env::var("TOKEN_ISSUER").unwrap_or_else(|_| "https://auth.groomspot.local".to_string());
    let audience = env::var("TOKEN_AUDIENCE").unwrap_or_else(|_| "groomspot-app".to_string());

    let mut config = TokenConfig::new(issuer, audience, secret);
    if let Ok(value) = env::var("TOKEN_TTL_SECONDS") {
        if let Ok(ttl) = value.trim().parse::<i64>() {
            config = config.with_ttl(ttl);
        }
    }
    if let Ok(value) = env::var("TOKEN_LEEWAY_SECONDS") {
        if let Ok(leeway) = value.trim().parse::<u32>() {
            config = config.with_leeway(leeway);
        }
    }
    Ok(config)
}

pub fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect()
}
