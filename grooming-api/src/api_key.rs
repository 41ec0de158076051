use std::collections::HashSet;
use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use tracing::warn;

use crate::config::parse_csv;

const API_KEY_HEADER: &str = "x-api-key";

/// Allow-list of client API keys, loaded once at startup. This is a coarse
/// perimeter check for approved client apps and runs before any token logic.
#[derive(Clone)]
pub struct ApiKeys {
    keys: Arc<HashSet<String>>,
}

impl ApiKeys {
    pub fn from_csv(value: &str) -> Self {
        Self {
            keys: Arc::new(parse_csv(value).into_iter().collect()),
        }
    }

    pub fn from_env() -> Result<Self> {
        let raw = env::var("API_KEYS").map_err(|_| anyhow!("API_KEYS must be set"))?;
        let keys = Self::from_csv(&raw);
        if keys.is_empty() {
            return Err(anyhow!("API_KEYS must contain at least one key"));
        }
        Ok(keys)
    }

    pub fn allows(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

pub async fn require_api_key(
    State(keys): State<ApiKeys>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match presented {
        Some(key) if keys.allows(key) => next.run(request).await,
        Some(_) => {
            warn!(path = %request.uri().path(), "rejected request with unknown api key");
            ApiError::InvalidApiKey.into_response()
        }
        None => ApiError::MissingApiKey.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_allow_list_membership() {
        let keys = ApiKeys::from_csv("mobile-app, web-app ,");
        assert!(keys.allows("mobile-app"));
        assert!(keys.allows("web-app"));
        assert!(!keys.allows("unknown"));
        assert!(!keys.allows(""));
    }

    #[test]
    fn blank_csv_is_empty() {
        assert!(ApiKeys::from_csv(" , ").is_empty());
    }
}
