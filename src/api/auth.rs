use crate::api::error::ApiError;
use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use std::sync::Arc;

/// Gateway authentication manager
#[derive(Debug, Clone)]
pub struct AuthManager {
    /// Valid gateway keys (from config)
    valid_keys: Arc<Vec<String>>,
    enforced: bool,
}

impl AuthManager {
    pub fn new(keys: Vec<String>, enforced: bool) -> Self {
        Self {
            valid_keys: Arc::new(keys),
            enforced,
        }
    }

    pub fn is_enforced(&self) -> bool {
        self.enforced
    }

    /// Validate bearer key from headers
    pub fn validate(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        if !self.enforced {
            return Ok(());
        }

        let key = headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        if !self.valid_keys.iter().any(|valid| valid == key) {
            tracing::warn!("Invalid gateway key attempt");
            return Err(ApiError::Unauthorized);
        }

        Ok(())
    }

    /// Middleware for protecting routes
    pub async fn auth_middleware(
        axum::extract::State(auth_manager): axum::extract::State<AuthManager>,
        headers: HeaderMap,
        request: Request,
        next: Next,
    ) -> Result<Response, ApiError> {
        auth_manager.validate(&headers)?;
        Ok(next.run(request).await)
    }
}
