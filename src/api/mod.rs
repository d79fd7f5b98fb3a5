pub mod auth;
pub mod error;
pub mod routes;

use crate::config::Config;
use crate::core::Router;
use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router as AxumRouter;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::info;

pub use auth::AuthManager;
pub use error::ApiError;

/// OpenAI-compatible HTTP surface
pub struct WebApiAdapter {
    router: Arc<Router>,
    auth_manager: AuthManager,
    host: String,
    port: u16,
    allowed_origins: Vec<String>,
}

impl WebApiAdapter {
    pub fn new(router: Router, config: &Config) -> Self {
        Self {
            router: Arc::new(router),
            auth_manager: AuthManager::new(config.api_keys.clone(), config.auth_enforcement_enabled),
            host: config.host.clone(),
            port: config.port,
            allowed_origins: config.allowed_origins.clone(),
        }
    }

    /// Build Axum router with all endpoints
    pub fn build_routes(&self) -> AxumRouter {
        // Public endpoints (no auth required)
        let public_routes = AxumRouter::new().route("/health", get(routes::health));

        // Protected endpoints (auth required when enforcement is on)
        let api_routes = AxumRouter::new()
            .route("/v1/chat/completions", post(routes::chat_completions))
            .route("/v1/embeddings", post(routes::embeddings))
            .route("/v1/models", get(routes::list_models))
            .route("/v1/models/*model_id", get(routes::get_model))
            .with_state(self.router.clone())
            .layer(axum::middleware::from_fn_with_state(
                self.auth_manager.clone(),
                AuthManager::auth_middleware,
            ));

        AxumRouter::new()
            .merge(public_routes)
            .merge(api_routes)
            .fallback(routes::unknown_url)
            .layer(
                ServiceBuilder::new()
                    .layer(axum::middleware::from_fn(logging_middleware))
                    .layer(axum::middleware::from_fn(rejection_envelope))
                    .layer(cors_layer(&self.allowed_origins))
                    .layer(DefaultBodyLimit::max(1024 * 1024 * 10)), // 10MB
            )
    }

    /// Start the Web API server
    pub async fn start(&self) -> Result<()> {
        let app = self.build_routes();
        let addr = format!("{}:{}", self.host, self.port);

        info!(
            "Starting gateway on {} (auth enforced: {})",
            addr,
            self.auth_manager.is_enforced()
        );

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .context("Failed to bind server")?;

        axum::serve(listener, app).await.context("Server error")?;

        Ok(())
    }
}

/// CORS for the configured origins. Bare host names such as `localhost`
/// are expanded to their http and https forms; `*` allows any origin.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .flat_map(|origin| {
            if origin.contains("://") {
                vec![origin.clone()]
            } else {
                vec![format!("http://{}", origin), format!("https://{}", origin)]
            }
        })
        .filter_map(|origin| match HeaderValue::from_str(&origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

/// Re-render axum's plain-text rejections (wrong method on a known path,
/// oversized body) as error envelopes. JSON responses pass untouched.
async fn rejection_envelope(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let response = next.run(request).await;

    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    if is_json {
        return response;
    }

    match response.status() {
        StatusCode::METHOD_NOT_ALLOWED => ApiError::UnknownUrl.into_response(),
        StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge.into_response(),
        _ => response,
    }
}

/// Logging middleware
async fn logging_middleware(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let status = response.status();
    tracing::info!("{} {} -> {}", method, uri, status);

    response
}

