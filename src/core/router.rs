use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::llm::{
    generate_response_chunks, ChatCompletion, ChatCompletionRequest, EmbeddingRequest,
    EmbeddingResponse, Model, ModelList, Provider, ProviderFailure, ProviderRegistry,
    RequestContext, StreamFrame,
};

pub const PROVIDER_HEADER: &str = "llm_provider";
pub const PROVIDER_AUTH_HEADER: &str = "provider_auth";
pub const MAX_CONTEXT_HEADER: &str = "max_context";

/// Failures raised before or while dispatching to an adapter.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid LLM provider: {0}")]
    InvalidProvider(String),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error(transparent)]
    Provider(#[from] ProviderFailure),
}

/// What a chat completion call produces.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    Complete(ChatCompletion),
    Stream(Vec<StreamFrame>),
}

/// Resolves the provider for each request and invokes the adapter.
#[derive(Clone)]
pub struct Router {
    registry: Arc<ProviderRegistry>,
    default_provider: String,
    /// When gateway auth is off, the inbound bearer key is meant for the provider.
    forward_bearer: bool,
    stream_delay: Duration,
}

impl Router {
    pub fn new(config: &Config, registry: ProviderRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            default_provider: config.default_provider.clone(),
            forward_bearer: !config.auth_enforcement_enabled,
            stream_delay: Duration::from_millis(config.stream_delay_ms),
        }
    }

    pub fn stream_delay(&self) -> Duration {
        self.stream_delay
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn resolve(&self, headers: &HeaderMap) -> Result<Arc<dyn Provider>, DispatchError> {
        let name = header(headers, PROVIDER_HEADER).unwrap_or(self.default_provider.as_str());
        self.registry.resolve(name).map_err(|e| {
            tracing::warn!(provider = %name, "request named an unknown provider");
            DispatchError::InvalidProvider(e.0)
        })
    }

    /// Per-call overrides taken from the request headers.
    pub fn context(&self, headers: &HeaderMap) -> RequestContext {
        let provider_auth = header(headers, PROVIDER_AUTH_HEADER)
            .map(str::to_string)
            .or_else(|| {
                if self.forward_bearer {
                    bearer(headers)
                } else {
                    None
                }
            });

        let max_context = header(headers, MAX_CONTEXT_HEADER).and_then(|value| {
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| tracing::warn!(value, "ignoring unparsable max_context header"))
                .ok()
        });

        RequestContext {
            provider_auth,
            max_context,
        }
    }

    pub async fn chat_completions(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<ChatReply, DispatchError> {
        let provider = self.resolve(headers)?;
        let request: ChatCompletionRequest = parse_body(body)?;
        let streaming = request.is_streaming();

        tracing::debug!(
            provider = provider.name(),
            model = request.model.as_deref().unwrap_or_default(),
            streaming,
            "dispatching chat completion"
        );

        let completion = provider
            .chat_completions(&self.context(headers), request)
            .await?;

        if streaming {
            Ok(ChatReply::Stream(generate_response_chunks(&completion)))
        } else {
            Ok(ChatReply::Complete(completion))
        }
    }

    pub async fn embeddings(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<EmbeddingResponse, DispatchError> {
        let provider = self.resolve(headers)?;
        let request: EmbeddingRequest = parse_body(body)?;

        Ok(provider.embeddings(&self.context(headers), request).await?)
    }

    pub async fn list_models(&self, headers: &HeaderMap) -> Result<ModelList, DispatchError> {
        let provider = self.resolve(headers)?;
        Ok(provider.list_models(&self.context(headers)).await?)
    }

    pub async fn get_model(&self, headers: &HeaderMap, model_id: &str) -> Result<Model, DispatchError> {
        let provider = self.resolve(headers)?;
        Ok(provider.get_model(&self.context(headers), model_id).await?)
    }
}

/// Header value by name, also accepting the dashed spelling.
fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .or_else(|| headers.get(name.replace('_', "-")))
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    header(headers, "authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, DispatchError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "rejecting malformed request body");
        DispatchError::InvalidBody(e.to_string())
    })
}
