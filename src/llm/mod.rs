//! Provider adapters and the canonical OpenAI-shaped schema they translate to.

pub mod embedding;
pub mod error;
pub mod lenient_json;
pub mod providers;
pub mod registry;
pub mod stream;
pub mod tools;
pub mod transport;
pub mod types;

pub use error::{ErrorKind, ErrorPayload, ProviderFailure, ProviderResult};
pub use registry::{ProviderKind, ProviderRegistry, UnknownProvider};
pub use stream::{generate_response_chunks, StreamFrame};
pub use transport::HttpTransport;
pub use types::{
    ChatCompletion, ChatCompletionRequest, EmbeddingRequest, EmbeddingResponse, Model, ModelList,
};

use async_trait::async_trait;

/// Per-call overrides taken from request headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Credential forwarded to the provider instead of the configured key.
    pub provider_auth: Option<String>,
    /// Context window override (`MAX_CONTEXT`).
    pub max_context: Option<u32>,
}

/// The capability set every provider adapter implements.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn chat_completions(
        &self,
        ctx: &RequestContext,
        request: ChatCompletionRequest,
    ) -> ProviderResult<ChatCompletion>;

    async fn embeddings(
        &self,
        ctx: &RequestContext,
        request: EmbeddingRequest,
    ) -> ProviderResult<EmbeddingResponse>;

    async fn list_models(&self, ctx: &RequestContext) -> ProviderResult<ModelList>;

    /// Whether a catalog entry answers to the requested model id.
    fn catalog_matches(&self, listed_id: &str, requested_id: &str) -> bool {
        listed_id == requested_id
    }

    /// Scan the model list for the requested id.
    async fn get_model(&self, ctx: &RequestContext, model_id: &str) -> ProviderResult<Model> {
        let models = self.list_models(ctx).await.map_err(|failure| {
            tracing::warn!(
                provider = self.name(),
                status = failure.status_code,
                "model listing failed during lookup"
            );
            ProviderFailure::new(ErrorKind::InternalServerError)
        })?;

        models
            .data
            .into_iter()
            .find(|model| self.catalog_matches(&model.id, model_id))
            .ok_or_else(|| ProviderFailure::new(ErrorKind::ModelNotFound))
    }
}
