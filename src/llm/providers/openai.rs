use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::llm::error::{
    catalog_failure, completion_failure, malformed_success, ErrorPayload, ProviderFailure,
    ProviderResult,
};
use crate::llm::registry::ProviderKind;
use crate::llm::transport::{HttpTransport, NativeResponse};
use crate::llm::types::{
    ChatCompletion, ChatCompletionRequest, Choice, EmbeddingRequest, EmbeddingResponse, Model,
    ModelList,
};
use crate::llm::{Provider, RequestContext};

use super::{decode, encode, send, success_body, Endpoint};

/// Adapter for providers that already speak the OpenAI wire format
/// (OpenAI, Groq, Mistral, Together).
pub struct OpenAiCompatible {
    kind: ProviderKind,
    transport: HttpTransport,
    endpoint: Endpoint,
    options: ProviderConfig,
}

#[derive(Debug, Deserialize)]
struct NativeModel {
    id: String,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    owned_by: Option<String>,
    #[serde(default)]
    organization: Option<String>,
}

impl OpenAiCompatible {
    pub fn new(kind: ProviderKind, transport: HttpTransport, options: ProviderConfig) -> Self {
        Self {
            kind,
            endpoint: Endpoint::new(kind, &options),
            transport,
            options,
        }
    }

    /// Surface a native OpenAI error envelope unchanged, otherwise map it.
    fn native_failure(
        &self,
        response: &NativeResponse,
        fallback: fn(&NativeResponse) -> ProviderFailure,
    ) -> ProviderFailure {
        match response.body.as_json().and_then(ErrorPayload::from_native) {
            Some(error) => ProviderFailure {
                status_code: response.status,
                error,
            },
            None => fallback(response),
        }
    }

    /// Together lists models under their short name; everyone else keeps
    /// the native id so it can be sent back in a chat request.
    fn catalog_id<'a>(&self, native_id: &'a str) -> &'a str {
        match self.kind {
            ProviderKind::Together => short_id(native_id),
            _ => native_id,
        }
    }

    async fn post(&self, ctx: &RequestContext, path: &str, body: &Value) -> ProviderResult<NativeResponse> {
        send(
            self.name(),
            &self.transport,
            Method::POST,
            &self.endpoint.url(path),
            &self.endpoint.bearer_headers(ctx),
            Some(body),
        )
        .await
    }
}

/// Last path segment of a namespaced model id (`org/model` -> `model`).
fn short_id(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

/// Tool call indices restart at 0 within each choice.
fn renumber_tool_calls(choices: &mut [Choice]) {
    for choice in choices {
        if let Some(calls) = choice.message.tool_calls.as_mut() {
            for (i, call) in calls.iter_mut().enumerate() {
                call.index = Some(i as u32);
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatible {
    fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    fn catalog_matches(&self, listed_id: &str, requested_id: &str) -> bool {
        listed_id == requested_id || listed_id == self.catalog_id(requested_id)
    }

    async fn chat_completions(
        &self,
        ctx: &RequestContext,
        mut request: ChatCompletionRequest,
    ) -> ProviderResult<ChatCompletion> {
        if let Some(model) = request.model.take() {
            request.model = Some(self.options.native_model(&model));
        }
        request.stream = Some(false);
        request.extra.remove("stream_options");

        let body = encode(self.name(), &request)?;
        let response = self.post(ctx, "/v1/chat/completions", &body).await?;
        if !response.is_success() {
            return Err(self.native_failure(&response, completion_failure));
        }

        let body = success_body(self.name(), &response, "choices")?;
        let mut completion: ChatCompletion = decode(self.name(), body, "choices")?;
        renumber_tool_calls(&mut completion.choices);

        Ok(completion)
    }

    async fn embeddings(
        &self,
        ctx: &RequestContext,
        mut request: EmbeddingRequest,
    ) -> ProviderResult<EmbeddingResponse> {
        request.model = self.options.native_model(&request.model);

        let body = encode(self.name(), &request)?;
        let response = self.post(ctx, "/v1/embeddings", &body).await?;
        if !response.is_success() {
            return Err(self.native_failure(&response, completion_failure));
        }

        let body = success_body(self.name(), &response, "data")?;
        decode(self.name(), body, "data")
    }

    async fn list_models(&self, ctx: &RequestContext) -> ProviderResult<ModelList> {
        let response = send(
            self.name(),
            &self.transport,
            Method::GET,
            &self.endpoint.url("/v1/models"),
            &self.endpoint.bearer_headers(ctx),
            None,
        )
        .await?;
        if !response.is_success() {
            return Err(self.native_failure(&response, catalog_failure));
        }

        // Together answers with a bare array, everyone else with {"data": [...]}.
        let entries = match response.body.as_json() {
            Some(Value::Array(_)) => response.body.as_json(),
            _ => response.field("data"),
        }
        .ok_or_else(|| malformed_success(self.name(), "data"))?;

        let natives: Vec<NativeModel> = decode(self.name(), entries, "data")?;
        let models = natives
            .into_iter()
            .map(|native| {
                let id = self.catalog_id(&native.id).to_string();
                let owner = native
                    .owned_by
                    .or(native.organization)
                    .unwrap_or_else(|| "organization-owner".to_string());
                Model::new(id, native.created.unwrap_or(0), owner)
            })
            .collect();

        Ok(ModelList::new(models))
    }
}
