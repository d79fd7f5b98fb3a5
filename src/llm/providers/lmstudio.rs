use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::ProviderConfig;
use crate::llm::error::{catalog_failure, completion_failure, malformed_success, ProviderResult};
use crate::llm::registry::ProviderKind;
use crate::llm::transport::{HttpTransport, NativeResponse};
use crate::llm::types::{
    ChatCompletion, ChatCompletionRequest, Choice, Embedding, EmbeddingRequest, EmbeddingResponse,
    EmbeddingUsage, Model, ModelList, ResponseFormat, Usage,
};
use crate::llm::{embedding, tools, Provider, RequestContext};

use super::{
    decode, encode, iteration_seed, send, success_body, u64_field, warn_unsupported,
    warn_unsupported_embedding, Endpoint,
};

const UNSUPPORTED: &[&str] = &["logit_bias", "logprobs", "top_logprobs"];

/// Adapter for the LM Studio local server. It speaks the OpenAI format but
/// has no function calling and answers one choice per call.
pub struct LmStudioProvider {
    transport: HttpTransport,
    endpoint: Endpoint,
    options: ProviderConfig,
}

#[derive(Debug, Deserialize)]
struct NativeModel {
    id: String,
    #[serde(default)]
    owned_by: Option<String>,
}

impl LmStudioProvider {
    pub fn new(transport: HttpTransport, options: ProviderConfig) -> Self {
        Self {
            endpoint: Endpoint::new(ProviderKind::LmStudio, &options),
            transport,
            options,
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

    /// Forward only the fields the server understands.
    fn native_request(&self, model: Option<&str>, request: &ChatCompletionRequest) -> ProviderResult<Map<String, Value>> {
        let mut body = Map::new();
        if let Some(model) = model {
            body.insert("model".into(), json!(model));
        }
        body.insert("messages".into(), encode(self.name(), &request.messages)?);
        body.insert("stream".into(), json!(false));

        if let Some(format) = &request.response_format {
            body.insert("response_format".into(), encode(self.name(), format)?);
        }
        if let Some(temperature) = request.temperature {
            body.insert("temperature".into(), json!(temperature));
        }
        if let Some(top_p) = request.top_p {
            body.insert("top_p".into(), json!(top_p));
        }
        if let Some(max_tokens) = request.token_limit() {
            body.insert("max_tokens".into(), json!(max_tokens));
        }
        let stop = request.stop_sequences();
        if !stop.is_empty() {
            body.insert("stop".into(), json!(stop));
        }
        if let Some(penalty) = request.frequency_penalty {
            body.insert("frequency_penalty".into(), json!(penalty));
        }
        if let Some(penalty) = request.presence_penalty {
            body.insert("presence_penalty".into(), json!(penalty));
        }

        Ok(body)
    }

    async fn simulate_tools(
        &self,
        ctx: &RequestContext,
        model: Option<String>,
        mut request: ChatCompletionRequest,
    ) -> ProviderResult<ChatCompletion> {
        tools::inject_tool_prompt(&mut request)?;
        tracing::debug!(provider = self.name(), "simulating tool call");

        let mut body = Map::new();
        if let Some(model) = &model {
            body.insert("model".into(), json!(model));
        }
        body.insert("messages".into(), encode(self.name(), &request.messages)?);
        body.insert("response_format".into(), encode(self.name(), &ResponseFormat::json_object())?);
        body.insert("temperature".into(), json!(0));
        body.insert("stream".into(), json!(false));

        let response = self.post(ctx, "/v1/chat/completions", &Value::Object(body)).await?;
        if !response.is_success() {
            return Err(completion_failure(&response));
        }

        let native = success_body(self.name(), &response, "choices")?;
        let reply = native
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let usage = native_usage(native);
        let model = native["model"]
            .as_str()
            .map(str::to_string)
            .or(model)
            .unwrap_or_default();

        Ok(tools::tool_call_completion(&model, tools::parse_tool_reply(reply), usage))
    }
}

fn native_usage(body: &Value) -> Usage {
    let usage = body.get("usage").cloned().unwrap_or_default();
    Usage::new(
        u64_field(&usage, "prompt_tokens"),
        u64_field(&usage, "completion_tokens"),
    )
}

#[async_trait]
impl Provider for LmStudioProvider {
    fn name(&self) -> &'static str {
        ProviderKind::LmStudio.as_str()
    }

    async fn chat_completions(
        &self,
        ctx: &RequestContext,
        request: ChatCompletionRequest,
    ) -> ProviderResult<ChatCompletion> {
        let model = request
            .model
            .as_deref()
            .map(|model| self.options.native_model(model));

        if request.wants_tools() {
            return self.simulate_tools(ctx, model, request).await;
        }

        warn_unsupported(self.name(), &request, UNSUPPORTED);
        let mut body = self.native_request(model.as_deref(), &request)?;

        let mut choices = Vec::new();
        let mut usage = Usage::default();
        let mut first: Option<Value> = None;

        for index in 0..request.completions() {
            if let Some(seed) = iteration_seed(&self.options, request.seed) {
                body.insert("seed".into(), json!(seed));
            }

            let response = self
                .post(ctx, "/v1/chat/completions", &Value::Object(body.clone()))
                .await?;
            if !response.is_success() {
                return Err(completion_failure(&response));
            }

            let native = success_body(self.name(), &response, "choices")?;
            let choice = native
                .pointer("/choices/0")
                .ok_or_else(|| malformed_success(self.name(), "choices"))?;
            let mut choice: Choice = decode(self.name(), choice, "choices")?;
            choice.index = index;
            if choice.finish_reason.is_none() {
                choice.finish_reason = Some("stop".to_string());
            }

            let call_usage = native_usage(native);
            usage.add(call_usage.prompt_tokens, call_usage.completion_tokens);
            choices.push(choice);
            first.get_or_insert_with(|| native.clone());
        }

        let first = first.unwrap_or_default();
        let model = first["model"]
            .as_str()
            .map(str::to_string)
            .or(model)
            .unwrap_or_default();

        let mut completion = ChatCompletion::new(model, choices, usage);
        if let Some(id) = first["id"].as_str() {
            completion.id = id.to_string();
        }
        Ok(completion)
    }

    async fn embeddings(
        &self,
        ctx: &RequestContext,
        request: EmbeddingRequest,
    ) -> ProviderResult<EmbeddingResponse> {
        warn_unsupported_embedding(self.name(), &request);

        let model = self.options.native_model(&request.model);
        let mut data = Vec::new();
        let mut usage = EmbeddingUsage::default();

        for (index, input) in request.input.to_vec().into_iter().enumerate() {
            let body = json!({"model": model, "input": input, "encoding_format": "float"});
            let response = self.post(ctx, "/v1/embeddings", &body).await?;
            if !response.is_success() {
                return Err(completion_failure(&response));
            }

            let native = success_body(self.name(), &response, "data")?;
            let vector = native
                .pointer("/data/0/embedding")
                .ok_or_else(|| malformed_success(self.name(), "data"))?;
            let values: Vec<f64> = decode(self.name(), vector, "data")?;

            let native_usage = native.get("usage").cloned().unwrap_or_default();
            usage.prompt_tokens += u64_field(&native_usage, "prompt_tokens");
            usage.total_tokens += u64_field(&native_usage, "total_tokens");

            data.push(Embedding::new(
                index as u32,
                embedding::vector(values, request.wants_base64()),
            ));
        }

        Ok(EmbeddingResponse::new(model, data, usage))
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
            return Err(catalog_failure(&response));
        }

        let body = success_body(self.name(), &response, "data")?;
        let natives: Vec<NativeModel> = decode(self.name(), &body["data"], "data")?;

        Ok(ModelList::new(
            natives
                .into_iter()
                .map(|native| {
                    let owner = native
                        .owned_by
                        .unwrap_or_else(|| "organization-owner".to_string());
                    Model::new(native.id, 0, owner)
                })
                .collect(),
        ))
    }
}
