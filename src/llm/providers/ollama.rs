use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::ProviderConfig;
use crate::llm::error::{
    catalog_failure, completion_failure, ErrorKind, ProviderFailure, ProviderResult,
};
use crate::llm::registry::ProviderKind;
use crate::llm::transport::{HttpTransport, NativeResponse};
use crate::llm::types::{
    ChatCompletion, ChatCompletionRequest, ChatMessage, Choice, Embedding, EmbeddingRequest,
    EmbeddingResponse, EmbeddingUsage, Model, ModelList, ResponseMessage, Usage,
};
use crate::llm::{embedding, tools, Provider, RequestContext};

use super::{
    decode, epoch_seconds, image_base64, iteration_seed, send, success_body, u64_field,
    warn_dropped, warn_unsupported, warn_unsupported_embedding, Endpoint,
};

const UNSUPPORTED: &[&str] = &["logit_bias", "logprobs", "top_logprobs", "presence_penalty"];

pub struct OllamaProvider {
    transport: HttpTransport,
    endpoint: Endpoint,
    options: ProviderConfig,
}

#[derive(Debug, Deserialize)]
struct NativeModel {
    name: String,
    #[serde(default)]
    modified_at: Option<String>,
}

impl OllamaProvider {
    pub fn new(transport: HttpTransport, options: ProviderConfig) -> Self {
        Self {
            endpoint: Endpoint::new(ProviderKind::Ollama, &options),
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

    /// Messages in `/api/chat` form: text parts joined, images as base64.
    async fn native_messages(&self, messages: &[ChatMessage]) -> ProviderResult<Vec<Value>> {
        let mut natives = Vec::with_capacity(messages.len());

        for message in messages {
            let mut native = json!({
                "role": message.role.as_str(),
                "content": message.text(),
            });

            let urls = message
                .content
                .as_ref()
                .map(|content| content.image_urls())
                .unwrap_or_default();
            if !urls.is_empty() {
                let mut images = Vec::with_capacity(urls.len());
                for url in urls {
                    images.push(image_base64(self.name(), &self.transport, url).await?);
                }
                native["images"] = json!(images);
            }

            natives.push(native);
        }

        Ok(natives)
    }

    /// The `options` bag for a regular chat call.
    fn native_options(&self, ctx: &RequestContext, logical_model: &str, request: &ChatCompletionRequest) -> Map<String, Value> {
        let settings = self.options.model(logical_model);
        let mut options = Map::new();

        let num_ctx = ctx
            .max_context
            .or_else(|| settings.and_then(|s| s.context_window))
            .filter(|n| *n > 0);
        if let Some(num_ctx) = num_ctx {
            options.insert("num_ctx".into(), json!(num_ctx));
        }
        if let Some(num_gpu) = settings.and_then(|s| s.gpu_layers) {
            options.insert("num_gpu".into(), json!(num_gpu));
        }
        if let Some(penalty) = request.frequency_penalty {
            options.insert("repeat_penalty".into(), json!(penalty));
        }
        if let Some(top_p) = request.top_p {
            options.insert("top_p".into(), json!(top_p));
        }
        if let Some(max_tokens) = request.token_limit() {
            options.insert("num_predict".into(), json!(max_tokens));
        }
        if let Some(temperature) = request.temperature {
            options.insert("temperature".into(), json!(temperature));
        }
        let stop = request.stop_sequences();
        if !stop.is_empty() {
            options.insert("stop".into(), json!(stop));
        }

        options
    }

    async fn simulate_tools(
        &self,
        ctx: &RequestContext,
        model: String,
        mut request: ChatCompletionRequest,
    ) -> ProviderResult<ChatCompletion> {
        tools::inject_tool_prompt(&mut request)?;
        tracing::debug!(provider = self.name(), model = %model, "simulating tool call");

        let body = json!({
            "model": model,
            "format": "json",
            "stream": false,
            "messages": self.native_messages(&request.messages).await?,
            "options": {"temperature": 0},
        });

        let response = self.post(ctx, "/api/chat", &body).await?;
        if !response.is_success() {
            return Err(completion_failure(&response));
        }

        let native = success_body(self.name(), &response, "message")?;
        let reply = native["message"]["content"].as_str().unwrap_or_default();
        let usage = Usage::new(
            u64_field(native, "prompt_eval_count"),
            u64_field(native, "eval_count"),
        );

        Ok(tools::tool_call_completion(&model, tools::parse_tool_reply(reply), usage))
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &'static str {
        ProviderKind::Ollama.as_str()
    }

    async fn chat_completions(
        &self,
        ctx: &RequestContext,
        request: ChatCompletionRequest,
    ) -> ProviderResult<ChatCompletion> {
        let Some(logical_model) = request.model.clone() else {
            return Err(ProviderFailure::with_message(
                ErrorKind::BadRequest,
                "A model is required for OLLAMA requests.",
            ));
        };
        let model = self.options.native_model(&logical_model);

        if request.wants_tools() {
            return self.simulate_tools(ctx, model, request).await;
        }

        warn_unsupported(self.name(), &request, UNSUPPORTED);

        let mut body = Map::new();
        body.insert("model".into(), json!(model));
        body.insert("stream".into(), json!(false));
        body.insert(
            "messages".into(),
            Value::Array(self.native_messages(&request.messages).await?),
        );
        if request.wants_json() {
            body.insert("format".into(), json!("json"));
        }
        let options = self.native_options(ctx, &logical_model, &request);

        let mut choices = Vec::new();
        let mut usage = Usage::default();

        for index in 0..request.completions() {
            let mut options = options.clone();
            if let Some(seed) = iteration_seed(&self.options, request.seed) {
                options.insert("seed".into(), json!(seed));
            }
            if !options.is_empty() {
                body.insert("options".into(), Value::Object(options));
            }

            let response = self.post(ctx, "/api/chat", &Value::Object(body.clone())).await?;
            if !response.is_success() {
                return Err(completion_failure(&response));
            }

            let native = success_body(self.name(), &response, "message")?;
            // prompt_eval_count is absent when the prompt was served from cache
            usage.add(
                u64_field(native, "prompt_eval_count"),
                u64_field(native, "eval_count"),
            );

            let content = native["message"]["content"].as_str().unwrap_or_default();
            let finish = match native.get("done_reason").and_then(Value::as_str) {
                Some("length") => "length",
                _ => "stop",
            };
            choices.push(Choice::new(index, ResponseMessage::assistant(content), finish));
        }

        Ok(ChatCompletion::new(model, choices, usage))
    }

    async fn embeddings(
        &self,
        ctx: &RequestContext,
        request: EmbeddingRequest,
    ) -> ProviderResult<EmbeddingResponse> {
        warn_unsupported_embedding(self.name(), &request);
        if request.encoding_format.as_deref().is_some_and(|f| f != "float" && f != "base64") {
            warn_dropped(self.name(), "encoding_format");
        }

        let model = self.options.native_model(&request.model);
        let mut data = Vec::new();

        for (index, input) in request.input.to_vec().into_iter().enumerate() {
            let body = json!({"model": model, "prompt": input});
            let response = self.post(ctx, "/api/embeddings", &body).await?;
            if !response.is_success() {
                return Err(completion_failure(&response));
            }

            let native = success_body(self.name(), &response, "embedding")?;
            let values: Vec<f64> = decode(self.name(), &native["embedding"], "embedding")?;
            data.push(Embedding::new(
                index as u32,
                embedding::vector(values, request.wants_base64()),
            ));
        }

        Ok(EmbeddingResponse::new(request.model, data, EmbeddingUsage::default()))
    }

    async fn list_models(&self, ctx: &RequestContext) -> ProviderResult<ModelList> {
        let response = send(
            self.name(),
            &self.transport,
            Method::GET,
            &self.endpoint.url("/api/tags"),
            &self.endpoint.bearer_headers(ctx),
            None,
        )
        .await?;
        if !response.is_success() {
            return Err(catalog_failure(&response));
        }

        let body = success_body(self.name(), &response, "models")?;
        let natives: Vec<NativeModel> = decode(self.name(), &body["models"], "models")?;

        Ok(ModelList::new(
            natives
                .into_iter()
                .map(|native| {
                    let created = epoch_seconds(native.modified_at.as_deref());
                    Model::new(native.name, created, "organization-owner")
                })
                .collect(),
        ))
    }
}
