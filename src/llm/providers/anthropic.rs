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
    ChatCompletion, ChatCompletionRequest, ChatMessage, Choice, ContentPart, EmbeddingRequest,
    EmbeddingResponse, MessageContent, Model, ModelList, ResponseMessage, Role, Tool, ToolCall,
    Usage,
};
use crate::llm::{Provider, RequestContext};

use super::{decode, parse_data_url, send, success_body, u64_field, warn_unsupported, Endpoint, Headers};

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const JSON_INSTRUCTION: &str = "\n Output Format: Strictly in JSON.";

const UNSUPPORTED: &[&str] = &[
    "frequency_penalty",
    "presence_penalty",
    "logit_bias",
    "logprobs",
    "top_logprobs",
    "seed",
];

pub struct AnthropicProvider {
    transport: HttpTransport,
    endpoint: Endpoint,
    options: ProviderConfig,
}

#[derive(Debug, Deserialize)]
struct NativeModel {
    id: String,
    #[serde(default)]
    created_at: Option<String>,
}

impl AnthropicProvider {
    pub fn new(transport: HttpTransport, options: ProviderConfig) -> Self {
        Self {
            endpoint: Endpoint::new(ProviderKind::Anthropic, &options),
            transport,
            options,
        }
    }

    fn headers(&self, ctx: &RequestContext) -> Headers {
        let mut headers = vec![
            ("accept", "application/json".to_string()),
            ("anthropic-version", API_VERSION.to_string()),
        ];
        if let Some(key) = self.endpoint.credential(ctx) {
            headers.push(("x-api-key", key));
        }
        headers
    }

    /// Build the `/v1/messages` body.
    fn to_native(&self, request: &ChatCompletionRequest) -> Value {
        let mut body = Map::new();

        let model = request
            .model
            .as_deref()
            .map(|model| self.options.native_model(model))
            .unwrap_or_default();
        body.insert("model".into(), json!(model));
        body.insert(
            "max_tokens".into(),
            json!(request.token_limit().unwrap_or(DEFAULT_MAX_TOKENS)),
        );
        body.insert("stream".into(), json!(false));

        let mut system = request
            .messages
            .iter()
            .filter(|message| message.role == Role::System)
            .map(ChatMessage::text)
            .collect::<Vec<_>>()
            .join("\n");
        if request.wants_json() {
            system.push_str(JSON_INSTRUCTION);
        }
        if !system.is_empty() {
            body.insert("system".into(), json!(system));
        }

        body.insert("messages".into(), Value::Array(native_messages(&request.messages)));

        if let Some(temperature) = request.temperature {
            body.insert("temperature".into(), json!(temperature));
        }
        if let Some(top_p) = request.top_p {
            body.insert("top_p".into(), json!(top_p));
        }
        let stop = request.stop_sequences();
        if !stop.is_empty() {
            body.insert("stop_sequences".into(), json!(stop));
        }

        if let Some(tools) = request.tools.as_deref().filter(|tools| !tools.is_empty()) {
            body.insert(
                "tools".into(),
                Value::Array(tools.iter().map(native_tool).collect()),
            );
            if let Some(choice) = request.tool_choice.as_ref().and_then(native_tool_choice) {
                body.insert("tool_choice".into(), choice);
            }
        }

        Value::Object(body)
    }
}

fn native_tool(tool: &Tool) -> Value {
    let input_schema = tool
        .function
        .parameters
        .clone()
        .unwrap_or_else(|| json!({"type": "object", "properties": {}}));

    let mut native = json!({
        "name": tool.function.name,
        "input_schema": input_schema,
    });
    if let Some(description) = &tool.function.description {
        native["description"] = json!(description);
    }
    native
}

fn native_tool_choice(choice: &Value) -> Option<Value> {
    match choice {
        Value::String(mode) => match mode.as_str() {
            "auto" => Some(json!({"type": "auto"})),
            "required" => Some(json!({"type": "any"})),
            "none" => Some(json!({"type": "none"})),
            _ => None,
        },
        Value::Object(_) => choice
            .pointer("/function/name")
            .and_then(Value::as_str)
            .map(|name| json!({"type": "tool", "name": name})),
        _ => None,
    }
}

fn native_tool_id(id: &str) -> String {
    match id.strip_prefix("call_") {
        Some(rest) => format!("toolu_{}", rest),
        None => id.to_string(),
    }
}

fn canonical_tool_id(id: &str) -> String {
    match id.strip_prefix("toolu_") {
        Some(rest) => format!("call_{}", rest),
        None => id.to_string(),
    }
}

fn content_blocks(content: Option<&MessageContent>) -> Vec<Value> {
    match content {
        None => Vec::new(),
        Some(MessageContent::Text(text)) if text.is_empty() => Vec::new(),
        Some(MessageContent::Text(text)) => vec![json!({"type": "text", "text": text})],
        Some(MessageContent::Parts(parts)) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({"type": "text", "text": text}),
                ContentPart::ImageUrl { image_url } => match parse_data_url(&image_url.url) {
                    Some(data_url) => json!({
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": data_url.media_type,
                            "data": data_url.data,
                        }
                    }),
                    None => json!({
                        "type": "image",
                        "source": {"type": "url", "url": image_url.url}
                    }),
                },
            })
            .collect(),
    }
}

/// Translate the non-system messages. Consecutive messages that map to the
/// same native role are merged, since the Messages API requires alternation.
fn native_messages(messages: &[ChatMessage]) -> Vec<Value> {
    let mut turns: Vec<(&'static str, Vec<Value>)> = Vec::new();

    for message in messages {
        let (role, blocks) = match message.role {
            Role::System => continue,
            Role::User => ("user", content_blocks(message.content.as_ref())),
            Role::Assistant => {
                let mut blocks = content_blocks(message.content.as_ref());
                for call in message.tool_calls.iter().flatten() {
                    let input: Value = serde_json::from_str(&call.function.arguments)
                        .unwrap_or_else(|_| json!({}));
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": native_tool_id(&call.id),
                        "name": call.function.name,
                        "input": input,
                    }));
                }
                ("assistant", blocks)
            }
            Role::Tool => {
                let tool_use_id = message
                    .tool_call_id
                    .as_deref()
                    .map(native_tool_id)
                    .unwrap_or_default();
                (
                    "user",
                    vec![json!({
                        "type": "tool_result",
                        "tool_use_id": tool_use_id,
                        "content": message.text(),
                    })],
                )
            }
        };

        match turns.last_mut() {
            Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
            _ => turns.push((role, blocks)),
        }
    }

    turns
        .into_iter()
        .map(|(role, blocks)| match blocks.as_slice() {
            [single] if single["type"] == "text" => json!({"role": role, "content": single["text"]}),
            _ => json!({"role": role, "content": blocks}),
        })
        .collect()
}

fn finish_reason(stop_reason: Option<&str>) -> &'static str {
    match stop_reason {
        Some("max_tokens") => "length",
        Some("tool_use") => "tool_calls",
        _ => "stop",
    }
}

/// One native message response as a canonical choice.
fn choice_from_native(index: u32, body: &Value) -> Choice {
    let blocks = body
        .get("content")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let text: String = blocks
        .iter()
        .filter(|block| block["type"] == "text")
        .filter_map(|block| block["text"].as_str())
        .collect();

    let tool_calls: Vec<ToolCall> = blocks
        .iter()
        .filter(|block| block["type"] == "tool_use")
        .enumerate()
        .map(|(i, block)| {
            ToolCall::function(
                i as u32,
                canonical_tool_id(block["id"].as_str().unwrap_or_default()),
                block["name"].as_str().unwrap_or_default(),
                block.get("input").cloned().unwrap_or_else(|| json!({})).to_string(),
            )
        })
        .collect();

    let mut message = ResponseMessage::assistant(text);
    if !tool_calls.is_empty() {
        if message.content.as_deref() == Some("") {
            message.content = None;
        }
        message.tool_calls = Some(tool_calls);
    }

    Choice::new(
        index,
        message,
        finish_reason(body.get("stop_reason").and_then(Value::as_str)),
    )
}

fn canonical_id(native_id: &str) -> String {
    match native_id.strip_prefix("msg_") {
        Some(rest) => format!("chatcmpl-{}", rest),
        None => native_id.to_string(),
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        ProviderKind::Anthropic.as_str()
    }

    async fn chat_completions(
        &self,
        ctx: &RequestContext,
        request: ChatCompletionRequest,
    ) -> ProviderResult<ChatCompletion> {
        warn_unsupported(self.name(), &request, UNSUPPORTED);

        let body = self.to_native(&request);
        let url = self.endpoint.url("/v1/messages");
        let headers = self.headers(ctx);

        let mut choices = Vec::new();
        let mut usage = Usage::default();
        let mut first: Option<Value> = None;

        for index in 0..request.completions() {
            let response = send(self.name(), &self.transport, Method::POST, &url, &headers, Some(&body)).await?;
            if !response.is_success() {
                return Err(completion_failure(&response));
            }

            let native = success_body(self.name(), &response, "content")?;
            let native_usage = native.get("usage").cloned().unwrap_or_default();
            usage.add(
                u64_field(&native_usage, "input_tokens"),
                u64_field(&native_usage, "output_tokens"),
            );
            choices.push(choice_from_native(index, native));
            first.get_or_insert_with(|| native.clone());
        }

        let first = first.unwrap_or_default();
        let model = first["model"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| body["model"].as_str().unwrap_or_default().to_string());

        let mut completion = ChatCompletion::new(model, choices, usage);
        if let Some(id) = first["id"].as_str() {
            completion.id = canonical_id(id);
        }
        Ok(completion)
    }

    async fn embeddings(
        &self,
        _ctx: &RequestContext,
        _request: EmbeddingRequest,
    ) -> ProviderResult<EmbeddingResponse> {
        Err(ProviderFailure::new(ErrorKind::NotImplemented))
    }

    async fn list_models(&self, ctx: &RequestContext) -> ProviderResult<ModelList> {
        let response: NativeResponse = send(
            self.name(),
            &self.transport,
            Method::GET,
            &self.endpoint.url("/v1/models?limit=1000"),
            &self.headers(ctx),
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
                    Model::new(
                        native.id,
                        super::epoch_seconds(native.created_at.as_deref()),
                        "anthropic",
                    )
                })
                .collect(),
        ))
    }
}
