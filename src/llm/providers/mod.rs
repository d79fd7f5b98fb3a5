//! Provider adapters and the plumbing they share.

mod anthropic;
mod lmstudio;
mod ollama;
mod openai;

pub use anthropic::AnthropicProvider;
pub use lmstudio::LmStudioProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatible;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ProviderConfig;

use super::error::{malformed_success, ErrorKind, ProviderFailure, ProviderResult};
use super::registry::ProviderKind;
use super::transport::{HttpTransport, NativeResponse};
use super::types::{ChatCompletionRequest, EmbeddingRequest};
use super::RequestContext;

pub(crate) type Headers = Vec<(&'static str, String)>;

/// Where a provider lives and the key configured for it.
#[derive(Debug, Clone)]
pub(crate) struct Endpoint {
    base_url: String,
    api_key: Option<String>,
}

impl Endpoint {
    pub fn new(kind: ProviderKind, options: &ProviderConfig) -> Self {
        let base_url = options
            .base_url
            .as_deref()
            .unwrap_or(kind.default_base_url())
            .trim_end_matches('/')
            .to_string();

        Self {
            base_url,
            api_key: options.api_key.clone().filter(|key| !key.is_empty()),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `PROVIDER_AUTH` wins over the configured key.
    pub fn credential(&self, ctx: &RequestContext) -> Option<String> {
        ctx.provider_auth
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| self.api_key.clone())
    }

    pub fn bearer_headers(&self, ctx: &RequestContext) -> Headers {
        let mut headers = vec![("accept", "application/json".to_string())];
        if let Some(key) = self.credential(ctx) {
            headers.push(("authorization", format!("Bearer {}", key)));
        }
        headers
    }
}

/// Send one request, turning transport failures into `unknown_error`.
pub(crate) async fn send(
    provider: &str,
    transport: &HttpTransport,
    method: Method,
    url: &str,
    headers: &[(&'static str, String)],
    body: Option<&Value>,
) -> ProviderResult<NativeResponse> {
    transport
        .send(method, url, headers, body)
        .await
        .map_err(|e| {
            tracing::error!(provider, error = %e, "provider request failed");
            ProviderFailure::new(ErrorKind::UnknownError)
        })
}

/// The JSON body of a successful response, provided it has `field`.
pub(crate) fn success_body<'a>(
    provider: &str,
    response: &'a NativeResponse,
    field: &str,
) -> ProviderResult<&'a Value> {
    match response.body.as_json() {
        Some(body) if body.get(field).is_some() => Ok(body),
        _ => Err(malformed_success(provider, field)),
    }
}

pub(crate) fn decode<T: DeserializeOwned>(
    provider: &str,
    value: &Value,
    field: &str,
) -> ProviderResult<T> {
    serde_json::from_value(value.clone()).map_err(|e| {
        tracing::debug!(provider, field, error = %e, "could not decode provider payload");
        malformed_success(provider, field)
    })
}

pub(crate) fn encode<T: serde::Serialize>(provider: &str, value: &T) -> ProviderResult<Value> {
    serde_json::to_value(value).map_err(|e| {
        tracing::error!(provider, error = %e, "could not encode provider request");
        ProviderFailure::new(ErrorKind::InternalServerError)
    })
}

pub(crate) fn warn_dropped(provider: &str, field: &str) {
    tracing::warn!(provider, field, "parameter not supported by provider, ignoring");
}

/// Warn-and-drop every listed field the request carries, plus any
/// unrecognised keys.
pub(crate) fn warn_unsupported(provider: &str, request: &ChatCompletionRequest, fields: &[&str]) {
    for field in fields {
        if request.has_field(field) {
            warn_dropped(provider, field);
        }
    }
    for field in request.extra.keys() {
        warn_dropped(provider, field);
    }
}

pub(crate) fn warn_unsupported_embedding(provider: &str, request: &EmbeddingRequest) {
    if request.dimensions.is_some() {
        warn_dropped(provider, "dimensions");
    }
    for field in request.extra.keys() {
        warn_dropped(provider, field);
    }
}

/// Seed for one iteration of an `n` loop.
pub(crate) fn iteration_seed(options: &ProviderConfig, explicit: Option<i64>) -> Option<i64> {
    match explicit {
        Some(seed) => Some(seed),
        None if options.vary_seed => Some(i64::from(rand::random::<u32>())),
        None => None,
    }
}

pub(crate) fn u64_field(body: &Value, key: &str) -> u64 {
    body.get(key).and_then(Value::as_u64).unwrap_or(0)
}

/// Epoch seconds for an RFC 3339 timestamp, 0 when it does not parse.
pub(crate) fn epoch_seconds(timestamp: Option<&str>) -> i64 {
    timestamp
        .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.timestamp())
        .unwrap_or(0)
}

/// The parts of a `data:<media type>;base64,<payload>` URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DataUrl<'a> {
    pub media_type: &'a str,
    pub data: &'a str,
}

pub(crate) fn parse_data_url(url: &str) -> Option<DataUrl<'_>> {
    let (meta, data) = url.strip_prefix("data:")?.split_once(',')?;
    let media_type = meta.strip_suffix(";base64")?;
    Some(DataUrl { media_type, data })
}

/// Base64 payload of an image part; remote images are downloaded.
pub(crate) async fn image_base64(
    provider: &str,
    transport: &HttpTransport,
    url: &str,
) -> ProviderResult<String> {
    if let Some(data_url) = parse_data_url(url) {
        return Ok(data_url.data.to_string());
    }

    let bytes = transport.fetch_bytes(url).await.map_err(|e| {
        tracing::warn!(provider, error = %e, "failed to download image");
        ProviderFailure::with_message(ErrorKind::BadRequest, format!("Unable to download image: {}", url))
    })?;
    Ok(STANDARD.encode(bytes))
}
