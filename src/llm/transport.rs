use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

/// Outbound HTTP failures that never produced a status code.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A provider response body: parsed JSON when possible, raw text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeBody {
    Json(Value),
    Text(String),
}

impl NativeBody {
    pub fn parse(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => NativeBody::Json(value),
            Err(_) => NativeBody::Text(text),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            NativeBody::Json(value) => Some(value),
            NativeBody::Text(_) => None,
        }
    }

    /// Whether the serialized body contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        match self {
            NativeBody::Json(value) => value.to_string().contains(needle),
            NativeBody::Text(text) => text.contains(needle),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeResponse {
    pub status: u16,
    pub body: NativeBody,
}

impl NativeResponse {
    pub fn new(status: u16, body: NativeBody) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// Top-level field of a JSON object body.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.body.as_json().and_then(|body| body.get(key))
    }
}

/// Single-attempt HTTP transport shared by all adapters.
///
/// No retries and no client-side timeout: a call blocks until the provider
/// answers or the connection fails.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("switchyard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self { client })
    }

    pub async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &[(&'static str, String)],
        body: Option<&Value>,
    ) -> Result<NativeResponse, TransportError> {
        debug!(%method, url, "sending provider request");

        let mut request = self.client.request(method, url);
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|source| TransportError::Request {
            url: url.to_string(),
            source,
        })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;

        if status != 200 {
            warn!(url, status, body = %text, "provider returned an error status");
        }

        Ok(NativeResponse::new(status, NativeBody::parse(text)))
    }

    /// Download raw bytes, used for remote image parts.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let map_err = |source| TransportError::Request {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(map_err)?;
        let bytes = response.bytes().await.map_err(map_err)?;

        Ok(bytes.to_vec())
    }
}
