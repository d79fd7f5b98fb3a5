use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use switchyard::api::WebApiAdapter;
use switchyard::config::Config;
use switchyard::llm::types::{Choice, ResponseMessage, Usage};
use switchyard::llm::{
    ChatCompletion, ChatCompletionRequest, EmbeddingRequest, EmbeddingResponse, ErrorKind, Model,
    ModelList, Provider, ProviderFailure, ProviderKind, ProviderRegistry, ProviderResult,
    RequestContext,
};
use switchyard::Router;
use tower::ServiceExt;

/// Answers every chat with a fixed completion and records the call context.
#[derive(Default)]
struct StubProvider {
    seen: Mutex<Vec<RequestContext>>,
}

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        "OLLAMA"
    }

    async fn chat_completions(
        &self,
        ctx: &RequestContext,
        request: ChatCompletionRequest,
    ) -> ProviderResult<ChatCompletion> {
        self.seen.lock().unwrap().push(ctx.clone());

        let mut completion = ChatCompletion::new(
            request.model.unwrap_or_default(),
            vec![Choice::new(0, ResponseMessage::assistant("Hi!"), "stop")],
            Usage::new(3, 2),
        );
        completion.id = "chatcmpl-test".to_string();
        completion.created = 1700000000;
        Ok(completion)
    }

    async fn embeddings(
        &self,
        _ctx: &RequestContext,
        _request: EmbeddingRequest,
    ) -> ProviderResult<EmbeddingResponse> {
        Err(ProviderFailure::new(ErrorKind::NotImplemented))
    }

    async fn list_models(&self, _ctx: &RequestContext) -> ProviderResult<ModelList> {
        Ok(ModelList::new(vec![
            Model::new("llama3", 0, "organization-owner"),
            Model::new("org/model-a", 0, "organization-owner"),
        ]))
    }
}

fn app_with(config: Config, stub: Arc<StubProvider>) -> axum::Router {
    let mut providers: HashMap<ProviderKind, Arc<dyn Provider>> = HashMap::new();
    providers.insert(ProviderKind::Ollama, stub);
    let router = Router::new(&config, ProviderRegistry::with_providers(providers));
    WebApiAdapter::new(router, &config).build_routes()
}

fn open_config() -> Config {
    Config {
        auth_enforcement_enabled: false,
        ..Config::default()
    }
}

fn chat(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = app_with(open_config(), Arc::default());
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_chat_completion_json() {
    let app = app_with(open_config(), Arc::default());
    let response = app
        .oneshot(chat(r#"{"model":"llama3","messages":[{"role":"user","content":"hello"}]}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["choices"][0]["message"]["content"], "Hi!");
    assert_eq!(body["usage"]["total_tokens"], 5);
}

#[tokio::test]
async fn test_streaming_wire_bytes() {
    let app = app_with(open_config(), Arc::default());
    let response = app
        .oneshot(chat(
            r#"{"model":"llama3","stream":true,"messages":[{"role":"user","content":"hello"}]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let body = String::from_utf8(body_bytes(response).await).unwrap();
    let expected = concat!(
        "data: {\"id\":\"chatcmpl-test\",\"object\":\"chat.completion.chunk\",\"created\":1700000000,\"model\":\"llama3\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"},\"logprobs\":null,\"finish_reason\":null}]}\n\n",
        "data: {\"id\":\"chatcmpl-test\",\"object\":\"chat.completion.chunk\",\"created\":1700000000,\"model\":\"llama3\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi!\"},\"logprobs\":null,\"finish_reason\":null}]}\n\n",
        "data: {\"id\":\"chatcmpl-test\",\"object\":\"chat.completion.chunk\",\"created\":1700000000,\"model\":\"llama3\",\"choices\":[{\"index\":0,\"delta\":{},\"logprobs\":null,\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    assert_eq!(body, expected);
}

#[tokio::test]
async fn test_invalid_provider_is_rejected() {
    let app = app_with(open_config(), Arc::default());
    let mut request = chat(r#"{"model":"llama3","messages":[]}"#);
    request
        .headers_mut()
        .insert("llm_provider", "CLIPPY".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_llm_provider");
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let stub = Arc::new(StubProvider::default());
    let app = app_with(open_config(), stub.clone());

    let response = app.oneshot(chat("{\"model\": ")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_body");
    assert!(stub.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_url() {
    let app = app_with(open_config(), Arc::default());
    let response = app
        .oneshot(Request::builder().uri("/v1/completions").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({"error": {
            "message": "Unknown request URL. Please check the URL for typos.",
            "type": "invalid_request_error",
            "param": null,
            "code": "unknown_url"
        }})
    );
}

#[tokio::test]
async fn test_wrong_method_on_known_path() {
    let stub = Arc::new(StubProvider::default());
    let app = app_with(open_config(), stub.clone());
    let response = app
        .oneshot(Request::builder().uri("/v1/chat/completions").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(body["error"]["code"], "unknown_url");
    assert!(stub.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_body_is_rejected_with_envelope() {
    let stub = Arc::new(StubProvider::default());
    let app = app_with(open_config(), stub.clone());

    let padding = "x".repeat(10 * 1024 * 1024);
    let body = format!(
        r#"{{"model":"llama3","messages":[{{"role":"user","content":"{}"}}]}}"#,
        padding
    );
    let response = app.oneshot(chat(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_body");
    assert!(body["error"]["message"].is_string());
    assert!(stub.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_model_lookup_by_path() {
    let app = app_with(open_config(), Arc::default());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/v1/models/org/model-a").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], "org/model-a");

    let response = app
        .oneshot(Request::builder().uri("/v1/models/gpt-9").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "model_not_found");
}

#[tokio::test]
async fn test_adapter_failure_keeps_status() {
    let app = app_with(open_config(), Arc::default());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/embeddings")
                .body(Body::from(r#"{"model":"m","input":"x"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["type"], "not_implemented");
}

#[tokio::test]
async fn test_enforced_auth() {
    let config = Config {
        api_keys: vec!["gw-key".to_string()],
        auth_enforcement_enabled: true,
        ..Config::default()
    };
    let stub = Arc::new(StubProvider::default());
    let app = app_with(config, stub.clone());

    let response = app
        .clone()
        .oneshot(chat(r#"{"model":"llama3","messages":[]}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut request = chat(r#"{"model":"llama3","messages":[]}"#);
    request
        .headers_mut()
        .insert("authorization", "Bearer gw-key".parse().unwrap());
    request
        .headers_mut()
        .insert("provider_auth", "sk-upstream".parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // health stays public
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let seen = stub.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].provider_auth.as_deref(), Some("sk-upstream"));
}

#[tokio::test]
async fn test_open_gateway_forwards_bearer_and_max_context() {
    let stub = Arc::new(StubProvider::default());
    let app = app_with(open_config(), stub.clone());

    let mut request = chat(r#"{"model":"llama3","messages":[]}"#);
    request
        .headers_mut()
        .insert("authorization", "Bearer sk-client".parse().unwrap());
    request
        .headers_mut()
        .insert("max_context", "4096".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let seen = stub.seen.lock().unwrap();
    assert_eq!(seen[0].provider_auth.as_deref(), Some("sk-client"));
    assert_eq!(seen[0].max_context, Some(4096));
}
