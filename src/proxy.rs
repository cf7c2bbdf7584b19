//! OpenAI-compatible shim in front of a provider SDK.
//!
//! Tools that only speak `POST /v1/chat/completions` (LM Studio clients,
//! the API backend of this crate) can reach a provider such as Gemini by
//! pointing at this server. The router is generic over a
//! [`CompletionBackend`], so tests swap the real provider for a fake.
//!
//! ```text
//! client ──POST /v1/chat/completions──▶ proxy_router ──▶ CompletionBackend
//!        ◀────── chat.completion JSON ──────────────────┘
//! ```

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Pdf2MdError;

/// Model used when a request does not name one.
pub const DEFAULT_PROXY_MODEL: &str = "gemini-2.5-flash-preview-05-20";

/// Address the shim listens on by default.
pub const DEFAULT_PROXY_ADDR: &str = "127.0.0.1:4000";

/// Provider the shim forwards to by default.
pub const DEFAULT_PROXY_PROVIDER: &str = "gemini";

/// Settings for the shim.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind: SocketAddr,
    pub provider: String,
    pub default_model: String,
    pub default_temperature: f32,
    pub default_max_tokens: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 4000)),
            provider: DEFAULT_PROXY_PROVIDER.to_string(),
            default_model: DEFAULT_PROXY_MODEL.to_string(),
            default_temperature: 0.1,
            default_max_tokens: 8192,
        }
    }
}

// ── Wire format ──────────────────────────────────────────────────────────

/// Body of `POST /v1/chat/completions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: MessageContent,
}

/// `content` is either a plain string or a list of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl MessageContent {
    /// All text parts joined with newlines.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn image_urls(&self) -> Vec<&str> {
        match self {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
                    ContentPart::Text { .. } => None,
                })
                .collect(),
        }
    }
}

/// A request with every default filled in.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// What an upstream answered.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: Option<usize>,
    pub completion_tokens: Option<usize>,
}

// ── Errors ───────────────────────────────────────────────────────────────

/// Failure while serving a request. Always answered as HTTP 500.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Upstream(String),

    #[error("Not found")]
    NotFound,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match self {
            ProxyError::NotFound => StatusCode::NOT_FOUND,
            ProxyError::BadRequest(_) | ProxyError::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!("Proxy request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// ── Upstream ─────────────────────────────────────────────────────────────

/// Where the shim sends completions.
pub trait CompletionBackend: Send + Sync + 'static {
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<Completion, ProxyError>> + Send;
}

/// Upstream backed by an `edgequake_llm` provider.
///
/// One provider is created per requested model and reused afterwards.
pub struct ProviderBackend {
    provider_name: String,
    providers: Mutex<HashMap<String, Arc<dyn LLMProvider>>>,
}

impl ProviderBackend {
    pub fn new(provider_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            providers: Mutex::new(HashMap::new()),
        }
    }

    fn provider_for(&self, model: &str) -> Result<Arc<dyn LLMProvider>, ProxyError> {
        let mut cache = self
            .providers
            .lock()
            .map_err(|_| ProxyError::Upstream("provider cache poisoned".into()))?;
        if let Some(p) = cache.get(model) {
            return Ok(Arc::clone(p));
        }
        let provider = ProviderFactory::create_llm_provider(&self.provider_name, model)
            .map_err(|e| {
                ProxyError::Upstream(format!(
                    "cannot create {} provider for {}: {}",
                    self.provider_name, model, e
                ))
            })?;
        cache.insert(model.to_string(), Arc::clone(&provider));
        Ok(provider)
    }
}

impl CompletionBackend for ProviderBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProxyError> {
        let provider = self.provider_for(&request.model)?;
        let messages = to_chat_messages(&request.messages)?;
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        let reported = response.prompt_tokens + response.completion_tokens > 0;
        Ok(Completion {
            content: response.content,
            prompt_tokens: reported.then_some(response.prompt_tokens),
            completion_tokens: reported.then_some(response.completion_tokens),
        })
    }
}

/// Convert wire messages into provider messages.
///
/// `system` stays a system message; `user` carries its text and decoded
/// images. Earlier `assistant` turns are passed along as context.
fn to_chat_messages(messages: &[WireMessage]) -> Result<Vec<ChatMessage>, ProxyError> {
    if messages.is_empty() {
        return Err(ProxyError::BadRequest("messages must not be empty".into()));
    }

    let mut out = Vec::with_capacity(messages.len());
    for m in messages {
        let text = m.content.text();
        match m.role.as_str() {
            "system" => out.push(ChatMessage::system(text)),
            "user" => {
                let images = m
                    .content
                    .image_urls()
                    .into_iter()
                    .map(decode_data_url)
                    .collect::<Result<Vec<_>, _>>()?;
                out.push(ChatMessage::user_with_images(&text, images));
            }
            "assistant" => out.push(ChatMessage::system(format!(
                "Your previous reply was:\n\n{}",
                text
            ))),
            other => {
                return Err(ProxyError::BadRequest(format!("unsupported role '{}'", other)))
            }
        }
    }
    Ok(out)
}

/// Decode `data:<mime>;base64,<payload>` into `ImageData`.
fn decode_data_url(url: &str) -> Result<ImageData, ProxyError> {
    let rest = url.strip_prefix("data:").ok_or_else(|| {
        ProxyError::BadRequest("only data: image URLs are supported".into())
    })?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ProxyError::BadRequest("malformed data URL".into()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| ProxyError::BadRequest("data URL is not base64".into()))?;
    Ok(ImageData::new(payload.to_string(), mime).with_detail("high"))
}

// ── Router ───────────────────────────────────────────────────────────────

/// Shared state of the router.
pub struct ProxyState<B> {
    pub backend: B,
    pub config: ProxyConfig,
}

/// Build the shim's routes.
pub fn proxy_router<B: CompletionBackend>(state: Arc<ProxyState<B>>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions::<B>))
        .route("/v1/models", get(list_models::<B>))
        .fallback(not_found)
        .with_state(state)
}

async fn chat_completions<B: CompletionBackend>(
    State(state): State<Arc<ProxyState<B>>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ProxyError> {
    let req: ChatCompletionRequest =
        serde_json::from_slice(&body).map_err(|e| ProxyError::BadRequest(e.to_string()))?;

    let request = CompletionRequest {
        model: req
            .model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| state.config.default_model.clone()),
        messages: req.messages,
        temperature: req.temperature.unwrap_or(state.config.default_temperature),
        max_tokens: req.max_tokens.unwrap_or(state.config.default_max_tokens),
    };
    debug!(
        "chat.completions model={} messages={}",
        request.model,
        request.messages.len()
    );

    let model = request.model.clone();
    let completion = state.backend.complete(request).await?;

    let usage = match (completion.prompt_tokens, completion.completion_tokens) {
        (Some(p), Some(c)) => json!({
            "prompt_tokens": p,
            "completion_tokens": c,
            "total_tokens": p + c,
        }),
        _ => json!({}),
    };

    Ok(Json(json!({
        "id": format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
        "object": "chat.completion",
        "created": chrono::Utc::now().timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": completion.content },
            "finish_reason": "stop",
        }],
        "usage": usage,
    })))
}

async fn list_models<B: CompletionBackend>(
    State(state): State<Arc<ProxyState<B>>>,
) -> Json<serde_json::Value> {
    Json(json!({
        "object": "list",
        "data": [{
            "id": state.config.default_model,
            "object": "model",
            "owned_by": state.config.provider,
        }],
    }))
}

async fn not_found() -> ProxyError {
    ProxyError::NotFound
}

// ── Server lifecycle ─────────────────────────────────────────────────────

/// Handle to a running shim.
pub struct ProxyHandle {
    pub local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ProxyHandle {
    /// Base URL clients should use, e.g. `http://127.0.0.1:4000`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Chat-completions endpoint of this server.
    pub fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url())
    }

    /// Stop accepting connections and wait up to 5 s for in-flight requests.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if tokio::time::timeout(Duration::from_secs(5), &mut self.task)
            .await
            .is_err()
        {
            warn!("Proxy did not stop within 5s; aborting");
            self.task.abort();
        }
    }

    /// Resolve when the server task ends.
    pub async fn wait(self) {
        let _ = self.task.await;
    }
}

/// Start the shim on `config.bind`.
pub struct ProxyServer;

impl ProxyServer {
    pub async fn start<B: CompletionBackend>(
        config: ProxyConfig,
        backend: B,
    ) -> Result<ProxyHandle, Pdf2MdError> {
        let listener = tokio::net::TcpListener::bind(config.bind)
            .await
            .map_err(|e| Pdf2MdError::ProxyBindFailed {
                addr: config.bind.to_string(),
                source: e,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Pdf2MdError::ProxyBindFailed {
                addr: config.bind.to_string(),
                source: e,
            })?;

        let provider = config.provider.clone();
        let app = proxy_router(Arc::new(ProxyState { backend, config }));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
                debug!("Proxy received shutdown signal");
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("Proxy server error: {e}");
            }
            info!("Proxy stopped");
        });

        info!(
            "Proxy listening on http://{} (upstream: {})",
            local_addr, provider
        );
        Ok(ProxyHandle {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    /// Upstream that echoes the last user text and counts images.
    struct EchoBackend;

    impl CompletionBackend for EchoBackend {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProxyError> {
            let last = request
                .messages
                .last()
                .ok_or_else(|| ProxyError::BadRequest("no messages".into()))?;
            Ok(Completion {
                content: format!(
                    "{} | model={} images={} max_tokens={}",
                    last.content.text(),
                    request.model,
                    last.content.image_urls().len(),
                    request.max_tokens
                ),
                prompt_tokens: None,
                completion_tokens: None,
            })
        }
    }

    struct FailingBackend;

    impl CompletionBackend for FailingBackend {
        async fn complete(&self, _request: CompletionRequest) -> Result<Completion, ProxyError> {
            Err(ProxyError::Upstream("quota exceeded".into()))
        }
    }

    fn app<B: CompletionBackend>(backend: B) -> Router {
        proxy_router(Arc::new(ProxyState {
            backend,
            config: ProxyConfig::default(),
        }))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn completion_uses_defaults_and_openai_shape() {
        let body = r#"{"messages":[{"role":"user","content":[
            {"type":"text","text":"OCR the full page to markdown."},
            {"type":"image_url","image_url":{"url":"data:image/png;base64,AAAA"}}
        ]}]}"#;
        let response = app(EchoBackend)
            .oneshot(post_json("/v1/chat/completions", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["object"], "chat.completion");
        assert_eq!(json["model"], DEFAULT_PROXY_MODEL);
        assert_eq!(json["choices"][0]["finish_reason"], "stop");
        assert_eq!(json["choices"][0]["message"]["role"], "assistant");
        assert_eq!(
            json["choices"][0]["message"]["content"],
            format!(
                "OCR the full page to markdown. | model={} images=1 max_tokens=8192",
                DEFAULT_PROXY_MODEL
            )
        );
        assert_eq!(json["usage"], json!({}));
        assert!(json["id"].as_str().unwrap().starts_with("chatcmpl-"));
    }

    #[tokio::test]
    async fn explicit_model_and_string_content() {
        let body = r#"{"model":"gemini-2.0-flash","max_tokens":16,
            "messages":[{"role":"user","content":"hello"}]}"#;
        let json = json_body(
            app(EchoBackend)
                .oneshot(post_json("/v1/chat/completions", body))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(json["model"], "gemini-2.0-flash");
        assert_eq!(
            json["choices"][0]["message"]["content"],
            "hello | model=gemini-2.0-flash images=0 max_tokens=16"
        );
    }

    #[tokio::test]
    async fn malformed_json_is_500_with_error_body() {
        let response = app(EchoBackend)
            .oneshot(post_json("/v1/chat/completions", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert!(json["error"].as_str().unwrap().contains("Invalid request"));
    }

    #[tokio::test]
    async fn upstream_failure_is_500() {
        let body = r#"{"messages":[{"role":"user","content":"hi"}]}"#;
        let response = app(FailingBackend)
            .oneshot(post_json("/v1/chat/completions", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"], "quota exceeded");
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let response = app(EchoBackend)
            .oneshot(post_json("/v1/embeddings", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn models_lists_default_model() {
        let request = Request::builder()
            .uri("/v1/models")
            .body(Body::empty())
            .unwrap();
        let json = json_body(app(EchoBackend).oneshot(request).await.unwrap()).await;
        assert_eq!(json["data"][0]["id"], DEFAULT_PROXY_MODEL);
    }

    #[test]
    fn data_url_decoding() {
        let img = decode_data_url("data:image/jpeg;base64,/9j/4AAQ").unwrap();
        assert_eq!(img.mime_type, "image/jpeg");
        assert_eq!(img.data, "/9j/4AAQ");
        assert!(decode_data_url("https://example.org/a.png").is_err());
        assert!(decode_data_url("data:image/png,raw").is_err());
    }

    #[test]
    fn message_conversion_rejects_unknown_roles() {
        let msgs = vec![WireMessage {
            role: "tool".into(),
            content: MessageContent::Text("x".into()),
        }];
        assert!(to_chat_messages(&msgs).is_err());
        assert!(to_chat_messages(&[]).is_err());
    }

    #[tokio::test]
    async fn server_starts_on_ephemeral_port_and_stops() {
        let config = ProxyConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let handle = ProxyServer::start(config, EchoBackend).await.unwrap();
        assert_ne!(handle.local_addr.port(), 0);
        assert!(handle.completions_url().ends_with("/v1/chat/completions"));

        let models: serde_json::Value = reqwest::get(format!("{}/v1/models", handle.base_url()))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(models["object"], "list");

        handle.stop().await;
    }
}
