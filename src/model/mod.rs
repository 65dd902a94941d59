pub mod options;
pub mod prompt;
pub mod stream;

use std::time::Duration;

use futures::future;
use futures::stream::{Stream, StreamExt, TryStreamExt};
use log::{debug, info};
use reqwest::{Client, Response};
use serde_json::Value;

use crate::config::Config;
use crate::error::{truncate_body, ProxyError, MAX_ERROR_BODY_CHARS};
use prompt::BackendRequest;
use stream::StreamEvent;

// Enough bytes to hold MAX_ERROR_BODY_CHARS characters of any UTF-8 width.
const MAX_ERROR_BODY_BYTES: usize = MAX_ERROR_BODY_CHARS * 4;

/// Client for Ollama's chat and model-listing endpoints.
#[derive(Clone)]
pub struct OllamaClient {
    config: Config,
    client: Client,
}

impl OllamaClient {
    pub fn new(config: Config) -> Result<Self, ProxyError> {
        info!("Using Ollama server at: {}", config.ollama_base_url);

        // The timeout covers connecting and reading the whole body, streamed chunks included.
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ProxyError::from_transport)?;

        Ok(Self { config, client })
    }

    async fn send(&self, request: &BackendRequest) -> Result<Response, ProxyError> {
        debug!("Payload: {}", serde_json::to_string(request).unwrap_or_default());

        let response = self
            .client
            .post(self.config.chat_url())
            .json(request)
            .send()
            .await
            .map_err(ProxyError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            return Err(ProxyError::upstream(status.as_u16(), &body));
        }
        Ok(response)
    }

    /// Unary chat: wait for the full completion and return its text.
    pub async fn chat(&self, request: &BackendRequest) -> Result<String, ProxyError> {
        info!(
            "Sending chat request to Ollama ({} messages, num_predict: {}, num_ctx: {})",
            request.messages.len(),
            request.options.num_predict,
            request.options.num_ctx
        );

        let response = self.send(request).await?;
        let body = response.text().await.map_err(ProxyError::from_transport)?;
        let content = extract_reply(&body)?;

        info!("Response length: {} characters", content.len());
        Ok(content)
    }

    /// Streaming chat. Never fails up front: every failure, including one while
    /// opening the call, arrives as the final [`StreamEvent::Error`].
    pub fn chat_stream(&self, request: BackendRequest) -> impl Stream<Item = StreamEvent> {
        info!(
            "Opening chat stream to Ollama ({} messages, num_predict: {}, num_ctx: {})",
            request.messages.len(),
            request.options.num_predict,
            request.options.num_ctx
        );

        let client = self.clone();
        let opened = async move { client.send(&request).await };

        futures::stream::once(opened).flat_map(|opened| match opened {
            Ok(response) => {
                let body = response.bytes_stream().map_err(ProxyError::from_transport);
                stream::translate(body).left_stream()
            }
            Err(e) => futures::stream::once(future::ready(StreamEvent::Error(e.to_string())))
                .right_stream(),
        })
    }

    /// Fetch `/api/tags` verbatim.
    pub async fn list_models(&self, timeout: Duration) -> Result<Value, ProxyError> {
        let response = self
            .client
            .get(self.config.tags_url())
            .timeout(timeout)
            .send()
            .await
            .map_err(ProxyError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            return Err(ProxyError::upstream(status.as_u16(), &body));
        }

        let body = response.text().await.map_err(ProxyError::from_transport)?;
        serde_json::from_str(&body).map_err(|e| ProxyError::MalformedUpstreamResponse {
            reason: format!("model list is not JSON: {e}"),
        })
    }
}

/// Pull `message.content` out of a unary `/api/chat` response.
pub fn extract_reply(body: &str) -> Result<String, ProxyError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| ProxyError::MalformedUpstreamResponse {
            reason: format!("response is not JSON: {e}"),
        })?;

    value
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(str::to_string)
        .ok_or_else(|| ProxyError::MalformedUpstreamResponse {
            reason: "missing message.content".to_string(),
        })
}

// Reads at most MAX_ERROR_BODY_BYTES; a read failure keeps whatever arrived.
async fn read_error_body(response: Response) -> String {
    let mut body = Vec::new();
    let mut chunks = response.bytes_stream();
    while body.len() < MAX_ERROR_BODY_BYTES {
        match chunks.next().await {
            Some(Ok(chunk)) => body.extend_from_slice(&chunk),
            Some(Err(e)) => {
                debug!("Failed to read Ollama error body: {}", e);
                break;
            }
            None => break,
        }
    }
    truncate_body(&String::from_utf8_lossy(&body))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::web::models::ChatRequest;
    use actix_web::{dev::ServerHandle, web, App, HttpResponse, HttpServer};
    use serde_json::json;

    /// A stand-in Ollama on an ephemeral port. `/api/chat` dispatches on the
    /// user message so one server can play every scenario.
    pub(crate) struct FakeOllama {
        pub base_url: String,
        handle: ServerHandle,
    }

    impl FakeOllama {
        pub(crate) async fn start() -> Self {
            let server = HttpServer::new(|| {
                App::new()
                    .route("/api/chat", web::post().to(fake_chat))
                    .route("/api/tags", web::get().to(fake_tags))
            })
            .workers(1)
            .bind(("127.0.0.1", 0))
            .unwrap();
            let addr = server.addrs()[0];
            let server = server.run();
            let handle = server.handle();
            actix_web::rt::spawn(server);
            Self {
                base_url: format!("http://{addr}"),
                handle,
            }
        }

        pub(crate) fn config(&self) -> Config {
            Config {
                ollama_base_url: self.base_url.clone(),
                request_timeout: Duration::from_millis(500),
                ..Config::default()
            }
        }

        pub(crate) async fn stop(self) {
            self.handle.stop(false).await;
        }
    }

    async fn fake_chat(body: web::Json<Value>) -> HttpResponse {
        let stream = body["stream"].as_bool().unwrap_or(false);
        let prompt = body["messages"]
            .as_array()
            .and_then(|m| m.last())
            .and_then(|m| m["content"].as_str())
            .unwrap_or_default()
            .to_string();

        match prompt.as_str() {
            "not loaded" => HttpResponse::InternalServerError().body("model not loaded"),
            "huge error" => HttpResponse::BadRequest().body("x".repeat(5000)),
            "slow" => {
                actix_web::rt::time::sleep(Duration::from_secs(2)).await;
                HttpResponse::Ok().json(json!({"message": {"content": "too late"}, "done": true}))
            }
            "echo options" => HttpResponse::Ok().json(json!({
                "message": {"role": "assistant", "content": body["options"].to_string()},
                "done": true
            })),
            "no content" => HttpResponse::Ok().json(json!({"message": {"role": "assistant"}, "done": true})),
            "stall" if stream => {
                let chunks = futures::stream::iter(vec![Ok::<_, actix_web::Error>(
                    web::Bytes::from_static(b"{\"message\":{\"content\":\"Hi\"}}\n"),
                )])
                .chain(futures::stream::pending());
                HttpResponse::Ok().content_type("application/x-ndjson").streaming(chunks)
            }
            _ if stream => HttpResponse::Ok().content_type("application/x-ndjson").body(concat!(
                "{\"message\":{\"content\":\"Hi\"},\"done\":false}\n",
                "this line is noise\n",
                "{\"message\":{\"content\":\" there\"},\"done\":false}\n",
                "{\"message\":{\"content\":\"\"},\"done\":true}\n",
            )),
            _ => HttpResponse::Ok().json(json!({
                "model": "mistral:7b-instruct-q4_0",
                "message": {"role": "assistant", "content": format!("echo: {prompt}")},
                "done": true
            })),
        }
    }

    async fn fake_tags() -> HttpResponse {
        HttpResponse::Ok().json(json!({"models": [{"name": "mistral:7b-instruct-q4_0"}]}))
    }

    fn request(config: &Config, message: &str, stream: bool) -> BackendRequest {
        let turn: ChatRequest = serde_json::from_value(json!({
            "character_name": "Mallu",
            "character_policy": "You are Mallu.",
            "message": message
        }))
        .unwrap();
        BackendRequest::from_turn(&turn, config, stream)
    }

    #[test]
    fn extract_reply_requires_message_content() {
        assert_eq!(
            extract_reply(r#"{"message":{"content":"hello"}}"#).unwrap(),
            "hello"
        );
        assert!(matches!(
            extract_reply(r#"{"message":{"role":"assistant"}}"#),
            Err(ProxyError::MalformedUpstreamResponse { .. })
        ));
        assert!(matches!(
            extract_reply("<html>"),
            Err(ProxyError::MalformedUpstreamResponse { .. })
        ));
    }

    #[actix_web::test]
    async fn unary_chat_returns_text() {
        let ollama = FakeOllama::start().await;
        let config = ollama.config();
        let client = OllamaClient::new(config.clone()).unwrap();
        let reply = client.chat(&request(&config, "hello", false)).await.unwrap();
        assert_eq!(reply, "echo: hello");
        ollama.stop().await;
    }

    #[actix_web::test]
    async fn unary_chat_surfaces_upstream_failures() {
        let ollama = FakeOllama::start().await;
        let config = ollama.config();
        let client = OllamaClient::new(config.clone()).unwrap();

        match client.chat(&request(&config, "not loaded", false)).await {
            Err(ProxyError::UpstreamError { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "model not loaded");
            }
            other => panic!("unexpected: {other:?}"),
        }

        match client.chat(&request(&config, "huge error", false)).await {
            Err(ProxyError::UpstreamError { body, .. }) => assert_eq!(body.len(), 500),
            other => panic!("unexpected: {other:?}"),
        }

        assert!(matches!(
            client.chat(&request(&config, "no content", false)).await,
            Err(ProxyError::MalformedUpstreamResponse { .. })
        ));
        assert!(matches!(
            client.chat(&request(&config, "slow", false)).await,
            Err(ProxyError::UpstreamTimeout)
        ));
        ollama.stop().await;
    }

    #[actix_web::test]
    async fn unreachable_backend_is_unavailable() {
        let config = Config {
            // Port 9 (discard) is closed on test hosts.
            ollama_base_url: "http://127.0.0.1:9".to_string(),
            ..Config::default()
        };
        let client = OllamaClient::new(config.clone()).unwrap();
        assert!(matches!(
            client.chat(&request(&config, "hello", false)).await,
            Err(ProxyError::UpstreamUnavailable { .. })
        ));

        let events: Vec<_> = client.chat_stream(request(&config, "hello", true)).collect().await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Error(message) => assert!(message.starts_with("Failed to connect to Ollama")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[actix_web::test]
    async fn streaming_chat_relays_fragments() {
        let ollama = FakeOllama::start().await;
        let config = ollama.config();
        let client = OllamaClient::new(config.clone()).unwrap();
        let events: Vec<_> = client.chat_stream(request(&config, "hello", true)).collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Content("Hi".into()),
                StreamEvent::Content(" there".into()),
                StreamEvent::Done
            ]
        );
        ollama.stop().await;
    }

    #[actix_web::test]
    async fn streaming_open_failure_is_single_error() {
        let ollama = FakeOllama::start().await;
        let config = ollama.config();
        let client = OllamaClient::new(config.clone()).unwrap();
        let events: Vec<_> = client
            .chat_stream(request(&config, "not loaded", true))
            .collect()
            .await;
        assert_eq!(
            events,
            vec![StreamEvent::Error("Ollama request failed: model not loaded".into())]
        );
        ollama.stop().await;
    }

    #[actix_web::test]
    async fn stalled_stream_times_out_with_error() {
        let ollama = FakeOllama::start().await;
        let config = ollama.config();
        let client = OllamaClient::new(config.clone()).unwrap();
        let events: Vec<_> = client.chat_stream(request(&config, "stall", true)).collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Content("Hi".into()),
                StreamEvent::Error("Request to Ollama timed out".into())
            ]
        );
        ollama.stop().await;
    }

    #[actix_web::test]
    async fn list_models_passes_through() {
        let ollama = FakeOllama::start().await;
        let config = ollama.config();
        let client = OllamaClient::new(config.clone()).unwrap();
        let models = client.list_models(Duration::from_secs(1)).await.unwrap();
        assert_eq!(models["models"][0]["name"], "mistral:7b-instruct-q4_0");
        ollama.stop().await;
    }
}
