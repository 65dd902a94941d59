use std::time::Duration;

use actix_web::{web, HttpResponse, Responder};
use futures::StreamExt;
use log::{debug, error, info};
use serde_json::json;
use uuid::Uuid;

use crate::error::ProxyError;
use crate::model::prompt::BackendRequest;
use crate::model::stream::StreamEvent;
use crate::web::models::{ChatRequest, ChatResponse};
use crate::AppState;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const MODELS_TIMEOUT: Duration = Duration::from_secs(10);

// Informational root endpoint
pub async fn index(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "message": "Welcome to ChatMallu - Character Chat API",
        "model": data.config.model_name,
        "endpoints": {
            "/chat": "POST - Chat with character (non-streaming)",
            "/chat/stream": "POST - Chat with character (streaming)",
            "/health": "GET - Check API health",
            "/models": "GET - List available models"
        }
    }))
}

// Health check endpoint, probes Ollama
pub async fn health_check(data: web::Data<AppState>) -> impl Responder {
    match data.ollama.list_models(HEALTH_TIMEOUT).await {
        Ok(_) => HttpResponse::Ok().json(json!({
            "status": "healthy",
            "ollama_status": "connected",
            "model": data.config.model_name
        })),
        Err(e) => {
            error!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(json!({
                "error": format!("Ollama connection failed: {}", e)
            }))
        }
    }
}

// Model listing passthrough
pub async fn list_models(data: web::Data<AppState>) -> Result<HttpResponse, ProxyError> {
    match data.ollama.list_models(MODELS_TIMEOUT).await {
        Ok(models) => Ok(HttpResponse::Ok().json(models)),
        Err(ProxyError::UpstreamError { status, body }) => {
            error!("Ollama refused model listing ({}): {}", status, body);
            let status = actix_web::http::StatusCode::from_u16(status)
                .unwrap_or(actix_web::http::StatusCode::BAD_GATEWAY);
            Ok(HttpResponse::build(status).json(json!({
                "error": "Failed to fetch models from Ollama"
            })))
        }
        Err(e) => Err(e),
    }
}

// Unary chat endpoint
pub async fn chat(
    data: web::Data<AppState>,
    req: web::Json<ChatRequest>,
) -> Result<HttpResponse, ProxyError> {
    let request_id = Uuid::new_v4();
    info!(
        "Chat request {} for character {} ({} history messages)",
        request_id,
        req.character_name,
        req.history().len()
    );
    debug!("Chat request {} message: {}", request_id, req.message);

    let backend_request = BackendRequest::from_turn(&req, &data.config, false);

    match data.ollama.chat(&backend_request).await {
        Ok(response) => {
            info!("Chat request {} completed", request_id);
            Ok(HttpResponse::Ok().json(ChatResponse {
                response,
                character_name: req.into_inner().character_name,
                model: data.config.model_name.clone(),
            }))
        }
        Err(e) => {
            error!("Chat request {} failed: {}", request_id, e);
            Err(e)
        }
    }
}

// Streaming chat endpoint, server-sent events
pub async fn chat_stream(
    data: web::Data<AppState>,
    req: web::Json<ChatRequest>,
) -> HttpResponse {
    let request_id = Uuid::new_v4();
    info!(
        "Streaming chat request {} for character {} ({} history messages)",
        request_id,
        req.character_name,
        req.history().len()
    );
    debug!("Streaming chat request {} message: {}", request_id, req.message);

    let backend_request = BackendRequest::from_turn(&req, &data.config, true);

    // Dropping this stream on client disconnect drops the Ollama connection with it.
    let events = data
        .ollama
        .chat_stream(backend_request)
        .inspect(move |event| {
            if !event.is_terminal() {
                return;
            }
            match event {
                StreamEvent::Error(message) => {
                    error!("Streaming chat request {} failed: {}", request_id, message)
                }
                _ => info!("Streaming chat request {} completed", request_id),
            }
        })
        .map(|event| Ok::<_, actix_web::Error>(web::Bytes::from(event.to_sse_frame())));

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(events)
}
