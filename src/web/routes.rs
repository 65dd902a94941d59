use actix_web::web;
use crate::web::handlers;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::index))
        .route("/health", web::get().to(handlers::health_check))
        .route("/models", web::get().to(handlers::list_models))
        .route("/chat", web::post().to(handlers::chat))
        .route("/chat/stream", web::post().to(handlers::chat_stream));
}
