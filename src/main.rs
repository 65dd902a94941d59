mod config;
mod error;
mod model;
mod web;

use actix_web::{middleware::Logger, web::Data, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};

use config::Config;
use model::OllamaClient;
use web::routes;

// App state structure
struct AppState {
    config: Config,
    ollama: OllamaClient,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting ChatMallu character chat API");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let ollama = match OllamaClient::new(config.clone()) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize Ollama client: {}", e);
            std::process::exit(1);
        }
    };
    info!("Serving model {}", config.model_name);

    let bind = (config.host.clone(), config.port);
    let app_state = Data::new(AppState { config, ollama });

    // Start web server
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(app_state.clone())
            .configure(routes::configure)
    })
    .bind(bind)?
    .run()
    .await
}
