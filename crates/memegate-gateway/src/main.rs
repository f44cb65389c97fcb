use actix_web::{middleware::Logger, web, App, HttpServer};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memegate::SqliteLedger;
use memegate_gateway::{
    config::GatewayConfig, metrics::register_metrics, routes, state::AppState, HttpMemeSource,
};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    let port = config.port;
    let allowed_origins = config.allowed_origins.clone();

    tracing::info!("Starting memegate-gateway on port {}", port);
    tracing::info!("Initial grant: {} credits per token", config.initial_grant);
    tracing::info!(
        "Top-up auth: {}",
        if config.admin_token.is_some() {
            "enabled"
        } else {
            "disabled (trusted network only)"
        }
    );

    // Initialize ledger
    let ledger = match SqliteLedger::open(&config.db_path) {
        Ok(ledger) => ledger,
        Err(e) => {
            tracing::error!("Failed to open ledger at {}: {}", config.db_path, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Ledger initialized at: {}", config.db_path);

    let memes = match HttpMemeSource::from_config(&config) {
        Ok(source) => source,
        Err(e) => {
            tracing::error!("Failed to build upstream HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    // Register Prometheus metrics
    register_metrics();

    // Create shared state
    let state = AppState::new(config, Arc::new(ledger), Arc::new(memes));
    let state_data = web::Data::new(state);

    // Start HTTP server
    HttpServer::new(move || {
        let cors = memegate_gateway::cors::build_cors(&allowed_origins);

        App::new()
            .app_data(state_data.clone())
            .wrap(Logger::default())
            .wrap(cors)
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
