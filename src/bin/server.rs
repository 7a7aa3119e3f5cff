use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use matchroom::auth::TokenManager;
use matchroom::config::ServerConfig;
use matchroom::handlers::routes;
use matchroom::server;
use matchroom::storage::MemoryStore;

#[tokio::main]
async fn main() {
    // Initialize env
    let dotenv_result = dotenvy::dotenv();

    // Initialize logging
    env_logger::init();

    match dotenv_result {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration: host={}, port={}", config.host, config.port);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    let store = Arc::new(MemoryStore::new());
    let authenticator = Arc::new(TokenManager::new(&config.jwt_secret));
    let services = server::start(&config, store, authenticator);
    let app = routes(services.state.clone());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
    };

    if config.enable_tls {
        let (Some(cert_path), Some(key_path)) = (&config.tls_cert_path, &config.tls_key_path) else {
            error!("TLS is enabled but certificate paths are missing");
            std::process::exit(1);
        };

        let (bound, server) = warp::serve(app)
            .tls()
            .cert_path(cert_path)
            .key_path(key_path)
            .bind_with_graceful_shutdown(addr, shutdown);
        info!("Starting Matchroom server on wss://{}", bound);
        server.await;
    } else {
        match warp::serve(app).try_bind_with_graceful_shutdown(addr, shutdown) {
            Ok((bound, server)) => {
                info!("Starting Matchroom server on ws://{}", bound);
                server.await;
            }
            Err(e) => {
                error!("Failed to bind {}: {}", addr, e);
                std::process::exit(1);
            }
        }
    }

    if let Some(poller) = services.poller_task {
        poller.abort();
    }
    info!(
        "Server stopped with {} active connections",
        services.metrics.active_connections()
    );
}
