use tracing::{error, info};

use canvas_relay::web::WebServer;
use canvas_relay::Config;

#[tokio::main]
async fn main() {
    // Load configuration
    let mut config = match Config::load("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };
    config.apply_env_overrides();

    // Initialize logging
    if let Err(e) = canvas_relay::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        canvas_relay::logging::init_console_only(&config.logging.level);
    }

    info!("canvas-relay {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!(
        endpoint = %config.relay.endpoint,
        board_topic = %config.relay.board_topic,
        echo = ?config.relay.echo,
        overflow = ?config.relay.overflow,
        "Relay configured on {}",
        config.bind_addr()
    );

    let server = match WebServer::new(&config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to create server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
