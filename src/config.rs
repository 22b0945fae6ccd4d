//! Configuration module for the canvas relay.

use serde::Deserialize;
use std::path::Path;

use crate::relay::{EchoPolicy, OverflowPolicy};
use crate::{RelayError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum number of concurrent WebSocket sessions.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_connections() -> usize {
    1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
        }
    }
}

/// Relay (broker) configuration: endpoint and destination names, fan-out policy.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Path of the WebSocket upgrade endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Prefix of destinations handled by application handlers.
    #[serde(default = "default_app_prefix")]
    pub app_prefix: String,
    /// Prefix of broker (topic) destinations.
    #[serde(default = "default_broker_prefix")]
    pub broker_prefix: String,
    /// Draw destination, relative to `app_prefix`.
    #[serde(default = "default_draw_destination")]
    pub draw_destination: String,
    /// Topic that draw events are broadcast to.
    #[serde(default = "default_board_topic")]
    pub board_topic: String,
    /// Capacity of each subscriber's outbound queue.
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// Whether the sender receives its own events.
    #[serde(default)]
    pub echo: EchoPolicy,
    /// What happens to a subscriber whose queue is full.
    #[serde(default)]
    pub overflow: OverflowPolicy,
    /// Largest accepted inbound STOMP frame, in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

fn default_endpoint() -> String {
    "/canvaWs".to_string()
}

fn default_app_prefix() -> String {
    "/app".to_string()
}

fn default_broker_prefix() -> String {
    "/topic".to_string()
}

fn default_draw_destination() -> String {
    "/draw".to_string()
}

fn default_board_topic() -> String {
    "/topic/board".to_string()
}

fn default_outbound_queue_capacity() -> usize {
    256
}

fn default_max_frame_bytes() -> usize {
    64 * 1024
}

impl RelayConfig {
    /// Full publish destination for draw events (e.g. `/app/draw`).
    pub fn publish_destination(&self) -> String {
        format!("{}{}", self.app_prefix, self.draw_destination)
    }

    /// Whether a destination is served by the broker.
    pub fn is_broker_destination(&self, destination: &str) -> bool {
        has_path_prefix(destination, &self.broker_prefix)
    }

    /// Whether a destination is served by an application handler.
    pub fn is_app_destination(&self, destination: &str) -> bool {
        has_path_prefix(destination, &self.app_prefix)
    }
}

/// `/topic/board` has prefix `/topic`; `/topics` does not.
fn has_path_prefix(destination: &str, prefix: &str) -> bool {
    destination
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1)
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            app_prefix: default_app_prefix(),
            broker_prefix: default_broker_prefix(),
            draw_destination: default_draw_destination(),
            board_topic: default_board_topic(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            echo: EchoPolicy::default(),
            overflow: OverflowPolicy::default(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

/// HTTP layer configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebConfig {
    /// CORS allowed origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file. Empty logs to the console only.
    #[serde(default)]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: String::new(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Relay configuration.
    #[serde(default)]
    pub relay: RelayConfig,
    /// HTTP layer configuration.
    #[serde(default)]
    pub web: WebConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(RelayError::Io)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RelayError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `CANVAS_RELAY_HOST`: bind host
    /// - `CANVAS_RELAY_PORT`: bind port (ignored unless it parses)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("CANVAS_RELAY_HOST") {
            if !host.is_empty() {
                self.server.host = host;
            }
        }
        if let Some(port) = std::env::var("CANVAS_RELAY_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.server.port = port;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let relay = &self.relay;
        for (name, value) in [
            ("endpoint", &relay.endpoint),
            ("app_prefix", &relay.app_prefix),
            ("broker_prefix", &relay.broker_prefix),
            ("draw_destination", &relay.draw_destination),
        ] {
            if !value.starts_with('/') {
                return Err(RelayError::Config(format!(
                    "relay.{name} must start with '/', got {value:?}"
                )));
            }
        }
        if relay.app_prefix == relay.broker_prefix {
            return Err(RelayError::Config(
                "relay.app_prefix and relay.broker_prefix must differ".to_string(),
            ));
        }
        if !relay.is_broker_destination(&relay.board_topic) {
            return Err(RelayError::Config(format!(
                "relay.board_topic {:?} is not under broker prefix {:?}",
                relay.board_topic, relay.broker_prefix
            )));
        }
        if relay.outbound_queue_capacity == 0 {
            return Err(RelayError::Config(
                "relay.outbound_queue_capacity must be greater than 0".to_string(),
            ));
        }
        if relay.max_frame_bytes == 0 {
            return Err(RelayError::Config(
                "relay.max_frame_bytes must be greater than 0".to_string(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(RelayError::Config(
                "server.max_connections must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Socket address string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_connections, 1024);

        assert_eq!(config.relay.endpoint, "/canvaWs");
        assert_eq!(config.relay.app_prefix, "/app");
        assert_eq!(config.relay.broker_prefix, "/topic");
        assert_eq!(config.relay.draw_destination, "/draw");
        assert_eq!(config.relay.board_topic, "/topic/board");
        assert_eq!(config.relay.outbound_queue_capacity, 256);
        assert_eq!(config.relay.echo, EchoPolicy::Include);
        assert_eq!(config.relay.overflow, OverflowPolicy::Drop);
        assert_eq!(config.relay.max_frame_bytes, 65536);
        assert_eq!(config.relay.publish_destination(), "/app/draw");

        assert!(config.web.cors_origins.is_empty());

        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_empty());

        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000
max_connections = 16

[relay]
endpoint = "/ws"
app_prefix = "/app"
broker_prefix = "/topic"
draw_destination = "/stroke"
board_topic = "/topic/canvas"
outbound_queue_capacity = 8
echo = "exclude"
overflow = "disconnect"
max_frame_bytes = 1024

[web]
cors_origins = ["http://localhost:3000"]

[logging]
level = "debug"
file = "logs/relay.log"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.max_connections, 16);

        assert_eq!(config.relay.endpoint, "/ws");
        assert_eq!(config.relay.publish_destination(), "/app/stroke");
        assert_eq!(config.relay.board_topic, "/topic/canvas");
        assert_eq!(config.relay.outbound_queue_capacity, 8);
        assert_eq!(config.relay.echo, EchoPolicy::Exclude);
        assert_eq!(config.relay.overflow, OverflowPolicy::Disconnect);
        assert_eq!(config.relay.max_frame_bytes, 1024);

        assert_eq!(config.web.cors_origins, vec!["http://localhost:3000"]);

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, "logs/relay.log");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[server]
port = 3000

[relay]
echo = "exclude"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.relay.echo, EchoPolicy::Exclude);

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.relay.board_topic, "/topic/board");
        assert_eq!(config.relay.overflow, OverflowPolicy::Drop);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.relay.endpoint, "/canvaWs");
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("this is not valid toml [[[");
        match result {
            Err(RelayError::Config(msg)) => assert!(msg.contains("config parse error")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_policy() {
        let result = Config::parse("[relay]\noverflow = \"block\"\n");
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");
        assert!(matches!(result, Err(RelayError::Io(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 4242\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.port, 4242);
    }

    #[test]
    fn test_apply_env_overrides() {
        let original_host = std::env::var("CANVAS_RELAY_HOST").ok();
        let original_port = std::env::var("CANVAS_RELAY_PORT").ok();

        std::env::set_var("CANVAS_RELAY_HOST", "127.0.0.1");
        std::env::set_var("CANVAS_RELAY_PORT", "not-a-port");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.server.host, "127.0.0.1");
        // Unparseable port leaves the configured value alone
        assert_eq!(config.server.port, 8080);

        std::env::set_var("CANVAS_RELAY_PORT", "9999");
        config.apply_env_overrides();
        assert_eq!(config.server.port, 9999);

        match original_host {
            Some(val) => std::env::set_var("CANVAS_RELAY_HOST", val),
            None => std::env::remove_var("CANVAS_RELAY_HOST"),
        }
        match original_port {
            Some(val) => std::env::set_var("CANVAS_RELAY_PORT", val),
            None => std::env::remove_var("CANVAS_RELAY_PORT"),
        }
    }

    #[test]
    fn test_validate_board_topic_outside_broker() {
        let mut config = Config::default();
        config.relay.board_topic = "/queue/board".to_string();

        match config.validate() {
            Err(RelayError::Config(msg)) => assert!(msg.contains("board_topic")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_zero_capacity() {
        let mut config = Config::default();
        config.relay.outbound_queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_relative_endpoint() {
        let mut config = Config::default();
        config.relay.endpoint = "canvaWs".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_same_prefixes() {
        let mut config = Config::default();
        config.relay.app_prefix = "/topic".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_destination_prefixes() {
        let relay = RelayConfig::default();

        assert!(relay.is_broker_destination("/topic/board"));
        assert!(relay.is_broker_destination("/topic/board/sub"));
        assert!(!relay.is_broker_destination("/topic"));
        assert!(!relay.is_broker_destination("/topic/"));
        assert!(!relay.is_broker_destination("/topics/board"));
        assert!(!relay.is_broker_destination("/app/draw"));

        assert!(relay.is_app_destination("/app/draw"));
        assert!(!relay.is_app_destination("/application/draw"));
    }
}
