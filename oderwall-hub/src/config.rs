//! Hub configuration
//!
//! # Environment variables
//!
//! All settings can be overridden through the environment:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | DATA_DIR | ./data | Where orders.json / history.json live |
//! | HUB_LISTEN_ADDR | 0.0.0.0:8090 | TCP listen address |
//! | HISTORY_LIMIT | 50 | Page size cap for get-history |
//! | CHANNEL_CAPACITY | 1024 | Broadcast channel capacity |
//! | LOG_DIR | (unset) | Daily-rolling log files when set |
//!
//! # Example
//!
//! ```ignore
//! DATA_DIR=/var/lib/oderwall HUB_LISTEN_ADDR=0.0.0.0:9000 cargo run
//! ```

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for the persisted live list and history
    pub data_dir: String,
    /// TCP listen address for client connections
    pub listen_addr: String,
    /// Page size cap for history queries
    pub history_limit: usize,
    /// Broadcast channel capacity
    pub channel_capacity: usize,
    /// Optional directory for rolling log files
    pub log_dir: Option<String>,
}

impl Config {
    /// Load configuration from the environment, with defaults
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()),
            listen_addr: std::env::var("HUB_LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8090".into()),
            history_limit: std::env::var("HISTORY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
            channel_capacity: std::env::var("CHANNEL_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1024),
            log_dir: std::env::var("LOG_DIR").ok(),
        }
    }

    /// Override the paths and address (used by tests)
    pub fn with_overrides(data_dir: impl Into<String>, listen_addr: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.data_dir = data_dir.into();
        config.listen_addr = listen_addr.into();
        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
