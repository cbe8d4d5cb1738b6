//! Listener configuration

use serde::Deserialize;

/// Where the API service listens
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl ApiConfig {
    /// Load listener settings, defaults overridden by the environment
    ///
    /// # Environment Variables
    /// - `API_HOST`: bind address (default: 0.0.0.0)
    /// - `API_PORT`: bind port (default: 3001)
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 3001)?
            .add_source(config::Environment::with_prefix("API").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
