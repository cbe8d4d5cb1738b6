//! Listener configuration

use serde::Deserialize;

/// Where the authentication service listens
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AuthConfig {
    pub host: String,
    pub port: u16,
}

impl AuthConfig {
    /// Load listener settings, defaults overridden by the environment
    ///
    /// # Environment Variables
    /// - `AUTH_HOST`: bind address (default: 0.0.0.0)
    /// - `AUTH_PORT`: bind port (default: 3000)
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 3000)?
            .add_source(config::Environment::with_prefix("AUTH").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_environment_overrides_defaults() {
        unsafe {
            env::remove_var("AUTH_PORT");
            env::set_var("AUTH_HOST", "127.0.0.1");
        }

        let config = AuthConfig::load().unwrap();
        assert_eq!(config.address(), "127.0.0.1:3000");

        unsafe {
            env::remove_var("AUTH_HOST");
        }
    }
}
