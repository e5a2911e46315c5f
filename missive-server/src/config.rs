use missive_core::Error;
use std::env;

/// Where the HTTP binding listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Path of the envelope endpoint.
    pub route: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            route: "/rpc".to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `MISSIVE_HOST`, `MISSIVE_PORT` and
    /// `MISSIVE_ROUTE` when set.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = ServerConfig::default();
        if let Some(host) = lookup("MISSIVE_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("MISSIVE_PORT") {
            config.port = port
                .parse()
                .map_err(|e| Error::Config(format!("MISSIVE_PORT `{}`: {}", port, e)))?;
        }
        if let Some(route) = lookup("MISSIVE_ROUTE") {
            if !route.starts_with('/') {
                return Err(Error::Config(format!(
                    "MISSIVE_ROUTE `{}` must start with `/`",
                    route
                )));
            }
            config.route = route;
        }
        Ok(config)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
