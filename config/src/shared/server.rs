use serde::{Deserialize, Serialize};

const fn default_port() -> u16 {
    ServerConfig::DEFAULT_PORT
}

fn default_host() -> String {
    ServerConfig::DEFAULT_HOST.to_owned()
}

/// Address the HTTP event receiver binds to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    pub const DEFAULT_HOST: &'static str = "0.0.0.0";

    /// Port Cloud Run and Cloud Functions route traffic to by default.
    pub const DEFAULT_PORT: u16 = 8080;

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
