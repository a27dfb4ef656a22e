use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Placeholder secret so a bare `klaxon serve` works on a dev machine.
/// Production deployments must set `jwt_secret` or `KLAXON_JWT_SECRET`.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-in-production";

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_jwt_secret() -> String {
    std::env::var("KLAXON_JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.to_string())
}

fn default_token_ttl_minutes() -> i64 {
    60
}

fn default_send_queue_depth() -> usize {
    64
}

/// Configuration for the server, loadable from TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// HS256 secret for minting and verifying session credentials.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: i64,
    /// Per-session outbound queue bound; overflow disconnects the session.
    #[serde(default = "default_send_queue_depth")]
    pub send_queue_depth: usize,
}

/// CLI overrides that can be applied on top of a config file.
#[derive(Debug, Default)]
pub struct ServerConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Default config file search paths.
    const SEARCH_PATHS: &'static [&'static str] = &["./klaxon.toml", "/etc/klaxon/server.toml"];

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("klaxon.db")
    }

    /// Load config from a specific file path.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search for config file in default locations and load if found.
    pub fn load_from_search_paths() -> Option<Self> {
        for path_str in Self::SEARCH_PATHS {
            let path = Path::new(path_str);
            if path.exists() {
                if let Ok(config) = Self::load(path) {
                    return Some(config);
                }
            }
        }
        None
    }

    /// Load config with CLI overrides.
    ///
    /// Priority: CLI args > config file > defaults
    pub fn load_with_overrides(
        config_path: Option<&Path>,
        overrides: ServerConfigOverrides,
    ) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = config_path {
            Self::load(path)?
        } else {
            Self::load_from_search_paths().unwrap_or_default()
        };

        if let Some(host) = overrides.host {
            config.host = host;
        }
        if let Some(port) = overrides.port {
            config.port = port;
        }
        if let Some(data_dir) = overrides.data_dir {
            config.data_dir = data_dir;
        }

        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            jwt_secret: default_jwt_secret(),
            token_ttl_minutes: default_token_ttl_minutes(),
            send_queue_depth: default_send_queue_depth(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.send_queue_depth, 64);
        assert_eq!(config.token_ttl_minutes, 60);
        assert_eq!(config.db_path(), PathBuf::from("./data/klaxon.db"));
    }

    #[test]
    fn test_partial_toml() {
        let config: ServerConfig = toml::from_str("port = 9000\n").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.send_queue_depth, 64);
    }

    #[test]
    fn test_overrides_beat_defaults() {
        let config = ServerConfig::load_with_overrides(
            None,
            ServerConfigOverrides {
                port: Some(9999),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(config.port, 9999);
    }
}
