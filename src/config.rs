use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_TOPIC: &str = "SiwaDonationBroadcast";
pub const DEFAULT_BASE_URL: &str = "https://apis.roblox.com";
pub const DEFAULT_PORT: u16 = 3000;

pub const ENV_API_KEY: &str = "ROBLOX_API_KEY";
pub const ENV_UNIVERSE_ID: &str = "UNIVERSE_ID";
pub const ENV_TOPIC: &str = "MESSAGING_TOPIC";
pub const ENV_BASE_URL: &str = "ROBLOX_API_BASE_URL";
pub const ENV_PORT: &str = "PORT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is required (set the environment variable or [roblox] in the config file)")]
    Missing { key: &'static str },

    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Validated relay configuration. Only constructed through [`Config::load`]
/// or [`Config::from_sources`], so the required values are always present.
#[derive(Debug, Clone)]
pub struct Config {
    pub roblox: RobloxConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct RobloxConfig {
    pub api_key: String,
    pub universe_id: String,
    pub topic: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

// Loose file shape: everything optional so env vars can fill the gaps.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    roblox: FileRoblox,
    #[serde(default)]
    server: FileServer,
}

#[derive(Debug, Deserialize, Default)]
struct FileRoblox {
    api_key: Option<String>,
    universe_id: Option<String>,
    topic: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct FileServer {
    port: Option<u16>,
}

impl RobloxConfig {
    /// First characters of the API key, safe to print in logs.
    pub fn masked_api_key(&self) -> String {
        let prefix: String = self.api_key.chars().take(8).collect();
        format!("{prefix}...")
    }
}

impl Config {
    /// Load from an optional TOML file, then let process environment
    /// variables override it.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|source| {
                ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                }
            })?),
            None => None,
        };
        Self::from_sources(file.as_deref(), |key| std::env::var(key).ok())
    }

    /// Build from raw file contents and an environment lookup. Environment
    /// values win over file values; blank values count as unset.
    pub fn from_sources<F>(file: Option<&str>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file: FileConfig = match file {
            Some(contents) => toml::from_str(contents)?,
            None => FileConfig::default(),
        };

        let non_blank = |v: Option<String>| {
            v.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        };
        let lookup =
            |key: &str, from_file: Option<String>| non_blank(env(key)).or(non_blank(from_file));

        let api_key = lookup(ENV_API_KEY, file.roblox.api_key)
            .ok_or(ConfigError::Missing { key: ENV_API_KEY })?;
        let universe_id = lookup(ENV_UNIVERSE_ID, file.roblox.universe_id)
            .ok_or(ConfigError::Missing { key: ENV_UNIVERSE_ID })?;
        let topic =
            lookup(ENV_TOPIC, file.roblox.topic).unwrap_or_else(|| DEFAULT_TOPIC.to_string());
        let base_url = lookup(ENV_BASE_URL, file.roblox.base_url)
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let port = match non_blank(env(ENV_PORT)) {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                key: ENV_PORT,
                value: raw.clone(),
            })?,
            None => file.server.port.unwrap_or(DEFAULT_PORT),
        };

        Ok(Config {
            roblox: RobloxConfig {
                api_key,
                universe_id,
                topic,
                base_url,
            },
            server: ServerConfig { port },
        })
    }
}
