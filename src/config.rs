use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::client::{ClientSettings, DEFAULT_API_PATH, DEFAULT_HOSTNAME, DEFAULT_PROTOCOL};
use crate::error::CbioError;

pub const CONFIG_FILE: &str = "kira-cbioportal.json";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub api_path: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub descriptor_checksum: Option<String>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub transport_cache: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub client: ClientSettings,
    pub cache_dir: Option<Utf8PathBuf>,
    pub timeout: Duration,
    pub transport_cache: bool,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `kira-cbioportal.json` in the current directory when
    /// present. Without either, defaults point at the public portal.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CbioError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CbioError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CbioError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CbioError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let protocol = config
            .protocol
            .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string());
        if protocol != "http" && protocol != "https" {
            return Err(CbioError::ConfigParse(format!(
                "unsupported protocol: {protocol}"
            )));
        }

        let client = ClientSettings {
            hostname: config
                .hostname
                .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string()),
            protocol,
            api_path: config
                .api_path
                .unwrap_or_else(|| DEFAULT_API_PATH.to_string()),
            token: config.token.filter(|token| !token.trim().is_empty()),
            descriptor_checksum: config
                .descriptor_checksum
                .filter(|checksum| !checksum.trim().is_empty()),
        };

        Ok(ResolvedConfig {
            schema_version,
            client,
            cache_dir: config.cache_dir.map(Utf8PathBuf::from),
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            transport_cache: config.transport_cache.unwrap_or(true),
        })
    }
}
