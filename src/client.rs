use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::descriptor::{self, Registry};
use crate::error::CbioError;
use crate::transport::Transport;

pub const DEFAULT_HOSTNAME: &str = "www.cbioportal.org";
pub const DEFAULT_PROTOCOL: &str = "https";
pub const DEFAULT_API_PATH: &str = "api/v2/api-docs";

/// Where and how to reach a cBioPortal instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub hostname: String,
    pub protocol: String,
    pub api_path: String,
    /// Literal bearer token, or a path to a file with a `token: <value>` line.
    pub token: Option<String>,
    pub descriptor_checksum: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            protocol: DEFAULT_PROTOCOL.to_string(),
            api_path: DEFAULT_API_PATH.to_string(),
            token: None,
            descriptor_checksum: None,
        }
    }
}

impl ClientSettings {
    pub fn descriptor_url(&self) -> String {
        format!(
            "{}://{}/{}",
            self.protocol,
            self.hostname.trim_end_matches('/'),
            self.api_path.trim_start_matches('/')
        )
    }
}

/// Handle on one cBioPortal API: base URL, operation registry and optional
/// authorization. Immutable after construction.
#[derive(Debug, Clone)]
pub struct ApiClient {
    protocol: String,
    hostname: String,
    base_url: String,
    registry: Arc<Registry>,
    authorization: Option<String>,
}

impl ApiClient {
    /// Resolves the token, then downloads and verifies the descriptor.
    pub fn connect<T: Transport>(transport: &T, settings: &ClientSettings) -> Result<Self, CbioError> {
        validate_protocol(&settings.protocol)?;
        let token = match settings.token.as_deref() {
            Some(token) => resolve_token(token)?,
            None => None,
        };
        let url = settings.descriptor_url();
        let registry = match settings.descriptor_checksum.as_deref() {
            Some(expected) => descriptor::load(transport, &url, expected)?,
            None => descriptor::load_unpinned(transport, &url)?,
        };
        Ok(Self::assemble(
            &settings.protocol,
            &settings.hostname,
            registry,
            token,
        ))
    }

    /// Builds a handle around an already loaded registry.
    pub fn from_registry(
        protocol: &str,
        hostname: &str,
        registry: Registry,
        token: Option<&str>,
    ) -> Result<Self, CbioError> {
        validate_protocol(protocol)?;
        let token = match token {
            Some(token) => resolve_token(token)?,
            None => None,
        };
        Ok(Self::assemble(protocol, hostname, registry, token))
    }

    fn assemble(protocol: &str, hostname: &str, registry: Registry, token: Option<String>) -> Self {
        let hostname = hostname.trim_end_matches('/').to_string();
        let base_url = format!("{protocol}://{hostname}{}", registry.base_path());
        Self {
            protocol: protocol.to_string(),
            hostname,
            base_url,
            registry: Arc::new(registry),
            authorization: token.map(|token| format!("Bearer {token}")),
        }
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Value of the `Authorization` header, when a token was supplied.
    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    /// The fields that decide what a query returns; used in cache keys. The
    /// token itself never leaves the process, only its digest.
    pub fn identity(&self) -> Value {
        let auth = self
            .authorization
            .as_ref()
            .map(|header| hex::encode(Sha256::digest(header.as_bytes())));
        json!({
            "baseUrl": self.base_url,
            "descriptor": self.registry.checksum(),
            "auth": auth,
        })
    }
}

/// Interprets a token argument: an existing file is read for its
/// `token: <value>` line, anything containing a path separator must be such
/// a file, everything else is the token itself.
pub fn resolve_token(token: &str) -> Result<Option<String>, CbioError> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(None);
    }
    let path = Path::new(token);
    if path.is_file() {
        let content = fs::read_to_string(path)
            .map_err(|err| CbioError::Configuration(format!("read token file {token}: {err}")))?;
        return parse_token_file(&content)
            .map(Some)
            .ok_or_else(|| {
                CbioError::Configuration(format!("no 'token:' line in token file {token}"))
            });
    }
    if token.contains('/') || token.contains(std::path::MAIN_SEPARATOR) {
        return Err(CbioError::Configuration(format!(
            "token file not found: {token}"
        )));
    }
    Ok(Some(token.to_string()))
}

fn parse_token_file(content: &str) -> Option<String> {
    content
        .lines()
        .filter_map(|line| line.trim().strip_prefix("token:"))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn validate_protocol(protocol: &str) -> Result<(), CbioError> {
    match protocol {
        "http" | "https" => Ok(()),
        other => Err(CbioError::Configuration(format!(
            "unsupported protocol: {other}"
        ))),
    }
}
