use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::CbioError;
use crate::transport::{HttpRequest, Method, Transport};

static VERB_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<base>.+?)Using(GET|POST|PUT|DELETE|PATCH)(_\d+)?$").expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub name: String,
    pub method: Method,
    pub path: String,
    pub parameters: Vec<ParamSpec>,
    pub summary: Option<String>,
}

impl OperationDescriptor {
    pub fn body(&self) -> Option<&ParamSpec> {
        self.parameters
            .iter()
            .find(|param| param.location == ParamLocation::Body)
    }

    pub fn params_in(&self, location: ParamLocation) -> impl Iterator<Item = &ParamSpec> {
        self.parameters
            .iter()
            .filter(move |param| param.location == location)
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    version: Option<String>,
    base_path: String,
    checksum: String,
    operations: BTreeMap<String, OperationDescriptor>,
    aliases: BTreeMap<String, String>,
}

impl Registry {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CbioError> {
        let document: Value = serde_json::from_slice(bytes)
            .map_err(|err| CbioError::Decode(format!("API descriptor: {err}")))?;
        let mut registry = Self::from_document(&document)?;
        registry.checksum = checksum(bytes);
        Ok(registry)
    }

    pub fn from_document(document: &Value) -> Result<Self, CbioError> {
        let paths = document
            .get("paths")
            .and_then(Value::as_object)
            .ok_or_else(|| CbioError::Decode("API descriptor has no paths".to_string()))?;

        let mut operations = BTreeMap::new();
        for (path, item) in paths {
            let shared = item
                .get("parameters")
                .and_then(Value::as_array)
                .map(|params| params.iter().filter_map(parse_param).collect::<Vec<_>>())
                .unwrap_or_default();
            let Some(item) = item.as_object() else {
                continue;
            };
            for (verb, operation) in item {
                let Some(method) = Method::parse(verb) else {
                    continue;
                };
                let Some(name) = operation.get("operationId").and_then(Value::as_str) else {
                    continue;
                };
                let mut parameters = shared.clone();
                if let Some(params) = operation.get("parameters").and_then(Value::as_array) {
                    for param in params.iter().filter_map(parse_param) {
                        parameters.retain(|existing: &ParamSpec| existing.name != param.name);
                        parameters.push(param);
                    }
                }
                if let Some(body) = operation.get("requestBody") {
                    parameters.push(parse_request_body(operation, body));
                }
                let descriptor = OperationDescriptor {
                    name: name.to_string(),
                    method,
                    path: path.clone(),
                    parameters,
                    summary: operation
                        .get("summary")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                };
                operations.insert(name.to_string(), descriptor);
            }
        }

        let mut aliases = BTreeMap::new();
        for name in operations.keys() {
            if let Some(captures) = VERB_SUFFIX.captures(name) {
                let base = captures["base"].to_string();
                if !operations.contains_key(&base) {
                    aliases.entry(base).or_insert_with(|| name.clone());
                }
            }
        }

        let info = document.get("info");
        Ok(Self {
            version: info
                .and_then(|info| info.get("version"))
                .and_then(Value::as_str)
                .map(str::to_string),
            base_path: base_path(document),
            checksum: String::new(),
            operations,
            aliases,
        })
    }

    pub fn get(&self, name: &str) -> Result<&OperationDescriptor, CbioError> {
        let resolved = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        self.operations
            .get(resolved)
            .ok_or_else(|| CbioError::UnknownOperation(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }

    pub fn names(&self) -> Vec<&str> {
        self.operations.keys().map(String::as_str).collect()
    }

    pub fn search(&self, fragment: &str) -> Vec<&str> {
        let needle = fragment.to_ascii_lowercase();
        self.operations
            .keys()
            .filter(|name| name.to_ascii_lowercase().contains(&needle))
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Downloads the descriptor at `url` and verifies it against
/// `expected_checksum` before parsing.
pub fn load<T: Transport>(
    transport: &T,
    url: &str,
    expected_checksum: &str,
) -> Result<Registry, CbioError> {
    let bytes = fetch(transport, url)?;
    let actual = checksum(&bytes);
    if !actual.eq_ignore_ascii_case(expected_checksum.trim()) {
        return Err(CbioError::Integrity {
            expected: expected_checksum.trim().to_ascii_lowercase(),
            actual,
        });
    }
    let registry = Registry::from_slice(&bytes)?;
    info!(
        url,
        operations = registry.len(),
        version = registry.version().unwrap_or("unknown"),
        "loaded API descriptor"
    );
    Ok(registry)
}

pub fn load_unpinned<T: Transport>(transport: &T, url: &str) -> Result<Registry, CbioError> {
    let bytes = fetch(transport, url)?;
    let registry = Registry::from_slice(&bytes)?;
    warn!(
        url,
        checksum = registry.checksum(),
        "API descriptor checksum not pinned"
    );
    Ok(registry)
}

fn fetch<T: Transport>(transport: &T, url: &str) -> Result<Vec<u8>, CbioError> {
    let response = transport.send(&HttpRequest::get(url))?;
    if !response.is_success() {
        return Err(CbioError::TransportStatus {
            status: response.status,
            message: response.text(),
        });
    }
    Ok(response.body)
}

fn parse_param(value: &Value) -> Option<ParamSpec> {
    let name = value.get("name")?.as_str()?.to_string();
    let location = match value.get("in")?.as_str()? {
        "path" => ParamLocation::Path,
        "query" => ParamLocation::Query,
        "header" => ParamLocation::Header,
        "body" => ParamLocation::Body,
        _ => return None,
    };
    let kind = value
        .get("type")
        .or_else(|| value.get("schema").and_then(|schema| schema.get("type")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| value.get("schema").and_then(schema_name));
    Some(ParamSpec {
        name,
        required: value
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(location == ParamLocation::Path),
        location,
        kind,
    })
}

fn parse_request_body(operation: &Value, body: &Value) -> ParamSpec {
    let schema = body
        .get("content")
        .and_then(Value::as_object)
        .and_then(|content| {
            content
                .get("application/json")
                .or_else(|| content.values().next())
        })
        .and_then(|media| media.get("schema"));
    let kind = schema.and_then(|schema| {
        schema_name(schema).or_else(|| schema.get("type").and_then(Value::as_str).map(str::to_string))
    });
    let name = operation
        .get("x-codegen-request-body-name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| schema.and_then(schema_name).map(|name| lower_first(&name)))
        .unwrap_or_else(|| "body".to_string());
    ParamSpec {
        name,
        location: ParamLocation::Body,
        required: body.get("required").and_then(Value::as_bool).unwrap_or(false),
        kind,
    }
}

fn schema_name(schema: &Value) -> Option<String> {
    schema
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|reference| reference.rsplit('/').next())
        .map(str::to_string)
}

fn lower_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn base_path(document: &Value) -> String {
    let raw = document
        .get("basePath")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            document
                .get("servers")
                .and_then(Value::as_array)
                .and_then(|servers| servers.first())
                .and_then(|server| server.get("url"))
                .and_then(Value::as_str)
                .map(|url| match url.split_once("://") {
                    Some((_, rest)) => rest.find('/').map(|i| rest[i..].to_string()).unwrap_or_default(),
                    None => url.to_string(),
                })
        })
        .unwrap_or_default();
    raw.trim_end_matches('/').to_string()
}
