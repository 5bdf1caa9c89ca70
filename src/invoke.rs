use std::collections::HashSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use reqwest::Url;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::client::ApiClient;
use crate::descriptor::{OperationDescriptor, ParamLocation, ParamSpec};
use crate::error::CbioError;
use crate::transport::{HttpRequest, HttpResponse, Transport};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}/]+)\}").expect("valid regex"));

/// Named arguments of one operation call, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Serialize) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Performs one call of `operation` and hands back the response unopened.
pub fn invoke<T: Transport>(
    client: &ApiClient,
    transport: &T,
    operation: &str,
    use_cache: bool,
    params: &Params,
) -> Result<HttpResponse, CbioError> {
    let request = build_request(client, operation, use_cache, params)?;
    debug!(
        operation,
        method = %request.method,
        url = %request.url,
        use_cache,
        "invoking API operation"
    );
    transport.send(&request)
}

/// Validates `params` against the operation's descriptor and serializes
/// them into path, query and body.
pub fn build_request(
    client: &ApiClient,
    operation: &str,
    use_cache: bool,
    params: &Params,
) -> Result<HttpRequest, CbioError> {
    let descriptor = client.registry().get(operation)?;
    let mut consumed = HashSet::new();

    let url = render_url(client.base_url(), descriptor, params, &mut consumed)?;

    let mut query = Vec::new();
    for spec in descriptor.params_in(ParamLocation::Query) {
        match params.get(&spec.name) {
            Some(value) => {
                consumed.insert(spec.name.clone());
                for text in query_values(value) {
                    query.push((spec.name.clone(), text));
                }
            }
            None if spec.required => return Err(missing(descriptor, &spec.name)),
            None => {}
        }
    }

    let mut headers = Vec::new();
    for spec in descriptor.params_in(ParamLocation::Header) {
        if let Some(value) = params.get(&spec.name) {
            consumed.insert(spec.name.clone());
            headers.push((spec.name.clone(), scalar_text(value)));
        }
    }
    if let Some(auth) = client.authorization() {
        headers.push(("Authorization".to_string(), auth.to_string()));
    }

    let leftover = params
        .iter()
        .filter(|(name, _)| !consumed.contains(*name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect::<Map<_, _>>();
    let body = match descriptor.body() {
        Some(spec) => match params.get(&spec.name) {
            Some(value) => {
                if let Some(extra) = leftover.keys().find(|name| **name != spec.name) {
                    return Err(unknown(descriptor, extra));
                }
                Some(value.clone())
            }
            None if leftover.len() == 1 && !takes_object(spec) => {
                leftover.into_iter().next().map(|(_, value)| value)
            }
            None if !leftover.is_empty() => Some(Value::Object(leftover)),
            None if spec.required => return Err(missing(descriptor, &spec.name)),
            None => None,
        },
        None => {
            if let Some(extra) = leftover.keys().next() {
                return Err(unknown(descriptor, extra));
            }
            None
        }
    };

    Ok(HttpRequest {
        method: descriptor.method,
        url,
        query,
        headers,
        body,
        use_cache,
    })
}

fn render_url(
    base_url: &str,
    descriptor: &OperationDescriptor,
    params: &Params,
    consumed: &mut HashSet<String>,
) -> Result<String, CbioError> {
    let mut url = Url::parse(base_url)
        .map_err(|err| CbioError::Configuration(format!("invalid base URL {base_url}: {err}")))?;
    let mut segments = Vec::new();
    for raw in descriptor.path.split('/').filter(|segment| !segment.is_empty()) {
        let mut failure = None;
        let rendered = PLACEHOLDER.replace_all(raw, |caps: &Captures| {
            let name = &caps[1];
            match params.get(name) {
                Some(value) => {
                    consumed.insert(name.to_string());
                    scalar_text(value)
                }
                None => {
                    if failure.is_none() {
                        failure = Some(name.to_string());
                    }
                    String::new()
                }
            }
        });
        if let Some(name) = failure {
            return Err(missing(descriptor, &name));
        }
        segments.push(rendered.into_owned());
    }
    url.path_segments_mut()
        .map_err(|_| CbioError::Configuration(format!("base URL cannot take a path: {base_url}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.to_string())
}

/// Array and scalar bodies carry a single loose param as-is.
fn takes_object(spec: &ParamSpec) -> bool {
    !matches!(
        spec.kind.as_deref(),
        Some("array" | "string" | "integer" | "number" | "boolean")
    )
}

fn query_values(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(scalar_text)
            .collect(),
        other => vec![scalar_text(other)],
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn missing(descriptor: &OperationDescriptor, name: &str) -> CbioError {
    CbioError::Configuration(format!(
        "missing required parameter '{name}' for {}",
        descriptor.name
    ))
}

fn unknown(descriptor: &OperationDescriptor, name: &str) -> CbioError {
    CbioError::Configuration(format!(
        "unknown parameter '{name}' for {}",
        descriptor.name
    ))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::descriptor::Registry;
    use crate::transport::Method;

    fn client() -> ApiClient {
        let document = json!({
            "swagger": "2.0",
            "basePath": "/api",
            "paths": {
                "/molecular-profiles/{molecularProfileId}/molecular-data/fetch": {
                    "post": {
                        "operationId": "fetchAllMolecularDataInMolecularProfileUsingPOST",
                        "parameters": [
                            {"name": "molecularProfileId", "in": "path", "required": true, "type": "string"},
                            {"name": "projection", "in": "query", "type": "string"},
                            {"name": "molecularDataFilter", "in": "body", "required": true,
                             "schema": {"$ref": "#/definitions/MolecularDataFilter"}}
                        ]
                    }
                },
                "/studies/{studyId}/sample-lists": {
                    "get": {
                        "operationId": "getAllSampleListsInStudyUsingGET",
                        "parameters": [
                            {"name": "studyId", "in": "path", "required": true, "type": "string"},
                            {"name": "sampleListIds", "in": "query", "type": "array"}
                        ]
                    }
                }
            }
        });
        let registry = Registry::from_document(&document).unwrap();
        ApiClient::from_registry("https", "www.cbioportal.org", registry, Some("secret")).unwrap()
    }

    #[test]
    fn wraps_loose_body_fields() {
        let params = Params::new()
            .with("molecularProfileId", "acc_tcga_rppa")
            .with("entrezGeneIds", vec![1, 2])
            .with("sampleIds", vec!["S1", "S2"]);
        let request =
            build_request(&client(), "fetchAllMolecularDataInMolecularProfile", false, &params)
                .unwrap();

        assert_eq!(request.method, Method::Post);
        assert_eq!(
            request.url,
            "https://www.cbioportal.org/api/molecular-profiles/acc_tcga_rppa/molecular-data/fetch"
        );
        assert_eq!(
            request.body,
            Some(json!({"entrezGeneIds": [1, 2], "sampleIds": ["S1", "S2"]}))
        );
        assert_eq!(request.header("authorization"), Some("Bearer secret"));
    }

    #[test]
    fn explicit_body_key_is_used_verbatim() {
        let params = Params::new()
            .with("molecularProfileId", "p")
            .with("molecularDataFilter", json!({"sampleListId": "all"}));
        let request =
            build_request(&client(), "fetchAllMolecularDataInMolecularProfile", false, &params)
                .unwrap();
        assert_eq!(request.body, Some(json!({"sampleListId": "all"})));
    }

    #[test]
    fn array_request_body_is_sent_bare() {
        let document = json!({
            "openapi": "3.0.1",
            "servers": [{"url": "https://www.cbioportal.org/api"}],
            "paths": {
                "/genes/fetch": {
                    "post": {
                        "operationId": "fetchGenes",
                        "parameters": [
                            {"name": "geneIdType", "in": "query", "schema": {"type": "string"}},
                            {"name": "projection", "in": "query", "schema": {"type": "string"}}
                        ],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": {"type": "array", "items": {"type": "string"}}
                                }
                            }
                        }
                    }
                }
            }
        });
        let registry = Registry::from_document(&document).unwrap();
        let client = ApiClient::from_registry("https", "www.cbioportal.org", registry, None).unwrap();
        let params = Params::new()
            .with("geneIdType", "HUGO_GENE_SYMBOL")
            .with("geneIds", vec!["TP53"]);

        let request = build_request(&client, "fetchGenes", false, &params).unwrap();

        assert_eq!(request.url, "https://www.cbioportal.org/api/genes/fetch");
        assert_eq!(request.body, Some(json!(["TP53"])));
        assert_eq!(
            request.query,
            vec![("geneIdType".to_string(), "HUGO_GENE_SYMBOL".to_string())]
        );
    }

    #[test]
    fn arrays_repeat_in_query() {
        let params = Params::new()
            .with("studyId", "acc tcga")
            .with("sampleListIds", vec!["a", "b"]);
        let request = build_request(&client(), "getAllSampleListsInStudy", true, &params).unwrap();
        assert_eq!(
            request.url,
            "https://www.cbioportal.org/api/studies/acc%20tcga/sample-lists"
        );
        assert_eq!(
            request.query,
            vec![
                ("sampleListIds".to_string(), "a".to_string()),
                ("sampleListIds".to_string(), "b".to_string())
            ]
        );
        assert!(request.use_cache);
    }

    #[test]
    fn missing_path_param() {
        let err = build_request(&client(), "getAllSampleListsInStudy", false, &Params::new())
            .unwrap_err();
        assert_matches!(err, CbioError::Configuration(message) if message.contains("studyId"));
    }

    #[test]
    fn unknown_param_without_body() {
        let params = Params::new().with("studyId", "acc_tcga").with("bogus", 1);
        let err = build_request(&client(), "getAllSampleListsInStudy", false, &params).unwrap_err();
        assert_matches!(err, CbioError::Configuration(message) if message.contains("bogus"));
    }

    #[test]
    fn unknown_operation() {
        let err = build_request(&client(), "nope", false, &Params::new()).unwrap_err();
        assert_matches!(err, CbioError::UnknownOperation(_));
    }
}
