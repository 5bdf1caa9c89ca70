#![allow(dead_code)]

use std::fs;
use std::sync::Mutex;

use serde_json::Value;

use kira_cbioportal::cache::ResultCache;
use kira_cbioportal::client::{ApiClient, ClientSettings};
use kira_cbioportal::descriptor::checksum;
use kira_cbioportal::error::CbioError;
use kira_cbioportal::planner::CbioPortal;
use kira_cbioportal::transport::{HttpRequest, HttpResponse, Method, Transport};

pub const DESCRIPTOR_PATH: &str = "/api/v2/api-docs";

pub fn descriptor_bytes() -> Vec<u8> {
    fs::read("tests/fixtures/api-docs.json").unwrap()
}

pub fn settings() -> ClientSettings {
    ClientSettings {
        descriptor_checksum: Some(checksum(&descriptor_bytes())),
        ..ClientSettings::default()
    }
}

struct Route {
    method: Method,
    path: String,
    query: Option<(String, String)>,
    response: HttpResponse,
}

/// Answers requests from canned routes and records everything it sees.
#[derive(Default)]
pub struct StubTransport {
    routes: Vec<Route>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default().route_bytes(Method::Get, DESCRIPTOR_PATH, 200, descriptor_bytes())
    }

    pub fn route(self, method: Method, path: &str, body: Value) -> Self {
        self.route_bytes(method, path, 200, body.to_string().into_bytes())
    }

    pub fn route_status(self, method: Method, path: &str, status: u16, body: Value) -> Self {
        self.route_bytes(method, path, status, body.to_string().into_bytes())
    }

    pub fn route_query(mut self, method: Method, path: &str, query: (&str, &str), body: Value) -> Self {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            query: Some((query.0.to_string(), query.1.to_string())),
            response: HttpResponse::new(200, body.to_string().into_bytes()),
        });
        self
    }

    fn route_bytes(mut self, method: Method, path: &str, status: u16, body: Vec<u8>) -> Self {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            query: None,
            response: HttpResponse::new(status, body),
        });
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests other than the descriptor download.
    pub fn api_requests(&self) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|request| url_path(&request.url) != DESCRIPTOR_PATH)
            .collect()
    }

    pub fn reset(&self) {
        self.requests.lock().unwrap().clear();
    }
}

impl Transport for StubTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, CbioError> {
        self.requests.lock().unwrap().push(request.clone());
        let path = url_path(&request.url);
        self.routes
            .iter()
            .filter(|route| route.method == request.method && route.path == path)
            .find(|route| match &route.query {
                Some((key, value)) => request
                    .query
                    .iter()
                    .any(|(k, v)| k == key && v == value),
                None => true,
            })
            .map(|route| route.response.clone())
            .ok_or_else(|| CbioError::Transport(format!("no route for {} {path}", request.method)))
    }
}

pub fn url_path(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    rest.find('/').map(|index| &rest[index..]).unwrap_or("/")
}

pub fn portal(transport: StubTransport) -> CbioPortal<StubTransport> {
    CbioPortal::connect(transport, &settings(), ResultCache::in_memory()).unwrap()
}

pub fn client(transport: &StubTransport) -> ApiClient {
    ApiClient::connect(transport, &settings()).unwrap()
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
