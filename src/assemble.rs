use serde_json::Value;
use tracing::{debug, warn};

use crate::client::ApiClient;
use crate::error::CbioError;
use crate::invoke::{Params, invoke};
use crate::table::Table;
use crate::transport::{HttpResponse, Transport};

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    Rows(Table),
    RemoteError(String),
    Empty,
}

impl ParsedResponse {
    /// Classifies a response body. Non-success statuses are only accepted
    /// when they carry a JSON `message`; anything else is a transport error.
    pub fn from_response(response: &HttpResponse) -> Result<Self, CbioError> {
        let value = if response.body.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            match serde_json::from_slice::<Value>(&response.body) {
                Ok(value) => value,
                Err(err) if response.is_success() => {
                    return Err(CbioError::Decode(err.to_string()));
                }
                Err(_) => Value::Null,
            }
        };
        if !response.is_success() {
            return match error_message(&value) {
                Some(message) => Ok(ParsedResponse::RemoteError(message)),
                None => Err(CbioError::TransportStatus {
                    status: response.status,
                    message: response.text(),
                }),
            };
        }
        Ok(Self::from_value(&value))
    }

    pub fn from_value(value: &Value) -> Self {
        if let Some(message) = error_message(value) {
            return ParsedResponse::RemoteError(message);
        }
        let table = match value {
            Value::Null => Table::empty(),
            Value::Array(items) => Table::from_json_rows(items),
            single => Table::from_json_rows(std::iter::once(single)),
        };
        if table.is_empty() {
            ParsedResponse::Empty
        } else {
            ParsedResponse::Rows(table)
        }
    }

    pub fn into_table(self) -> Table {
        match self {
            ParsedResponse::Rows(table) => table,
            ParsedResponse::RemoteError(_) | ParsedResponse::Empty => Table::empty(),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ParsedResponse::RemoteError(message) => Some(message),
            _ => None,
        }
    }
}

fn error_message(value: &Value) -> Option<String> {
    value
        .as_object()
        .and_then(|object| object.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub fn invoke_and_parse<T: Transport>(
    client: &ApiClient,
    transport: &T,
    operation: &str,
    use_cache: bool,
    params: &Params,
) -> Result<ParsedResponse, CbioError> {
    let response = invoke(client, transport, operation, use_cache, params)?;
    let parsed = ParsedResponse::from_response(&response)?;
    match &parsed {
        ParsedResponse::Rows(table) => debug!(operation, rows = table.len(), "bound rows"),
        ParsedResponse::RemoteError(message) => debug!(operation, remote = %message, "remote error payload"),
        ParsedResponse::Empty => debug!(operation, "empty payload"),
    }
    Ok(parsed)
}

pub fn invoke_and_bind<T: Transport>(
    client: &ApiClient,
    transport: &T,
    operation: &str,
    use_cache: bool,
    params: &Params,
) -> Result<Table, CbioError> {
    let parsed = invoke_and_parse(client, transport, operation, use_cache, params)?;
    if let ParsedResponse::RemoteError(message) = &parsed {
        warn!(operation, remote = %message, "error payload bound as empty table");
    }
    Ok(parsed.into_table())
}

pub fn invoke_all_pages<T: Transport>(
    client: &ApiClient,
    transport: &T,
    operation: &str,
    params: &Params,
    page_size: usize,
) -> Result<Table, CbioError> {
    let page_size = page_size.max(1);
    let mut out = Table::empty();
    for page in 0usize.. {
        let params = params
            .clone()
            .with("pageSize", page_size)
            .with("pageNumber", page);
        let table = invoke_and_bind(client, transport, operation, false, &params)?;
        let rows = table.len();
        out.append(table);
        if rows < page_size {
            break;
        }
    }
    Ok(out)
}

pub fn invoke_chunked<T: Transport>(
    client: &ApiClient,
    transport: &T,
    operation: &str,
    params: &Params,
    key: &str,
    values: &[String],
    chunk_size: usize,
) -> Result<Table, CbioError> {
    let mut values = values.to_vec();
    values.sort();
    values.dedup();
    let mut out = Table::empty();
    for chunk in values.chunks(chunk_size.max(1)) {
        let params = params.clone().with(key, chunk);
        out.append(invoke_and_bind(client, transport, operation, false, &params)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn rows_with_extra_column() {
        let parsed = ParsedResponse::from_value(&json!([
            {"sampleId": "S1", "value": 1},
            {"sampleId": "S2", "value": 2, "extra": true}
        ]));
        let ParsedResponse::Rows(table) = parsed else {
            panic!("expected rows");
        };
        assert_eq!(table.columns(), ["sampleId", "value", "extra"]);
        assert_eq!(table.get(0, "extra"), None);
        assert_eq!(table.get(1, "extra"), Some(&json!(true)));
    }

    #[test]
    fn message_object_is_remote_error() {
        let parsed = ParsedResponse::from_value(&json!({"message": "Molecular profile not found"}));
        assert_eq!(
            parsed,
            ParsedResponse::RemoteError("Molecular profile not found".to_string())
        );
        assert!(parsed.into_table().is_empty());
    }

    #[test]
    fn empty_array_is_empty() {
        assert_eq!(ParsedResponse::from_value(&json!([])), ParsedResponse::Empty);
    }

    #[test]
    fn error_status_with_message() {
        let response = HttpResponse::new(404, br#"{"message":"Sample list not found: x"}"#.to_vec());
        let parsed = ParsedResponse::from_response(&response).unwrap();
        assert_eq!(parsed.message(), Some("Sample list not found: x"));
    }

    #[test]
    fn error_status_without_message() {
        let response = HttpResponse::new(502, b"<html>bad gateway</html>".to_vec());
        let err = ParsedResponse::from_response(&response).unwrap_err();
        assert_matches!(err, CbioError::TransportStatus { status: 502, .. });
    }
}
