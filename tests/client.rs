mod common;

use assert_matches::assert_matches;

use kira_cbioportal::client::{ApiClient, ClientSettings};
use kira_cbioportal::error::CbioError;

use common::{StubTransport, settings};

#[test]
fn connect_builds_base_url() {
    let transport = StubTransport::new();
    let client = ApiClient::connect(&transport, &settings()).unwrap();
    assert_eq!(client.base_url(), "https://www.cbioportal.org/api");
    assert_eq!(client.authorization(), None);
    assert!(client.registry().contains("getAllStudies"));
}

#[test]
fn token_path_that_does_not_exist_fails_before_network() {
    let transport = StubTransport::new();
    let settings = ClientSettings {
        token: Some("not-a-real-path/token".to_string()),
        ..settings()
    };
    let err = ApiClient::connect(&transport, &settings).unwrap_err();

    assert_matches!(err, CbioError::Configuration(_));
    assert!(transport.requests().is_empty());
}

#[test]
fn token_file_sets_bearer_header() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("cbioportal_data_access_token.txt");
    std::fs::write(&path, "token: abc-123\n").unwrap();

    let transport = StubTransport::new();
    let settings = ClientSettings {
        token: Some(path.to_str().unwrap().to_string()),
        ..settings()
    };
    let client = ApiClient::connect(&transport, &settings).unwrap();
    assert_eq!(client.authorization(), Some("Bearer abc-123"));
}

#[test]
fn identity_hides_token_and_tracks_host() {
    let transport = StubTransport::new();
    let plain = ApiClient::connect(&transport, &settings()).unwrap();
    let with_token = ApiClient::connect(
        &transport,
        &ClientSettings {
            token: Some("secret-token".to_string()),
            ..settings()
        },
    )
    .unwrap();

    assert_ne!(plain.identity(), with_token.identity());
    assert!(!with_token.identity().to_string().contains("secret-token"));
}

#[test]
fn rejects_unknown_protocol() {
    let transport = StubTransport::new();
    let settings = ClientSettings {
        protocol: "ftp".to_string(),
        ..settings()
    };
    let err = ApiClient::connect(&transport, &settings).unwrap_err();
    assert_matches!(err, CbioError::Configuration(_));
}
