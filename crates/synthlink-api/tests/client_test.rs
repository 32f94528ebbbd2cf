#![allow(clippy::unwrap_used)]
// Integration tests for `EditorClient` using wiremock.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use synthlink_api::{EditorClient, Error, ParameterValue};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, EditorClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = EditorClient::with_client(reqwest::Client::new(), base_url, Duration::from_secs(5));
    (server, client)
}

// ── Device tests ────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_devices() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "inputs": [
                { "name": "Keystation 49", "type": "INPUT" },
                { "name": "Midi Through", "type": "INPUT" }
            ],
            "outputs": [
                { "name": "Nord Lead", "type": "INPUT" }
            ]
        })))
        .mount(&server)
        .await;

    let listing = client.list_devices().await.unwrap();

    let inputs: Vec<_> = listing.inputs.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(inputs, vec!["Keystation 49", "Midi Through"]);
    assert_eq!(listing.outputs.len(), 1);
    assert_eq!(listing.outputs[0].name, "Nord Lead");
}

#[tokio::test]
async fn test_list_devices_empty_lists() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let listing = client.list_devices().await.unwrap();
    assert!(listing.inputs.is_empty());
    assert!(listing.outputs.is_empty());
}

#[tokio::test]
async fn test_list_devices_server_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(500).set_body_string("midi subsystem down"))
        .mount(&server)
        .await;

    let result = client.list_devices().await;

    match result {
        Err(Error::Status { status, body, .. }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "midi subsystem down");
        }
        other => panic!("expected Status error, got: {other:?}"),
    }
}

// ── Parameter tests ─────────────────────────────────────────────────

#[tokio::test]
async fn test_list_parameters_array() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/parameters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "address": "synth/osc1/level", "value": 100 },
            { "address": "synth/env/attack", "value": 12 }
        ])))
        .mount(&server)
        .await;

    let params = client.list_parameters().await.unwrap();

    assert_eq!(
        params,
        vec![
            ParameterValue::new("synth/osc1/level", 100),
            ParameterValue::new("synth/env/attack", 12),
        ]
    );
}

#[tokio::test]
async fn test_list_parameters_keyed_object() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/parameters"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"synth/osc1/level": 100, "synth/env/attack": 12}"#)
                .insert_header("content-type", "application/json"),
        )
        .mount(&server)
        .await;

    let params = client.list_parameters().await.unwrap();

    assert_eq!(params.len(), 2);
    assert_eq!(params[0], ParameterValue::new("synth/osc1/level", 100));
    assert_eq!(params[1], ParameterValue::new("synth/env/attack", 12));
}

#[tokio::test]
async fn test_list_parameters_rejects_garbage() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/parameters"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result = client.list_parameters().await;

    match result {
        Err(Error::Deserialization { body, .. }) => assert_eq!(body, "<html>oops</html>"),
        other => panic!("expected Deserialization error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_update_parameters() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/parameters/update"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.update_parameters().await.unwrap();
}

// ── Selection tests ─────────────────────────────────────────────────

#[tokio::test]
async fn test_select_input_encodes_name() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/input/Midi%20Through"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    client.select_input("Midi Through").await.unwrap();
}

#[tokio::test]
async fn test_select_output() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/output/NordLead"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.select_output("NordLead").await.unwrap();
}

#[tokio::test]
async fn test_select_output_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/output/Gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Device not found"))
        .mount(&server)
        .await;

    let err = client.select_output("Gone").await.unwrap_err();
    assert!(err.is_not_found(), "expected 404, got: {err:?}");
}

#[tokio::test]
async fn test_request_timeout() {
    let server = MockServer::start().await;
    let client = EditorClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        Duration::from_millis(100),
    );

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let result = client.list_devices().await;
    assert!(
        matches!(result, Err(Error::Timeout { .. })),
        "expected Timeout error, got: {result:?}"
    );
}
