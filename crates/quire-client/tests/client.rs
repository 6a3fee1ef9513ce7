mod common;

use std::collections::BTreeMap;

use common::FakeService;
use quire_client::{
    ClientError, Config, EditorClient, GraphqlRequest, GraphqlResponse, HttpTransport, Transport,
};
use quire_core::{StyleTokens, UpsertDocumentInput};

/// Answers every request with a GraphQL error.
struct Failing;

impl Transport for Failing {
    async fn execute(&self, _request: GraphqlRequest) -> Result<GraphqlResponse, ClientError> {
        Ok(GraphqlResponse::with_error("document key too long"))
    }
}

#[tokio::test]
async fn test_missing_document_loads_as_none() {
    let client = EditorClient::new(FakeService::new());
    assert_eq!(client.load_document("nothing-here").await.unwrap(), None);
}

#[tokio::test]
async fn test_save_then_load_returns_stored_fields() {
    let service = FakeService::new();
    let client = EditorClient::new(service.clone());
    let tokens: StyleTokens = BTreeMap::from([("fontSize".to_string(), "18px".to_string())]);

    let saved = client
        .save_document(&UpsertDocumentInput {
            document_key: "notes".into(),
            title: Some("Notes".into()),
            content_md: "# Notes".into(),
            style_tokens: Some(tokens.clone()),
            theme_key: None,
        })
        .await
        .unwrap();
    assert_eq!(saved.content_md, "# Notes");

    let loaded = client.load_document("notes").await.unwrap().unwrap();
    assert_eq!(loaded.title.as_deref(), Some("Notes"));
    assert_eq!(loaded.style_tokens, tokens);

    let rendered = client.render("notes").await.unwrap();
    assert_eq!(rendered.content_html, "<p># Notes</p>");
    assert!(rendered.theme_css.contains("--ed-font-size:18px"));
}

#[tokio::test]
async fn test_render_of_missing_document_warns() {
    let client = EditorClient::new(FakeService::new());
    let rendered = client.render("ghost").await.unwrap();
    assert_eq!(rendered.content_html, "");
    assert_eq!(rendered.warnings[0].code.as_deref(), Some("NOT_FOUND"));
}

#[tokio::test]
async fn test_graphql_error_is_a_service_error() {
    let client = EditorClient::new(Failing);
    let err = client.render("notes").await.unwrap_err();
    assert_eq!(err, ClientError::service("document key too long"));
    assert!(!err.is_transport());
}

#[tokio::test]
async fn test_transport_failure_propagates() {
    let service = FakeService::new().with_document("notes", "x");
    service.fail_next("Doc", 1);
    let client = EditorClient::new(service.clone());

    let err = client.load_document("notes").await.unwrap_err();
    assert!(err.is_transport());

    // Only the one request failed.
    assert!(client.load_document("notes").await.unwrap().is_some());
}

#[test]
fn test_client_builds_from_config() {
    let config = Config {
        endpoint: "https://editor.example.com/graphql".into(),
        api_key: Some("dev".into()),
        ..Config::default()
    };
    let client = EditorClient::from_config(&config).unwrap();
    assert_eq!(
        client.transport().endpoint(),
        "https://editor.example.com/graphql"
    );

    let _: &HttpTransport = client.transport();
}
