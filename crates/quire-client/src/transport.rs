//! GraphQL over HTTP.
//!
//! [`Transport`] is the seam between typed operations and the network: it
//! takes one GraphQL request and returns the decoded envelope. Errors inside
//! the envelope are left for the caller to interpret.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::error::ClientError;

/// Header carrying the service credential.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest {
    pub query: &'static str,
    pub operation_name: SmolStr,
    pub variables: Value,
}

impl GraphqlRequest {
    pub fn new(operation_name: &str, query: &'static str, variables: Value) -> Self {
        Self {
            query,
            operation_name: SmolStr::new(operation_name),
            variables,
        }
    }

    /// String variable by name, for transports that dispatch locally.
    pub fn var_str(&self, name: &str) -> Option<&str> {
        self.variables.get(name).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub errors: Vec<GraphqlError>,
}

impl GraphqlResponse {
    pub fn with_data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            data: None,
            errors: vec![GraphqlError {
                message: message.into(),
                extra: BTreeMap::new(),
            }],
        }
    }

    /// Decode one top-level field of `data`.
    ///
    /// Any error in the envelope fails the whole call, even when partial
    /// data came along; the first message is reported.
    pub fn into_field<T: DeserializeOwned>(self, field: &str) -> Result<T, ClientError> {
        if let Some(first) = self.errors.into_iter().next() {
            return Err(ClientError::service(first.message));
        }
        let mut data = match self.data {
            Some(Value::Null) | None => {
                return Err(ClientError::service("response contained no data"));
            }
            Some(data) => data,
        };
        let value = data
            .get_mut(field)
            .map(Value::take)
            .ok_or_else(|| ClientError::service(format!("response is missing `{field}`")))?;
        Ok(serde_json::from_value(value)?)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<GraphqlError>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

/// Sends GraphQL requests somewhere and returns the decoded envelope.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    async fn execute(&self, request: GraphqlRequest) -> Result<GraphqlResponse, ClientError>;
}

/// Production transport: HTTPS POST with a JSON body.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    async fn execute(&self, request: GraphqlRequest) -> Result<GraphqlResponse, ClientError> {
        let started = Instant::now();
        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        tracing::debug!(
            operation = %request.operation_name,
            %status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "graphql request finished"
        );

        if !status.is_success() {
            // GraphQL servers often put a proper error envelope in 4xx bodies.
            if let Ok(envelope) = serde_json::from_slice::<GraphqlResponse>(&body) {
                if let Some(first) = envelope.errors.into_iter().next() {
                    return Err(ClientError::service(first.message));
                }
            }
            return Err(ClientError::service(format!("HTTP {status}")));
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_uses_graphql_field_names() {
        let request = GraphqlRequest::new("Doc", "query Doc { x }", json!({ "documentKey": "k" }));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "query": "query Doc { x }",
                "operationName": "Doc",
                "variables": { "documentKey": "k" }
            })
        );
        assert_eq!(request.var_str("documentKey"), Some("k"));
    }

    #[test]
    fn test_errors_win_over_partial_data() {
        let response: GraphqlResponse = serde_json::from_value(json!({
            "data": { "render": { "contentHtml": "" } },
            "errors": [{ "message": "first" }, { "message": "second" }]
        }))
        .unwrap();
        let err = response.into_field::<Value>("render").unwrap_err();
        assert_eq!(err, ClientError::service("first"));
    }

    #[test]
    fn test_missing_data_is_a_service_error() {
        let response: GraphqlResponse =
            serde_json::from_value(json!({ "data": null, "errors": null })).unwrap();
        assert!(matches!(
            response.into_field::<Value>("document"),
            Err(ClientError::Service { .. })
        ));
    }

    #[test]
    fn test_null_field_decodes_as_none() {
        let response = GraphqlResponse::with_data(json!({ "document": null }));
        let doc: Option<Value> = response.into_field("document").unwrap();
        assert_eq!(doc, None);
    }

    #[test]
    fn test_wrong_shape_is_a_service_error() {
        let response = GraphqlResponse::with_data(json!({ "deleteHtmlSnippet": "yes" }));
        let err = response.into_field::<bool>("deleteHtmlSnippet").unwrap_err();
        assert!(matches!(err, ClientError::Service { .. }));
    }
}
