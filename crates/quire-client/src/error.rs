//! Error types for talking to the editor service.

use miette::Diagnostic;
use quire_core::ValidationError;
use thiserror::Error;

/// Errors returned by document and snippet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
#[non_exhaustive]
pub enum ClientError {
    /// The request never got a usable HTTP response: connection refused,
    /// DNS failure, TLS failure, timeout.
    #[error("transport error: {0}")]
    #[diagnostic(
        code(quire::client::transport),
        help("check the endpoint URL and that the service is reachable")
    )]
    Transport(String),

    /// The service answered but reported a failure, or answered with
    /// something that isn't a valid response.
    #[error("service error: {message}")]
    #[diagnostic(code(quire::client::service))]
    Service { message: String },

    /// Rejected locally; nothing was sent.
    #[error("invalid input: {0}")]
    #[diagnostic(code(quire::client::validation))]
    Validation(String),
}

impl ClientError {
    pub fn service(message: impl Into<String>) -> Self {
        ClientError::Service {
            message: message.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

impl From<ValidationError> for ClientError {
    fn from(e: ValidationError) -> Self {
        ClientError::Validation(e.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_status() || e.is_decode() {
            ClientError::service(e.to_string())
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::service(format!("malformed response: {e}"))
    }
}
