//! quire client
//!
//! Talks to the editor service and drives edit sessions:
//! - [`EditorClient`]: typed document operations over a [`Transport`]
//! - [`SnippetRegistry`]: snippet CRUD scoped to one document
//! - [`spawn_session`]: runs an [`quire_core::EditSession`] on a tokio task
//! - [`config`] and [`telemetry`]: ambient setup shared by binaries

pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod snippets;
pub mod telemetry;
pub mod transport;

pub use client::EditorClient;
pub use config::Config;
pub use error::ClientError;
pub use session::{SessionClosed, SessionHandle, SessionOptions, SessionView, spawn_session};
pub use snippets::SnippetRegistry;
pub use transport::{
    GraphqlError, GraphqlRequest, GraphqlResponse, HttpTransport, LocalTransport, Transport,
};
