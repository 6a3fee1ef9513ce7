//! Typed document operations.

use quire_core::{Document, RenderResult, UpsertDocumentInput};
use serde_json::json;
use smol_str::SmolStr;

use crate::config::Config;
use crate::error::ClientError;
use crate::snippets::SnippetRegistry;
use crate::transport::{GraphqlRequest, HttpTransport, Transport};

const DOCUMENT_QUERY: &str = "query Doc($documentKey: String!) { document(documentKey: $documentKey) { documentKey title contentMd styleTokens themeKey createdAt updatedAt } }";

const SAVE_MUTATION: &str = "mutation Save($input: UpsertDocumentInput!) { upsertDocument(input: $input) { documentKey title contentMd styleTokens themeKey createdAt updatedAt } }";

const RENDER_QUERY: &str = "query Render($documentKey: String!) { render(documentKey: $documentKey) { contentHtml contentText themeCss warnings } }";

/// Document operations against one service endpoint.
#[derive(Debug, Clone)]
pub struct EditorClient<T> {
    transport: T,
}

impl EditorClient<HttpTransport> {
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(
            config.endpoint.clone(),
            config.api_key.clone(),
            config.request_timeout(),
        )?;
        Ok(Self::new(transport))
    }
}

impl<T: Transport + Sync> EditorClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) async fn call<R: serde::de::DeserializeOwned>(
        &self,
        request: GraphqlRequest,
        field: &str,
    ) -> Result<R, ClientError> {
        let operation = request.operation_name.clone();
        let result = self.transport.execute(request).await?.into_field(field);
        if let Err(err) = &result {
            tracing::debug!(%operation, error = %err, "operation failed");
        }
        result
    }

    /// `None` when no document with this key exists yet.
    pub async fn load_document(&self, document_key: &str) -> Result<Option<Document>, ClientError> {
        let request = GraphqlRequest::new(
            "Doc",
            DOCUMENT_QUERY,
            json!({ "documentKey": document_key }),
        );
        self.call(request, "document").await
    }

    /// Create or replace the document's editable fields.
    pub async fn save_document(&self, input: &UpsertDocumentInput) -> Result<Document, ClientError> {
        let request = GraphqlRequest::new("Save", SAVE_MUTATION, json!({ "input": input }));
        self.call(request, "upsertDocument").await
    }

    /// Render the stored version of the document.
    pub async fn render(&self, document_key: &str) -> Result<RenderResult, ClientError> {
        let request = GraphqlRequest::new(
            "Render",
            RENDER_QUERY,
            json!({ "documentKey": document_key }),
        );
        self.call(request, "render").await
    }

    /// Snippet operations scoped to one document.
    pub fn snippets(&self, document_key: impl Into<SmolStr>) -> SnippetRegistry<'_, T> {
        SnippetRegistry::new(self, document_key.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT_FIELDS: &str =
        "documentKey title contentMd styleTokens themeKey createdAt updatedAt";
    const SNIPPET_FIELDS: &str =
        "id documentId name rawHtml sanitizedHtml warnings createdAt updatedAt";

    #[test]
    fn test_queries_select_every_field() {
        assert!(DOCUMENT_QUERY.contains(DOCUMENT_FIELDS));
        assert!(SAVE_MUTATION.contains(DOCUMENT_FIELDS));
        assert!(crate::snippets::UPSERT_SNIPPET_MUTATION.contains(SNIPPET_FIELDS));
        assert!(crate::snippets::SNIPPETS_QUERY.contains(SNIPPET_FIELDS));
    }
}
