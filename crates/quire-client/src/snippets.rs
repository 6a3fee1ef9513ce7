//! HTML snippets attached to a document.
//!
//! The service sanitizes on every create and update and keeps the raw input
//! alongside. Only `sanitized_html` is ever meant for display.

use quire_core::{HtmlSnippet, SnippetId, UpsertHtmlSnippetInput, ValidationError};
use serde_json::json;
use smol_str::SmolStr;

use crate::client::EditorClient;
use crate::error::ClientError;
use crate::transport::{GraphqlRequest, Transport};

pub(crate) const UPSERT_SNIPPET_MUTATION: &str = "mutation UpsertSnippet($input: UpsertHtmlSnippetInput!) { upsertHtmlSnippet(input: $input) { id documentId name rawHtml sanitizedHtml warnings createdAt updatedAt } }";

pub(crate) const DELETE_SNIPPET_MUTATION: &str = "mutation DeleteSnippet($documentKey: String!, $snippetId: ID!) { deleteHtmlSnippet(documentKey: $documentKey, snippetId: $snippetId) }";

pub(crate) const SNIPPETS_QUERY: &str = "query Snippets($documentKey: String!) { snippets(documentKey: $documentKey) { id documentId name rawHtml sanitizedHtml warnings createdAt updatedAt } }";

/// Snippet operations for one document, from [`EditorClient::snippets`].
#[derive(Debug)]
pub struct SnippetRegistry<'a, T> {
    client: &'a EditorClient<T>,
    document_key: SmolStr,
}

impl<'a, T: Transport + Sync> SnippetRegistry<'a, T> {
    pub(crate) fn new(client: &'a EditorClient<T>, document_key: SmolStr) -> Self {
        Self {
            client,
            document_key,
        }
    }

    pub fn document_key(&self) -> &SmolStr {
        &self.document_key
    }

    /// Store a new snippet. The returned warnings describe what sanitization
    /// removed; they never block creation.
    pub async fn create(
        &self,
        raw_html: &str,
        name: Option<&str>,
    ) -> Result<HtmlSnippet, ClientError> {
        require_html(raw_html)?;
        let snippet = self
            .upsert(UpsertHtmlSnippetInput {
                document_key: self.document_key.clone(),
                snippet_id: None,
                name: name.map(str::to_owned),
                raw_html: raw_html.to_owned(),
            })
            .await?;
        tracing::debug!(
            document_key = %self.document_key,
            snippet = %snippet.id,
            warnings = snippet.warnings.len(),
            "snippet created"
        );
        Ok(snippet)
    }

    /// Change the HTML, the name, or both.
    ///
    /// The service replaces both fields on every upsert, so an omitted one is
    /// filled in from the stored snippet first.
    pub async fn update(
        &self,
        id: &SnippetId,
        raw_html: Option<&str>,
        name: Option<&str>,
    ) -> Result<HtmlSnippet, ClientError> {
        let (raw_html, name) = match (raw_html, name) {
            (None, None) => {
                return Err(ClientError::Validation(
                    "nothing to update: give new HTML, a new name, or both".into(),
                ));
            }
            (Some(raw_html), Some(name)) => (raw_html.to_owned(), Some(name.to_owned())),
            (raw_html, name) => {
                let current = self.get(id).await?.ok_or_else(|| {
                    ClientError::Validation(format!(
                        "no snippet {id} in document {}",
                        self.document_key
                    ))
                })?;
                (
                    raw_html.map_or(current.raw_html, str::to_owned),
                    name.map(str::to_owned).or(current.name),
                )
            }
        };
        require_html(&raw_html)?;

        let snippet = self
            .upsert(UpsertHtmlSnippetInput {
                document_key: self.document_key.clone(),
                snippet_id: Some(id.clone()),
                name,
                raw_html,
            })
            .await?;
        if &snippet.id != id {
            tracing::warn!(requested = %id, stored = %snippet.id, "service stored update as a new snippet");
        }
        Ok(snippet)
    }

    /// Whether the snippet existed. Tokens referencing it are left alone.
    pub async fn delete(&self, id: &SnippetId) -> Result<bool, ClientError> {
        let request = GraphqlRequest::new(
            "DeleteSnippet",
            DELETE_SNIPPET_MUTATION,
            json!({ "documentKey": self.document_key, "snippetId": id }),
        );
        let deleted = self.client.call(request, "deleteHtmlSnippet").await?;
        tracing::debug!(document_key = %self.document_key, snippet = %id, deleted, "snippet delete");
        Ok(deleted)
    }

    /// All snippets of the document, in the service's order.
    pub async fn list(&self) -> Result<Vec<HtmlSnippet>, ClientError> {
        let request = GraphqlRequest::new(
            "Snippets",
            SNIPPETS_QUERY,
            json!({ "documentKey": self.document_key }),
        );
        self.client.call(request, "snippets").await
    }

    pub async fn get(&self, id: &SnippetId) -> Result<Option<HtmlSnippet>, ClientError> {
        Ok(self.list().await?.into_iter().find(|s| &s.id == id))
    }

    async fn upsert(&self, input: UpsertHtmlSnippetInput) -> Result<HtmlSnippet, ClientError> {
        let request = GraphqlRequest::new(
            "UpsertSnippet",
            UPSERT_SNIPPET_MUTATION,
            json!({ "input": input }),
        );
        self.client.call(request, "upsertHtmlSnippet").await
    }
}

fn require_html(raw_html: &str) -> Result<(), ValidationError> {
    if raw_html.trim().is_empty() {
        return Err(ValidationError::EmptySnippetHtml);
    }
    Ok(())
}
