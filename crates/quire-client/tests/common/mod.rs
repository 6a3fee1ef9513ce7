//! In-memory stand-in for the editor service.
//!
//! Dispatches on the GraphQL operation name, keeps documents and snippets in
//! a map, renders by splicing snippet HTML into paragraphs, and records every
//! request so tests can check ordering, timing and concurrency.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use quire_client::{ClientError, GraphqlRequest, GraphqlResponse, Transport};
use quire_core::{Document, HtmlSnippet, RenderResult, SnippetId, StyleTokens, Warning, token};
use quire_renderer::{PreviewRenderer, theme};
use serde_json::{Value, json};
use smol_str::SmolStr;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Request {
    pub operation: SmolStr,
    pub variables: Value,
    pub at: Instant,
}

#[derive(Debug, Clone)]
pub struct Save {
    pub content_md: String,
    pub title: Option<String>,
    pub style_tokens: StyleTokens,
    pub at: Instant,
}

#[derive(Default)]
struct State {
    documents: HashMap<SmolStr, Document>,
    snippets: Vec<HtmlSnippet>,
    next_snippet: u64,
    latency: Duration,
    failures: HashMap<SmolStr, usize>,
    requests: Vec<Request>,
    saves: Vec<Save>,
    in_flight: usize,
    max_in_flight: usize,
}

#[derive(Clone, Default)]
pub struct FakeService {
    state: Arc<Mutex<State>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn with_document(self, key: &str, content_md: &str) -> Self {
        let at = Utc.timestamp_opt(1_740_000_000, 0).unwrap();
        self.state().documents.insert(
            key.into(),
            Document {
                document_key: key.into(),
                title: None,
                content_md: content_md.into(),
                style_tokens: StyleTokens::new(),
                theme_key: None,
                created_at: at,
                updated_at: at,
            },
        );
        self
    }

    pub fn with_snippet(self, key: &str, id: &str, raw_html: &str) -> Self {
        let at = Utc.timestamp_opt(1_740_000_000, 0).unwrap();
        self.state().snippets.push(HtmlSnippet {
            id: SnippetId::new(id).unwrap(),
            document_id: key.into(),
            name: None,
            raw_html: raw_html.into(),
            sanitized_html: PreviewRenderer::default().sanitize(raw_html),
            warnings: vec![],
            created_at: at,
            updated_at: at,
        });
        self
    }

    /// Every request takes this long to answer.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state().latency = latency;
        self
    }

    /// The next `times` requests for `operation` fail with a transport error.
    pub fn fail_next(&self, operation: &str, times: usize) {
        self.state().failures.insert(operation.into(), times);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state().requests.clone()
    }

    pub fn operations(&self) -> Vec<SmolStr> {
        self.state()
            .requests
            .iter()
            .map(|r| r.operation.clone())
            .collect()
    }

    /// Successful saves, oldest first.
    pub fn saves(&self) -> Vec<Save> {
        self.state().saves.clone()
    }

    pub fn saved_contents(&self) -> Vec<String> {
        self.saves().into_iter().map(|s| s.content_md).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    pub fn document(&self, key: &str) -> Option<Document> {
        self.state().documents.get(key).cloned()
    }

    fn enter(&self, request: &GraphqlRequest) -> (Duration, bool) {
        let mut state = self.state();
        state.requests.push(Request {
            operation: request.operation_name.clone(),
            variables: request.variables.clone(),
            at: Instant::now(),
        });
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);
        let fail = match state.failures.get_mut(&request.operation_name) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        };
        (state.latency, fail)
    }

    fn dispatch(&self, request: &GraphqlRequest) -> GraphqlResponse {
        let mut state = self.state();
        let key: SmolStr = request
            .var_str("documentKey")
            .or_else(|| request.variables["input"]["documentKey"].as_str())
            .unwrap_or_default()
            .into();

        match request.operation_name.as_str() {
            "Doc" => {
                let document = state.documents.get(&key);
                GraphqlResponse::with_data(json!({ "document": document }))
            }
            "Save" => {
                let input = &request.variables["input"];
                let now = Utc::now();
                let style_tokens: StyleTokens =
                    serde_json::from_value(input["styleTokens"].clone()).unwrap_or_default();
                let document = state
                    .documents
                    .entry(key.clone())
                    .or_insert_with(|| Document {
                        document_key: key.clone(),
                        title: None,
                        content_md: String::new(),
                        style_tokens: StyleTokens::new(),
                        theme_key: None,
                        created_at: now,
                        updated_at: now,
                    });
                document.title = input["title"].as_str().map(str::to_owned);
                document.content_md = input["contentMd"].as_str().unwrap_or_default().to_owned();
                document.style_tokens = style_tokens.clone();
                document.updated_at = now;
                let response = json!({ "upsertDocument": document });
                let save = Save {
                    content_md: document.content_md.clone(),
                    title: document.title.clone(),
                    style_tokens,
                    at: Instant::now(),
                };
                state.saves.push(save);
                GraphqlResponse::with_data(response)
            }
            "Render" => {
                let result = match state.documents.get(&key) {
                    Some(document) => render(document, &state.snippets),
                    None => RenderResult {
                        content_html: String::new(),
                        content_text: String::new(),
                        theme_css: theme::resolve(&StyleTokens::new()).css,
                        warnings: vec![Warning::new("NOT_FOUND", "Document not found")],
                    },
                };
                GraphqlResponse::with_data(json!({ "render": result }))
            }
            "UpsertSnippet" => {
                let input = &request.variables["input"];
                let raw_html = input["rawHtml"].as_str().unwrap_or_default().to_owned();
                let name = input["name"].as_str().map(str::to_owned);
                let sanitized_html = PreviewRenderer::default().sanitize(&raw_html);
                let mut warnings = vec![];
                if raw_html.to_lowercase().contains("<script") {
                    warnings.push(Warning::new(
                        "SCRIPT_STRIPPED",
                        "Script tags are not allowed and were stripped.",
                    ));
                }
                let now = Utc::now();
                let existing = input["snippetId"].as_str().and_then(|id| {
                    state
                        .snippets
                        .iter()
                        .position(|s| s.id.as_str() == id && s.document_id == key)
                });
                let snippet = match existing {
                    Some(index) => {
                        let snippet = &mut state.snippets[index];
                        snippet.name = name;
                        snippet.raw_html = raw_html;
                        snippet.sanitized_html = sanitized_html;
                        snippet.warnings = warnings;
                        snippet.updated_at = now;
                        snippet.clone()
                    }
                    None => {
                        state.next_snippet += 1;
                        let snippet = HtmlSnippet {
                            id: SnippetId::new(format!("snip-{}", state.next_snippet)).unwrap(),
                            document_id: key.clone(),
                            name,
                            raw_html,
                            sanitized_html,
                            warnings,
                            created_at: now,
                            updated_at: now,
                        };
                        state.snippets.push(snippet.clone());
                        snippet
                    }
                };
                GraphqlResponse::with_data(json!({ "upsertHtmlSnippet": snippet }))
            }
            "DeleteSnippet" => {
                let id = request.var_str("snippetId").unwrap_or_default();
                let before = state.snippets.len();
                state
                    .snippets
                    .retain(|s| !(s.id.as_str() == id && s.document_id == key));
                let deleted = state.snippets.len() != before;
                GraphqlResponse::with_data(json!({ "deleteHtmlSnippet": deleted }))
            }
            "Snippets" => {
                let snippets: Vec<&HtmlSnippet> = state
                    .snippets
                    .iter()
                    .filter(|s| s.document_id == key)
                    .collect();
                GraphqlResponse::with_data(json!({ "snippets": snippets }))
            }
            other => GraphqlResponse::with_error(format!("unknown operation {other}")),
        }
    }
}

/// Paragraphs become `<p>`, snippet tokens become their sanitized HTML,
/// unknown tokens vanish with a warning.
fn render(document: &Document, snippets: &[HtmlSnippet]) -> RenderResult {
    let mut warnings = vec![];
    let mut blocks = vec![];
    for block in document.content_md.split("\n\n") {
        let mut block = block.trim().to_owned();
        if block.is_empty() {
            continue;
        }
        let ids: Vec<SnippetId> = token::decode(&block).collect();
        for id in ids {
            let replacement = match snippets
                .iter()
                .find(|s| s.id == id && s.document_id == document.document_key)
            {
                Some(snippet) => snippet.sanitized_html.clone(),
                None => {
                    warnings.push(Warning::new(
                        "MISSING_SNIPPET",
                        format!("Missing snippet: {id}"),
                    ));
                    String::new()
                }
            };
            block = block.replacen(&token::encode(&id), &replacement, 1);
        }
        if block.is_empty() {
            continue;
        }
        if block.starts_with('<') {
            blocks.push(block);
        } else {
            blocks.push(format!("<p>{block}</p>"));
        }
    }
    let content_html = blocks.concat();
    RenderResult {
        content_text: content_html.clone(),
        content_html,
        theme_css: theme::resolve(&document.style_tokens).css,
        warnings,
    }
}

impl Transport for FakeService {
    async fn execute(&self, request: GraphqlRequest) -> Result<GraphqlResponse, ClientError> {
        let (latency, fail) = self.enter(&request);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let response = if fail {
            Err(ClientError::Transport("connection reset by peer".into()))
        } else {
            Ok(self.dispatch(&request))
        };
        self.state().in_flight -= 1;
        response
    }
}
