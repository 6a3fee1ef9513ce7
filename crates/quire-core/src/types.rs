//! Document, snippet and render types exchanged with the editor service.
//!
//! Field names follow the service's camelCase GraphQL schema. Every struct is
//! strict about required fields so a malformed response fails at decode time
//! instead of leaking half-filled values into the session.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use smol_str::SmolStr;

use crate::error::ValidationError;

/// Partial theme overrides as stored on a document.
///
/// Keys outside the recognized theme set are kept verbatim; the theme
/// resolver ignores them.
pub type StyleTokens = BTreeMap<String, String>;

/// Server-assigned identifier of an HTML snippet.
///
/// Restricted to `[A-Za-z0-9_-]` so it can be embedded in a snippet token
/// without escaping. UUIDs qualify.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SnippetId(SmolStr);

impl SnippetId {
    pub fn new(id: impl AsRef<str>) -> Result<Self, ValidationError> {
        let id = id.as_ref();
        if id.is_empty() {
            return Err(ValidationError::EmptySnippetId);
        }
        if let Some(ch) = id.chars().find(|c| !is_id_char(*c)) {
            return Err(ValidationError::InvalidSnippetId {
                id: id.to_owned(),
                ch,
            });
        }
        Ok(Self(SmolStr::new(id)))
    }

    /// Wrap text already matched by the token grammar.
    pub(crate) fn from_matched(id: &str) -> Self {
        Self(SmolStr::new(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub(crate) fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

impl fmt::Display for SnippetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SnippetId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SnippetId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SnippetId> for String {
    fn from(id: SnippetId) -> Self {
        id.0.to_string()
    }
}

impl AsRef<str> for SnippetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Informational message attached to a snippet or a render.
///
/// Only `message` is interpreted; everything else the service sends along
/// (location, severity, ...) is carried through untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<SmolStr>,
    pub message: String,
    #[serde(flatten)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl Warning {
    pub fn new(code: impl Into<SmolStr>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            details: BTreeMap::new(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// A stored document as returned by the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub document_key: SmolStr,
    #[serde(default)]
    pub title: Option<String>,
    pub content_md: String,
    #[serde(default, deserialize_with = "lenient_style_tokens")]
    pub style_tokens: StyleTokens,
    #[serde(default)]
    pub theme_key: Option<SmolStr>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// The editable part of this document.
    pub fn draft(&self) -> DocumentDraft {
        DocumentDraft {
            title: self.title.clone(),
            content_md: self.content_md.clone(),
            style_tokens: self.style_tokens.clone(),
            theme_key: self.theme_key.clone(),
        }
    }
}

/// Everything a user can change about a document.
///
/// One value of this type is one snapshot: the session saves whole drafts,
/// never a mix of fields from different edits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentDraft {
    pub title: Option<String>,
    pub content_md: String,
    pub style_tokens: StyleTokens,
    pub theme_key: Option<SmolStr>,
}

impl DocumentDraft {
    pub fn to_input(&self, document_key: &SmolStr) -> UpsertDocumentInput {
        UpsertDocumentInput {
            document_key: document_key.clone(),
            title: self.title.clone(),
            content_md: self.content_md.clone(),
            style_tokens: Some(self.style_tokens.clone()),
            theme_key: self.theme_key.clone(),
        }
    }
}

/// A sanitized HTML fragment owned by a document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlSnippet {
    pub id: SnippetId,
    pub document_id: SmolStr,
    #[serde(default)]
    pub name: Option<String>,
    /// Author input. Never rendered.
    pub raw_html: String,
    /// The only HTML that may be displayed for this snippet.
    pub sanitized_html: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub warnings: Vec<Warning>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Output of the service's render query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResult {
    pub content_html: String,
    pub content_text: String,
    pub theme_css: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub warnings: Vec<Warning>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertDocumentInput {
    pub document_key: SmolStr,
    pub title: Option<String>,
    pub content_md: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_tokens: Option<StyleTokens>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_key: Option<SmolStr>,
}

/// `snippet_id` present means update, absent means create.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertHtmlSnippetInput {
    pub document_key: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet_id: Option<SnippetId>,
    pub name: Option<String>,
    pub raw_html: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Style tokens are free-form JSON on the service side. Scalars are kept as
/// strings, anything nested is dropped.
fn lenient_style_tokens<'de, D>(deserializer: D) -> Result<StyleTokens, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key, value))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snippet_id_accepts_uuids() {
        let id = SnippetId::new("3f2b8c1e-9a4d-4e6f-8b2a-1c3d5e7f9a0b").unwrap();
        assert_eq!(id.as_str(), "3f2b8c1e-9a4d-4e6f-8b2a-1c3d5e7f9a0b");
    }

    #[test]
    fn test_snippet_id_rejects_token_breaking_characters() {
        assert_eq!(SnippetId::new(""), Err(ValidationError::EmptySnippetId));
        assert_eq!(
            SnippetId::new("abc]]def"),
            Err(ValidationError::InvalidSnippetId {
                id: "abc]]def".into(),
                ch: ']'
            })
        );
    }

    #[test]
    fn test_document_decodes_numeric_style_tokens() {
        let doc: Document = serde_json::from_value(json!({
            "documentKey": "notes",
            "title": null,
            "contentMd": "# Hi",
            "styleTokens": { "fontSize": 18, "textColor": "#222", "nested": { "a": 1 } },
            "themeKey": "default",
            "createdAt": "2025-03-01T10:00:00+00:00",
            "updatedAt": "2025-03-01T10:05:00.123456+00:00"
        }))
        .unwrap();

        assert_eq!(doc.style_tokens.get("fontSize").map(String::as_str), Some("18"));
        assert_eq!(doc.style_tokens.get("textColor").map(String::as_str), Some("#222"));
        assert!(!doc.style_tokens.contains_key("nested"));
    }

    #[test]
    fn test_document_with_null_style_tokens_is_empty() {
        let doc: Document = serde_json::from_value(json!({
            "documentKey": "notes",
            "contentMd": "",
            "styleTokens": null,
            "createdAt": "2025-03-01T10:00:00Z",
            "updatedAt": "2025-03-01T10:00:00Z"
        }))
        .unwrap();
        assert!(doc.style_tokens.is_empty());
        assert_eq!(doc.theme_key, None);
    }

    #[test]
    fn test_document_missing_content_fails_to_decode() {
        let result: Result<Document, _> = serde_json::from_value(json!({
            "documentKey": "notes",
            "createdAt": "2025-03-01T10:00:00Z",
            "updatedAt": "2025-03-01T10:00:00Z"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_warning_keeps_unknown_fields() {
        let warning: Warning = serde_json::from_value(json!({
            "code": "IFRAME_BLOCKED",
            "message": "Iframe src host not allowed.",
            "line": 3
        }))
        .unwrap();
        assert_eq!(warning.details.get("line"), Some(&json!(3)));
        assert_eq!(
            warning.to_string(),
            "[IFRAME_BLOCKED] Iframe src host not allowed."
        );
    }

    #[test]
    fn test_snippet_input_omits_absent_id() {
        let input = UpsertHtmlSnippetInput {
            document_key: "notes".into(),
            snippet_id: None,
            name: None,
            raw_html: "<b>x</b>".into(),
        };
        assert_eq!(
            serde_json::to_value(&input).unwrap(),
            json!({ "documentKey": "notes", "name": null, "rawHtml": "<b>x</b>" })
        );
    }
}
