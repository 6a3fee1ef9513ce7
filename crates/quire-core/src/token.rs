//! Snippet reference tokens.
//!
//! A snippet is referenced from Markdown with `[[html_snippet:<id>]]`. The
//! double brackets never form a valid Markdown link on their own, so a token
//! survives sitting between paragraphs or on a line by itself, and it can be
//! found with a plain scan instead of a Markdown parse. The service's
//! renderer only resolves the ids it assigns (UUIDs) and splices in their
//! sanitized HTML; other ids that fit this grammar stay literal text there.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::SnippetId;

pub const TOKEN_PREFIX: &str = "[[html_snippet:";
pub const TOKEN_SUFFIX: &str = "]]";

pub static SNIPPET_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[html_snippet:([A-Za-z0-9_-]+)\]\]").unwrap());

/// Token text for `id`. Same id, same bytes.
pub fn encode(id: &SnippetId) -> String {
    format!("{}{}{}", TOKEN_PREFIX, id.as_str(), TOKEN_SUFFIX)
}

/// Snippet ids referenced in `text`, left to right, duplicates included.
///
/// The iterator is lazy and `Clone`, so it can be restarted from any point.
/// Truncated or otherwise malformed tokens are skipped.
pub fn decode(text: &str) -> SnippetRefs<'_> {
    SnippetRefs { text, pos: 0 }
}

/// Iterator returned by [`decode`].
#[derive(Clone, Debug)]
pub struct SnippetRefs<'a> {
    text: &'a str,
    pos: usize,
}

impl Iterator for SnippetRefs<'_> {
    type Item = SnippetId;

    fn next(&mut self) -> Option<SnippetId> {
        if self.pos >= self.text.len() {
            return None;
        }
        let caps = SNIPPET_TOKEN_RE.captures_at(self.text, self.pos)?;
        let (whole, id) = (caps.get(0)?, caps.get(1)?);
        self.pos = whole.end();
        Some(SnippetId::from_matched(id.as_str()))
    }
}

impl std::iter::FusedIterator for SnippetRefs<'_> {}

/// Append a token for `id` as its own block.
///
/// `text` is kept as is and becomes a prefix of the result. The token goes
/// after a blank line and is followed by a newline, so lists, headings and
/// fences above it stay intact. Only the newlines needed to reach a blank
/// line are added, so repeated inserts don't pile up blank lines. Empty text
/// yields just the token.
pub fn insert(text: &str, id: &SnippetId) -> String {
    let token = encode(id);
    if text.is_empty() {
        return token;
    }
    let separator = if text.ends_with("\n\n") {
        ""
    } else if text.ends_with('\n') {
        "\n"
    } else {
        "\n\n"
    };
    format!("{text}{separator}{token}\n")
}

pub fn contains(text: &str, id: &SnippetId) -> bool {
    decode(text).any(|found| &found == id)
}

/// Drop every token for `id`.
///
/// A token on a line of its own takes the line and the blank separator line
/// above it along, undoing [`insert`]. Inline occurrences are cut out.
pub fn remove(text: &str, id: &SnippetId) -> String {
    let token = encode(id);
    let mut kept: Vec<String> = Vec::new();
    for line in text.split_inclusive('\n') {
        if line.trim() == token {
            if kept.last().is_some_and(|prev| prev.trim().is_empty()) {
                kept.pop();
            }
            continue;
        }
        kept.push(line.replace(&token, ""));
    }
    kept.concat()
}

/// Ids referenced in `text` that are missing from `known`.
///
/// Each id is reported once, in order of first appearance. The service
/// renders such references as nothing plus a warning; this lets a caller
/// surface them before a round trip.
pub fn dangling<'a>(text: &str, known: impl IntoIterator<Item = &'a SnippetId>) -> Vec<SnippetId> {
    let known: HashSet<&SnippetId> = known.into_iter().collect();
    let mut seen = HashSet::new();
    decode(text)
        .filter(|id| !known.contains(id))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
