//! Errors for locally detectable bad input.

use thiserror::Error;

/// Input rejected before anything is sent to the service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// Snippet ids must contain at least one character.
    #[error("snippet id must not be empty")]
    EmptySnippetId,

    /// Snippet ids are restricted to ASCII letters, digits, `-` and `_`.
    #[error("invalid character {ch:?} in snippet id {id:?}")]
    InvalidSnippetId { id: String, ch: char },

    /// Snippet HTML was empty or whitespace only.
    #[error("snippet HTML must not be empty")]
    EmptySnippetHtml,
}
