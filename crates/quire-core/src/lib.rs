//! quire-core: framework-agnostic document editing logic.
//!
//! This crate provides:
//! - Wire types for documents, snippets and render results (`types`)
//! - `[[html_snippet:<id>]]` reference tokens embedded in Markdown (`token`)
//! - `EditSession`, the save/render state machine driven by events (`session`)
//!
//! Nothing here performs I/O. The session emits [`session::Effect`]s that a
//! driver (see `quire-client`) executes, feeding results back in as events.

pub mod error;
pub mod session;
pub mod token;
pub mod types;

pub use error::ValidationError;
pub use session::{
    DEFAULT_QUIET_PERIOD, EditSession, Effect, FailedPhase, Revision, SessionConfig,
    SessionError, SessionEvent, SessionNotice, SessionPhase, SyncPhase, TimerId,
};
pub use smol_str::SmolStr;
pub use token::SnippetRefs;
pub use types::{
    Document, DocumentDraft, HtmlSnippet, RenderResult, SnippetId, StyleTokens,
    UpsertDocumentInput, UpsertHtmlSnippetInput, Warning,
};
