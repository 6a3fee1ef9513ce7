//! Inputs and outputs of the edit session.

use std::fmt;
use std::time::Duration;

use smol_str::SmolStr;
use thiserror::Error;

use crate::types::{Document, RenderResult, SnippetId, StyleTokens, UpsertDocumentInput};

/// Counter bumped by every local mutation within one session.
///
/// Save and render requests carry the revision of the snapshot they were
/// issued for; results for any other revision are discarded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(pub u64);

impl Revision {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Handle of one scheduled debounce timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// Start loading a document.
    Open { document_key: SmolStr },
    /// Load finished. `None` means the document does not exist yet.
    Loaded { document: Option<Document> },
    LoadFailed { message: String },

    /// Replace the Markdown body.
    SetContent(String),
    SetTitle(Option<String>),
    SetStyleTokens(StyleTokens),
    /// Append a reference to a stored snippet and save right away.
    InsertSnippet(SnippetId),

    /// A scheduled debounce timer fired.
    DebounceElapsed(TimerId),
    /// Save now instead of waiting for the quiet period. Also the retry path
    /// after a failure.
    Flush,

    SaveSucceeded { revision: Revision },
    SaveFailed { revision: Revision, message: String },
    RenderSucceeded { revision: Revision, result: RenderResult },
    RenderFailed { revision: Revision, message: String },

    Close,
}

/// Work requested by the session.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Load {
        document_key: SmolStr,
    },
    /// Fire `DebounceElapsed(timer)` after `after`. Replaces any earlier timer.
    ScheduleDebounce {
        timer: TimerId,
        after: Duration,
    },
    CancelDebounce,
    Save {
        revision: Revision,
        input: UpsertDocumentInput,
    },
    /// Only ever issued right after the save of `revision` was confirmed.
    Render {
        revision: Revision,
        document_key: SmolStr,
    },
    Notify(SessionNotice),
}

/// Things the hosting UI may want to show.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionNotice {
    Opened { document_key: SmolStr, existed: bool },
    Saved { revision: Revision },
    PreviewUpdated(RenderResult),
    Failed(SessionError),
    Closed,
}

/// Which step of a round trip failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailedPhase {
    Load,
    Save,
    Render,
}

impl fmt::Display for FailedPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailedPhase::Load => "load",
            FailedPhase::Save => "save",
            FailedPhase::Render => "render",
        })
    }
}

/// A load, save or render round trip failed. Local edits are kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{phase} failed: {message}")]
pub struct SessionError {
    pub phase: FailedPhase,
    pub message: String,
}

impl SessionError {
    pub fn new(phase: FailedPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
        }
    }
}
