use std::time::Duration;

use smol_str::SmolStr;

use super::event::{
    Effect, FailedPhase, Revision, SessionError, SessionEvent, SessionNotice, TimerId,
};
use crate::token;
use crate::types::{Document, DocumentDraft, RenderResult};

/// Quiet period between the last edit and the autosave it triggers.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(650);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub quiet_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_QUIET_PERIOD,
        }
    }
}

/// Coarse lifecycle of a session, for display and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Loading,
    Ready(SyncPhase),
    Closed,
}

/// Save/render activity of a loaded document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    /// Local equals saved and the preview reflects it.
    Clean,
    /// Local edits not yet saved, nothing in flight.
    Dirty,
    /// A save of one snapshot is in flight.
    Saving,
    /// That snapshot was saved; its render is in flight.
    Rendering,
}

/// One document's editing state. See the module docs for the transitions.
#[derive(Clone, Debug)]
pub struct EditSession {
    config: SessionConfig,
    lifecycle: Lifecycle,
}

#[derive(Clone, Debug)]
enum Lifecycle {
    Idle,
    Loading { document_key: SmolStr },
    Ready(Box<ReadySession>),
    Closed,
}

#[derive(Clone, Debug)]
struct ReadySession {
    document_key: SmolStr,
    local: DocumentDraft,
    saved: DocumentDraft,
    revision: Revision,
    saved_revision: Revision,
    /// Revision shown by `preview`; `None` until the first render lands.
    rendered_revision: Option<Revision>,
    activity: Activity,
    /// A timer fired or a flush arrived while a round trip was in flight.
    save_queued: bool,
    debounce: Option<TimerId>,
    timers_issued: u64,
    preview: Option<RenderResult>,
}

#[derive(Clone, Debug)]
enum Activity {
    Clean,
    Dirty,
    Saving {
        revision: Revision,
        snapshot: DocumentDraft,
    },
    Rendering {
        revision: Revision,
    },
}

impl EditSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            lifecycle: Lifecycle::Idle,
        }
    }

    /// Pure transition: consume the current state and an event, return the
    /// next state and the effects to run.
    pub fn transition(mut self, event: SessionEvent) -> (Self, Vec<Effect>) {
        let effects = self.handle(event);
        (self, effects)
    }

    /// In-place form of [`transition`](Self::transition).
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.apply(event, &mut effects);
        effects
    }

    fn apply(&mut self, event: SessionEvent, effects: &mut Vec<Effect>) {
        if let SessionEvent::Close = event {
            self.close(effects);
            return;
        }

        match &mut self.lifecycle {
            Lifecycle::Idle => match event {
                SessionEvent::Open { document_key } => {
                    tracing::debug!(%document_key, "opening document");
                    effects.push(Effect::Load {
                        document_key: document_key.clone(),
                    });
                    self.lifecycle = Lifecycle::Loading { document_key };
                }
                other => tracing::trace!(event = ?other, "no document open, ignoring"),
            },
            Lifecycle::Loading { document_key } => match event {
                SessionEvent::Loaded { document } => {
                    let document_key = document_key.clone();
                    let ready = ReadySession::loaded(document_key, document, effects);
                    self.lifecycle = Lifecycle::Ready(Box::new(ready));
                }
                SessionEvent::LoadFailed { message } => {
                    tracing::warn!(%document_key, %message, "document load failed");
                    effects.push(Effect::Notify(SessionNotice::Failed(SessionError::new(
                        FailedPhase::Load,
                        message,
                    ))));
                    self.lifecycle = Lifecycle::Idle;
                }
                other => tracing::trace!(event = ?other, "still loading, ignoring"),
            },
            Lifecycle::Ready(ready) => ready.apply(event, &self.config, effects),
            Lifecycle::Closed => tracing::trace!(event = ?event, "session closed, discarding"),
        }
    }

    fn close(&mut self, effects: &mut Vec<Effect>) {
        if let Lifecycle::Closed = self.lifecycle {
            return;
        }
        if let Lifecycle::Ready(ready) = &mut self.lifecycle {
            ready.cancel_debounce(effects);
            if ready.local != ready.saved {
                tracing::warn!(
                    document_key = %ready.document_key,
                    revision = %ready.revision,
                    "closing with unsaved changes"
                );
            }
        }
        self.lifecycle = Lifecycle::Closed;
        effects.push(Effect::Notify(SessionNotice::Closed));
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        match &self.lifecycle {
            Lifecycle::Idle => SessionPhase::Idle,
            Lifecycle::Loading { .. } => SessionPhase::Loading,
            Lifecycle::Ready(ready) => SessionPhase::Ready(ready.sync_phase()),
            Lifecycle::Closed => SessionPhase::Closed,
        }
    }

    pub fn document_key(&self) -> Option<&SmolStr> {
        match &self.lifecycle {
            Lifecycle::Loading { document_key } => Some(document_key),
            Lifecycle::Ready(ready) => Some(&ready.document_key),
            _ => None,
        }
    }

    fn ready(&self) -> Option<&ReadySession> {
        match &self.lifecycle {
            Lifecycle::Ready(ready) => Some(ready),
            _ => None,
        }
    }

    /// The working copy, including edits not yet saved.
    pub fn local(&self) -> Option<&DocumentDraft> {
        self.ready().map(|r| &r.local)
    }

    /// The last draft the service confirmed.
    pub fn saved(&self) -> Option<&DocumentDraft> {
        self.ready().map(|r| &r.saved)
    }

    pub fn local_md(&self) -> Option<&str> {
        self.local().map(|d| d.content_md.as_str())
    }

    pub fn saved_md(&self) -> Option<&str> {
        self.saved().map(|d| d.content_md.as_str())
    }

    pub fn revision(&self) -> Option<Revision> {
        self.ready().map(|r| r.revision)
    }

    /// Last successful render. Stays put when later round trips fail.
    pub fn preview(&self) -> Option<&RenderResult> {
        self.ready().and_then(|r| r.preview.as_ref())
    }

    pub fn is_save_queued(&self) -> bool {
        self.ready().is_some_and(|r| r.save_queued)
    }

    pub fn pending_timer(&self) -> Option<TimerId> {
        self.ready().and_then(|r| r.debounce)
    }
}

impl ReadySession {
    fn loaded(
        document_key: SmolStr,
        document: Option<Document>,
        effects: &mut Vec<Effect>,
    ) -> Self {
        let existed = document.is_some();
        let draft = document.as_ref().map(Document::draft).unwrap_or_default();
        tracing::debug!(%document_key, existed, "document loaded");

        let revision = Revision::default();
        effects.push(Effect::Notify(SessionNotice::Opened {
            document_key: document_key.clone(),
            existed,
        }));
        // Show what is stored before the first edit.
        effects.push(Effect::Render {
            revision,
            document_key: document_key.clone(),
        });

        Self {
            document_key,
            local: draft.clone(),
            saved: draft,
            revision,
            saved_revision: revision,
            rendered_revision: None,
            activity: Activity::Rendering { revision },
            save_queued: false,
            debounce: None,
            timers_issued: 0,
            preview: None,
        }
    }

    fn sync_phase(&self) -> SyncPhase {
        match self.activity {
            Activity::Clean => SyncPhase::Clean,
            Activity::Dirty => SyncPhase::Dirty,
            Activity::Saving { .. } => SyncPhase::Saving,
            Activity::Rendering { .. } => SyncPhase::Rendering,
        }
    }

    fn apply(&mut self, event: SessionEvent, config: &SessionConfig, effects: &mut Vec<Effect>) {
        match event {
            SessionEvent::SetContent(content_md) => {
                if content_md != self.local.content_md {
                    self.local.content_md = content_md;
                    self.touched(config, effects);
                }
            }
            SessionEvent::SetTitle(title) => {
                if title != self.local.title {
                    self.local.title = title;
                    self.touched(config, effects);
                }
            }
            SessionEvent::SetStyleTokens(style_tokens) => {
                if style_tokens != self.local.style_tokens {
                    self.local.style_tokens = style_tokens;
                    self.touched(config, effects);
                }
            }
            SessionEvent::InsertSnippet(id) => {
                tracing::debug!(snippet = %id, "inserting snippet token");
                self.local.content_md = token::insert(&self.local.content_md, &id);
                // Confirming an insert shouldn't wait for the idle timer.
                if self.changed(effects) {
                    self.flush(effects);
                }
            }
            SessionEvent::DebounceElapsed(timer) => {
                if self.debounce != Some(timer) {
                    tracing::trace!(?timer, "stale debounce timer");
                    return;
                }
                self.debounce = None;
                self.request_save(effects);
            }
            SessionEvent::Flush => self.flush(effects),
            SessionEvent::SaveSucceeded { revision } => self.save_succeeded(revision, effects),
            SessionEvent::SaveFailed { revision, message } => {
                self.round_trip_failed(FailedPhase::Save, revision, message, effects)
            }
            SessionEvent::RenderSucceeded { revision, result } => {
                self.render_succeeded(revision, result, effects)
            }
            SessionEvent::RenderFailed { revision, message } => {
                self.round_trip_failed(FailedPhase::Render, revision, message, effects)
            }
            other @ (SessionEvent::Open { .. }
            | SessionEvent::Loaded { .. }
            | SessionEvent::LoadFailed { .. }
            | SessionEvent::Close) => {
                tracing::trace!(event = ?other, "document already open, ignoring")
            }
        }
    }

    /// Local draft changed.
    fn touched(&mut self, config: &SessionConfig, effects: &mut Vec<Effect>) {
        if self.changed(effects) {
            self.schedule_debounce(config, effects);
        }
    }

    /// Bumps the revision. Returns false when the edit restored the saved draft.
    fn changed(&mut self, effects: &mut Vec<Effect>) -> bool {
        self.revision = self.revision.next();

        if matches!(self.activity, Activity::Dirty) && self.is_settled() {
            // Edited back to exactly what is saved and shown.
            self.activity = Activity::Clean;
            self.save_queued = false;
            self.cancel_debounce(effects);
            return false;
        }
        if matches!(self.activity, Activity::Clean) {
            self.activity = Activity::Dirty;
        }
        true
    }

    fn is_settled(&self) -> bool {
        self.local == self.saved && self.rendered_revision == Some(self.saved_revision)
    }

    fn schedule_debounce(&mut self, config: &SessionConfig, effects: &mut Vec<Effect>) {
        self.timers_issued += 1;
        let timer = TimerId(self.timers_issued);
        self.debounce = Some(timer);
        effects.push(Effect::ScheduleDebounce {
            timer,
            after: config.quiet_period,
        });
    }

    fn cancel_debounce(&mut self, effects: &mut Vec<Effect>) {
        if self.debounce.take().is_some() {
            effects.push(Effect::CancelDebounce);
        }
    }

    fn flush(&mut self, effects: &mut Vec<Effect>) {
        self.cancel_debounce(effects);
        self.request_save(effects);
    }

    fn request_save(&mut self, effects: &mut Vec<Effect>) {
        match self.activity {
            Activity::Dirty => self.start_save(effects),
            Activity::Saving { .. } | Activity::Rendering { .. } => {
                tracing::debug!(revision = %self.revision, "round trip in flight, save queued");
                self.save_queued = true;
            }
            Activity::Clean => {}
        }
    }

    fn start_save(&mut self, effects: &mut Vec<Effect>) {
        // The save carries the newest text; a pending timer has nothing left to do.
        self.cancel_debounce(effects);
        let revision = self.revision;
        let snapshot = self.local.clone();
        tracing::debug!(document_key = %self.document_key, %revision, "saving");
        effects.push(Effect::Save {
            revision,
            input: snapshot.to_input(&self.document_key),
        });
        self.activity = Activity::Saving { revision, snapshot };
        self.save_queued = false;
    }

    fn save_succeeded(&mut self, revision: Revision, effects: &mut Vec<Effect>) {
        match std::mem::replace(&mut self.activity, Activity::Dirty) {
            Activity::Saving {
                revision: in_flight,
                snapshot,
            } if in_flight == revision => {
                self.saved = snapshot;
                self.saved_revision = revision;
                self.activity = Activity::Rendering { revision };
                effects.push(Effect::Notify(SessionNotice::Saved { revision }));
                effects.push(Effect::Render {
                    revision,
                    document_key: self.document_key.clone(),
                });
            }
            other => {
                self.activity = other;
                tracing::debug!(%revision, "discarding stale save result");
            }
        }
    }

    fn render_succeeded(
        &mut self,
        revision: Revision,
        result: RenderResult,
        effects: &mut Vec<Effect>,
    ) {
        match self.activity {
            Activity::Rendering {
                revision: in_flight,
            } if in_flight == revision => {
                if !result.warnings.is_empty() {
                    tracing::debug!(%revision, warnings = result.warnings.len(), "render warnings");
                }
                self.rendered_revision = Some(revision);
                self.preview = Some(result.clone());
                effects.push(Effect::Notify(SessionNotice::PreviewUpdated(result)));
                self.settle(effects);
            }
            _ => tracing::debug!(%revision, "discarding stale render result"),
        }
    }

    /// A round trip ended; pick the next phase.
    fn settle(&mut self, effects: &mut Vec<Effect>) {
        if self.local == self.saved {
            self.activity = Activity::Clean;
            self.save_queued = false;
            self.cancel_debounce(effects);
        } else if self.save_queued || self.debounce.is_none() {
            self.activity = Activity::Dirty;
            self.start_save(effects);
        } else {
            // The pending timer will pick up the remaining edits.
            self.activity = Activity::Dirty;
        }
    }

    fn round_trip_failed(
        &mut self,
        phase: FailedPhase,
        revision: Revision,
        message: String,
        effects: &mut Vec<Effect>,
    ) {
        let in_flight = match (&self.activity, phase) {
            (Activity::Saving { revision: r, .. }, FailedPhase::Save) => *r == revision,
            (Activity::Rendering { revision: r }, FailedPhase::Render) => *r == revision,
            _ => false,
        };
        if !in_flight {
            tracing::debug!(%phase, %revision, "discarding stale failure");
            return;
        }

        tracing::warn!(
            document_key = %self.document_key,
            %phase,
            %revision,
            %message,
            "round trip failed, keeping local edits"
        );
        self.activity = Activity::Dirty;
        self.save_queued = false;
        effects.push(Effect::Notify(SessionNotice::Failed(SessionError::new(
            phase, message,
        ))));
    }
}
