//! Async driver for [`EditSession`].
//!
//! One tokio task per open document. It feeds user commands and round-trip
//! results to the state machine one at a time, runs the effects the machine
//! asks for, and publishes a [`SessionView`] after every step.
//!
//! ```ignore
//! let client = Arc::new(EditorClient::from_config(&config)?);
//! let (session, mut notices) = spawn_session(client, SessionOptions::from(&config), "notes");
//! session.set_content("# Notes\n\nFirst line")?;
//! let view = session.settled().await;
//! println!("{}", view.preview.to_html());
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use quire_core::{
    DocumentDraft, EditSession, Effect, Revision, SessionConfig, SessionError, SessionEvent,
    SessionNotice, SessionPhase, SnippetId, StyleTokens, SyncPhase, Warning,
};
use quire_renderer::{PreviewFrame, PreviewRenderer, SanitizerConfig, theme};
use smol_str::SmolStr;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::client::EditorClient;
use crate::config::Config;
use crate::transport::Transport;

/// Returned by [`SessionHandle`] methods once the session task has stopped.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("edit session is closed")]
pub struct SessionClosed;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub session: SessionConfig,
    pub sanitizer: SanitizerConfig,
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            session: config.session_config(),
            sanitizer: config.sanitizer(),
        }
    }
}

/// Read-only snapshot of a session, republished after every step.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub document_key: SmolStr,
    pub phase: SessionPhase,
    pub revision: Option<Revision>,
    pub local: Option<DocumentDraft>,
    pub saved: Option<DocumentDraft>,
    pub save_queued: bool,
    /// An autosave timer is armed and will start a save when it fires.
    pub autosave_pending: bool,
    /// Sanitized HTML and the stylesheet to show it with.
    pub preview: PreviewFrame,
    /// Warnings of the last successful render.
    pub warnings: Vec<Warning>,
    /// Set by a failed round trip, cleared by the next edit, flush or save.
    pub last_error: Option<SessionError>,
    /// Handle commands processed so far, the initial open included.
    pub commands_applied: u64,
}

impl SessionView {
    /// Nothing left to do until the user acts: everything is saved and
    /// rendered, a round trip failed with no save armed behind it, or the
    /// session is over.
    pub fn is_settled(&self) -> bool {
        if self.autosave_pending || self.save_queued {
            return false;
        }
        match self.phase {
            SessionPhase::Ready(SyncPhase::Clean) | SessionPhase::Closed => true,
            SessionPhase::Ready(SyncPhase::Dirty) | SessionPhase::Idle => self.last_error.is_some(),
            _ => false,
        }
    }

    pub fn local_md(&self) -> Option<&str> {
        self.local.as_ref().map(|d| d.content_md.as_str())
    }

    pub fn saved_md(&self) -> Option<&str> {
        self.saved.as_ref().map(|d| d.content_md.as_str())
    }
}

/// Controls one running session. Dropping it closes the session.
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionEvent>,
    commands_sent: AtomicU64,
    view: watch::Receiver<SessionView>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    fn send(&self, event: SessionEvent) -> Result<(), SessionClosed> {
        self.commands.send(event).map_err(|_| SessionClosed)?;
        self.commands_sent.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Replace the Markdown body. Saved after the quiet period.
    pub fn set_content(&self, content_md: impl Into<String>) -> Result<(), SessionClosed> {
        self.send(SessionEvent::SetContent(content_md.into()))
    }

    pub fn set_title(&self, title: Option<String>) -> Result<(), SessionClosed> {
        self.send(SessionEvent::SetTitle(title))
    }

    /// Replace the style overrides. The preview stylesheet updates at once.
    pub fn set_style_tokens(&self, tokens: StyleTokens) -> Result<(), SessionClosed> {
        self.send(SessionEvent::SetStyleTokens(tokens))
    }

    /// Append a token for an existing snippet and save without waiting.
    pub fn insert_snippet(&self, id: SnippetId) -> Result<(), SessionClosed> {
        self.send(SessionEvent::InsertSnippet(id))
    }

    /// Save now. Also how a failed save is retried.
    pub fn flush(&self) -> Result<(), SessionClosed> {
        self.send(SessionEvent::Flush)
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Wait until every command sent so far has been applied and
    /// [`SessionView::is_settled`] holds, then return that view.
    pub async fn settled(&self) -> SessionView {
        let sent = self.commands_sent.load(Ordering::Acquire);
        self.wait_for(|view| view.commands_applied >= sent && view.is_settled())
            .await
    }

    /// Wait for the first view matching `condition`, checking the current
    /// one first. Returns the last view if the session stops before that.
    pub async fn wait_for(&self, condition: impl FnMut(&SessionView) -> bool) -> SessionView {
        let mut view = self.view.clone();
        let found = view.wait_for(condition).await.map(|v| SessionView::clone(&v));
        match found {
            Ok(found) => found,
            Err(_) => view.borrow().clone(),
        }
    }

    /// Close the session and wait for its task to stop. Requests still in
    /// flight finish on their own; their results are dropped.
    pub async fn close(self) -> SessionView {
        let SessionHandle {
            commands,
            view,
            task,
            ..
        } = self;
        let _ = commands.send(SessionEvent::Close);
        if let Err(e) = task.await {
            tracing::error!(error = %e, "session task ended abnormally");
        }
        view.borrow().clone()
    }
}

/// Open `document_key` on a new task.
///
/// Notices (opened, saved, preview updated, failures) arrive on the returned
/// receiver; it can be dropped if only the view is of interest.
pub fn spawn_session<T>(
    client: Arc<EditorClient<T>>,
    options: SessionOptions,
    document_key: impl Into<SmolStr>,
) -> (SessionHandle, mpsc::UnboundedReceiver<SessionNotice>)
where
    T: Transport + Sync + 'static,
{
    let document_key = document_key.into();
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (results_tx, results_rx) = mpsc::unbounded_channel();
    let (notices_tx, notices_rx) = mpsc::unbounded_channel();

    let preview = PreviewRenderer::new(&options.sanitizer);
    let machine = EditSession::new(options.session);
    let (view_tx, view_rx) = watch::channel(SessionView {
        document_key: document_key.clone(),
        phase: machine.phase(),
        revision: None,
        local: None,
        saved: None,
        save_queued: false,
        autosave_pending: false,
        preview: preview.frame(),
        warnings: Vec::new(),
        last_error: None,
        commands_applied: 0,
    });

    let driver = Driver {
        client,
        document_key: document_key.clone(),
        machine,
        preview,
        results: results_tx,
        notices: notices_tx,
        view: view_tx,
        debounce: None,
        warnings: Vec::new(),
        last_error: None,
        commands_applied: 0,
    };

    // First thing the task sees.
    let _ = commands_tx.send(SessionEvent::Open {
        document_key: document_key.clone(),
    });
    let span = tracing::info_span!("session", %document_key);
    let task = tokio::spawn(driver.run(commands_rx, results_rx).instrument(span));

    let handle = SessionHandle {
        commands: commands_tx,
        commands_sent: AtomicU64::new(1),
        view: view_rx,
        task,
    };
    (handle, notices_rx)
}

struct Driver<T> {
    client: Arc<EditorClient<T>>,
    document_key: SmolStr,
    machine: EditSession,
    preview: PreviewRenderer,
    /// Timers and round trips report back through here.
    results: mpsc::UnboundedSender<SessionEvent>,
    notices: mpsc::UnboundedSender<SessionNotice>,
    view: watch::Sender<SessionView>,
    debounce: Option<JoinHandle<()>>,
    warnings: Vec<Warning>,
    last_error: Option<SessionError>,
    commands_applied: u64,
}

impl<T> Driver<T>
where
    T: Transport + Sync + 'static,
{
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionEvent>,
        mut results: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                Some(event) = results.recv() => event,
                command = commands.recv() => match command {
                    Some(event) => {
                        self.commands_applied += 1;
                        if is_user_edit(&event) {
                            self.last_error = None;
                        }
                        event
                    }
                    // Every handle is gone.
                    None => SessionEvent::Close,
                },
            };
            self.step(event);
            if self.machine.phase() == SessionPhase::Closed {
                break;
            }
        }
        self.cancel_debounce();
        tracing::debug!("session task finished");
    }

    fn step(&mut self, event: SessionEvent) {
        let styles_edited = matches!(event, SessionEvent::SetStyleTokens(_));
        for effect in self.machine.handle(event) {
            self.execute(effect);
        }
        if styles_edited {
            if let Some(local) = self.machine.local() {
                self.preview
                    .set_theme_css(theme::resolve(&local.style_tokens).css);
            }
        }
        self.publish();
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Load { document_key } => {
                let client = self.client.clone();
                self.spawn_round_trip(async move {
                    match client.load_document(&document_key).await {
                        Ok(document) => SessionEvent::Loaded { document },
                        Err(e) => SessionEvent::LoadFailed {
                            message: e.to_string(),
                        },
                    }
                });
            }
            Effect::ScheduleDebounce { timer, after } => {
                self.cancel_debounce();
                let results = self.results.clone();
                self.debounce = Some(tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = results.send(SessionEvent::DebounceElapsed(timer));
                }));
            }
            Effect::CancelDebounce => self.cancel_debounce(),
            Effect::Save { revision, input } => {
                let client = self.client.clone();
                self.spawn_round_trip(async move {
                    match client.save_document(&input).await {
                        Ok(_) => SessionEvent::SaveSucceeded { revision },
                        Err(e) => SessionEvent::SaveFailed {
                            revision,
                            message: e.to_string(),
                        },
                    }
                });
            }
            Effect::Render {
                revision,
                document_key,
            } => {
                let client = self.client.clone();
                self.spawn_round_trip(async move {
                    match client.render(&document_key).await {
                        Ok(result) => SessionEvent::RenderSucceeded { revision, result },
                        Err(e) => SessionEvent::RenderFailed {
                            revision,
                            message: e.to_string(),
                        },
                    }
                });
            }
            Effect::Notify(notice) => self.notify(notice),
        }
    }

    fn spawn_round_trip(&self, round_trip: impl Future<Output = SessionEvent> + Send + 'static) {
        let results = self.results.clone();
        tokio::spawn(
            async move {
                let event = round_trip.await;
                // The session may be gone by now; the result is simply dropped.
                let _ = results.send(event);
            }
            .in_current_span(),
        );
    }

    fn cancel_debounce(&mut self) {
        if let Some(timer) = self.debounce.take() {
            timer.abort();
        }
    }

    fn notify(&mut self, notice: SessionNotice) {
        match &notice {
            SessionNotice::PreviewUpdated(result) => {
                self.preview.apply(result);
                self.warnings = result.warnings.clone();
                // Keep showing theme edits that haven't been saved yet.
                if let (Some(local), Some(saved)) = (self.machine.local(), self.machine.saved()) {
                    if local.style_tokens != saved.style_tokens {
                        self.preview
                            .set_theme_css(theme::resolve(&local.style_tokens).css);
                    }
                }
            }
            SessionNotice::Saved { revision } => {
                tracing::debug!(%revision, "saved");
                self.last_error = None;
            }
            SessionNotice::Failed(error) => {
                tracing::warn!(%error, "round trip failed");
                self.last_error = Some(error.clone());
            }
            SessionNotice::Opened { existed, .. } => {
                tracing::info!(existed, "document opened");
            }
            SessionNotice::Closed => {}
        }
        let _ = self.notices.send(notice);
    }

    fn publish(&self) {
        self.view.send_replace(SessionView {
            document_key: self.document_key.clone(),
            phase: self.machine.phase(),
            revision: self.machine.revision(),
            local: self.machine.local().cloned(),
            saved: self.machine.saved().cloned(),
            save_queued: self.machine.is_save_queued(),
            autosave_pending: self.machine.pending_timer().is_some(),
            preview: self.preview.frame(),
            warnings: self.warnings.clone(),
            last_error: self.last_error.clone(),
            commands_applied: self.commands_applied,
        });
    }
}

fn is_user_edit(event: &SessionEvent) -> bool {
    matches!(
        event,
        SessionEvent::SetContent(_)
            | SessionEvent::SetTitle(_)
            | SessionEvent::SetStyleTokens(_)
            | SessionEvent::InsertSnippet(_)
            | SessionEvent::Flush
    )
}
