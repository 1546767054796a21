//! Session controller handle and owner task

use std::future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::credential::CredentialStore;
use crate::debuglog::DebugLog;
use crate::document::{DocumentAdapter, DocumentError};
use crate::engine::{CollabEngine, DocEvent, DocumentHandle, EngineSession};
use crate::metrics;
use crate::permission::PermissionApi;
use crate::session::errors::SessionError;
use crate::session::state::{AuthErrorInfo, SessionState, SessionStatus};
use crate::shutdown::ShutdownSignal;
use crate::token::{CredentialProvider, ExpiryMonitor, TokenApi, TokenBridge};

/// Engine document key for a note identifier.
pub fn document_key(document_id: &str) -> String {
    format!("note-{document_id}")
}

#[derive(Debug)]
enum Command {
    SetDocument(String),
    Edit(String),
    Retry,
    Teardown(oneshot::Sender<()>),
}

/// Cloneable handle to the session owner task.
///
/// Commands are delivered over an mpsc channel and executed one at a time;
/// observable state comes back over `watch` channels, so readers never touch
/// session internals directly.
#[derive(Clone)]
pub struct SessionController {
    command_tx: mpsc::Sender<Command>,
    status_rx: watch::Receiver<SessionStatus>,
    buffer_rx: watch::Receiver<String>,
    countdown_rx: watch::Receiver<u64>,
    log: DebugLog,
}

impl SessionController {
    /// Spawn the owner task and return a handle to it
    ///
    /// The task runs until `shutdown` fires or every handle is dropped;
    /// either way it tears the active session down before exiting.
    pub fn spawn(
        config: &Config,
        engine: Arc<dyn CollabEngine>,
        permission_api: Arc<dyn PermissionApi>,
        token_api: Arc<dyn TokenApi>,
        credentials: CredentialStore,
        shutdown_rx: broadcast::Receiver<ShutdownSignal>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let (buffer_tx, buffer_rx) = watch::channel(String::new());
        let monitor = ExpiryMonitor::new();
        let countdown_rx = monitor.subscribe();
        let log = DebugLog::new();

        let run_loop = RunLoop {
            engine,
            permission_api,
            token_api,
            credentials,
            rpc_addr: config.engine.rpc_addr.clone(),
            event_buffer: config.session.event_buffer,
            countdown_tick: config.session.countdown_tick,
            state: SessionState::Idle,
            document_id: None,
            session: None,
            document: None,
            adapter: None,
            events_rx: None,
            monitor,
            status_tx,
            buffer_tx,
            log: log.clone(),
        };
        tokio::spawn(run_loop.run(command_rx, shutdown_rx));

        Self {
            command_tx,
            status_rx,
            buffer_rx,
            countdown_rx,
            log,
        }
    }

    /// Select the document to collaborate on
    ///
    /// Changing the identifier tears the current session down and starts a
    /// fresh one; re-submitting the current identifier is a no-op.
    pub async fn set_document(&self, document_id: impl Into<String>) -> Result<(), SessionError> {
        self.send(Command::SetDocument(document_id.into())).await
    }

    /// Submit the full editor text as one local edit
    pub async fn edit(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(Command::Edit(text.into())).await
    }

    /// Restart the session after a startup failure
    pub async fn retry(&self) -> Result<(), SessionError> {
        self.send(Command::Retry).await
    }

    /// Tear the active session down and wait until teardown completed
    pub async fn teardown(&self) -> Result<(), SessionError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Teardown(ack_tx)).await?;
        ack_rx.await.map_err(|_| SessionError::ControllerGone)
    }

    /// Watch the session status
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    /// Watch the local text buffer
    pub fn local_text(&self) -> watch::Receiver<String> {
        self.buffer_rx.clone()
    }

    /// Watch the token expiry countdown in whole seconds
    pub fn countdown(&self) -> watch::Receiver<u64> {
        self.countdown_rx.clone()
    }

    /// The shared diagnostic log fed by the owner task
    pub fn debug_log(&self) -> DebugLog {
        self.log.clone()
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SessionError::ControllerGone)
    }
}

enum Input {
    Command(Option<Command>),
    Event(Option<DocEvent>),
    Shutdown,
    Tick,
}

/// Single owner of all mutable session state.
struct RunLoop {
    engine: Arc<dyn CollabEngine>,
    permission_api: Arc<dyn PermissionApi>,
    token_api: Arc<dyn TokenApi>,
    credentials: CredentialStore,
    rpc_addr: String,
    event_buffer: usize,
    countdown_tick: Duration,
    state: SessionState,
    document_id: Option<String>,
    session: Option<Box<dyn EngineSession>>,
    document: Option<Arc<dyn DocumentHandle>>,
    adapter: Option<DocumentAdapter>,
    events_rx: Option<mpsc::Receiver<DocEvent>>,
    monitor: ExpiryMonitor,
    status_tx: watch::Sender<SessionStatus>,
    buffer_tx: watch::Sender<String>,
    log: DebugLog,
}

impl RunLoop {
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<Command>,
        mut shutdown_rx: broadcast::Receiver<ShutdownSignal>,
    ) {
        let mut countdown = tokio::time::interval(self.countdown_tick);
        countdown.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let input = tokio::select! {
                command = command_rx.recv() => Input::Command(command),
                _ = shutdown_rx.recv() => Input::Shutdown,
                event = Self::next_event(&mut self.events_rx) => Input::Event(event),
                _ = countdown.tick() => Input::Tick,
            };

            match input {
                Input::Command(Some(Command::SetDocument(id))) => self.switch_document(id).await,
                Input::Command(Some(Command::Edit(text))) => self.handle_edit(text).await,
                Input::Command(Some(Command::Retry)) => self.handle_retry().await,
                Input::Command(Some(Command::Teardown(ack))) => {
                    self.teardown_session().await;
                    // re-selecting the same document later starts fresh
                    self.document_id = None;
                    let _ = ack.send(());
                }
                Input::Command(None) | Input::Shutdown => {
                    self.teardown_session().await;
                    break;
                }
                Input::Event(Some(event)) => self.handle_event(event).await,
                Input::Event(None) => self.events_rx = None,
                Input::Tick => self.monitor.publish().await,
            }
        }

        info!("session controller stopped");
    }

    /// Resolves to pending forever while no session is attached, so the
    /// select arm stays inert between sessions.
    async fn next_event(rx: &mut Option<mpsc::Receiver<DocEvent>>) -> Option<DocEvent> {
        match rx {
            Some(rx) => rx.recv().await,
            None => future::pending().await,
        }
    }

    async fn transition(&mut self, state: SessionState) {
        debug!(from = %self.state, to = %state, "session transition");
        metrics::session_transition(state.as_str());
        self.log.push(format!("state -> {state}")).await;
        self.state = state;
        self.status_tx.send_modify(|s| s.state = state);
    }

    async fn fail(&mut self, message: String) {
        warn!(%message, "session startup failed");
        self.log.push(message.clone()).await;
        self.status_tx.send_modify(|s| s.error = Some(message));
        self.transition(SessionState::Error).await;
    }

    async fn switch_document(&mut self, document_id: String) {
        if self.document_id.as_deref() == Some(document_id.as_str()) {
            debug!(%document_id, "document unchanged");
            return;
        }
        if self.document_id.is_some() {
            self.teardown_session().await;
        }
        self.document_id = Some(document_id);
        self.start_session().await;
    }

    async fn handle_retry(&mut self) {
        if self.state != SessionState::Error || self.document_id.is_none() {
            debug!(state = %self.state, "retry ignored");
            return;
        }
        self.log.push("retrying session startup").await;
        self.teardown_session().await;
        self.start_session().await;
    }

    /// Startup sequence: resolve permission, open, attach, hydrate
    ///
    /// Each step runs to completion before the next; a failure unwinds
    /// whatever was already established and lands in `Error`.
    async fn start_session(&mut self) {
        let Some(document_id) = self.document_id.clone() else {
            return;
        };
        let key = document_key(&document_id);

        self.status_tx.send_replace(SessionStatus {
            document_key: Some(key.clone()),
            ..SessionStatus::default()
        });
        self.state = SessionState::Idle;
        self.log.push(format!("starting session for {key}")).await;

        self.transition(SessionState::ResolvingPermission).await;
        let credential = self.credentials.get().await;
        let role = match self
            .permission_api
            .resolve(&document_id, credential.as_deref())
            .await
        {
            Ok(role) => role,
            Err(e) => {
                self.fail(e.to_string()).await;
                return;
            }
        };
        self.log.push(format!("resolved role {role}")).await;
        self.status_tx.send_modify(|s| s.role = Some(role));

        self.transition(SessionState::Connecting).await;
        let bridge = Arc::new(TokenBridge::new(
            self.token_api.clone(),
            self.credentials.clone(),
            document_id,
            self.monitor.clone(),
            self.log.clone(),
        ));
        let session = match self
            .engine
            .open(&self.rpc_addr, bridge as Arc<dyn CredentialProvider>)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                self.fail(e.to_string()).await;
                return;
            }
        };

        self.transition(SessionState::Attaching).await;
        let (events_tx, events_rx) = mpsc::channel(self.event_buffer);
        let document = match session.attach(&key, events_tx).await {
            Ok(document) => document,
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    warn!(error = %close_err, "close failed after attach failure");
                    self.log
                        .push(format!("cleanup close failed: {close_err}"))
                        .await;
                }
                self.fail(e.to_string()).await;
                return;
            }
        };

        let mut adapter = DocumentAdapter::new(document.clone(), role);
        if let Err(e) = adapter.hydrate().await {
            if let Err(detach_err) = session.detach(document.clone()).await {
                warn!(error = %detach_err, "detach failed after hydrate failure");
                self.log
                    .push(format!("cleanup detach failed: {detach_err}"))
                    .await;
            }
            if let Err(close_err) = session.close().await {
                warn!(error = %close_err, "close failed after hydrate failure");
                self.log
                    .push(format!("cleanup close failed: {close_err}"))
                    .await;
            }
            self.fail(format!("failed to hydrate {key}: {e}")).await;
            return;
        }

        self.buffer_tx.send_replace(adapter.buffer().to_string());
        self.session = Some(session);
        self.document = Some(document);
        self.adapter = Some(adapter);
        self.events_rx = Some(events_rx);
        self.status_tx.send_modify(|s| {
            s.attached = true;
            s.error = None;
        });
        self.transition(SessionState::Synced).await;
    }

    /// Ordered teardown: detach first, then close, both best-effort
    ///
    /// Cleanup failures are logged and never raised; `attached` is false
    /// afterwards no matter what the engine reported.
    async fn teardown_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Some(document) = self.document.take() {
                if let Err(e) = session.detach(document).await {
                    warn!(error = %e, "detach failed during teardown");
                    self.log.push(format!("teardown detach failed: {e}")).await;
                }
            }
            if let Err(e) = session.close().await {
                warn!(error = %e, "close failed during teardown");
                self.log.push(format!("teardown close failed: {e}")).await;
            }
        }
        self.document = None;
        self.adapter = None;
        self.events_rx = None;
        self.monitor.clear().await;
        self.buffer_tx.send_replace(String::new());
        self.status_tx.send_modify(|s| {
            s.attached = false;
            s.role = None;
            s.sync_label = None;
            s.last_auth_error = None;
        });
        self.transition(SessionState::TornDown).await;
    }

    async fn handle_edit(&mut self, text: String) {
        if self.state != SessionState::Synced {
            debug!(state = %self.state, "edit ignored outside synced session");
            return;
        }
        let result = match self.adapter.as_mut() {
            Some(adapter) => adapter.apply_local_edit(&text).await,
            None => return,
        };
        match result {
            Ok(()) => self.publish_buffer(),
            Err(DocumentError::ReadOnly) => {
                debug!("edit ignored for read-only role");
                self.log.push("edit rejected: read-only role").await;
            }
            Err(DocumentError::Engine(e)) => {
                warn!(error = %e, "local edit failed");
                self.log.push(format!("local edit failed: {e}")).await;
                self.status_tx.send_modify(|s| s.error = Some(e.to_string()));
            }
        }
    }

    async fn handle_event(&mut self, event: DocEvent) {
        match event {
            DocEvent::RemoteChange => {
                let result = match self.adapter.as_mut() {
                    Some(adapter) => adapter.on_remote_update().await,
                    None => return,
                };
                match result {
                    Ok(()) => self.publish_buffer(),
                    Err(e) => {
                        warn!(error = %e, "remote update failed");
                        self.log.push(format!("remote update failed: {e}")).await;
                    }
                }
            }
            DocEvent::Sync { label } => {
                self.log.push(format!("sync: {label}")).await;
                self.status_tx.send_modify(|s| {
                    s.sync_label = Some(label);
                    s.error = None;
                });
            }
            DocEvent::AuthError { method, reason } => {
                metrics::auth_error();
                let info = AuthErrorInfo { method, reason };
                warn!(method = %info.method, reason = %info.reason, "engine auth error");
                self.log.push(info.to_string()).await;
                self.status_tx.send_modify(|s| {
                    s.error = Some(info.to_string());
                    s.last_auth_error = Some(info);
                });
            }
        }
    }

    fn publish_buffer(&self) {
        if let Some(adapter) = self.adapter.as_ref() {
            self.buffer_tx.send_replace(adapter.buffer().to_string());
        }
    }
}
