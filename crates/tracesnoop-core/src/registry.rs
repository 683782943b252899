//! Tracks the single managed terminal session.

use crate::{Result, SessionEvent, SessionOptions, SnoopError, TerminalSession};
use std::io::Write;
use tokio::sync::{broadcast, RwLock};
use tracesnoop_types::SessionInfo;
use tracing::{debug, info};
use uuid::Uuid;

/// Starts new terminal sessions for the registry.
pub trait SessionLauncher: Send + Sync {
    fn launch(&self, events: broadcast::Sender<SessionEvent>) -> Result<TerminalSession>;
}

/// Launches a shell in a PTY with the standard snooper pipeline.
pub struct PtyLauncher {
    options: SessionOptions,
    display: Box<dyn Fn() -> Box<dyn Write + Send> + Send + Sync>,
}

impl PtyLauncher {
    /// `display` is called once per session to get the sink for its output.
    pub fn new<F>(options: SessionOptions, display: F) -> Self
    where
        F: Fn() -> Box<dyn Write + Send> + Send + Sync + 'static,
    {
        Self {
            options,
            display: Box::new(display),
        }
    }
}

impl SessionLauncher for PtyLauncher {
    fn launch(&self, events: broadcast::Sender<SessionEvent>) -> Result<TerminalSession> {
        TerminalSession::open(&self.options, (self.display)(), events)
    }
}

/// A terminal created outside the registry (for example by the host
/// environment) that should be replaced by a managed one.
pub trait ForeignTerminal: Send {
    fn name(&self) -> String;

    /// Close the terminal and release whatever it holds.
    fn dispose(self: Box<Self>);
}

/// Owns at most one managed terminal session.
///
/// Opening a session closes the previous one first, so its snoopers are gone
/// before the new session produces any output.
pub struct SessionRegistry {
    launcher: Box<dyn SessionLauncher>,
    active: RwLock<Option<TerminalSession>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionRegistry {
    pub fn new(launcher: impl SessionLauncher + 'static) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            launcher: Box::new(launcher),
            active: RwLock::new(None),
            events,
        }
    }

    /// Subscribe to events from every session this registry opens.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Open a new managed session, replacing any existing one.
    pub async fn open(&self) -> Result<Uuid> {
        let mut active = self.active.write().await;

        if let Some(previous) = active.take() {
            info!(target: "tracesnoop::session", "Replacing session {}", previous.id());
            previous.close();
        }

        let session = self.launcher.launch(self.events.clone())?;
        let id = session.id();
        *active = Some(session);
        Ok(id)
    }

    /// Replace a terminal opened elsewhere with a managed session.
    pub async fn on_terminal_opened(&self, terminal: Box<dyn ForeignTerminal>) -> Result<Uuid> {
        info!(target: "tracesnoop::session", "Taking over terminal {}", terminal.name());
        terminal.dispose();
        self.open().await
    }

    /// Close the active session.
    pub async fn close(&self) -> Result<()> {
        let session = self
            .active
            .write()
            .await
            .take()
            .ok_or(SnoopError::NoActiveSession)?;
        session.close();
        Ok(())
    }

    /// Close the active session if it has the given id.
    pub async fn close_session(&self, id: Uuid) -> Result<()> {
        let mut active = self.active.write().await;
        match active.as_ref() {
            Some(session) if session.id() == id => {
                if let Some(session) = active.take() {
                    session.close();
                }
                Ok(())
            }
            _ => Err(SnoopError::SessionNotFound(id)),
        }
    }

    /// Drop the session with the given id once its process has exited.
    /// Returns whether a session was released.
    pub async fn reap(&self, id: Uuid) -> bool {
        let mut active = self.active.write().await;
        if active
            .as_ref()
            .is_some_and(|s| s.id() == id && s.has_exited())
        {
            debug!(target: "tracesnoop::session", "Releasing exited session {}", id);
            active.take();
            return true;
        }
        false
    }

    pub async fn send_input(&self, data: &[u8]) -> Result<()> {
        self.active
            .read()
            .await
            .as_ref()
            .ok_or(SnoopError::NoActiveSession)?
            .send_input(data)
    }

    pub async fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        self.active
            .read()
            .await
            .as_ref()
            .ok_or(SnoopError::NoActiveSession)?
            .resize(rows, cols)
    }

    pub async fn active(&self) -> Option<SessionInfo> {
        self.active.read().await.as_ref().map(|s| s.info())
    }
}
