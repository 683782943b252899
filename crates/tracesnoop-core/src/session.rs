//! A managed terminal session: one PTY process wired through a snooper
//! pipeline.

use crate::{
    CommandCaptureSnooper, ProcessOutput, PtyProcess, Result, SnoopError, SnooperPipeline,
    SpawnOptions, TracebackLanguage, TracebackSnooper, DEFAULT_MAX_TRACE_BUFFER,
};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracesnoop_types::{CommandTrigger, SessionInfo, SessionStatus, SnoopEvent};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Events published by a terminal session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A snooper raised an event.
    Snoop { session_id: Uuid, event: SnoopEvent },
    /// The process exited on its own.
    Exited {
        session_id: Uuid,
        exit_code: Option<u32>,
    },
}

/// Everything needed to start a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub spawn: SpawnOptions,
    pub language: TracebackLanguage,
    /// Cap on an accumulating traceback, in bytes.
    pub max_trace_buffer: Option<usize>,
    pub triggers: Vec<CommandTrigger>,
}

impl SessionOptions {
    pub fn new(spawn: SpawnOptions) -> Self {
        Self {
            spawn,
            language: TracebackLanguage::python(),
            max_trace_buffer: Some(DEFAULT_MAX_TRACE_BUFFER),
            triggers: tracesnoop_types::default_command_triggers(),
        }
    }

    /// Build the standard pipeline: traceback snooper, then command capture.
    pub fn build_pipeline(&self, display: Box<dyn Write + Send>) -> SnooperPipeline {
        SnooperPipeline::new(display)
            .with_snooper(
                TracebackSnooper::new(self.language.clone())
                    .with_max_buffer(self.max_trace_buffer),
            )
            .with_snooper(CommandCaptureSnooper::new(self.triggers.clone()))
    }
}

/// Work items for the session pump, processed strictly in arrival order.
#[derive(Debug)]
enum PumpMessage {
    Output(Vec<u8>),
    Input(Vec<u8>),
    Closed,
}

/// State shared between the session handle and its pump task.
struct Shared {
    pipeline: Mutex<SnooperPipeline>,
    closed: AtomicBool,
    exit_code: OnceLock<Option<u32>>,
}

/// One managed terminal: a PTY process, its pipeline and the pump task that
/// feeds one from the other.
pub struct TerminalSession {
    id: Uuid,
    program: String,
    tx: mpsc::UnboundedSender<PumpMessage>,
    shared: Arc<Shared>,
    process: Option<Arc<PtyProcess>>,
    pump: JoinHandle<()>,
}

impl TerminalSession {
    /// Spawn the shell and start snooping it. Must be called inside a Tokio
    /// runtime.
    pub fn open(
        opts: &SessionOptions,
        display: Box<dyn Write + Send>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let output_tx = tx.clone();
        let process = PtyProcess::spawn(&opts.spawn, move |output| {
            let msg = match output {
                ProcessOutput::Data(data) => PumpMessage::Output(data),
                ProcessOutput::Closed => PumpMessage::Closed,
            };
            // The pump is gone once the session closes.
            let _ = output_tx.send(msg);
        })?;
        let process = Arc::new(process);

        let stdin = process
            .take_writer()
            .ok_or_else(|| SnoopError::PtyError("PTY writer unavailable".to_string()))?;

        let session = Self::start(
            opts.spawn.program.clone(),
            opts.build_pipeline(display),
            stdin,
            Some(process),
            tx,
            rx,
            events,
        );
        info!(target: "tracesnoop::session", "Session {} opened ({})", session.id, session.program);
        Ok(session)
    }

    /// Start a session around an existing pipeline and input sink, with no
    /// PTY attached. Output is fed with [`TerminalSession::push_output`].
    pub fn from_pipeline(
        program: impl Into<String>,
        pipeline: SnooperPipeline,
        stdin: Box<dyn Write + Send>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::start(program.into(), pipeline, stdin, None, tx, rx, events)
    }

    fn start(
        program: String,
        pipeline: SnooperPipeline,
        stdin: Box<dyn Write + Send>,
        process: Option<Arc<PtyProcess>>,
        tx: mpsc::UnboundedSender<PumpMessage>,
        rx: mpsc::UnboundedReceiver<PumpMessage>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let id = Uuid::new_v4();
        let shared = Arc::new(Shared {
            pipeline: Mutex::new(pipeline),
            closed: AtomicBool::new(false),
            exit_code: OnceLock::new(),
        });

        let pump = tokio::spawn(run_pump(
            id,
            shared.clone(),
            rx,
            stdin,
            process.clone(),
            events,
        ));

        Self {
            id,
            program,
            tx,
            shared,
            process,
            pump,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Forward raw keystrokes: snoopers first, then the process's input.
    pub fn send_input(&self, data: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(SnoopError::SessionClosed(self.id));
        }
        self.tx
            .send(PumpMessage::Input(data.to_vec()))
            .map_err(|_| SnoopError::ChannelSendError)
    }

    /// Feed process output as if it came from the PTY.
    pub fn push_output(&self, data: &[u8]) -> Result<()> {
        self.tx
            .send(PumpMessage::Output(data.to_vec()))
            .map_err(|_| SnoopError::ChannelSendError)
    }

    /// Signal end of process output.
    pub fn push_eof(&self) -> Result<()> {
        self.tx
            .send(PumpMessage::Closed)
            .map_err(|_| SnoopError::ChannelSendError)
    }

    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        match &self.process {
            Some(process) => process.resize(rows, cols),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Whether the process has exited on its own.
    pub fn has_exited(&self) -> bool {
        self.shared.exit_code.get().is_some()
    }

    pub fn status(&self) -> SessionStatus {
        if self.is_closed() {
            SessionStatus::Closed
        } else if self.has_exited() {
            SessionStatus::Exited
        } else {
            SessionStatus::Active
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            shell: self.program.clone(),
            status: self.status(),
            exit_code: self.shared.exit_code.get().copied().flatten(),
        }
    }

    /// Tear the session down.
    ///
    /// Snoopers are detached before this returns, so no snooper sees another
    /// chunk and no partial traceback is ever emitted. The process is killed
    /// if still running.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shared
            .pipeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .detach_all();
        self.pump.abort();

        if let Some(process) = &self.process {
            process.terminate();
        }
        info!(target: "tracesnoop::session", "Session {} closed", self.id);
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_pump(
    session_id: Uuid,
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<PumpMessage>,
    mut stdin: Box<dyn Write + Send>,
    process: Option<Arc<PtyProcess>>,
    events: broadcast::Sender<SessionEvent>,
) {
    debug!(target: "tracesnoop::session", "Pump started for session {}", session_id);

    while let Some(msg) = rx.recv().await {
        match msg {
            PumpMessage::Output(data) => {
                let Some(found) = with_pipeline(&shared, |p| p.deliver_output(&data)) else {
                    break;
                };
                publish(&events, session_id, found);
            }
            PumpMessage::Input(data) => {
                let Some(found) = with_pipeline(&shared, |p| p.deliver_input(&data)) else {
                    break;
                };
                publish(&events, session_id, found);

                if let Err(e) = stdin.write_all(&data).and_then(|_| stdin.flush()) {
                    warn!(target: "tracesnoop::session", "Failed to write input to session {}: {}", session_id, e);
                }
            }
            PumpMessage::Closed => {
                // Whatever a snooper was still accumulating dies with the session.
                if with_pipeline(&shared, |p| p.detach_all()).is_none() {
                    break;
                }

                let exit_code = match &process {
                    Some(process) => {
                        let process = process.clone();
                        tokio::task::spawn_blocking(move || process.wait())
                            .await
                            .ok()
                            .and_then(|r| r.ok())
                    }
                    None => None,
                };

                let _ = shared.exit_code.set(exit_code);
                if let Some(process) = &process {
                    process.terminate();
                }

                info!(target: "tracesnoop::session", "Session {} process exited with code {:?}", session_id, exit_code);
                let _ = events.send(SessionEvent::Exited {
                    session_id,
                    exit_code,
                });
                break;
            }
        }
    }

    debug!(target: "tracesnoop::session", "Pump stopped for session {}", session_id);
}

/// Run `f` on the pipeline unless the session has been closed.
fn with_pipeline<T>(shared: &Shared, f: impl FnOnce(&mut SnooperPipeline) -> T) -> Option<T> {
    let mut pipeline = shared
        .pipeline
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if shared.closed.load(Ordering::SeqCst) {
        return None;
    }
    Some(f(&mut pipeline))
}

fn publish(events: &broadcast::Sender<SessionEvent>, session_id: Uuid, found: Vec<SnoopEvent>) {
    for event in found {
        debug!(target: "tracesnoop::session", "Session {} raised {} event", session_id, event.kind());
        // No subscribers is not an error.
        let _ = events.send(SessionEvent::Snoop { session_id, event });
    }
}
