//! WebSocket-backed panel host.
//!
//! Panels connect to `/ws/events`; each one gets every event as a JSON text
//! frame. A panel is available while at least one is connected.

use std::process::Stdio;
use tokio::sync::broadcast;
use tracesnoop_core::PanelHost;
use tracesnoop_types::{SnoopEvent, StackTrace};
use tracing::{debug, info, warn};

const PANEL_CHANNEL_CAPACITY: usize = 64;

pub struct PanelHub {
    tx: broadcast::Sender<String>,
    open_command: Option<Vec<String>>,
}

impl PanelHub {
    pub fn new(open_command: Option<Vec<String>>) -> Self {
        let (tx, _) = broadcast::channel(PANEL_CHANNEL_CAPACITY);
        Self { tx, open_command }
    }

    /// Register a panel connection.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn connected(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl PanelHost for PanelHub {
    fn is_available(&self) -> bool {
        self.connected() > 0
    }

    fn request_open(&self) {
        let Some((program, args)) = self.open_command.as_deref().and_then(|c| c.split_first())
        else {
            info!(target: "tracesnoop::panel", "No panel connected; connect one to /ws/events");
            return;
        };

        info!(target: "tracesnoop::panel", "Opening panel with {}", program);
        // The runtime reaps the child; nothing waits on it.
        let spawned = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        if let Err(e) = spawned {
            warn!(target: "tracesnoop::panel", "Failed to run panel command {}: {}", program, e);
        }
    }

    fn post(&self, event: &SnoopEvent) -> bool {
        if let SnoopEvent::Traceback { value } = event {
            let parsed = StackTrace::parse(value);
            match parsed.as_ref().and_then(|t| Some((t, t.error_site()?))) {
                Some((trace, site)) => info!(
                    target: "tracesnoop::panel",
                    "Traceback: {} at {}:{} ({} frames)",
                    trace.error_type,
                    site.filepath,
                    site.line,
                    trace.frames.len()
                ),
                None => debug!(target: "tracesnoop::panel", "Traceback with no parseable frames"),
            }
        }

        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                warn!(target: "tracesnoop::panel", "Failed to serialize event: {}", e);
                return false;
            }
        };
        self.tx.send(json).is_ok()
    }
}
