//! Events produced by snoopers and delivered to panels.

use serde::{Deserialize, Serialize};

/// An event raised while snooping a terminal session.
///
/// This is also the wire format sent to connected panels, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SnoopEvent {
    /// A complete traceback was extracted from process output.
    Traceback {
        /// Trace text exactly as extracted, newline-joined.
        value: String,
    },
    /// A submitted command matched a configured trigger.
    Command {
        /// Name of the downstream action to run.
        action: String,
        /// Remainder of the command line after the trigger prefix.
        argument: String,
    },
}

impl SnoopEvent {
    /// Build a traceback event.
    pub fn traceback(value: impl Into<String>) -> Self {
        SnoopEvent::Traceback {
            value: value.into(),
        }
    }

    /// Short name of the event kind, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            SnoopEvent::Traceback { .. } => "traceback",
            SnoopEvent::Command { .. } => "command",
        }
    }
}
