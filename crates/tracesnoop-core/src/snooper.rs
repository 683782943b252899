//! Snoopers observing a terminal session's output and input streams.

use crate::{Result, TracebackLanguage};
use tracesnoop_types::SnoopEvent;
use tracing::{debug, trace, warn};

/// Default cap on an accumulating traceback buffer (256 KiB).
pub const DEFAULT_MAX_TRACE_BUFFER: usize = 256 * 1024;

/// An observer attached to a terminal session.
///
/// Both feeds default to ignoring the chunk, so a snooper only implements the
/// stream it cares about.
pub trait Snooper: Send {
    /// Name used in log lines.
    fn name(&self) -> &str;

    /// Observe a chunk of process output.
    fn observe_output(&mut self, _chunk: &str) -> Result<Vec<SnoopEvent>> {
        Ok(Vec::new())
    }

    /// Observe a chunk of user input.
    fn observe_input(&mut self, _chunk: &str) -> Result<Vec<SnoopEvent>> {
        Ok(Vec::new())
    }
}

/// Traceback snooper states.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TraceState {
    /// No start marker seen. `carry` holds the tail of the last chunk so a
    /// marker split across chunks is still found.
    Idle { carry: String },
    /// Start marker seen; output is appended until a trace completes.
    Accumulating { buffer: String },
}

/// Detects tracebacks in process output.
///
/// A chunk that completes one trace and also starts the next is only
/// partially handled: text after the completed trace is dropped, so the next
/// trace is noticed once its start marker appears in a later chunk.
#[derive(Debug)]
pub struct TracebackSnooper {
    language: TracebackLanguage,
    state: TraceState,
    max_buffer: Option<usize>,
}

impl TracebackSnooper {
    pub fn new(language: TracebackLanguage) -> Self {
        Self {
            language,
            state: TraceState::Idle {
                carry: String::new(),
            },
            max_buffer: Some(DEFAULT_MAX_TRACE_BUFFER),
        }
    }

    /// Set the maximum accumulated length in bytes; `None` disables the cap.
    pub fn with_max_buffer(mut self, max_buffer: Option<usize>) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    /// Whether the snooper is waiting for a start marker.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, TraceState::Idle { .. })
    }

    /// Text accumulated since the start marker (empty while idle).
    pub fn buffer(&self) -> &str {
        match &self.state {
            TraceState::Idle { .. } => "",
            TraceState::Accumulating { buffer } => buffer,
        }
    }

    /// Drop any accumulated output and return to idle.
    pub fn reset(&mut self) {
        self.state = TraceState::Idle {
            carry: String::new(),
        };
    }

    fn feed(&mut self, chunk: &str) -> Option<String> {
        let marker = self.language.start_marker.as_str();

        match &mut self.state {
            TraceState::Idle { carry } => {
                let mut window = std::mem::take(carry);
                window.push_str(chunk);

                match window.find(marker) {
                    Some(pos) => {
                        trace!(target: "tracesnoop::snooper", "Start marker seen ({})", self.language.name);
                        self.state = TraceState::Accumulating {
                            buffer: window.split_off(pos),
                        };
                    }
                    None => {
                        *carry = tail(&window, marker.len().saturating_sub(1)).to_string();
                        return None;
                    }
                }
            }
            TraceState::Accumulating { buffer } => buffer.push_str(chunk),
        }

        let buffer = self.buffer();
        if let Some(found) = self.language.extract(buffer) {
            debug!(
                target: "tracesnoop::snooper",
                "Extracted {} traceback ({} bytes)",
                self.language.name,
                found.len()
            );
            self.reset();
            return Some(found);
        }

        if let Some(max) = self.max_buffer {
            let len = buffer.len();
            if len > max {
                warn!(
                    target: "tracesnoop::snooper",
                    "Traceback buffer exceeded {} bytes ({}), discarding",
                    max,
                    len
                );
                self.reset();
            }
        }

        None
    }
}

impl Snooper for TracebackSnooper {
    fn name(&self) -> &str {
        "traceback"
    }

    fn observe_output(&mut self, chunk: &str) -> Result<Vec<SnoopEvent>> {
        Ok(self
            .feed(chunk)
            .map(SnoopEvent::traceback)
            .into_iter()
            .collect())
    }
}

/// Last `n` bytes of `s`, widened to a char boundary.
fn tail(s: &str, n: usize) -> &str {
    let mut start = s.len().saturating_sub(n);
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
