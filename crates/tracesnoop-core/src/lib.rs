//! Terminal snooping core: traceback extraction, command capture and the
//! snooper pipeline wired to a pseudo-terminal session.

mod command_capture;
mod decoder;
mod dispatch;
mod error;
mod extractor;
mod pipeline;
mod process;
mod registry;
mod session;
mod snooper;

pub use command_capture::{tokenize, CommandCaptureSnooper, CommandLine, KeyToken};
pub use decoder::Utf8Decoder;
pub use dispatch::{Delivery, PanelDispatcher, PanelHost, DEFAULT_RETRY_DELAY};
pub use error::SnoopError;
pub use extractor::{TracebackLanguage, PYTHON_FRAME_PREFIX, PYTHON_START_MARKER};
pub use pipeline::SnooperPipeline;
pub use process::{ProcessOutput, PtyProcess, SpawnOptions};
pub use registry::{ForeignTerminal, PtyLauncher, SessionLauncher, SessionRegistry};
pub use session::{SessionEvent, SessionOptions, TerminalSession};
pub use snooper::{Snooper, TracebackSnooper, DEFAULT_MAX_TRACE_BUFFER};

/// Result type for tracesnoop operations.
pub type Result<T> = std::result::Result<T, SnoopError>;
