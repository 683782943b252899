//! Shared types for the tracesnoop terminal snooper.

mod command;
mod event;
mod session;
mod trace;

pub use command::*;
pub use event::*;
pub use session::*;
pub use trace::*;
