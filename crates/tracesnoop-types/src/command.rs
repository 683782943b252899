//! Command triggers matched against submitted command lines.

use serde::{Deserialize, Serialize};

use crate::SnoopEvent;

/// Maps a command prefix (e.g. `pytest`) to a downstream action name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTrigger {
    /// First word(s) of the command line, matched case-sensitively.
    pub prefix: String,
    /// Action to trigger when the prefix matches.
    pub action: String,
}

impl CommandTrigger {
    pub fn new(prefix: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            action: action.into(),
        }
    }

    /// Match a submitted command line, returning the argument after the prefix.
    ///
    /// The prefix only matches as a whole word: `pytest` matches `pytest a.py`
    /// and `pytest`, but not `pytestify`.
    pub fn match_command<'a>(&self, command: &'a str) -> Option<&'a str> {
        let command = command.trim_start();
        let rest = command.strip_prefix(self.prefix.as_str())?;
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return None;
        }
        Some(rest.trim())
    }

    /// Build the event for a command line, if it matches.
    pub fn event_for(&self, command: &str) -> Option<SnoopEvent> {
        self.match_command(command).map(|argument| SnoopEvent::Command {
            action: self.action.clone(),
            argument: argument.to_string(),
        })
    }
}

/// Default triggers: test runner and script invocations.
pub fn default_command_triggers() -> Vec<CommandTrigger> {
    vec![
        CommandTrigger::new("pytest", "run_tests"),
        CommandTrigger::new("python", "run_script"),
    ]
}
