//! Reconstruction of typed command lines from raw keystrokes.
//!
//! The shell owns the real line buffer; this is a best-effort mirror built
//! from what the user typed. History recall resets the mirror, and shell-side
//! completion (Tab) is not tracked, so completed words are missing from the
//! reconstructed line.

use crate::{Result, Snooper};
use tracesnoop_types::{CommandTrigger, SnoopEvent};
use tracing::{debug, trace};

/// Longest incomplete escape sequence carried into the next chunk.
const MAX_PENDING_ESCAPE: usize = 32;

/// A discrete key token from the input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyToken<'a> {
    /// Printable text, inserted at the cursor.
    Text(&'a str),
    Return,
    Delete,
    Up,
    Down,
    Right,
    Left,
}

/// Split a raw input chunk into key tokens.
///
/// Runs of printable text become a single `Text` token. `\r`, `\n` and
/// `\r\n` are Return; DEL and backspace are Delete; arrow keys are recognized
/// in both CSI (`ESC [ A`) and SS3 (`ESC O A`) form. Other escape sequences
/// and control bytes are skipped, as is an escape sequence cut off at the
/// end of `input`.
pub fn tokenize(input: &str) -> Vec<KeyToken<'_>> {
    scan(input).0
}

/// Tokenize `input`, returning the tokens and any trailing escape sequence
/// that is still incomplete.
fn scan(input: &str) -> (Vec<KeyToken<'_>>, &str) {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut text_start: Option<usize> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        // Non-ASCII bytes are always part of printable text.
        if b >= 0x20 && b != 0x7f {
            text_start.get_or_insert(i);
            i += 1;
            continue;
        }

        if let Some(start) = text_start.take() {
            tokens.push(KeyToken::Text(&input[start..i]));
        }

        match b {
            b'\r' => {
                tokens.push(KeyToken::Return);
                if bytes.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                i += 1;
            }
            b'\n' => {
                tokens.push(KeyToken::Return);
                i += 1;
            }
            0x7f | 0x08 => {
                tokens.push(KeyToken::Delete);
                i += 1;
            }
            0x1b => match parse_escape(&bytes[i..]) {
                Some((token, len)) => {
                    if let Some(token) = token {
                        tokens.push(token);
                    }
                    i += len;
                }
                None => return (tokens, &input[i..]),
            },
            _ => {
                trace!(target: "tracesnoop::command", "Ignoring control byte {:#04x}", b);
                i += 1;
            }
        }
    }

    if let Some(start) = text_start {
        tokens.push(KeyToken::Text(&input[start..]));
    }

    (tokens, "")
}

/// Parse an escape sequence at the start of `bytes` (which begins with ESC).
/// Returns the recognized arrow key, if any, and the sequence length, or
/// `None` when `bytes` ends before the sequence does.
fn parse_escape(bytes: &[u8]) -> Option<(Option<KeyToken<'static>>, usize)> {
    let arrow = |b: u8| match b {
        b'A' => Some(KeyToken::Up),
        b'B' => Some(KeyToken::Down),
        b'C' => Some(KeyToken::Right),
        b'D' => Some(KeyToken::Left),
        _ => None,
    };

    match bytes.get(1)? {
        b'[' => {
            // CSI: parameter/intermediate bytes, then a final byte in 0x40..=0x7e.
            let mut end = 2;
            loop {
                let b = *bytes.get(end)?;
                if (0x40..=0x7e).contains(&b) {
                    let token = if end == 2 { arrow(b) } else { None };
                    return Some((token, end + 1));
                }
                end += 1;
            }
        }
        b'O' => bytes.get(2).map(|&b| (arrow(b), 3)),
        _ => Some((None, 1)),
    }
}

/// Mirror of the shell's line buffer: text plus a cursor index.
///
/// The cursor counts characters and always satisfies
/// `0 <= cursor <= len`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    buffer: Vec<char>,
    cursor: usize,
}

impl CommandLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current line text.
    pub fn text(&self) -> String {
        self.buffer.iter().collect()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Apply one key token. Returns the submitted line on Return.
    pub fn apply(&mut self, token: KeyToken<'_>) -> Option<String> {
        match token {
            KeyToken::Text(text) => {
                let after = self.buffer.split_off(self.cursor);
                self.buffer.extend(text.chars());
                self.cursor = self.buffer.len();
                self.buffer.extend(after);
            }
            KeyToken::Delete => {
                if self.cursor > 0 {
                    self.buffer.remove(self.cursor - 1);
                    self.cursor -= 1;
                }
            }
            KeyToken::Return => {
                let submitted = self.text();
                self.clear();
                return Some(submitted);
            }
            // History recall is not mirrored; start over from an empty line.
            KeyToken::Up | KeyToken::Down => self.clear(),
            KeyToken::Right => self.cursor = (self.cursor + 1).min(self.buffer.len()),
            KeyToken::Left => self.cursor = self.cursor.saturating_sub(1),
        }
        None
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }
}

/// Captures submitted commands from user input and raises an event for
/// those matching a configured trigger.
///
/// Keys may be split across input chunks: an escape sequence cut off at the
/// end of a chunk is completed by the next one, and a `\n` following a `\r`
/// that ended the previous chunk is not a second Return.
#[derive(Debug, Default)]
pub struct CommandCaptureSnooper {
    line: CommandLine,
    triggers: Vec<CommandTrigger>,
    /// Start of an escape sequence from the previous chunk.
    pending: String,
    /// The previous chunk ended with `\r`.
    after_cr: bool,
}

impl CommandCaptureSnooper {
    pub fn new(triggers: Vec<CommandTrigger>) -> Self {
        Self {
            triggers,
            ..Self::default()
        }
    }

    /// Current reconstructed line.
    pub fn line(&self) -> &CommandLine {
        &self.line
    }

    fn match_triggers(&self, command: &str) -> Option<SnoopEvent> {
        self.triggers.iter().find_map(|t| t.event_for(command))
    }
}

impl Snooper for CommandCaptureSnooper {
    fn name(&self) -> &str {
        "command"
    }

    fn observe_input(&mut self, chunk: &str) -> Result<Vec<SnoopEvent>> {
        let mut events = Vec::new();

        let mut buffered = std::mem::take(&mut self.pending);
        buffered.push_str(chunk);
        let mut input = buffered.as_str();
        if std::mem::take(&mut self.after_cr) {
            input = input.strip_prefix('\n').unwrap_or(input);
        }

        let (tokens, rest) = scan(input);
        if rest.len() > MAX_PENDING_ESCAPE {
            trace!(target: "tracesnoop::command", "Dropping unterminated escape sequence");
        } else {
            self.pending = rest.to_string();
        }
        self.after_cr = rest.is_empty() && input.ends_with('\r');

        for token in tokens {
            let Some(command) = self.line.apply(token) else {
                continue;
            };
            debug!(target: "tracesnoop::command", "Command submitted: {}", command);
            if let Some(event) = self.match_triggers(&command) {
                debug!(target: "tracesnoop::command", "Command matched trigger: {:?}", event);
                events.push(event);
            }
        }

        Ok(events)
    }
}
