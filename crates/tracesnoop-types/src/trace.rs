//! Structured view of an extracted traceback.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Frame header, e.g. `  File "app/main.py", line 12, in handler`.
static FRAME_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^  File "(?P<path>[^"]+)", line (?P<line>\d+)(?:, in (?P<func>.+?))?\s*$"#)
        .expect("Invalid frame header regex")
});

/// One frame of a stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub filepath: String,
    pub line: u32,
    pub function: String,
    /// Source snippet printed under the frame header, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A parsed stack trace: frames in call-chain order plus the final error line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackTrace {
    /// Outermost call first, error site last.
    pub frames: Vec<StackFrame>,
    /// Exception type, e.g. `ZeroDivisionError`.
    pub error_type: String,
    /// Exception message, empty when the runtime printed none.
    pub message: String,
}

impl StackTrace {
    /// Parse extracted traceback text.
    ///
    /// Returns `None` when the text has no frames or no trailing error line.
    pub fn parse(text: &str) -> Option<Self> {
        let mut frames: Vec<StackFrame> = Vec::new();
        let mut error_line: Option<&str> = None;

        for raw in text.lines() {
            let line = raw.trim_end_matches('\r');
            if let Some(caps) = FRAME_HEADER_RE.captures(line) {
                let line_no = caps["line"].parse().ok()?;
                frames.push(StackFrame {
                    filepath: caps["path"].to_string(),
                    line: line_no,
                    function: caps
                        .name("func")
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default(),
                    source: None,
                });
                continue;
            }

            if line.starts_with(' ') {
                // First indented line after a header is its source snippet.
                if let Some(frame) = frames.last_mut() {
                    if frame.source.is_none() && !line.trim().is_empty() {
                        frame.source = Some(line.trim().to_string());
                    }
                }
                continue;
            }

            if !frames.is_empty() && !line.trim().is_empty() {
                error_line = Some(line);
            }
        }

        let error_line = error_line?;
        let (error_type, message) = match error_line.split_once(':') {
            Some((ty, msg)) => (ty.trim().to_string(), msg.trim().to_string()),
            None => (error_line.trim().to_string(), String::new()),
        };

        Some(Self {
            frames,
            error_type,
            message,
        })
    }

    /// The innermost frame, where the error was raised.
    pub fn error_site(&self) -> Option<&StackFrame> {
        self.frames.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO_DIV: &str = "Traceback (most recent call last):\n  File \"a.py\", line 1, in <module>\n    f()\n  File \"a.py\", line 2, in f\n    1/0\nZeroDivisionError: division by zero";

    #[test]
    fn test_parse_frames_in_order() {
        let trace = StackTrace::parse(ZERO_DIV).unwrap();
        assert_eq!(trace.frames.len(), 2);
        assert_eq!(trace.frames[0].function, "<module>");
        assert_eq!(trace.frames[0].line, 1);
        assert_eq!(trace.frames[0].source.as_deref(), Some("f()"));
        assert_eq!(trace.frames[1].function, "f");
        assert_eq!(trace.frames[1].source.as_deref(), Some("1/0"));
        assert_eq!(trace.error_type, "ZeroDivisionError");
        assert_eq!(trace.message, "division by zero");
        assert_eq!(trace.error_site().unwrap().filepath, "a.py");
    }

    #[test]
    fn test_parse_crlf_and_bare_error() {
        let text = "Traceback (most recent call last):\r\n  File \"/srv/x.py\", line 40, in run\r\n    loop()\r\nKeyboardInterrupt\r";
        let trace = StackTrace::parse(text).unwrap();
        assert_eq!(trace.frames[0].filepath, "/srv/x.py");
        assert_eq!(trace.frames[0].line, 40);
        assert_eq!(trace.error_type, "KeyboardInterrupt");
        assert!(trace.message.is_empty());
    }

    #[test]
    fn test_parse_frame_without_source() {
        let text = "Traceback (most recent call last):\n  File \"<stdin>\", line 1, in <module>\nNameError: name 'x' is not defined";
        let trace = StackTrace::parse(text).unwrap();
        assert_eq!(trace.frames.len(), 1);
        assert!(trace.frames[0].source.is_none());
        assert_eq!(trace.message, "name 'x' is not defined");
    }

    #[test]
    fn test_parse_rejects_text_without_frames() {
        assert!(StackTrace::parse("").is_none());
        assert!(StackTrace::parse("Traceback (most recent call last):\nValueError").is_none());
    }
}
