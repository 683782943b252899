//! Traceback extraction from accumulated terminal output.
//!
//! Extraction is a pure scan over the text: no I/O and no state, so the same
//! buffer always yields the same answer.

/// Line that opens a Python traceback.
pub const PYTHON_START_MARKER: &str = "Traceback (most recent call last):";

/// Prefix of a Python frame header line (two leading spaces).
pub const PYTHON_FRAME_PREFIX: &str = "  File";

/// Caret underline printed under the failing expression.
const PYTHON_CARET_LINE: &str = "~~^~~";

/// Marker configuration for one language's traceback format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracebackLanguage {
    pub name: String,
    /// Text that starts a traceback; matched case-sensitively.
    pub start_marker: String,
    /// Prefix identifying a frame header line.
    pub frame_prefix: String,
    /// Lines dropped before scanning, compared after trimming.
    pub decorative_lines: Vec<String>,
}

impl Default for TracebackLanguage {
    fn default() -> Self {
        Self::python()
    }
}

impl TracebackLanguage {
    /// CPython's `Traceback (most recent call last):` format.
    pub fn python() -> Self {
        Self {
            name: "python".to_string(),
            start_marker: PYTHON_START_MARKER.to_string(),
            frame_prefix: PYTHON_FRAME_PREFIX.to_string(),
            decorative_lines: vec![PYTHON_CARET_LINE.to_string()],
        }
    }

    /// Return the first complete traceback in `buffer`, or `None` if more
    /// output is needed.
    ///
    /// Only newline-terminated lines are considered. A trace is complete at a
    /// frame header `i` once line `i + 2` exists and does not start with a
    /// space: that line is the final error message. The returned text runs
    /// from the start marker through that line, joined by `\n`.
    pub fn extract(&self, buffer: &str) -> Option<String> {
        let start = buffer.find(self.start_marker.as_str())?;
        let text = &buffer[start..];

        // An unterminated trailing line may still be growing.
        let end = text.rfind('\n')?;
        let lines: Vec<&str> = text[..end]
            .split('\n')
            .filter(|line| !self.is_noise(line))
            .collect();

        for (i, line) in lines.iter().enumerate() {
            if !line.starts_with(self.frame_prefix.as_str()) {
                continue;
            }
            match lines.get(i + 2) {
                Some(after) if !after.starts_with(' ') => {
                    return Some(lines[..=i + 2].join("\n"));
                }
                _ => {}
            }
        }

        None
    }

    fn is_noise(&self, line: &str) -> bool {
        let trimmed = line.trim();
        trimmed.is_empty() || self.decorative_lines.iter().any(|d| d == trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ZERO_DIV: &str = "Traceback (most recent call last):\n  File \"a.py\", line 1, in <module>\n    f()\n  File \"a.py\", line 2, in f\n    1/0\nZeroDivisionError: division by zero\n";

    fn python() -> TracebackLanguage {
        TracebackLanguage::python()
    }

    #[test]
    fn test_empty_buffer_is_incomplete() {
        assert_eq!(python().extract(""), None);
    }

    #[test]
    fn test_marker_without_frames_is_incomplete() {
        assert_eq!(python().extract("Traceback (most recent call last):\n"), None);
        assert_eq!(
            python().extract("Traceback (most recent call last):\nsomething\nelse\n"),
            None
        );
    }

    #[test]
    fn test_complete_trace() {
        let trace = python().extract(ZERO_DIV).unwrap();
        assert_eq!(trace, ZERO_DIV.trim_end_matches('\n'));
    }

    #[test]
    fn test_waits_for_line_after_snippet() {
        let partial = "Traceback (most recent call last):\n  File \"a.py\", line 1, in <module>\n    f()\n";
        assert_eq!(python().extract(partial), None);
    }

    #[test]
    fn test_unterminated_error_line_is_incomplete() {
        let partial = "Traceback (most recent call last):\n  File \"a.py\", line 1, in <module>\n    f()\nZeroDiv";
        assert_eq!(python().extract(partial), None);
    }

    #[test]
    fn test_caret_and_blank_lines_are_dropped() {
        let buffer = "Traceback (most recent call last):\n\n  File \"a.py\", line 3, in <module>\n    x = a ~~^~~ b\n    ~~^~~\nTypeError: bad operand\n";
        let trace = python().extract(buffer).unwrap();
        assert_eq!(
            trace,
            "Traceback (most recent call last):\n  File \"a.py\", line 3, in <module>\n    x = a ~~^~~ b\nTypeError: bad operand"
        );
    }

    #[test]
    fn test_only_first_trace_is_returned() {
        let buffer = format!("{ZERO_DIV}{ZERO_DIV}");
        let trace = python().extract(&buffer).unwrap();
        assert_eq!(trace, ZERO_DIV.trim_end_matches('\n'));
    }

    #[test]
    fn test_text_before_marker_is_excluded() {
        let buffer = format!("$ python a.py\n{ZERO_DIV}$ ");
        let trace = python().extract(&buffer).unwrap();
        assert!(trace.starts_with(PYTHON_START_MARKER));
    }

    #[test]
    fn test_crlf_lines_are_kept_verbatim() {
        let buffer = "Traceback (most recent call last):\r\n  File \"a.py\", line 2, in f\r\n    1/0\r\nZeroDivisionError: division by zero\r\n";
        let trace = python().extract(buffer).unwrap();
        assert_eq!(trace, buffer.trim_end_matches('\n'));
    }

    #[test]
    fn test_frame_marker_without_start_marker() {
        let buffer = "  File \"a.py\", line 2, in f\n    1/0\nZeroDivisionError\n";
        assert_eq!(python().extract(buffer), None);
    }

    proptest! {
        #[test]
        fn prop_no_marker_never_completes(s in "[ -~\n]{0,200}") {
            prop_assume!(!s.contains(PYTHON_START_MARKER));
            prop_assert_eq!(python().extract(&s), None);
        }

        #[test]
        fn prop_no_marker_with_frame_lines(
            lines in proptest::collection::vec(
                prop_oneof![
                    Just("  File \"x.py\", line 1, in f".to_string()),
                    Just("    call()".to_string()),
                    "[A-Za-z]{1,12}: [a-z ]{0,20}",
                ],
                0..12,
            )
        ) {
            let text = lines.join("\n") + "\n";
            prop_assert_eq!(python().extract(&text), None);
        }
    }
}
