//! Fan-out of terminal streams to snoopers with display pass-through.

use crate::{Result, Snooper, Utf8Decoder};
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracesnoop_types::SnoopEvent;
use tracing::{trace, warn};

/// Ordered list of snoopers plus the display sink for process output.
///
/// Every chunk reaches every snooper in registration order. A snooper that
/// errors or panics is logged and skipped for that chunk; siblings still see
/// the chunk and output still reaches the display.
pub struct SnooperPipeline {
    snoopers: Vec<Box<dyn Snooper>>,
    display: Box<dyn Write + Send>,
    output_decoder: Utf8Decoder,
    input_decoder: Utf8Decoder,
}

impl SnooperPipeline {
    pub fn new(display: Box<dyn Write + Send>) -> Self {
        Self {
            snoopers: Vec::new(),
            display,
            output_decoder: Utf8Decoder::new(),
            input_decoder: Utf8Decoder::new(),
        }
    }

    /// Append a snooper to the end of the fan-out order.
    pub fn register(&mut self, snooper: Box<dyn Snooper>) {
        self.snoopers.push(snooper);
    }

    pub fn with_snooper(mut self, snooper: impl Snooper + 'static) -> Self {
        self.register(Box::new(snooper));
        self
    }

    pub fn len(&self) -> usize {
        self.snoopers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snoopers.is_empty()
    }

    /// Feed process output to every snooper, then write it unmodified to the
    /// display.
    pub fn deliver_output(&mut self, chunk: &[u8]) -> Vec<SnoopEvent> {
        let text = self.output_decoder.decode(chunk);
        let events = if text.is_empty() {
            Vec::new()
        } else {
            fan_out(&mut self.snoopers, "output", |s| s.observe_output(&text))
        };

        if let Err(e) = self
            .display
            .write_all(chunk)
            .and_then(|_| self.display.flush())
        {
            warn!(target: "tracesnoop::pipeline", "Display write failed: {}", e);
        }

        events
    }

    /// Feed user input to every snooper.
    pub fn deliver_input(&mut self, chunk: &[u8]) -> Vec<SnoopEvent> {
        let text = self.input_decoder.decode(chunk);
        if text.is_empty() {
            return Vec::new();
        }
        fan_out(&mut self.snoopers, "input", |s| s.observe_input(&text))
    }

    /// Drop every snooper along with any partial state they hold.
    pub fn detach_all(&mut self) {
        trace!(target: "tracesnoop::pipeline", "Detaching {} snoopers", self.snoopers.len());
        self.snoopers.clear();
        self.output_decoder.reset();
        self.input_decoder.reset();
    }
}

fn fan_out<F>(snoopers: &mut [Box<dyn Snooper>], feed: &str, mut observe: F) -> Vec<SnoopEvent>
where
    F: FnMut(&mut Box<dyn Snooper>) -> Result<Vec<SnoopEvent>>,
{
    let mut events = Vec::new();

    for snooper in snoopers.iter_mut() {
        match catch_unwind(AssertUnwindSafe(|| observe(snooper))) {
            Ok(Ok(found)) => events.extend(found),
            Ok(Err(e)) => {
                warn!(
                    target: "tracesnoop::pipeline",
                    "Snooper {} failed on {}: {}",
                    snooper.name(),
                    feed,
                    e
                );
            }
            Err(_) => {
                warn!(
                    target: "tracesnoop::pipeline",
                    "Snooper {} panicked on {}",
                    snooper.name(),
                    feed
                );
            }
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommandCaptureSnooper, SnoopError, TracebackLanguage, TracebackSnooper};
    use std::sync::{Arc, Mutex};
    use tracesnoop_types::default_command_triggers;

    const CHUNKS: [&str; 3] = [
        "Traceback (most recent call last):\n",
        "  File \"a.py\", line 1, in <module>\n    f()\n",
        "  File \"a.py\", line 2, in f\n    1/0\nZeroDivisionError: division by zero\n",
    ];

    /// Display sink that records everything written to it.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn contents(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    struct Failing;

    impl Snooper for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn observe_output(&mut self, _chunk: &str) -> Result<Vec<SnoopEvent>> {
            Err(SnoopError::SnooperFailed {
                name: "failing".to_string(),
                message: "rigged".to_string(),
            })
        }

        fn observe_input(&mut self, _chunk: &str) -> Result<Vec<SnoopEvent>> {
            panic!("rigged");
        }
    }

    struct Panicking;

    impl Snooper for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn observe_output(&mut self, _chunk: &str) -> Result<Vec<SnoopEvent>> {
            panic!("rigged");
        }
    }

    fn traceback_snooper() -> TracebackSnooper {
        TracebackSnooper::new(TracebackLanguage::python())
    }

    #[test]
    fn test_failing_snooper_is_isolated() {
        let display = Captured::default();
        let mut pipeline = SnooperPipeline::new(Box::new(display.clone()))
            .with_snooper(Failing)
            .with_snooper(traceback_snooper());

        let events: Vec<_> = CHUNKS
            .iter()
            .flat_map(|c| pipeline.deliver_output(c.as_bytes()))
            .collect();

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SnoopEvent::Traceback { value } if value.ends_with("division by zero")));
        assert_eq!(display.contents(), CHUNKS.concat().into_bytes());
    }

    #[test]
    fn test_panicking_snooper_is_isolated() {
        let display = Captured::default();
        let mut pipeline = SnooperPipeline::new(Box::new(display.clone()))
            .with_snooper(Panicking)
            .with_snooper(traceback_snooper());

        let events: Vec<_> = CHUNKS
            .iter()
            .flat_map(|c| pipeline.deliver_output(c.as_bytes()))
            .collect();

        assert_eq!(events.len(), 1);
        assert_eq!(display.contents(), CHUNKS.concat().into_bytes());
    }

    #[test]
    fn test_input_panic_does_not_block_siblings() {
        let mut pipeline = SnooperPipeline::new(Box::new(std::io::sink()))
            .with_snooper(Failing)
            .with_snooper(CommandCaptureSnooper::new(default_command_triggers()));

        let events = pipeline.deliver_input(b"pytest test_x.py\r");
        assert_eq!(
            events,
            vec![SnoopEvent::Command {
                action: "run_tests".to_string(),
                argument: "test_x.py".to_string(),
            }]
        );
    }

    #[test]
    fn test_output_passthrough_is_byte_exact() {
        let display = Captured::default();
        let mut pipeline = SnooperPipeline::new(Box::new(display.clone()))
            .with_snooper(traceback_snooper());

        let raw: &[u8] = b"\x1b[32mok\x1b[0m \xe2\x9c";
        pipeline.deliver_output(raw);
        pipeline.deliver_output(b"\x93\r\n");

        assert_eq!(display.contents(), b"\x1b[32mok\x1b[0m \xe2\x9c\x93\r\n".to_vec());
    }

    #[test]
    fn test_both_snoopers_see_their_streams() {
        let mut pipeline = SnooperPipeline::new(Box::new(std::io::sink()))
            .with_snooper(traceback_snooper())
            .with_snooper(CommandCaptureSnooper::new(default_command_triggers()));

        // Typed text never reaches the traceback snooper.
        assert!(pipeline.deliver_input(CHUNKS[0].as_bytes()).is_empty());
        let events: Vec<_> = CHUNKS
            .iter()
            .flat_map(|c| pipeline.deliver_output(c.as_bytes()))
            .collect();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_detach_all_stops_snooping() {
        let display = Captured::default();
        let mut pipeline = SnooperPipeline::new(Box::new(display.clone()))
            .with_snooper(traceback_snooper());
        assert_eq!(pipeline.len(), 1);

        pipeline.deliver_output(CHUNKS[0].as_bytes());
        pipeline.detach_all();
        assert!(pipeline.is_empty());

        let events: Vec<_> = CHUNKS[1..]
            .iter()
            .flat_map(|c| pipeline.deliver_output(c.as_bytes()))
            .collect();
        assert!(events.is_empty());
        assert_eq!(display.contents(), CHUNKS.concat().into_bytes());
    }
}
