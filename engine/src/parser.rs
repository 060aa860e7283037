//! Streaming progress parser.
//!
//! rsync, when given [`PROGRESS_FORMAT_ARG`](crate::command::PROGRESS_FORMAT_ARG),
//! prints one `<units>###<name>` record per transferred file. The parser is a
//! write sink for the live process output: each delivered chunk is scanned
//! for records at line starts, their magnitudes are summed, and the sum is
//! pushed into the attached indicator and the running total.
//!
//! Chunks are handled independently; a record split across two chunks is
//! not reassembled.

use crate::progress::ProgressIndicator;
use regex::bytes::Regex;
use std::io::{self, Write};

const RECORD_PATTERN: &str = r"(?m)^(\d+)###";

/// Counts work units in streamed transfer output.
pub struct ProgressParser<'a> {
    record: Regex,
    total: u64,
    indicator: Option<&'a dyn ProgressIndicator>,
}

impl<'a> ProgressParser<'a> {
    /// A parser that only accumulates a total (used by the estimation pass).
    pub fn detached() -> Self {
        ProgressParser {
            record: Regex::new(RECORD_PATTERN).expect("record pattern is valid"),
            total: 0,
            indicator: None,
        }
    }

    /// A parser that also advances `indicator`.
    pub fn attached(indicator: &'a dyn ProgressIndicator) -> Self {
        ProgressParser {
            indicator: Some(indicator),
            ..ProgressParser::detached()
        }
    }

    /// Work units seen so far in this job.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Scan one chunk and return the units it contained.
    pub fn consume(&mut self, chunk: &[u8]) -> u64 {
        let units = sum_records(&self.record, chunk);

        if let Some(indicator) = self.indicator {
            if units > 0 {
                indicator.inc(units);
            }
            if self.total == 0 {
                indicator.render_blank();
            }
        }
        self.total = self.total.saturating_add(units);
        units
    }
}

fn sum_records(record: &Regex, chunk: &[u8]) -> u64 {
    record
        .captures_iter(chunk)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| std::str::from_utf8(m.as_bytes()).ok())
        .filter_map(|digits| digits.parse::<u64>().ok())
        .fold(0u64, |acc, units| acc.saturating_add(units))
}

impl Write for ProgressParser<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.consume(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct RecordingIndicator {
        position: Cell<u64>,
        calls: RefCell<Vec<String>>,
    }

    impl ProgressIndicator for RecordingIndicator {
        fn inc(&self, delta: u64) {
            self.position.set(self.position.get() + delta);
            self.calls.borrow_mut().push(format!("inc({})", delta));
        }

        fn position(&self) -> u64 {
            self.position.get()
        }

        fn render_blank(&self) {
            self.calls.borrow_mut().push("render_blank".to_string());
        }

        fn finish(&self) {
            self.calls.borrow_mut().push("finish".to_string());
        }
    }

    #[test]
    fn test_two_records_in_one_chunk() {
        let mut parser = ProgressParser::detached();
        let units = parser.consume(b"120###fileA\n80###fileB\n");
        assert_eq!(units, 200);
        assert_eq!(parser.total(), 200);
    }

    #[test]
    fn test_chunk_without_records_changes_nothing() {
        let indicator = RecordingIndicator::default();
        let mut parser = ProgressParser::attached(&indicator);
        parser.consume(b"10###first\n");
        let before = indicator.position();

        let units = parser.consume(b"sending incremental file list\nsent 1,024 bytes\n");
        assert_eq!(units, 0);
        assert_eq!(parser.total(), 10);
        assert_eq!(indicator.position(), before);
    }

    #[test]
    fn test_records_must_start_a_line() {
        let mut parser = ProgressParser::detached();
        assert_eq!(parser.consume(b"file 12###x\n  7###y\n"), 0);
        assert_eq!(parser.consume(b"noise\n5###z"), 5);
    }

    #[test]
    fn test_description_is_ignored() {
        let mut parser = ProgressParser::detached();
        assert_eq!(parser.consume(b"3###dir/with ### hashes 99###\n"), 3);
    }

    #[test]
    fn test_first_chunk_forces_render() {
        let indicator = RecordingIndicator::default();
        let mut parser = ProgressParser::attached(&indicator);

        parser.consume(b"100###a\n");
        parser.consume(b"50###b\n");

        let calls = indicator.calls.borrow();
        assert_eq!(*calls, vec!["inc(100)", "render_blank", "inc(50)"]);
        assert_eq!(indicator.position(), 150);
    }

    #[test]
    fn test_render_repeats_until_something_is_counted() {
        let indicator = RecordingIndicator::default();
        let mut parser = ProgressParser::attached(&indicator);

        parser.consume(b"building file list\n");
        parser.consume(b"4###a\n");
        parser.consume(b"4###b\n");

        let renders = indicator
            .calls
            .borrow()
            .iter()
            .filter(|c| c.as_str() == "render_blank")
            .count();
        assert_eq!(renders, 2);
        assert!(!indicator.calls.borrow().iter().any(|c| c == "inc(0)"));
        assert_eq!(indicator.position(), 8);
    }

    #[test]
    fn test_write_sink_accepts_whole_chunk() {
        let mut parser = ProgressParser::detached();
        let written = parser.write(b"1###a\n2###b\n").expect("write should succeed");
        assert_eq!(written, 12);
        assert_eq!(parser.total(), 3);
    }
}
