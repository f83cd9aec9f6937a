//! Streaming AT response line parser.
//!
//! Accumulates incoming bytes into lines and classifies each complete line.
//! This handles partial reads gracefully: a single `Transport::read` may
//! return half a line, several lines, or a line plus the continuation prompt.
//!
//! ```text
//!   bytes ──▶ ┌──────────────┐  terminal line  ──▶ sink.response(lines)
//!             │  LineParser  │  other prefix   ──▶ sink.unsolicited(lines)
//!             │  (per line)  │  "> " prompt    ──▶ sink.prompt()
//!             └──────────────┘  anything else  ──▶ accumulate
//! ```
//!
//! The parser asks the sink whether a command is in flight before every
//! line, so a response that resolves mid-chunk turns the rest of that
//! chunk into unsolicited traffic.

use log::debug;

/// Leading characters that mark a vendor or standard AT prefix.
pub const PREFIX_CHARS: &[char] = &['+', '%', '!', '*', '$', '^', '_', '&', '@', '/', '#'];

/// Notifications whose payload follows on the next line.
const PDU_CARRYING: &[&str] = &["+CMT:", "+CBM:", "+CDS:"];

/// Receives classified output from [`LineParser::feed`].
pub trait ParserSink {
    /// Whether a command is currently awaiting its terminal line.
    fn awaiting_response(&self) -> bool;

    /// Whether `line` starts with a prefix the in-flight command expects.
    fn expects_prefix(&self, line: &str) -> bool;

    /// A solicited response completed; the last element is the terminal line.
    fn response(&mut self, lines: Vec<String>);

    /// An unsolicited notification (one line, or two for PDU carriers).
    fn unsolicited(&mut self, lines: Vec<String>);

    /// The modem sent the `"> "` continuation prompt.
    fn prompt(&mut self);
}

/// Whether `line` ends a solicited response.
pub fn is_terminal(line: &str) -> bool {
    line == "OK"
        || line == "ERROR"
        || line.starts_with("+CME ERROR")
        || line.starts_with("+CMS ERROR")
        || line.starts_with("+EXT ERROR")
        || line.starts_with("BUSY")
        || line.starts_with("CONNECT")
        || line.starts_with("NO ANSWER")
        || line.starts_with("NO CARRIER")
        || line.starts_with("NO DIALTONE")
}

/// Whether `line` has the `<prefix>COMMAND: values` shape.
pub fn looks_unsolicited(line: &str) -> bool {
    line.starts_with(PREFIX_CHARS) && line.contains(':')
}

fn carries_pdu(line: &str) -> bool {
    PDU_CARRYING.iter().any(|p| line.starts_with(p))
}

/// Streaming line parser.
#[derive(Debug, Default)]
pub struct LineParser {
    current: Vec<u8>,
    lines: Vec<String>,
    /// A PDU-carrying notification waiting for its payload line.
    pending_unsolicited: Option<String>,
}

impl LineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the parser, reporting every complete line to `sink`.
    pub fn feed<S: ParserSink + ?Sized>(&mut self, data: &[u8], sink: &mut S) {
        for &b in data {
            match b {
                b'\r' | b'\n' => {
                    if !self.current.is_empty() {
                        let line = String::from_utf8_lossy(&self.current).into_owned();
                        self.current.clear();
                        self.complete_line(line, sink);
                    }
                }
                _ => {
                    self.current.push(b);
                    if self.current == b"> " && sink.awaiting_response() {
                        self.current.clear();
                        sink.prompt();
                    }
                }
            }
        }
    }

    /// Drop partial state (e.g. after a timeout or transport reopen).
    pub fn reset(&mut self) {
        self.current.clear();
        self.lines.clear();
        self.pending_unsolicited = None;
    }

    /// Lines accumulated toward the current solicited response.
    pub fn pending_lines(&self) -> usize {
        self.lines.len()
    }

    fn complete_line<S: ParserSink + ?Sized>(&mut self, line: String, sink: &mut S) {
        if let Some(head) = self.pending_unsolicited.take() {
            sink.unsolicited(vec![head, line]);
            return;
        }

        if !sink.awaiting_response() {
            self.route_unsolicited(line, sink);
            return;
        }

        if is_terminal(&line) {
            self.lines.push(line);
            let lines = std::mem::take(&mut self.lines);
            sink.response(lines);
            return;
        }

        if looks_unsolicited(&line) && !sink.expects_prefix(&line) {
            debug!("parser: interleaved unsolicited '{}'", line);
            self.route_unsolicited(line, sink);
            return;
        }

        self.lines.push(line);
    }

    fn route_unsolicited<S: ParserSink + ?Sized>(&mut self, line: String, sink: &mut S) {
        if carries_pdu(&line) {
            self.pending_unsolicited = Some(line);
        } else {
            sink.unsolicited(vec![line]);
        }
    }
}
