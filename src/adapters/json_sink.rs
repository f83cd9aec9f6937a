//! JSON-lines event sink adapter.
//!
//! Each [`ModemEvent`] becomes one JSON object on its own line, tagged
//! with `"event"`.  The daemon points it at stdout, next to the request
//! responses.

use std::io::Write;

use log::warn;

use crate::app::events::ModemEvent;
use crate::app::ports::EventSink;

pub struct JsonLineSink<W: Write> {
    out: W,
}

impl JsonLineSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> JsonLineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Serialise `value` as one line and flush.
    pub fn write_line<T: serde::Serialize>(&mut self, value: &T) {
        let result = serde_json::to_writer(&mut self.out, value)
            .map_err(std::io::Error::from)
            .and_then(|_| self.out.write_all(b"\n"))
            .and_then(|_| self.out.flush());
        if let Err(e) = result {
            warn!("json sink: write failed: {}", e);
        }
    }
}

impl<W: Write> EventSink for JsonLineSink<W> {
    fn emit(&mut self, event: &ModemEvent) {
        self.write_line(event);
    }
}
