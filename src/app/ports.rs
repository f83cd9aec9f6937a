//! Port traits — the hexagonal boundary between the modem engine and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ModemService / CallHandler (domain)
//! ```
//!
//! Driven adapters (notification sinks, the data-call helper launcher)
//! implement these traits.  The engine only ever holds them behind the
//! trait, so tests swap in recording doubles.

use std::cell::RefCell;
use std::rc::Rc;

use super::events::ModemEvent;

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → callers)
// ───────────────────────────────────────────────────────────────

/// The engine emits structured [`ModemEvent`]s through this port.
/// Adapters decide where they go (log, stdout JSON lines, a bus, ...).
pub trait EventSink {
    fn emit(&mut self, event: &ModemEvent);
}

/// Sink shared between the service, the call handler and the
/// unsolicited handlers, all of which emit from continuations.
pub type SharedSink = Rc<RefCell<dyn EventSink>>;

/// Wrap a concrete sink for sharing.
pub fn shared_sink(sink: impl EventSink + 'static) -> SharedSink {
    Rc::new(RefCell::new(sink))
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &ModemEvent) {}
}

/// Fan out to two sinks, in order.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&mut self, event: &ModemEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

// ───────────────────────────────────────────────────────────────
// Data-call port (driven adapter: domain → helper process)
// ───────────────────────────────────────────────────────────────

/// Launches the external process that takes over the serial device once
/// a data call reports `CONNECT`.  The adapter must report the process's
/// exit back through [`CallHandler::data_call_ended`](crate::call::CallHandler::data_call_ended).
pub trait DataCallPort {
    fn launch(&mut self, device: &str, call_id: u8) -> Result<(), DataCallError>;
}

pub type SharedDataCall = Rc<RefCell<dyn DataCallPort>>;

/// Errors from [`DataCallPort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataCallError {
    /// No helper program configured.
    NotConfigured,
    /// The helper could not be started.
    Spawn(String),
}

impl core::fmt::Display for DataCallError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "no data-call helper configured"),
            Self::Spawn(msg) => write!(f, "failed to start data-call helper: {}", msg),
        }
    }
}
