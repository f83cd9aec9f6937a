//! Scripted modem for integration tests.
//!
//! Wraps a [`ModemService`] on a single shared channel and a
//! [`MemoryTransport`].  Tests play the modem: they read what the engine
//! wrote and feed back replies and notifications.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use gsmd::app::commands::ChannelKind;
use gsmd::app::events::ModemEvent;
use gsmd::app::ports::{DataCallError, DataCallPort, EventSink, SharedSink};
use gsmd::app::service::ModemService;
use gsmd::at::channel::Channel;
use gsmd::at::transport::MemoryTransport;
use gsmd::call::CallStatus;
use gsmd::config::ModemConfig;

// ── Event recorder ────────────────────────────────────────────

#[derive(Default)]
pub struct Recorder {
    pub events: Vec<ModemEvent>,
}

impl EventSink for Recorder {
    fn emit(&mut self, event: &ModemEvent) {
        self.events.push(event.clone());
    }
}

// ── Data-call double ──────────────────────────────────────────

#[derive(Default)]
pub struct FakeDataCall {
    pub launches: Vec<(String, u8)>,
}

impl DataCallPort for FakeDataCall {
    fn launch(&mut self, device: &str, call_id: u8) -> Result<(), DataCallError> {
        self.launches.push((device.to_string(), call_id));
        Ok(())
    }
}

// ── MockModem ─────────────────────────────────────────────────

pub struct MockModem {
    pub service: ModemService,
    pub transport: MemoryTransport,
    recorder: Rc<RefCell<Recorder>>,
}

#[allow(dead_code)]
impl MockModem {
    /// Default configuration: every kind on one device.
    pub fn new() -> Self {
        Self::with_config(ModemConfig::default())
    }

    pub fn with_config(config: ModemConfig) -> Self {
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let sink: SharedSink = recorder.clone();
        let service = ModemService::new(config, sink).expect("valid config");
        Self {
            service,
            transport: MemoryTransport::new(),
            recorder,
        }
    }

    pub fn channel(&self) -> Channel {
        self.service.channel(ChannelKind::Misc).clone()
    }

    /// Let the engine write its next command; `""` when it has none.
    pub fn written(&mut self) -> String {
        self.channel().on_writable(&mut self.transport, Instant::now());
        self.transport.take_written()
    }

    /// Bytes from the modem.
    pub fn reply(&mut self, data: &str) {
        self.channel().feed(data.as_bytes(), Instant::now());
    }

    /// Assert the next command is `command`, then answer it with `reply`.
    pub fn expect(&mut self, command: &str, reply: &str) {
        assert_eq!(self.written(), command);
        self.reply(reply);
    }

    pub fn events(&self) -> Vec<ModemEvent> {
        self.recorder.borrow().events.clone()
    }

    pub fn take_events(&self) -> Vec<ModemEvent> {
        std::mem::take(&mut self.recorder.borrow_mut().events)
    }

    /// `(slot, status)` of every call notification so far.
    pub fn call_statuses(&self) -> Vec<(u8, CallStatus)> {
        self.recorder
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                ModemEvent::CallStatus { id, status, .. } => Some((*id, *status)),
                _ => None,
            })
            .collect()
    }
}
