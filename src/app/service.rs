//! Modem service — the hexagonal core.
//!
//! [`ModemService`] owns the command channels and the call handler, wires
//! the default unsolicited handlers, and exposes every user-facing
//! operation.  It never touches a transport: the I/O driver pumps the
//! channels returned by [`ModemService::channels`].
//!
//! ```text
//!  Request ──▶ ┌──────────────────────────┐ ──▶ EventSink
//!              │       ModemService        │
//!  DataCall ◀──│ channels · calls · sms    │
//!              └──────────────────────────┘
//!                  │ call   │ misc   │ unsolicited
//!                  ▼        ▼        ▼
//!               Channel  Channel  Channel   (shared when paths match)
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;

use log::{info, warn};
use serde::Serialize;
use serde_json::{Value, json};

use super::commands::{ChannelKind, ModemCommand, Request, Response};
use super::events::ModemEvent;
use super::handlers;
use super::ports::{SharedDataCall, SharedSink};
use crate::at::channel::{Channel, Command};
use crate::at::sequence::{Outcome, Sequence, Step, Task};
use crate::call::{CallHandler, CallType};
use crate::config::ModemConfig;
use crate::error::{ChannelError, Error};
use crate::sms::Sms;

/// A message read back from storage with `+CMGR`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub index: u32,
    pub status: &'static str,
    pub sms: Sms,
    /// Absent when the payload is compressed or not valid in its alphabet.
    pub text: Option<String>,
}

/// `+CMGR` / `+CMGL` stat codes in PDU mode.
pub fn message_status(stat: u8) -> &'static str {
    match stat {
        0 => "unread",
        1 => "read",
        2 => "unsent",
        3 => "sent",
        _ => "unknown",
    }
}

// ───────────────────────────────────────────────────────────────
// ModemService
// ───────────────────────────────────────────────────────────────

/// Orchestrates channels, calls and messages.
pub struct ModemService {
    config: ModemConfig,
    sink: SharedSink,
    call: Channel,
    misc: Channel,
    unsolicited: Channel,
    /// Distinct channels, in the order they were first named.
    devices: Vec<Channel>,
    calls: CallHandler,
    bringup: RefCell<Option<Task>>,
}

impl ModemService {
    /// Validate `config`, create the channels and install the default
    /// unsolicited handlers.  Nothing is sent until [`start`](Self::start).
    pub fn new(config: ModemConfig, sink: SharedSink) -> Result<Self, Error> {
        config.validate()?;
        let timeout = config.command_timeout();
        let mut devices = Vec::new();
        let call = open_channel(&mut devices, &config.channels.call, timeout);
        let misc = open_channel(&mut devices, &config.channels.misc, timeout);
        let unsolicited = open_channel(&mut devices, &config.channels.unsolicited, timeout);

        let calls = CallHandler::new(sink.clone());
        calls.set_cancel_outgoing(&config.cancel_outgoing);
        for channel in &devices {
            handlers::install(channel, &calls, &sink);
        }
        info!(
            "modem service: {} channel(s), timeout {:?}",
            devices.len(),
            timeout
        );

        Ok(Self {
            config,
            sink,
            call,
            misc,
            unsolicited,
            devices,
            calls,
            bringup: RefCell::new(None),
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Queue the init set on every channel and start the bring-up
    /// sequence on the unsolicited channel.
    pub fn start(&self) {
        for channel in &self.devices {
            if channel.same_channel(&self.unsolicited) {
                continue;
            }
            for cmd in &self.config.commands.init {
                channel.submit(cmd.as_str());
            }
        }
        let bringup = Bringup::new(&self.config, self.sink.clone());
        *self.bringup.borrow_mut() = Some(Task::spawn(&self.unsolicited, "bring-up", bringup));
    }

    /// Whether the bring-up sequence has run to completion.
    pub fn is_started(&self) -> bool {
        self.bringup.borrow().as_ref().is_some_and(Task::is_finished)
    }

    pub fn set_data_port(&self, port: SharedDataCall) {
        self.calls.set_data_port(port);
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn channel(&self, kind: ChannelKind) -> &Channel {
        match kind {
            ChannelKind::Call => &self.call,
            ChannelKind::Misc => &self.misc,
            ChannelKind::Unsolicited => &self.unsolicited,
        }
    }

    /// Every distinct channel, once.
    pub fn channels(&self) -> &[Channel] {
        &self.devices
    }

    pub fn calls(&self) -> &CallHandler {
        &self.calls
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    // ── Calls ─────────────────────────────────────────────────

    /// Dial `number`.  Returns the slot the call occupies; progress is
    /// reported through [`ModemEvent::CallStatus`].
    pub fn call_initiate(&self, number: &str, call_type: CallType) -> Result<u8, Error> {
        Ok(self.calls.initiate(number, call_type, &self.call)?)
    }

    pub fn call_activate(&self, id: u8) -> Result<(), Error> {
        Ok(self.calls.activate(id, &self.call)?)
    }

    pub fn call_release(&self, id: u8) -> Result<(), Error> {
        Ok(self.calls.release(id, &self.call)?)
    }

    pub fn call_release_all(&self) -> Result<(), Error> {
        Ok(self.calls.release_all(&self.call)?)
    }

    pub fn call_hold(&self) -> Result<(), Error> {
        Ok(self.calls.hold(&self.call)?)
    }

    pub fn call_conference(&self) -> Result<(), Error> {
        Ok(self.calls.conference(&self.call)?)
    }

    pub fn call_transfer(&self) -> Result<(), Error> {
        Ok(self.calls.transfer(&self.call)?)
    }

    /// Re-read both slots with `+CLCC`.
    pub fn call_sync(&self) -> Task {
        self.calls.sync_status(&self.misc)
    }

    /// The data-call helper for slot `id` exited.
    pub fn data_call_ended(&self, id: u8) {
        self.calls.data_call_ended(id);
    }

    // ── Messages ──────────────────────────────────────────────

    /// Encode `text` for `number` and submit it.  `done` receives the
    /// message reference assigned by the network.
    pub fn sms_send(&self, number: &str, text: &str, done: impl FnOnce(Result<u8, Error>) + 'static) {
        match Sms::submit(number, text) {
            Ok(sms) => self.sms_send_pdu(&sms, done),
            Err(e) => done(Err(e.into())),
        }
    }

    /// Submit an already built PDU with `+CMGS=<length>`.
    pub fn sms_send_pdu(&self, sms: &Sms, done: impl FnOnce(Result<u8, Error>) + 'static) {
        let (hex, len) = match sms.encode().and_then(|hex| Ok((hex, sms.tpdu_len()?))) {
            Ok(pair) => pair,
            Err(e) => return done(Err(e.into())),
        };
        let command = Command::new(format!("+CMGS={len}\r{hex}"));
        Task::spawn(&self.misc, "sms-submit", SmsSubmit::new(command, done));
    }

    /// Read the message stored at `index`.
    pub fn sms_retrieve(&self, index: u32, done: impl FnOnce(Result<StoredMessage, Error>) + 'static) {
        self.misc
            .enqueue(format!("+CMGR={index}"), move |_, reply| {
                done(reply.map_err(Error::from).and_then(|lines| parse_stored(index, &lines)));
            });
    }

    // ── Passthrough ───────────────────────────────────────────

    /// Send `AT<text>` on `kind` and hand back the response lines.
    pub fn raw_command(
        &self,
        kind: ChannelKind,
        text: &str,
        done: impl FnOnce(Result<Vec<String>, Error>) + 'static,
    ) {
        self.channel(kind)
            .enqueue(text, move |_, reply| done(reply.map_err(Error::from)));
    }

    /// Abort the command in flight on `kind`.  `false` when nothing is
    /// in flight or it was already cancelled.
    pub fn cancel_command(&self, kind: ChannelKind) -> bool {
        self.channel(kind).request_cancel()
    }

    // ── Requests ──────────────────────────────────────────────

    /// Run one inbound request.  `reply` fires exactly once; for commands
    /// that talk to the modem it fires from the channel continuation.
    pub fn execute(&self, request: Request, reply: impl FnOnce(Response) + 'static) {
        let id = request.id;
        let done = move |result: Result<Value, Error>| {
            reply(match result {
                Ok(value) => Response::ok(id, value),
                Err(e) => Response::err(id, e),
            })
        };
        match request.command {
            ModemCommand::CallInitiate { number, call_type } => {
                done(self.call_initiate(&number, call_type).map(|slot| json!({ "id": slot })))
            }
            ModemCommand::CallActivate { call } => done(self.call_activate(call).map(|_| Value::Null)),
            ModemCommand::CallRelease { call } => done(self.call_release(call).map(|_| Value::Null)),
            ModemCommand::CallReleaseAll => done(self.call_release_all().map(|_| Value::Null)),
            ModemCommand::CallHold => done(self.call_hold().map(|_| Value::Null)),
            ModemCommand::CallConference => done(self.call_conference().map(|_| Value::Null)),
            ModemCommand::CallTransfer => done(self.call_transfer().map(|_| Value::Null)),
            ModemCommand::CallSync => {
                self.call_sync();
                done(Ok(Value::Null))
            }
            ModemCommand::SmsSend { number, text } => self.sms_send(&number, &text, move |r| {
                done(r.map(|mr| json!({ "message_reference": mr })))
            }),
            ModemCommand::SmsRetrieve { index } => self.sms_retrieve(index, move |r| {
                done(r.and_then(|msg| {
                    serde_json::to_value(msg).map_err(|e| ChannelError::Malformed(e.to_string()).into())
                }))
            }),
            ModemCommand::Raw { text, channel } => {
                self.raw_command(channel, &text, move |r| done(r.map(|lines| json!(lines))))
            }
            ModemCommand::Cancel { channel } => done(Ok(Value::Bool(self.cancel_command(channel)))),
        }
    }
}

fn open_channel(devices: &mut Vec<Channel>, path: &str, timeout: std::time::Duration) -> Channel {
    if let Some(existing) = devices.iter().find(|c| c.name() == path) {
        return existing.clone();
    }
    let channel = Channel::new(path, timeout);
    devices.push(channel.clone());
    channel
}

/// `+CMGR: <stat>,[<alpha>],<length>` followed by the PDU line.
fn parse_stored(index: u32, lines: &[String]) -> Result<StoredMessage, Error> {
    let malformed = || Error::Channel(ChannelError::Malformed(lines.join(" | ")));
    let at = lines
        .iter()
        .position(|l| l.starts_with("+CMGR:"))
        .ok_or_else(malformed)?;
    let stat = lines[at]
        .trim_start_matches("+CMGR:")
        .split(',')
        .next()
        .and_then(|s| s.trim().parse::<u8>().ok())
        .ok_or_else(malformed)?;
    let pdu = lines.get(at + 1).ok_or_else(malformed)?;
    let sms = Sms::decode(pdu)?;
    Ok(StoredMessage {
        index,
        status: message_status(stat),
        text: sms.text().ok(),
        sms,
    })
}

// ───────────────────────────────────────────────────────────────
// Sequences
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Setup,
    Pin,
    Sim,
}

/// Init and antenna sets, `+CPIN?`, then the SIM set once the SIM is
/// ready.  Failed setup commands are logged and skipped.
struct Bringup {
    phase: Phase,
    pending: VecDeque<String>,
    sim: Vec<String>,
    sink: SharedSink,
}

impl Bringup {
    fn new(config: &ModemConfig, sink: SharedSink) -> Self {
        let pending = config
            .commands
            .init
            .iter()
            .chain(&config.commands.antenna)
            .cloned()
            .collect();
        Self {
            phase: Phase::Setup,
            pending,
            sim: config.commands.sim.clone(),
            sink,
        }
    }

    fn sim_ready(&self, ready: bool) {
        info!("bring-up: SIM {}", if ready { "ready" } else { "not ready" });
        self.sink.borrow_mut().emit(&ModemEvent::SimReady { ready });
    }
}

impl Sequence for Bringup {
    fn resume(&mut self, outcome: Option<Outcome>) -> Step {
        match self.phase {
            Phase::Setup | Phase::Sim => {
                if let Some(Outcome { request, error: Some(e), .. }) = &outcome {
                    warn!("bring-up: '{}' failed: {}", request, e);
                }
            }
            Phase::Pin => {
                let ready = outcome.as_ref().and_then(|o| o.values("+CPIN")) == Some("READY");
                if !ready {
                    self.sim_ready(false);
                    return Step::Done;
                }
                self.phase = Phase::Sim;
                self.pending = self.sim.drain(..).collect();
            }
        }
        if let Some(cmd) = self.pending.pop_front() {
            return Step::Send(Command::new(cmd));
        }
        match self.phase {
            Phase::Setup => {
                self.phase = Phase::Pin;
                Step::Send(Command::new("+CPIN?"))
            }
            _ => {
                self.sim_ready(true);
                Step::Done
            }
        }
    }
}

/// One `+CMGS` exchange; the reply carries the message reference.
struct SmsSubmit {
    command: Option<Command>,
    done: Option<Box<dyn FnOnce(Result<u8, Error>)>>,
}

impl SmsSubmit {
    fn new(command: Command, done: impl FnOnce(Result<u8, Error>) + 'static) -> Self {
        Self {
            command: Some(command),
            done: Some(Box::new(done)),
        }
    }
}

impl Sequence for SmsSubmit {
    fn resume(&mut self, outcome: Option<Outcome>) -> Step {
        let Some(outcome) = outcome else {
            return match self.command.take() {
                Some(cmd) => Step::Send(cmd),
                None => Step::Done,
            };
        };
        let result = match (&outcome.error, outcome.values("+CMGS")) {
            (Some(e), _) => Err(Error::from(e.clone())),
            (None, Some(mr)) => mr
                .split(',')
                .next()
                .and_then(|v| v.trim().parse::<u8>().ok())
                .ok_or_else(|| ChannelError::Malformed(mr.to_string()).into()),
            (None, None) => Err(ChannelError::Malformed("missing +CMGS".into()).into()),
        };
        if let Some(done) = self.done.take() {
            done(result);
        }
        Step::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::EventSink;
    use crate::at::transport::MemoryTransport;
    use crate::call::CallStatus;
    use std::rc::Rc;
    use std::time::Instant;

    #[derive(Default)]
    struct RecordingSink(Vec<ModemEvent>);

    impl EventSink for RecordingSink {
        fn emit(&mut self, event: &ModemEvent) {
            self.0.push(event.clone());
        }
    }

    fn service(config: ModemConfig) -> (ModemService, Rc<RefCell<RecordingSink>>) {
        let sink = Rc::new(RefCell::new(RecordingSink::default()));
        let svc = ModemService::new(config, sink.clone()).unwrap();
        (svc, sink)
    }

    /// Write the next command and answer it with `reply`.
    fn exchange(ch: &Channel, t: &mut MemoryTransport, reply: &str) -> String {
        ch.on_writable(t, Instant::now());
        let written = t.take_written();
        ch.feed(reply.as_bytes(), Instant::now());
        written
    }

    #[test]
    fn equal_paths_share_one_channel() {
        let (svc, _) = service(ModemConfig::default());
        assert_eq!(svc.channels().len(), 1);
        assert!(svc.channel(ChannelKind::Call).same_channel(svc.channel(ChannelKind::Misc)));

        let mut config = ModemConfig::default();
        config.channels.call = "/dev/ttyUSB0".into();
        let (svc, _) = service(config);
        assert_eq!(svc.channels().len(), 2);
        assert!(!svc.channel(ChannelKind::Call).same_channel(svc.channel(ChannelKind::Misc)));
        assert!(svc.channel(ChannelKind::Misc).same_channel(svc.channel(ChannelKind::Unsolicited)));
    }

    #[test]
    fn invalid_config_is_refused() {
        let mut config = ModemConfig::default();
        config.baud_rate = 0;
        let sink: SharedSink = Rc::new(RefCell::new(RecordingSink::default()));
        assert!(matches!(ModemService::new(config, sink), Err(Error::Config(_))));
    }

    #[test]
    fn bringup_sends_sim_set_when_ready() {
        let mut config = ModemConfig::default();
        config.commands.init = vec!["Z".into(), "E0V1".into()];
        config.commands.antenna = vec!["+CFUN=1".into()];
        let (svc, sink) = service(config);
        svc.start();
        let ch = svc.channel(ChannelKind::Unsolicited).clone();
        let mut t = MemoryTransport::new();

        assert_eq!(exchange(&ch, &mut t, "OK\r\n"), "ATZ\r\n");
        assert_eq!(exchange(&ch, &mut t, "ERROR\r\n"), "ATE0V1\r\n");
        assert_eq!(exchange(&ch, &mut t, "OK\r\n"), "AT+CFUN=1\r\n");
        assert_eq!(exchange(&ch, &mut t, "+CPIN: READY\r\nOK\r\n"), "AT+CPIN?\r\n");
        assert!(!svc.is_started());
        assert_eq!(exchange(&ch, &mut t, "OK\r\n"), "AT+CNMI=2,1,2,1,1\r\n");
        assert!(svc.is_started());
        assert_eq!(sink.borrow().0, vec![ModemEvent::SimReady { ready: true }]);
    }

    #[test]
    fn bringup_stops_when_pin_is_needed() {
        let mut config = ModemConfig::default();
        config.commands.init = vec![];
        let (svc, sink) = service(config);
        svc.start();
        let ch = svc.channel(ChannelKind::Unsolicited).clone();
        let mut t = MemoryTransport::new();
        assert_eq!(exchange(&ch, &mut t, "+CPIN: SIM PIN\r\nOK\r\n"), "AT+CPIN?\r\n");
        assert!(svc.is_started());
        assert!(ch.is_idle());
        assert_eq!(sink.borrow().0, vec![ModemEvent::SimReady { ready: false }]);
    }

    #[test]
    fn separate_channels_get_the_init_set() {
        let mut config = ModemConfig::default();
        config.channels.call = "/dev/ttyUSB0".into();
        config.commands.init = vec!["E0V1".into()];
        let (svc, _) = service(config);
        svc.start();
        assert_eq!(svc.channel(ChannelKind::Call).queued(), 1);
        assert_eq!(svc.channel(ChannelKind::Misc).queued(), 1);
    }

    #[test]
    fn sms_send_writes_two_part_command() {
        let (svc, _) = service(ModemConfig::default());
        let result = Rc::new(RefCell::new(None));
        let r = result.clone();
        svc.sms_send("+491234", "hello", move |res| *r.borrow_mut() = Some(res));

        let ch = svc.channel(ChannelKind::Misc).clone();
        let mut t = MemoryTransport::new();
        assert_eq!(exchange(&ch, &mut t, "> "), "AT+CMGS=16\r");
        assert_eq!(
            exchange(&ch, &mut t, "+CMGS: 42\r\nOK\r\n"),
            "00110006919421430000AA05E8329BFD06\u{1a}"
        );
        assert_eq!(*result.borrow(), Some(Ok(42)));
    }

    #[test]
    fn sms_send_rejects_overlong_text() {
        let (svc, _) = service(ModemConfig::default());
        let result = Rc::new(RefCell::new(None));
        let r = result.clone();
        svc.sms_send("+491234", &"x".repeat(161), move |res| *r.borrow_mut() = Some(res));
        assert!(matches!(*result.borrow(), Some(Err(Error::Pdu(_)))));
        assert!(svc.channel(ChannelKind::Misc).is_idle());
    }

    #[test]
    fn sms_retrieve_decodes_stored_pdu() {
        let (svc, _) = service(ModemConfig::default());
        let result = Rc::new(RefCell::new(None));
        let r = result.clone();
        svc.sms_retrieve(3, move |res| *r.borrow_mut() = Some(res));

        let ch = svc.channel(ChannelKind::Misc).clone();
        let mut t = MemoryTransport::new();
        let written = exchange(
            &ch,
            &mut t,
            "+CMGR: 1,,35\r\n0791447758100650040DD0F334FC1CA6970100008080312170224008D4F29CDE0EA7D9\r\nOK\r\n",
        );
        assert_eq!(written, "AT+CMGR=3\r\n");
        let msg = result.borrow_mut().take().unwrap().unwrap();
        assert_eq!(msg.index, 3);
        assert_eq!(msg.status, "read");
        assert_eq!(msg.text.as_deref(), Some("Testmail"));
    }

    #[test]
    fn sms_retrieve_reports_modem_error() {
        let (svc, _) = service(ModemConfig::default());
        let result = Rc::new(RefCell::new(None));
        let r = result.clone();
        svc.sms_retrieve(9, move |res| *r.borrow_mut() = Some(res));
        let ch = svc.channel(ChannelKind::Misc).clone();
        exchange(&ch, &mut MemoryTransport::new(), "+CMS ERROR: 321\r\n");
        assert!(matches!(
            *result.borrow(),
            Some(Err(Error::Channel(ChannelError::Modem(_))))
        ));
    }

    #[test]
    fn raw_command_and_cancel() {
        let (svc, _) = service(ModemConfig::default());
        let lines = Rc::new(RefCell::new(None));
        let l = lines.clone();
        svc.raw_command(ChannelKind::Misc, "+CGMI", move |r| *l.borrow_mut() = Some(r));
        assert!(!svc.cancel_command(ChannelKind::Misc), "nothing in flight yet");

        let ch = svc.channel(ChannelKind::Misc).clone();
        let mut t = MemoryTransport::new();
        ch.on_writable(&mut t, Instant::now());
        assert_eq!(t.take_written(), "AT+CGMI\r\n");
        assert!(svc.cancel_command(ChannelKind::Misc));
        assert!(!svc.cancel_command(ChannelKind::Misc));
        ch.on_writable(&mut t, Instant::now());
        assert_eq!(t.take_written(), "\u{1a}");
        ch.feed(b"OK\r\n", Instant::now());
        assert!(lines.borrow().is_none(), "cancelled command resolves nothing");
    }

    #[test]
    fn execute_answers_with_request_id() {
        let (svc, _) = service(ModemConfig::default());
        let responses = Rc::new(RefCell::new(Vec::new()));

        let r = responses.clone();
        let req: Request = serde_json::from_str(r#"{"id":1,"command":"call_initiate","number":"123"}"#).unwrap();
        svc.execute(req, move |resp| r.borrow_mut().push(resp));
        assert_eq!(svc.calls().status().0, CallStatus::Outgoing);

        let r = responses.clone();
        let req: Request = serde_json::from_str(r#"{"id":3,"command":"call_hold"}"#).unwrap();
        svc.execute(req, move |resp| r.borrow_mut().push(resp));

        let r = responses.clone();
        let req: Request = serde_json::from_str(r#"{"id":4,"command":"raw","text":"+CGMI"}"#).unwrap();
        svc.execute(req, move |resp| r.borrow_mut().push(resp));

        let ch = svc.channel(ChannelKind::Misc).clone();
        let mut t = MemoryTransport::new();
        assert_eq!(exchange(&ch, &mut t, "OK\r\n"), "ATD123;\r\n");
        assert_eq!(exchange(&ch, &mut t, "Siemens\r\nOK\r\n"), "AT+CGMI\r\n");

        let responses = responses.borrow();
        assert_eq!(responses[0], Response::ok(Some(1), json!({ "id": 1 })));
        assert_eq!(responses[1].id, Some(3));
        assert!(!responses[1].ok);
        assert_eq!(responses[2], Response::ok(Some(4), json!(["Siemens", "OK"])));
    }
}
