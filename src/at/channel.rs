//! AT command channel — FIFO queue, single in-flight command, timeouts.
//!
//! The channel is transport-decoupled: it never owns a transport.  The I/O
//! driver feeds it bytes, tells it when the transport is writable, and
//! polls it for expired deadlines, handing in the transport on each call
//! that may write.
//!
//! ```text
//!  enqueue ──▶ ┌────────┐  writable   ┌──────────┐  terminal line  ┌──────────────┐
//!              │ queue  │────────────▶│ in-flight│────────────────▶│ continuation │
//!              └────────┘  (1 write)  └──────────┘  or timeout      └──────────────┘
//!                                          │  "> "
//!                                          ▼
//!                                      body write (two-part commands)
//! ```
//!
//! Continuations and unsolicited handlers run only after the channel's
//! internal state has been released, so they may enqueue further commands
//! on this or any other channel.  Such an enqueue simply appends.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use super::parser::{LineParser, ParserSink};
use super::prefix::{PrefixCache, PrefixSet};
use super::transport::{CANCEL_BYTE, Transport};
use super::unsolicited::UnsolicitedRegistry;
use crate::error::{ChannelError, ModemError};

/// Default per-command timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Outcome handed to a continuation: the response lines, or the failure.
pub type Reply = Result<Vec<String>, ChannelError>;

/// Called exactly once with the original request text and its outcome.
pub type Continuation = Box<dyn FnOnce(&str, Reply)>;

type Fallback = Box<dyn FnMut(&[String])>;

// ── Command description ──────────────────────────────────────

/// A command to enqueue.
#[derive(Debug, Clone)]
pub struct Command {
    text: String,
    raw: bool,
    prefixes: Option<Vec<String>>,
}

impl Command {
    /// A command sent as `AT<text>`.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            raw: false,
            prefixes: None,
        }
    }

    /// A command sent verbatim, without the `AT` prefix.
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            raw: true,
            ..Self::new(text)
        }
    }

    /// Override the derived response-prefix set.
    pub fn with_prefixes(mut self, prefixes: &[&str]) -> Self {
        self.prefixes = Some(prefixes.iter().map(|p| (*p).to_string()).collect());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Physical writes: the head, plus a body when the text embeds `\r`.
    fn wire(&self) -> (Vec<u8>, Option<Vec<u8>>) {
        let lead = if self.raw { "" } else { "AT" };
        match self.text.split_once('\r') {
            None => (format!("{lead}{}\r\n", self.text).into_bytes(), None),
            Some((head, body)) => {
                let mut body = body.as_bytes().to_vec();
                body.push(CANCEL_BYTE);
                (format!("{lead}{head}\r").into_bytes(), Some(body))
            }
        }
    }
}

impl From<&str> for Command {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Command {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

// ── Queue entries ────────────────────────────────────────────

struct PendingCommand {
    request: String,
    head: Vec<u8>,
    body: Option<Vec<u8>>,
    prefixes: PrefixSet,
    continuation: Continuation,
    enqueued_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Head,
    Body,
}

struct InFlight {
    cmd: PendingCommand,
    stage: Stage,
    /// Current stage's bytes are on the wire.
    written: bool,
    deadline: Option<Instant>,
    /// Caller aborted it; the eventual terminal line is swallowed.
    cancelled: bool,
    /// Abort requested without a transport at hand; written on the next
    /// writable edge.
    cancel_requested: bool,
}

impl InFlight {
    fn stage_bytes(&self) -> &[u8] {
        match (self.stage, &self.cmd.body) {
            (Stage::Body, Some(body)) => body,
            _ => &self.cmd.head,
        }
    }
}

/// Work produced while the core is borrowed, run after it is released.
enum Deferred {
    Resolve {
        request: String,
        continuation: Continuation,
        reply: Reply,
    },
    Unsolicited(Vec<String>),
}

// ── Channel core ─────────────────────────────────────────────

struct Core {
    name: String,
    queue: VecDeque<PendingCommand>,
    in_flight: Option<InFlight>,
    timeout: Duration,
    wants_write: bool,
    parser: LineParser,
    prefixes: PrefixCache,
    deferred: Vec<Deferred>,
}

impl Core {
    fn arm_if_queued(&mut self) {
        if self.in_flight.is_none() && !self.queue.is_empty() {
            self.wants_write = true;
        }
    }

    fn resolve(&mut self, flight: InFlight, reply: Reply) {
        debug!(
            "{}: '{}' resolved after {:?}",
            self.name,
            flight.cmd.request,
            flight.cmd.enqueued_at.elapsed()
        );
        self.deferred.push(Deferred::Resolve {
            request: flight.cmd.request,
            continuation: flight.cmd.continuation,
            reply,
        });
    }

    fn fail_all(&mut self, err: &ChannelError) {
        if let Some(flight) = self.in_flight.take() {
            if !flight.cancelled {
                self.resolve(flight, Err(err.clone()));
            }
        }
        while let Some(cmd) = self.queue.pop_front() {
            self.deferred.push(Deferred::Resolve {
                request: cmd.request,
                continuation: cmd.continuation,
                reply: Err(err.clone()),
            });
        }
        self.wants_write = false;
        self.parser.reset();
    }
}

impl ParserSink for Core {
    fn awaiting_response(&self) -> bool {
        self.in_flight.is_some()
    }

    fn expects_prefix(&self, line: &str) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|f| f.cmd.prefixes.iter().any(|p| line.starts_with(p.as_str())))
    }

    fn response(&mut self, lines: Vec<String>) {
        let Some(flight) = self.in_flight.take() else {
            self.deferred.push(Deferred::Unsolicited(lines));
            return;
        };
        let terminal = lines.last().cloned().unwrap_or_default();

        if flight.cancelled {
            debug!("{}: swallowing '{}' for cancelled command", self.name, terminal);
            self.arm_if_queued();
            return;
        }

        let reply = match ModemError::from_terminal(&terminal) {
            Some(e) => Err(ChannelError::Modem(e)),
            // Head of a two-part command must be answered by the prompt.
            None if flight.stage == Stage::Head && flight.cmd.body.is_some() => {
                Err(ChannelError::UnexpectedTerminal(terminal))
            }
            None => Ok(lines),
        };
        self.resolve(flight, reply);
        self.arm_if_queued();
    }

    fn unsolicited(&mut self, lines: Vec<String>) {
        self.deferred.push(Deferred::Unsolicited(lines));
    }

    fn prompt(&mut self) {
        match self.in_flight.as_mut() {
            Some(f) if f.stage == Stage::Head && f.cmd.body.is_some() => {
                f.stage = Stage::Body;
                f.written = false;
                self.wants_write = true;
            }
            _ => warn!("{}: continuation prompt without a pending body", self.name),
        }
    }
}

// ── Public handle ────────────────────────────────────────────

struct Shared {
    core: RefCell<Core>,
    delegate: RefCell<Option<UnsolicitedRegistry>>,
    fallback: RefCell<Option<Fallback>>,
}

/// Cheaply clonable handle to one command channel.
#[derive(Clone)]
pub struct Channel {
    shared: Rc<Shared>,
}

impl Channel {
    pub fn new(name: &str, timeout: Duration) -> Self {
        let core = Core {
            name: name.to_string(),
            queue: VecDeque::new(),
            in_flight: None,
            timeout,
            wants_write: false,
            parser: LineParser::new(),
            prefixes: PrefixCache::new(),
            deferred: Vec::new(),
        };
        Self {
            shared: Rc::new(Shared {
                core: RefCell::new(core),
                delegate: RefCell::new(None),
                fallback: RefCell::new(None),
            }),
        }
    }

    pub fn name(&self) -> String {
        self.shared.core.borrow().name.clone()
    }

    pub fn timeout(&self) -> Duration {
        self.shared.core.borrow().timeout
    }

    /// Whether two handles refer to the same channel.
    pub fn same_channel(&self, other: &Channel) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    // ── Enqueue ──────────────────────────────────────────────

    /// Append a command; `done` fires exactly once with the outcome.
    pub fn enqueue(&self, cmd: impl Into<Command>, done: impl FnOnce(&str, Reply) + 'static) {
        let cmd = cmd.into();
        let (head, body) = cmd.wire();
        let mut core = self.shared.core.borrow_mut();
        let prefixes: PrefixSet = match &cmd.prefixes {
            Some(p) => p.clone().into(),
            None => core.prefixes.get(&cmd.text),
        };
        core.queue.push_back(PendingCommand {
            request: cmd.text,
            head,
            body,
            prefixes,
            continuation: Box::new(done),
            enqueued_at: Instant::now(),
        });
        if core.in_flight.is_none() && !core.wants_write && core.queue.len() == 1 {
            core.wants_write = true;
        }
    }

    /// Two-continuation form of [`enqueue`](Self::enqueue).
    pub fn enqueue_split(
        &self,
        cmd: impl Into<Command>,
        on_ok: impl FnOnce(&str, Vec<String>) + 'static,
        on_err: impl FnOnce(&str, ChannelError) + 'static,
    ) {
        self.enqueue(cmd, move |request, reply| match reply {
            Ok(lines) => on_ok(request, lines),
            Err(e) => on_err(request, e),
        });
    }

    /// Enqueue text verbatim (no `AT` prefix).
    pub fn enqueue_raw(&self, text: &str, done: impl FnOnce(&str, Reply) + 'static) {
        self.enqueue(Command::raw(text), done);
    }

    /// Fire-and-forget: failures are logged.
    pub fn submit(&self, cmd: impl Into<Command>) {
        let name = self.name();
        self.enqueue(cmd, move |request, reply| {
            if let Err(e) = reply {
                warn!("{}: '{}' failed: {}", name, request, e);
            }
        });
    }

    // ── Unsolicited routing ──────────────────────────────────

    pub fn set_delegate(&self, registry: UnsolicitedRegistry) {
        *self.shared.delegate.borrow_mut() = Some(registry);
    }

    /// Mutate the registered delegate in place (creating it if absent).
    pub fn with_delegate<R>(&self, f: impl FnOnce(&mut UnsolicitedRegistry) -> R) -> R {
        let mut slot = self.shared.delegate.borrow_mut();
        f(slot.get_or_insert_with(UnsolicitedRegistry::new))
    }

    /// Handler for unsolicited lines no delegate entry claims.
    pub fn set_fallback(&self, handler: impl FnMut(&[String]) + 'static) {
        *self.shared.fallback.borrow_mut() = Some(Box::new(handler));
    }

    // ── Transport events ─────────────────────────────────────

    /// Whether the channel is waiting for a writable edge.
    pub fn wants_write(&self) -> bool {
        self.shared.core.borrow().wants_write
    }

    /// Transport became writable: put the next stage on the wire.
    pub fn on_writable<T: Transport>(&self, transport: &mut T, now: Instant) {
        {
            let mut core = self.shared.core.borrow_mut();
            let core = &mut *core;
            if !core.wants_write {
                return;
            }
            core.wants_write = false;

            if core.in_flight.is_none() {
                if let Some(cmd) = core.queue.pop_front() {
                    debug_assert!(core.in_flight.is_none(), "two commands in flight");
                    core.in_flight = Some(InFlight {
                        cmd,
                        stage: Stage::Head,
                        written: false,
                        deadline: None,
                        cancelled: false,
                        cancel_requested: false,
                    });
                }
            }

            if let Some(flight) = core.in_flight.as_mut() {
                if flight.cancel_requested && !flight.cancelled {
                    if let Err(e) = transport.write_cancel() {
                        warn!("{}: cancel write failed: {:?}", core.name, e);
                    }
                    flight.cancelled = true;
                    info!("{}: cancelled '{}'", core.name, flight.cmd.request);
                } else if !flight.written {
                    debug!(
                        "{}: >> {:?}",
                        core.name,
                        String::from_utf8_lossy(flight.stage_bytes())
                    );
                    match transport.write_all(flight.stage_bytes()) {
                        Ok(()) => {
                            flight.written = true;
                            flight.deadline = Some(now + core.timeout);
                        }
                        Err(e) => {
                            error!("{}: write failed: {:?}", core.name, e);
                            if let Some(flight) = core.in_flight.take() {
                                core.resolve(flight, Err(ChannelError::Io(format!("{e:?}"))));
                            }
                            core.arm_if_queued();
                        }
                    }
                }
            }
        }
        self.run_deferred();
    }

    /// Bytes arrived from the transport.
    pub fn feed(&self, data: &[u8], now: Instant) {
        {
            let mut core = self.shared.core.borrow_mut();
            let core = &mut *core;
            let timeout = core.timeout;
            if let Some(flight) = core.in_flight.as_mut() {
                if flight.deadline.is_some() {
                    flight.deadline = Some(now + timeout);
                }
            }
            let mut parser = std::mem::take(&mut core.parser);
            parser.feed(data, core);
            core.parser = parser;
        }
        self.run_deferred();
    }

    /// Fire the in-flight command's timeout if its deadline has passed.
    /// Returns `true` when a timeout fired.
    pub fn poll_timeout<T: Transport>(&self, transport: &mut T, now: Instant) -> bool {
        let fired = {
            let mut core = self.shared.core.borrow_mut();
            let core = &mut *core;
            let expired = core
                .in_flight
                .as_ref()
                .and_then(|f| f.deadline)
                .is_some_and(|d| now >= d);
            if expired {
                if let Err(e) = transport.write_cancel() {
                    warn!("{}: cancel write failed: {:?}", core.name, e);
                }
                core.parser.reset();
                if let Some(flight) = core.in_flight.take() {
                    warn!("{}: '{}' timed out", core.name, flight.cmd.request);
                    if !flight.cancelled {
                        let secs = core.timeout.as_secs();
                        core.resolve(flight, Err(ChannelError::Timeout { secs }));
                    }
                }
                core.arm_if_queued();
            }
            expired
        };
        self.run_deferred();
        fired
    }

    /// Abort the in-flight command on the wire.  Its continuation will not
    /// fire; the terminal line the abort provokes is consumed silently.
    pub fn cancel_current<T: Transport>(&self, transport: &mut T) -> bool {
        let mut core = self.shared.core.borrow_mut();
        let core = &mut *core;
        let Some(flight) = core.in_flight.as_mut() else {
            return false;
        };
        if flight.cancelled {
            return false;
        }
        if let Err(e) = transport.write_cancel() {
            warn!("{}: cancel write failed: {:?}", core.name, e);
        }
        flight.cancelled = true;
        info!("{}: cancelled '{}'", core.name, flight.cmd.request);
        true
    }

    /// Like [`cancel_current`](Self::cancel_current), for callers that do
    /// not hold the transport: the cancel byte goes out on the next
    /// [`on_writable`](Self::on_writable).
    pub fn request_cancel(&self) -> bool {
        let mut core = self.shared.core.borrow_mut();
        let Some(flight) = core.in_flight.as_mut() else {
            return false;
        };
        if flight.cancelled || flight.cancel_requested {
            return false;
        }
        flight.cancel_requested = true;
        core.wants_write = true;
        true
    }

    /// The transport is gone: fail everything with [`ChannelError::Hangup`].
    pub fn hangup(&self) {
        {
            let mut core = self.shared.core.borrow_mut();
            warn!("{}: hangup, failing {} queued", core.name, core.queue.len());
            core.fail_all(&ChannelError::Hangup);
        }
        self.run_deferred();
    }

    // ── Introspection ────────────────────────────────────────

    pub fn in_flight(&self) -> Option<String> {
        self.shared
            .core
            .borrow()
            .in_flight
            .as_ref()
            .map(|f| f.cmd.request.clone())
    }

    pub fn queued(&self) -> usize {
        self.shared.core.borrow().queue.len()
    }

    pub fn is_idle(&self) -> bool {
        let core = self.shared.core.borrow();
        core.in_flight.is_none() && core.queue.is_empty()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.shared
            .core
            .borrow()
            .in_flight
            .as_ref()
            .and_then(|f| f.deadline)
    }

    // ── Deferred work ────────────────────────────────────────

    fn run_deferred(&self) {
        loop {
            let batch = std::mem::take(&mut self.shared.core.borrow_mut().deferred);
            if batch.is_empty() {
                return;
            }
            for item in batch {
                match item {
                    Deferred::Resolve {
                        request,
                        continuation,
                        reply,
                    } => continuation(&request, reply),
                    Deferred::Unsolicited(lines) => self.dispatch_unsolicited(&lines),
                }
            }
        }
    }

    fn dispatch_unsolicited(&self, lines: &[String]) {
        let taken = self.shared.delegate.borrow_mut().take();
        let handled = match taken {
            Some(mut registry) => {
                let handled = registry.dispatch(lines);
                let mut slot = self.shared.delegate.borrow_mut();
                if slot.is_none() {
                    *slot = Some(registry);
                }
                handled
            }
            None => false,
        };
        if handled {
            return;
        }

        let taken = self.shared.fallback.borrow_mut().take();
        match taken {
            Some(mut fallback) => {
                fallback(lines);
                let mut slot = self.shared.fallback.borrow_mut();
                if slot.is_none() {
                    *slot = Some(fallback);
                }
            }
            None => info!("{}: unhandled unsolicited {:?}", self.name(), lines),
        }
    }
}
