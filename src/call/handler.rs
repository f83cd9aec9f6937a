//! Call handler — owns the two call slots.
//!
//! User actions go through the transition table and enqueue the matching
//! command; network notifications (`%CPI`, `+CRING`, `+CLCC`, ...) update
//! a slot directly.  Every observable change is announced through the
//! event sink, except that an unchanged slot is not re-announced (an
//! `incoming` slot always is, so repeated rings reach the caller).

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use log::{info, warn};

use super::clcc::{ClccEntry, ClccSync};
use super::table::{self, Effect};
use super::{Action, Call, CallStatus, CallType, CallUpdate, Direction, SLOTS};
use crate::app::events::ModemEvent;
use crate::app::ports::{SharedDataCall, SharedSink};
use crate::at::channel::{Channel, Reply};
use crate::at::sequence::Task;
use crate::error::{CallError, ChannelError};

/// Longest dial command (`D` + number + `;`) accepted.
pub const DIAL_MAX: usize = 64;

/// Observer invoked after every user action with its outcome.
pub type Hook = Box<dyn FnMut(Action, Result<(), &CallError>)>;

struct Inner {
    calls: [Call; SLOTS],
    hook: Option<Hook>,
    sink: SharedSink,
    data: Option<SharedDataCall>,
    cancel_outgoing: String,
}

/// Clonable handle to the call state.
#[derive(Clone)]
pub struct CallHandler {
    inner: Rc<RefCell<Inner>>,
}

impl CallHandler {
    pub fn new(sink: SharedSink) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                calls: Default::default(),
                hook: None,
                sink,
                data: None,
                cancel_outgoing: "H".to_string(),
            })),
        }
    }

    /// Command that aborts an outgoing call on this modem.
    pub fn set_cancel_outgoing(&self, command: &str) {
        self.inner.borrow_mut().cancel_outgoing = command.to_string();
    }

    pub fn set_data_port(&self, port: SharedDataCall) {
        self.inner.borrow_mut().data = Some(port);
    }

    pub fn set_hook(&self, hook: impl FnMut(Action, Result<(), &CallError>) + 'static) {
        self.inner.borrow_mut().hook = Some(Box::new(hook));
    }

    pub fn unset_hook(&self) {
        self.inner.borrow_mut().hook = None;
    }

    // ── Queries ──────────────────────────────────────────────

    pub fn status(&self) -> (CallStatus, CallStatus) {
        let inner = self.inner.borrow();
        (inner.calls[0].status, inner.calls[1].status)
    }

    pub fn is_busy(&self) -> bool {
        let (a, b) = self.status();
        a != CallStatus::Release || b != CallStatus::Release
    }

    pub fn call(&self, id: u8) -> Option<Call> {
        let idx = slot_index(id).ok()?;
        Some(self.inner.borrow().calls[idx].clone())
    }

    // ── User actions ─────────────────────────────────────────

    /// Dial `number`.  Voice calls get the trailing `;`.  Returns the slot.
    pub fn initiate(&self, number: &str, call_type: CallType, channel: &Channel) -> Result<u8, CallError> {
        let result = self.feed_user_input(Action::Initiate, None, channel, Some((number, call_type)));
        self.notify_hook(Action::Initiate, result.as_ref().map(|_| ()));
        result
    }

    pub fn activate(&self, index: u8, channel: &Channel) -> Result<(), CallError> {
        self.user_action(Action::Activate, Some(index), channel)
    }

    pub fn release(&self, index: u8, channel: &Channel) -> Result<(), CallError> {
        self.user_action(Action::Release, Some(index), channel)
    }

    pub fn release_all(&self, channel: &Channel) -> Result<(), CallError> {
        self.user_action(Action::DropAll, None, channel)
    }

    pub fn hold(&self, channel: &Channel) -> Result<(), CallError> {
        self.user_action(Action::Hold, None, channel)
    }

    pub fn conference(&self, channel: &Channel) -> Result<(), CallError> {
        self.user_action(Action::Conference, None, channel)
    }

    pub fn transfer(&self, channel: &Channel) -> Result<(), CallError> {
        self.user_action(Action::Connect, None, channel)
    }

    fn user_action(&self, action: Action, index: Option<u8>, channel: &Channel) -> Result<(), CallError> {
        if let Some(i) = index {
            slot_index(i)?;
        }
        let result = self.feed_user_input(action, index, channel, None).map(|_| ());
        self.notify_hook(action, result.as_ref().map(|_| ()));
        result
    }

    fn feed_user_input(
        &self,
        action: Action,
        index: Option<u8>,
        channel: &Channel,
        dial: Option<(&str, CallType)>,
    ) -> Result<u8, CallError> {
        let pair = self.status();
        let Some(effect) = table::lookup(pair, action, index) else {
            warn!("call: no {} in state ({}, {})", action.as_str(), pair.0, pair.1);
            return Err(CallError::InvalidAction { pair, action });
        };
        info!("call: {} in ({}, {}) -> {:?}", action.as_str(), pair.0, pair.1, effect);

        match effect {
            Effect::Send(cmd) => channel.submit(cmd),
            Effect::CancelOutgoing => {
                let cmd = self.inner.borrow().cancel_outgoing.clone();
                channel.submit(cmd);
            }
            Effect::SendAndSync(cmd) => {
                ClccSync::new(self.clone(), Some(cmd)).spawn(channel);
            }
            Effect::Dial => {
                let (number, call_type) = dial.unwrap_or(("", CallType::Voice));
                return self.dial(number, call_type, channel);
            }
        }
        Ok(index.unwrap_or(0))
    }

    fn dial(&self, number: &str, call_type: CallType, channel: &Channel) -> Result<u8, CallError> {
        let mut cmd: heapless::String<DIAL_MAX> = heapless::String::new();
        let suffix = if call_type == CallType::Voice { ";" } else { "" };
        write!(cmd, "D{number}{suffix}").map_err(|_| CallError::DialStringTooLong)?;

        let id = 1;
        self.status_change_from_network(
            id,
            CallUpdate::status(CallStatus::Outgoing)
                .with_direction(Direction::Outgoing)
                .with_peer(number)
                .with_type(call_type),
        )?;

        let handler = self.clone();
        let device = channel.name();
        channel.enqueue(cmd.as_str(), move |_, reply| {
            handler.dial_result(id, call_type, &device, reply);
        });
        Ok(id)
    }

    fn dial_result(&self, id: u8, call_type: CallType, device: &str, reply: Reply) {
        let outgoing = self.call(id).is_some_and(|c| c.status == CallStatus::Outgoing);
        match reply {
            Ok(lines) => {
                let connected = lines.last().is_some_and(|l| l.starts_with("CONNECT"));
                if connected && call_type == CallType::Data && outgoing {
                    self.data_call_connected(id, device);
                }
            }
            Err(ChannelError::Modem(e)) if outgoing => {
                info!("call {}: dial ended: {}", id, e.text);
                self.release_slot(id);
            }
            Err(e) if outgoing => {
                warn!("call {}: dial failed: {}", id, e);
                self.release_slot(id);
            }
            Err(_) => {}
        }
    }

    // ── Data calls ───────────────────────────────────────────

    fn data_call_connected(&self, id: u8, device: &str) {
        self.release_on_error(id, CallUpdate::status(CallStatus::Active));
        let port = self.inner.borrow().data.clone();
        let launched = match port {
            Some(port) => port.borrow_mut().launch(device, id).map_err(|e| e.to_string()),
            None => Err("no data-call port".to_string()),
        };
        if let Err(e) = launched {
            warn!("call {}: {}", id, e);
            self.release_slot(id);
        }
    }

    /// The data-call helper exited; the call is over regardless of why.
    pub fn data_call_ended(&self, id: u8) {
        info!("call {}: data helper exited", id);
        self.release_slot(id);
    }

    // ── Network events ───────────────────────────────────────

    /// Re-announce the ringing call.
    pub fn ring(&self) {
        let incoming = {
            let inner = self.inner.borrow();
            inner
                .calls
                .iter()
                .position(|c| c.status == CallStatus::Incoming)
        };
        if let Some(idx) = incoming {
            self.announce(idx);
        }
    }

    /// Merge `update` into slot `id` and announce it if anything changed.
    pub fn status_change_from_network(&self, id: u8, update: CallUpdate) -> Result<(), CallError> {
        let idx = slot_index(id)?;
        let changed = {
            let mut inner = self.inner.borrow_mut();
            let slot = &mut inner.calls[idx];
            let before = slot.clone();
            update.apply(slot);
            *slot != before || slot.status == CallStatus::Incoming
        };
        if changed {
            self.announce(idx);
        }
        Ok(())
    }

    /// Apply `update` to the only slot currently in `status`.
    pub fn status_change_by_status(&self, status: CallStatus, update: CallUpdate) -> Result<(), CallError> {
        let matching: Vec<usize> = {
            let inner = self.inner.borrow();
            inner
                .calls
                .iter()
                .enumerate()
                .filter(|(_, c)| c.status == status)
                .map(|(i, _)| i)
                .collect()
        };
        match matching.as_slice() {
            [idx] => self.status_change_from_network(*idx as u8 + 1, update),
            _ => Err(CallError::NonUniqueStatus(status)),
        }
    }

    /// List calls via `+CLCC` and reconcile both slots.
    pub fn sync_status(&self, channel: &Channel) -> Task {
        ClccSync::new(self.clone(), None).spawn(channel)
    }

    /// Bring both slots in line with a `+CLCC` listing.
    pub fn reconcile(&self, entries: &[ClccEntry]) {
        for id in 1..=SLOTS as u8 {
            let update = match entries.iter().find(|e| e.id == id) {
                Some(e) => {
                    let mut u = CallUpdate::status(e.status)
                        .with_direction(e.direction)
                        .with_type(e.call_type);
                    u.peer = e.number.clone();
                    if e.multiparty {
                        u = u.with_property("multiparty", true);
                    }
                    u
                }
                None => CallUpdate::status(CallStatus::Release),
            };
            self.release_on_error(id, update);
        }
        if let Some(extra) = entries.iter().find(|e| e.id as usize > SLOTS) {
            warn!("call: ignoring listed call {} beyond tracked slots", extra.id);
        }
    }

    // ── Internal ─────────────────────────────────────────────

    fn release_slot(&self, id: u8) {
        self.release_on_error(id, CallUpdate::status(CallStatus::Release));
    }

    fn release_on_error(&self, id: u8, update: CallUpdate) {
        if let Err(e) = self.status_change_from_network(id, update) {
            warn!("call: {}", e);
        }
    }

    fn announce(&self, idx: usize) {
        let (event, sink) = {
            let inner = self.inner.borrow();
            let call = &inner.calls[idx];
            let event = ModemEvent::CallStatus {
                id: idx as u8 + 1,
                status: call.status,
                properties: call.announced_properties(),
            };
            (event, Rc::clone(&inner.sink))
        };
        sink.borrow_mut().emit(&event);
    }

    fn notify_hook(&self, action: Action, result: Result<(), &CallError>) {
        let taken = self.inner.borrow_mut().hook.take();
        if let Some(mut hook) = taken {
            hook(action, result);
            let mut inner = self.inner.borrow_mut();
            if inner.hook.is_none() {
                inner.hook = Some(hook);
            }
        }
    }
}

fn slot_index(id: u8) -> Result<usize, CallError> {
    match id {
        1..=2 => Ok(id as usize - 1),
        _ => Err(CallError::BadIndex(id)),
    }
}
