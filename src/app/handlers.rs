//! Default unsolicited-notification handlers.
//!
//! Installed on every channel of a [`ModemService`](super::service::ModemService)
//! under the names the channel derives from the notification prefix
//! (`+CRING` → `plusCRING`).

use log::{debug, info, warn};

use super::events::{ModemEvent, registration_name, rssi_to_percent};
use super::ports::SharedSink;
use crate::at::channel::Channel;
use crate::at::codes;
use crate::at::unsolicited::{UnsolicitedRegistry, split_values};
use crate::call::{CallHandler, CallStatus, CallType, CallUpdate, Direction, SLOTS};
use crate::sms::Sms;

/// Type-of-address for international numbers in `+CLIP`, `%CPI`, ...
const TOA_INTERNATIONAL: &str = "145";

/// Register the default handlers on `channel` and a logging fallback.
pub fn install(channel: &Channel, calls: &CallHandler, sink: &SharedSink) {
    channel.with_delegate(|reg| register(reg, calls, sink));
    let name = channel.name();
    channel.set_fallback(move |lines| info!("{}: unhandled {:?}", name, lines));
}

fn register(reg: &mut UnsolicitedRegistry, calls: &CallHandler, sink: &SharedSink) {
    // ── Calls ────────────────────────────────────────────────
    let c = calls.clone();
    reg.register("plusCRING", move |values, _| cring(&c, values));

    let c = calls.clone();
    reg.register("plusCLIP", move |values, _| clip(&c, values));

    let c = calls.clone();
    reg.register("plusCCWA", move |values, _| ccwa(&c, values));

    let c = calls.clone();
    reg.register("percentCPI", move |values, _| call_progress(&c, values));

    let c = calls.clone();
    reg.register("percentCCCN", move |values, _| call_control_notification(&c, values));

    // ── Messages ─────────────────────────────────────────────
    let s = sink.clone();
    reg.register("plusCMT", move |_, pdu| match pdu {
        Some(pdu) => incoming_pdu(&s, pdu),
        None => warn!("+CMT without PDU line"),
    });

    let s = sink.clone();
    reg.register("plusCMTI", move |values, _| {
        let v = split_values(values);
        match (v.first(), v.get(1).and_then(|i| i.parse::<u32>().ok())) {
            (Some(storage), Some(index)) => emit(
                &s,
                ModemEvent::NewMessage {
                    storage: (*storage).to_string(),
                    index,
                },
            ),
            _ => warn!("malformed +CMTI '{}'", values),
        }
    });

    let s = sink.clone();
    reg.register("plusCBM", move |values, pdu| match cell_broadcast(values, pdu.unwrap_or("")) {
        Some(event) => emit(&s, event),
        None => warn!("malformed +CBM '{}'", values),
    });

    // ── Network ──────────────────────────────────────────────
    let s = sink.clone();
    reg.register("plusCREG", move |values, _| {
        let v = split_values(values);
        let Some(stat) = v.first().and_then(|x| x.parse::<u8>().ok()) else {
            warn!("malformed +CREG '{}'", values);
            return;
        };
        let (lac, cid) = match v.as_slice() {
            [_, lac, cid, ..] => (Some((*lac).to_string()), Some((*cid).to_string())),
            _ => (None, None),
        };
        emit(
            &s,
            ModemEvent::NetworkStatus {
                registration: registration_name(stat).to_string(),
                lac,
                cid,
            },
        );
    });

    for name in ["percentCSQ", "plusCSQ"] {
        let s = sink.clone();
        reg.register(name, move |values, _| {
            match split_values(values).first().and_then(|x| x.parse::<u8>().ok()) {
                Some(rssi) => emit(&s, ModemEvent::SignalStrength { percent: rssi_to_percent(rssi) }),
                None => warn!("malformed signal report '{}'", values),
            }
        });
    }
}

fn emit(sink: &SharedSink, event: ModemEvent) {
    sink.borrow_mut().emit(&event);
}

/// Number as presented to callers: international numbers get a `+`.
pub fn presented_number(number: &str, toa: &str) -> String {
    if toa == TOA_INTERNATIONAL && !number.starts_with('+') {
        format!("+{number}")
    } else {
        number.to_string()
    }
}

fn first_slot_with(calls: &CallHandler, status: CallStatus) -> Option<u8> {
    (1..=SLOTS as u8).find(|&id| calls.call(id).is_some_and(|c| c.status == status))
}

// ---------------------------------------------------------------------------
// Call notifications
// ---------------------------------------------------------------------------

/// `+CRING: VOICE`.  Re-announces a ringing slot, or claims a free one
/// on modems that report calls through ring indications only.
fn cring(calls: &CallHandler, values: &str) {
    if first_slot_with(calls, CallStatus::Incoming).is_some() {
        calls.ring();
        return;
    }
    let call_type = if values.trim() == "VOICE" {
        CallType::Voice
    } else {
        CallType::Data
    };
    let Some(id) = first_slot_with(calls, CallStatus::Release) else {
        warn!("+CRING with no free call slot");
        return;
    };
    let update = CallUpdate::status(CallStatus::Incoming)
        .with_direction(Direction::Incoming)
        .with_type(call_type);
    if let Err(e) = calls.status_change_from_network(id, update) {
        warn!("+CRING: {}", e);
    }
}

/// `+CLIP: "+496912345678",145,,,,0`
fn clip(calls: &CallHandler, values: &str) {
    let v = split_values(values);
    let (Some(number), Some(toa)) = (v.first(), v.get(1)) else {
        return;
    };
    let update = CallUpdate::default().with_peer(presented_number(number, toa));
    if let Err(e) = calls.status_change_by_status(CallStatus::Incoming, update) {
        debug!("+CLIP ignored: {}", e);
    }
}

/// `+CCWA: "+496912345678",145,1`: a second call is waiting.
fn ccwa(calls: &CallHandler, values: &str) {
    let v = split_values(values);
    let (Some(number), Some(toa)) = (v.first(), v.get(1)) else {
        return;
    };
    let peer = presented_number(number, toa);
    let id = first_slot_with(calls, CallStatus::Incoming).or_else(|| first_slot_with(calls, CallStatus::Release));
    let Some(id) = id else {
        warn!("+CCWA with no free call slot");
        return;
    };
    let update = CallUpdate::status(CallStatus::Incoming)
        .with_direction(Direction::Incoming)
        .with_peer(peer);
    if let Err(e) = calls.status_change_from_network(id, update) {
        warn!("+CCWA: {}", e);
    }
}

/// `%CPI: <id>,<msgType>,<ibt>,<tch>,<dir>,<mode>,<number>,<toa>,<alpha>,<cause>,<line>`
///
/// Only setup (0), disconnect (1), connected (6), reject (8) and request
/// (9) change a slot; the other message types are progress noise.  A
/// release wipes the slot, so the reason only shows up in the log.
pub fn call_progress(calls: &CallHandler, values: &str) {
    let v = split_values(values);
    let field = |i: usize| v.get(i).copied().filter(|f| !f.is_empty());
    let Some(id) = field(0).and_then(|f| f.parse::<u8>().ok()) else {
        warn!("malformed %CPI '{}'", values);
        return;
    };

    let mut update = CallUpdate::default();
    if let (Some(number), Some(toa)) = (field(6), field(7)) {
        update = update.with_peer(presented_number(number, toa));
    }
    if let Some(cause) = field(9).and_then(|f| f.parse::<u16>().ok()) {
        update = update.with_property("reason", codes::release_cause(cause).unwrap_or("unknown cause"));
    }
    if let Some(line) = field(10).and_then(|f| f.parse::<u8>().ok()) {
        update = update.with_property("line", line);
    }

    match field(1) {
        Some("0") => {
            update.status = Some(CallStatus::Incoming);
            update.direction = Some(Direction::Incoming);
        }
        Some("1" | "8") => update.status = Some(CallStatus::Release),
        Some("6") => update.status = Some(CallStatus::Active),
        Some("9") => {
            update.status = Some(CallStatus::Outgoing);
            update.direction = Some(Direction::Outgoing);
        }
        _ => return,
    }
    if update.status == Some(CallStatus::Release) {
        if let Some(reason) = update.properties.get("reason") {
            info!("call {}: released: {}", id, reason);
        }
    }
    if let Err(e) = calls.status_change_from_network(id, update) {
        warn!("%CPI: {}", e);
    }
}

/// `%CCCN: 0,0,A10E02010402011030068101428F0101`
///
/// Heuristic: the element is BER-encoded, but only the hold/retrieve
/// notification is recognised, by matching its fixed octets and skipping
/// the invoke id.
pub fn call_control_notification(calls: &CallHandler, values: &str) {
    const HOLD_PATTERN: &str = "A10E020102011030068101428F01";
    let v = split_values(values);
    let (Some(call), Some(ie)) = (v.get(1).and_then(|c| c.parse::<u8>().ok()), v.get(2)) else {
        return;
    };
    let (Some(head), Some(tail), Some(flag)) = (ie.get(0..8), ie.get(10..30), ie.get(30..32)) else {
        return;
    };
    if format!("{head}{tail}") != HOLD_PATTERN {
        return;
    }
    let Ok(held) = u8::from_str_radix(flag, 16) else {
        return;
    };
    let Some(id) = call.checked_add(1) else {
        warn!("%CCCN: call index {} out of range", call);
        return;
    };
    let update = CallUpdate::default().with_property("held", held != 0);
    if let Err(e) = calls.status_change_from_network(id, update) {
        warn!("%CCCN: {}", e);
    }
}

// ---------------------------------------------------------------------------
// Message notifications
// ---------------------------------------------------------------------------

fn incoming_pdu(sink: &SharedSink, pdu: &str) {
    match Sms::decode(pdu) {
        Ok(sms) => {
            let text = sms.text().ok();
            emit(sink, ModemEvent::IncomingPdu { sms, text });
        }
        Err(e) => warn!("+CMT: undecodable PDU: {}", e),
    }
}

/// `+CBM: <length>` + PDU (serial, message id, dcs, page, content), or the
/// text-mode form `+CBM: <sn>,<mid>,<dcs>,<page>,<pages>` + text.
fn cell_broadcast(values: &str, pdu: &str) -> Option<ModemEvent> {
    let v = split_values(values);
    match v.len() {
        1 => Some(ModemEvent::CellBroadcast {
            channel: u16::from_str_radix(pdu.get(4..8)?, 16).ok()?,
            data: pdu.get(12..)?.to_string(),
        }),
        5 => Some(ModemEvent::CellBroadcast {
            channel: v[1].parse().ok()?,
            data: pdu.to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::events::ModemEvent;
    use crate::app::ports::EventSink;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct RecordingSink(Vec<ModemEvent>);

    impl EventSink for RecordingSink {
        fn emit(&mut self, event: &ModemEvent) {
            self.0.push(event.clone());
        }
    }

    fn setup() -> (CallHandler, Rc<RefCell<RecordingSink>>, UnsolicitedRegistry) {
        let sink = Rc::new(RefCell::new(RecordingSink::default()));
        let shared: SharedSink = sink.clone();
        let calls = CallHandler::new(shared.clone());
        let mut reg = UnsolicitedRegistry::new();
        register(&mut reg, &calls, &shared);
        (calls, sink, reg)
    }

    fn line(s: &str) -> Vec<String> {
        vec![s.to_string()]
    }

    #[test]
    fn cpi_setup_connect_release() {
        let (calls, sink, mut reg) = setup();
        assert!(reg.dispatch(&line(r#"%CPI: 1,0,0,0,1,0,"496912345678",145,,,0"#)));
        let call = calls.call(1).unwrap();
        assert_eq!(call.status, CallStatus::Incoming);
        assert_eq!(call.peer.as_deref(), Some("+496912345678"));
        assert_eq!(call.properties.get("line"), Some(&serde_json::json!(0)));

        // progress messages change nothing
        reg.dispatch(&line(r#"%CPI: 1,4,0,1,1,0,"496912345678",145,,,0"#));
        reg.dispatch(&line(r#"%CPI: 1,6,0,1,1,0,"496912345678",145,,,0"#));
        assert_eq!(calls.status().0, CallStatus::Active);
        reg.dispatch(&line(r#"%CPI: 1,1,0,1,0,0,"496912345678",145,,17,0"#));
        assert_eq!(calls.status().0, CallStatus::Release);
        assert_eq!(sink.borrow().0.len(), 3);
    }

    #[test]
    fn cpi_reject_and_outgoing() {
        let (calls, _sink, mut reg) = setup();
        reg.dispatch(&line(r#"%CPI: 2,9,0,0,0,0,"123",129,,,0"#));
        let call = calls.call(2).unwrap();
        assert_eq!(call.status, CallStatus::Outgoing);
        assert_eq!(call.peer.as_deref(), Some("123"));
        reg.dispatch(&line("%CPI: 2,8,0,0,,,,,,,0"));
        assert!(calls.call(2).unwrap().is_released());
    }

    #[test]
    fn cring_claims_free_slot_then_rings() {
        let (calls, sink, mut reg) = setup();
        reg.dispatch(&line("+CRING: VOICE"));
        reg.dispatch(&line(r#"+CLIP: "496912345678",145,,,,0"#));
        reg.dispatch(&line("+CRING: VOICE"));
        let call = calls.call(1).unwrap();
        assert_eq!(call.status, CallStatus::Incoming);
        assert_eq!(call.peer.as_deref(), Some("+496912345678"));
        assert_eq!(sink.borrow().0.len(), 3);
    }

    #[test]
    fn waiting_call_takes_second_slot() {
        let (calls, _sink, mut reg) = setup();
        calls
            .status_change_from_network(1, CallUpdate::status(CallStatus::Active))
            .unwrap();
        reg.dispatch(&line(r#"+CCWA: "555",129,1"#));
        assert_eq!(calls.status(), (CallStatus::Active, CallStatus::Incoming));
    }

    #[test]
    fn cccn_hold_heuristic() {
        let (calls, _sink, mut reg) = setup();
        calls
            .status_change_from_network(1, CallUpdate::status(CallStatus::Active))
            .unwrap();
        reg.dispatch(&line("%CCCN: 0,0,A10E02010402011030068101428F0101"));
        assert_eq!(calls.call(1).unwrap().properties.get("held"), Some(&serde_json::json!(true)));
        reg.dispatch(&line("%CCCN: 0,0,A10E02010502011030068101428F0100"));
        assert_eq!(calls.call(1).unwrap().properties.get("held"), Some(&serde_json::json!(false)));
        // unrelated element
        reg.dispatch(&line("%CCCN: 0,0,A11502010802013B300D04010F"));
        assert_eq!(calls.call(1).unwrap().properties.get("held"), Some(&serde_json::json!(false)));
    }

    #[test]
    fn cccn_out_of_range_index_is_dropped() {
        let (calls, sink, mut reg) = setup();
        reg.dispatch(&line("%CCCN: 0,255,A10E02010402011030068101428F0101"));
        assert_eq!(calls.status(), (CallStatus::Release, CallStatus::Release));
        assert!(sink.borrow().0.is_empty());
    }

    #[test]
    fn network_and_signal_events() {
        let (_calls, sink, mut reg) = setup();
        reg.dispatch(&line(r#"+CREG: 1,"000F","032F""#));
        reg.dispatch(&line("+CREG: 2"));
        reg.dispatch(&line("%CSQ:  17, 0, 1"));
        let events = &sink.borrow().0;
        assert_eq!(
            events[0],
            ModemEvent::NetworkStatus {
                registration: "home".into(),
                lac: Some("000F".into()),
                cid: Some("032F".into())
            }
        );
        assert_eq!(
            events[1],
            ModemEvent::NetworkStatus {
                registration: "searching".into(),
                lac: None,
                cid: None
            }
        );
        assert_eq!(events[2], ModemEvent::SignalStrength { percent: 83 });
    }

    #[test]
    fn message_notifications() {
        let (_calls, sink, mut reg) = setup();
        reg.dispatch(&[
            "+CMT: ,35".to_string(),
            "0791447758100650040DD0F334FC1CA6970100008080312170224008D4F29CDE0EA7D9".to_string(),
        ]);
        reg.dispatch(&line(r#"+CMTI: "SM",7"#));
        reg.dispatch(&["+CBM: 88".to_string(), "001000DD001133DAED46".to_string()]);
        let events = &sink.borrow().0;
        match &events[0] {
            ModemEvent::IncomingPdu { sms, text } => {
                assert_eq!(sms.party.number, "sipgate");
                assert_eq!(text.as_deref(), Some("Testmail"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            events[1],
            ModemEvent::NewMessage {
                storage: "SM".into(),
                index: 7
            }
        );
        assert_eq!(
            events[2],
            ModemEvent::CellBroadcast {
                channel: 0x00DD,
                data: "33DAED46".into()
            }
        );
    }
}
