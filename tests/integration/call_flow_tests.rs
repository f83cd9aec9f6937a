//! Call control end to end: user actions out, modem notifications in.

use std::cell::RefCell;
use std::rc::Rc;

use gsmd::app::commands::Request;
use gsmd::app::events::ModemEvent;
use gsmd::app::ports::SharedDataCall;
use gsmd::call::{CallStatus, CallType};
use gsmd::error::{CallError, Error};
use serde_json::json;

use crate::mock_modem::{FakeDataCall, MockModem};

use CallStatus::{Active, Held, Incoming, Outgoing, Release};

// ── Outgoing ──────────────────────────────────────────────────

#[test]
fn outgoing_voice_call_connects_and_releases() {
    let mut m = MockModem::new();
    assert_eq!(m.service.call_initiate("+4912345", CallType::Voice), Ok(1));
    m.expect("ATD+4912345;\r\n", "OK\r\n");

    m.reply("%CPI: 1,6,0,1,0,0,\"4912345\",145,,,0\r\n");
    assert_eq!(m.service.calls().status(), (Active, Release));

    m.service.call_release(1).unwrap();
    m.expect("ATH\r\n", "OK\r\n");
    m.reply("%CPI: 1,1,0,1,0,0,\"4912345\",145,,16,0\r\n");

    assert_eq!(m.call_statuses(), [(1, Outgoing), (1, Active), (1, Release)]);
}

#[test]
fn refused_dial_releases_the_slot() {
    let mut m = MockModem::new();
    m.service.call_initiate("5551234", CallType::Voice).unwrap();
    m.expect("ATD5551234;\r\n", "BUSY\r\n");
    assert_eq!(m.service.calls().status(), (Release, Release));
    assert_eq!(m.call_statuses(), [(1, Outgoing), (1, Release)]);
}

#[test]
fn outgoing_call_is_cancelled_with_configured_command() {
    let mut config = gsmd::config::ModemConfig::default();
    config.cancel_outgoing = "+CHUP".into();
    let mut m = MockModem::with_config(config);
    m.service.call_initiate("5551234", CallType::Voice).unwrap();
    assert_eq!(m.written(), "ATD5551234;\r\n");

    // dial still in flight; the cancel queues behind it
    m.service.call_release(1).unwrap();
    m.reply("OK\r\n");
    m.expect("AT+CHUP\r\n", "OK\r\n");
}

#[test]
fn overlong_dial_string_is_refused() {
    let mut m = MockModem::new();
    let number = "1".repeat(80);
    assert_eq!(
        m.service.call_initiate(&number, CallType::Voice),
        Err(Error::Call(CallError::DialStringTooLong))
    );
    assert_eq!(m.written(), "");
}

// ── Incoming ──────────────────────────────────────────────────

#[test]
fn incoming_call_rings_and_is_answered() {
    let mut m = MockModem::new();
    m.reply("\r\n+CRING: VOICE\r\n\r\n+CLIP: \"4930123\",145,,,,0\r\n");
    m.reply("+CRING: VOICE\r\n");
    let call = m.service.calls().call(1).unwrap();
    assert_eq!(call.status, Incoming);
    assert_eq!(call.peer.as_deref(), Some("+4930123"));

    m.service.call_activate(1).unwrap();
    m.expect("ATA\r\n", "OK\r\n");
    m.reply("%CPI: 1,6,0,1,1,0,\"4930123\",145,,,0\r\n");

    assert_eq!(m.call_statuses(), [(1, Incoming), (1, Incoming), (1, Incoming), (1, Active)]);
    match m.events().last() {
        Some(ModemEvent::CallStatus { properties, .. }) => {
            assert_eq!(properties.get("peer"), Some(&json!("+4930123")));
            assert_eq!(properties.get("direction"), Some(&json!("incoming")));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn waiting_call_is_accepted_with_chld() {
    let mut m = MockModem::new();
    m.reply("%CPI: 1,0,0,0,1,0,\"111\",129,,,0\r\n%CPI: 1,6,0,1,1,0,\"111\",129,,,0\r\n");
    m.reply("+CCWA: \"222\",129,1\r\n");
    assert_eq!(m.service.calls().status(), (Active, Incoming));

    m.service.call_activate(2).unwrap();
    m.expect("AT+CHLD=2\r\n", "OK\r\n");
}

#[test]
fn hold_resynchronises_from_call_list() {
    let mut m = MockModem::new();
    m.reply("%CPI: 1,9,0,0,0,0,\"111\",129,,,0\r\n%CPI: 1,6,0,1,0,0,\"111\",129,,,0\r\n");
    m.service.call_hold().unwrap();
    m.expect("AT+CHLD=2\r\n", "OK\r\n");
    m.expect("AT+CLCC\r\n", "+CLCC: 1,0,1,0,0,\"111\",129\r\nOK\r\n");
    assert_eq!(m.service.calls().status(), (Held, Release));

    m.service.call_activate(1).unwrap();
    m.expect("AT+CHLD=2\r\n", "OK\r\n");
    m.expect("AT+CLCC\r\n", "+CLCC: 1,0,0,0,0,\"111\",129\r\nOK\r\n");
    assert_eq!(m.service.calls().status(), (Active, Release));
}

#[test]
fn invalid_action_writes_nothing() {
    let mut m = MockModem::new();
    assert!(matches!(
        m.service.call_hold(),
        Err(Error::Call(CallError::InvalidAction { .. }))
    ));
    assert!(matches!(m.service.call_activate(3), Err(Error::Call(CallError::BadIndex(3)))));
    assert_eq!(m.written(), "");
    assert!(m.events().is_empty());
}

#[test]
fn release_all_hangs_up_in_any_state() {
    let mut m = MockModem::new();
    m.service.call_release_all().unwrap();
    m.expect("ATH\r\n", "OK\r\n");
}

#[test]
fn sync_releases_calls_the_modem_no_longer_lists() {
    let mut m = MockModem::new();
    m.reply("%CPI: 1,6,0,1,0,0,\"111\",129,,,0\r\n");
    let task = m.service.call_sync();
    m.expect("AT+CLCC\r\n", "OK\r\n");
    assert!(task.is_finished());
    assert_eq!(m.service.calls().status(), (Release, Release));
}

// ── Data calls ────────────────────────────────────────────────

#[test]
fn data_call_hands_device_to_helper() {
    let mut m = MockModem::new();
    let helper = Rc::new(RefCell::new(FakeDataCall::default()));
    let port: SharedDataCall = helper.clone();
    m.service.set_data_port(port);

    m.service.call_initiate("*99#", CallType::Data).unwrap();
    m.expect("ATD*99#\r\n", "CONNECT 115200\r\n");
    assert_eq!(helper.borrow().launches, [("/dev/ttySAC0".to_string(), 1)]);
    assert_eq!(m.service.calls().status(), (Active, Release));

    m.service.data_call_ended(1);
    assert_eq!(m.service.calls().status(), (Release, Release));
}

#[test]
fn data_call_without_helper_is_released() {
    let mut m = MockModem::new();
    m.service.call_initiate("*99#", CallType::Data).unwrap();
    m.expect("ATD*99#\r\n", "CONNECT\r\n");
    assert_eq!(m.service.calls().status(), (Release, Release));
}

// ── Requests ──────────────────────────────────────────────────

#[test]
fn json_requests_drive_call_actions() {
    let mut m = MockModem::new();
    let responses = Rc::new(RefCell::new(Vec::new()));

    for line in [
        r#"{"id":1,"command":"call_initiate","number":"123","type":"voice"}"#,
        r#"{"id":2,"command":"call_release","call":1}"#,
        r#"{"id":3,"command":"call_release","call":2}"#,
    ] {
        let r = responses.clone();
        let request: Request = serde_json::from_str(line).unwrap();
        m.service.execute(request, move |resp| r.borrow_mut().push(resp));
    }
    m.expect("ATD123;\r\n", "OK\r\n");
    m.expect("ATH\r\n", "OK\r\n");

    let responses = responses.borrow();
    assert_eq!(responses.len(), 3);
    assert!(responses[0].ok && responses[1].ok);
    assert_eq!(responses[0].value, json!({ "id": 1 }));
    assert_eq!(responses[2].id, Some(3));
    assert!(!responses[2].ok);
}
