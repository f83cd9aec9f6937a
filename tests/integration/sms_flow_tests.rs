//! Message submission, retrieval and delivery notifications.

use std::cell::RefCell;
use std::rc::Rc;

use gsmd::app::commands::{ChannelKind, Request};
use gsmd::app::events::ModemEvent;
use gsmd::error::{ChannelError, Error};
use gsmd::sms::{Alphabet, Sms};
use serde_json::json;

use crate::mock_modem::MockModem;

const SIPGATE: &str = "0791447758100650040DD0F334FC1CA6970100008080312170224008D4F29CDE0EA7D9";

fn slot<T: 'static>() -> (Rc<RefCell<Option<T>>>, impl FnOnce(T) + 'static) {
    let cell = Rc::new(RefCell::new(None));
    let c = cell.clone();
    (cell, move |v| *c.borrow_mut() = Some(v))
}

#[test]
fn submit_waits_for_prompt_then_sends_pdu() {
    let mut m = MockModem::new();
    let (result, done) = slot();
    m.service.sms_send("+491234", "hello", done);

    m.expect("AT+CMGS=16\r", "> ");
    m.expect("00110006919421430000AA05E8329BFD06\u{1a}", "\r\n+CMGS: 7\r\n\r\nOK\r\n");
    assert_eq!(*result.borrow(), Some(Ok(7)));
}

#[test]
fn unicode_text_goes_out_as_ucs2() {
    let mut m = MockModem::new();
    let sms = Sms::submit("+491234", "Grüße ☺").unwrap();
    assert_eq!(sms.dcs.alphabet, Alphabet::Ucs2);
    let (result, done) = slot();
    m.service.sms_send_pdu(&sms, done);

    let head = m.written();
    assert_eq!(head, format!("AT+CMGS={}\r", sms.tpdu_len().unwrap()));
    m.reply("> ");
    let body = m.written();
    assert_eq!(body.trim_end_matches('\u{1a}'), sms.encode().unwrap());
    m.reply("+CMGS: 200\r\nOK\r\n");
    assert_eq!(*result.borrow(), Some(Ok(200)));
}

#[test]
fn submit_failure_is_reported() {
    let mut m = MockModem::new();
    let (result, done) = slot();
    m.service.sms_send("+491234", "hello", done);
    m.expect("AT+CMGS=16\r", "> ");
    m.expect("00110006919421430000AA05E8329BFD06\u{1a}", "+CMS ERROR: 500\r\n");
    assert!(matches!(
        *result.borrow(),
        Some(Err(Error::Channel(ChannelError::Modem(_))))
    ));
}

#[test]
fn missing_prompt_fails_the_submit() {
    let mut m = MockModem::new();
    let (result, done) = slot();
    m.service.sms_send("+491234", "hello", done);
    m.expect("AT+CMGS=16\r", "OK\r\n");
    assert!(matches!(
        *result.borrow(),
        Some(Err(Error::Channel(ChannelError::UnexpectedTerminal(_))))
    ));
    assert!(m.channel().is_idle());
}

#[test]
fn stored_message_is_read_back() {
    let mut m = MockModem::new();
    let (result, done) = slot();
    m.service.sms_retrieve(7, done);
    m.expect("AT+CMGR=7\r\n", &format!("+CMGR: 0,,35\r\n{SIPGATE}\r\n\r\nOK\r\n"));

    let msg = result.borrow_mut().take().unwrap().unwrap();
    assert_eq!(msg.status, "unread");
    assert_eq!(msg.sms.party.number, "sipgate");
    assert_eq!(msg.text.as_deref(), Some("Testmail"));
}

#[test]
fn delivery_notification_between_response_lines() {
    let mut m = MockModem::new();
    let (result, done) = slot();
    m.service.raw_command(ChannelKind::Misc, "+CGMI", done);
    assert_eq!(m.written(), "AT+CGMI\r\n");
    m.reply(&format!("Siemens\r\n+CMT: ,35\r\n{SIPGATE}\r\nOK\r\n"));

    assert_eq!(
        *result.borrow(),
        Some(Ok(vec!["Siemens".to_string(), "OK".to_string()]))
    );
    match m.events().as_slice() {
        [ModemEvent::IncomingPdu { sms, text }] => {
            assert_eq!(sms.party.number, "sipgate");
            assert_eq!(text.as_deref(), Some("Testmail"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn storage_and_broadcast_notifications() {
    let mut m = MockModem::new();
    m.reply("+CMTI: \"SM\",12\r\n");
    m.reply("+CBM: 88\r\n001000DD001133DAED46\r\n");
    assert_eq!(
        m.events(),
        [
            ModemEvent::NewMessage {
                storage: "SM".into(),
                index: 12
            },
            ModemEvent::CellBroadcast {
                channel: 0xDD,
                data: "33DAED46".into()
            },
        ]
    );
}

#[test]
fn undecodable_delivery_emits_nothing() {
    let mut m = MockModem::new();
    m.reply("+CMT: ,3\r\n07FF\r\n");
    assert!(m.events().is_empty());
}

#[test]
fn json_sms_requests() {
    let mut m = MockModem::new();
    let responses = Rc::new(RefCell::new(Vec::new()));
    for line in [
        r#"{"id":10,"command":"sms_send","number":"+491234","text":"hello"}"#,
        r#"{"id":11,"command":"sms_retrieve","index":7}"#,
    ] {
        let r = responses.clone();
        let request: Request = serde_json::from_str(line).unwrap();
        m.service.execute(request, move |resp| r.borrow_mut().push(resp));
    }
    m.expect("AT+CMGS=16\r", "> ");
    m.expect("00110006919421430000AA05E8329BFD06\u{1a}", "+CMGS: 3\r\nOK\r\n");
    m.expect("AT+CMGR=7\r\n", "+CMS ERROR: 321\r\n");

    let responses = responses.borrow();
    assert_eq!(responses[0].value, json!({ "message_reference": 3 }));
    assert_eq!(responses[1].id, Some(11));
    assert!(!responses[1].ok);
    assert!(responses[1].error.is_some());
}
