//! Modem bring-up and network notifications.

use gsmd::app::commands::{ChannelKind, Request};
use gsmd::app::events::ModemEvent;
use gsmd::config::ModemConfig;

use crate::mock_modem::MockModem;

fn short_config() -> ModemConfig {
    let mut config = ModemConfig::default();
    config.commands.init = vec!["Z".into(), "E0V1".into(), "+CMEE=1".into()];
    config
}

#[test]
fn full_bringup_with_ready_sim() {
    let mut m = MockModem::with_config(short_config());
    m.service.start();
    m.expect("ATZ\r\n", "OK\r\n");
    // echo still on for the first reply
    m.expect("ATE0V1\r\n", "ATE0V1\r\nOK\r\n");
    m.expect("AT+CMEE=1\r\n", "OK\r\n");
    m.expect("AT+CPIN?\r\n", "+CPIN: READY\r\n\r\nOK\r\n");
    m.expect("AT+CNMI=2,1,2,1,1\r\n", "OK\r\n");
    assert!(m.service.is_started());
    assert_eq!(m.events(), [ModemEvent::SimReady { ready: true }]);
}

#[test]
fn bringup_survives_failing_init_commands() {
    let mut m = MockModem::with_config(short_config());
    m.service.start();
    m.expect("ATZ\r\n", "ERROR\r\n");
    m.expect("ATE0V1\r\n", "+CME ERROR: 3\r\n");
    m.expect("AT+CMEE=1\r\n", "OK\r\n");
    m.expect("AT+CPIN?\r\n", "+CME ERROR: 10\r\n");
    assert!(m.service.is_started());
    assert_eq!(m.events(), [ModemEvent::SimReady { ready: false }]);
    assert_eq!(m.written(), "");
}

#[test]
fn notifications_during_bringup_are_routed() {
    let mut m = MockModem::with_config(short_config());
    m.service.start();
    assert_eq!(m.written(), "ATZ\r\n");
    m.reply("+CREG: 1,\"00C3\",\"1A2B\"\r\nOK\r\n");
    assert_eq!(
        m.take_events(),
        [ModemEvent::NetworkStatus {
            registration: "home".into(),
            lac: Some("00C3".into()),
            cid: Some("1A2B".into())
        }]
    );
    assert_eq!(m.written(), "ATE0V1\r\n");
}

#[test]
fn signal_reports_become_percentages() {
    let mut m = MockModem::new();
    m.reply("+CSQ: 31,99\r\n%CSQ: 15, 0, 1\r\n+CSQ: 99,99\r\n");
    assert_eq!(
        m.events(),
        [
            ModemEvent::SignalStrength { percent: 100 },
            ModemEvent::SignalStrength { percent: 79 },
            ModemEvent::SignalStrength { percent: 0 },
        ]
    );
}

#[test]
fn raw_and_cancel_requests() {
    let mut m = MockModem::new();
    let responses = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    for line in [
        r#"{"id":1,"command":"raw","text":"+COPS=?"}"#,
        r#"{"id":2,"command":"cancel","channel":"misc"}"#,
    ] {
        let r = responses.clone();
        let request: Request = serde_json::from_str(line).unwrap();
        if request.id == Some(2) {
            assert_eq!(m.written(), "AT+COPS=?\r\n");
        }
        m.service.execute(request, move |resp| r.borrow_mut().push(resp));
    }
    assert_eq!(m.written(), "\u{1a}");
    m.reply("OK\r\n");
    assert!(m.service.channel(ChannelKind::Misc).is_idle());

    let responses = responses.borrow();
    assert_eq!(responses.len(), 1, "cancelled command never answers");
    assert_eq!(responses[0].id, Some(2));
    assert_eq!(responses[0].value, serde_json::json!(true));
}
