//! Outbound modem notifications.
//!
//! The [`ModemService`](super::service::ModemService) and the
//! [`CallHandler`](crate::call::CallHandler) emit these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log them, print them as JSON lines,
//! forward them to a bus.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::call::CallStatus;
use crate::sms::Sms;

/// Structured events emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ModemEvent {
    /// A call slot changed observable state.
    CallStatus {
        id: u8,
        status: CallStatus,
        properties: Map<String, Value>,
    },

    /// A message was delivered directly (`+CMT`).  `text` is absent when
    /// the payload is compressed or not valid in its alphabet.
    IncomingPdu { sms: Sms, text: Option<String> },

    /// A message was stored on the SIM (`+CMTI`).
    NewMessage { storage: String, index: u32 },

    /// Cell broadcast page (`+CBM`): message identifier and content hex.
    CellBroadcast { channel: u16, data: String },

    /// Network registration (`+CREG`).
    NetworkStatus {
        registration: String,
        lac: Option<String>,
        cid: Option<String>,
    },

    /// Signal strength in percent.
    SignalStrength { percent: u8 },

    /// SIM state after bring-up.
    SimReady { ready: bool },
}

/// `+CREG` registration codes.
pub fn registration_name(code: u8) -> &'static str {
    match code {
        0 => "unregistered",
        1 => "home",
        2 => "searching",
        3 => "denied",
        5 => "roaming",
        _ => "unknown",
    }
}

/// Map a `+CSQ` RSSI (0..31, 99 unknown) to percent on a log scale.
pub fn rssi_to_percent(rssi: u8) -> u8 {
    match rssi {
        1..=31 => (f32::from(rssi).ln() / 31f32.ln() * 100.0).round() as u8,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag() {
        let ev = ModemEvent::SignalStrength { percent: 70 };
        let json = serde_json::to_string(&ev).unwrap();
        assert_eq!(json, r#"{"event":"signal_strength","percent":70}"#);
    }

    #[test]
    fn rssi_scale() {
        assert_eq!(rssi_to_percent(0), 0);
        assert_eq!(rssi_to_percent(31), 100);
        assert_eq!(rssi_to_percent(99), 0);
        assert_eq!(rssi_to_percent(1), 0);
        assert_eq!(rssi_to_percent(15), 79);
    }

    #[test]
    fn registration_names() {
        assert_eq!(registration_name(1), "home");
        assert_eq!(registration_name(5), "roaming");
        assert_eq!(registration_name(4), "unknown");
    }
}
