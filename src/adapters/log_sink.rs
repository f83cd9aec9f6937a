//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing every [`ModemEvent`] as one
//! structured line to the `log` facade (stderr via `env_logger` in the
//! daemon).

use log::info;

use crate::app::events::ModemEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`ModemEvent`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &ModemEvent) {
        match event {
            ModemEvent::CallStatus { id, status, properties } => {
                info!("CALL  | {} -> {} {:?}", id, status, properties);
            }
            ModemEvent::IncomingPdu { sms, text } => {
                info!(
                    "SMS   | from={} dcs=0x{:02X} text={:?}",
                    sms.party.number,
                    sms.dcs.raw,
                    text
                );
            }
            ModemEvent::NewMessage { storage, index } => {
                info!("SMS   | stored {}:{}", storage, index);
            }
            ModemEvent::CellBroadcast { channel, data } => {
                info!("CBM   | channel={} {} bytes", channel, data.len() / 2);
            }
            ModemEvent::NetworkStatus { registration, lac, cid } => {
                info!("NET   | {} lac={:?} cid={:?}", registration, lac, cid);
            }
            ModemEvent::SignalStrength { percent } => {
                info!("SIGNAL| {}%", percent);
            }
            ModemEvent::SimReady { ready } => {
                info!("SIM   | ready={}", ready);
            }
        }
    }
}
