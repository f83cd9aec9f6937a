//! Application core — modem orchestration with no I/O of its own.
//!
//! [`service::ModemService`] wires channels, the call handler and the
//! default unsolicited handlers together.  Everything that leaves the
//! engine goes through the port traits in [`ports`], so the whole layer
//! runs against in-memory transports and recording sinks in tests.

pub mod commands;
pub mod events;
pub mod handlers;
pub mod ports;
pub mod service;

pub use commands::{ChannelKind, ModemCommand, Request, Response};
pub use events::ModemEvent;
pub use service::{ModemService, StoredMessage};
