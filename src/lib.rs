//! gsmd library.
//!
//! GSM modem protocol engine: AT command channels with unsolicited
//! routing, command sequencing, two-slot call control and the SMS PDU
//! codec, tied together by [`app::service::ModemService`].  Exposed for
//! integration testing; the daemon binary lives behind the `daemon`
//! feature.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod at;
pub mod call;
pub mod config;
pub mod error;
pub mod io_task;
pub mod sms;

pub use error::{Error, Result};
