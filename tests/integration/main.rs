//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that drives a [`ModemService`] against
//! a scripted in-memory modem.  No serial device is required.
//!
//! [`ModemService`]: gsmd::app::service::ModemService

mod bringup_tests;
mod call_flow_tests;
mod mock_modem;
mod sms_flow_tests;
