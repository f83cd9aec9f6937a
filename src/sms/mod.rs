//! SMS PDU codec.
//!
//! ```text
//!   hex ──► pdu::Sms::decode ──► Sms ──► text() / concat() / ports()
//!                                 │
//!   Sms::submit(number, text) ────┴──► encode() ──► hex, tpdu_len()
//!
//!   pdu ── address (BCD / alphanumeric)
//!       ── dcs       (alphabet, class, message waiting)
//!       ── timestamp (SCTS, absolute validity)
//!       ── gsm7      (default alphabet, septet packing)
//! ```

pub mod address;
pub mod dcs;
pub mod gsm7;
pub mod pdu;
pub mod timestamp;

pub use address::Address;
pub use dcs::{Alphabet, DataCoding};
pub use pdu::{MessageKind, Sms, UserData, Validity};
pub use timestamp::Timestamp;
