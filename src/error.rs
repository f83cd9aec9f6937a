//! Unified error types for the GSM protocol engine.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! daemon's top-level error handling uniform.  Each layer has its own
//! sub-enum so callers can match on exactly the failures that layer produces:
//!
//! ```text
//!   ChannelError ── transport (timeout, hangup, io)
//!                ── protocol  (malformed line, unexpected terminal)
//!                ── modem     (ERROR / +CME / +CMS / +EXT → Condition)
//!   CallError    ── action not valid for the current call pair
//!   PduError     ── malformed or unrepresentable SMS PDU
//! ```

use core::fmt;

use crate::at::codes;
use crate::call::{Action, CallStatus};

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the engine funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A command exchange failed on the wire or was rejected by the modem.
    Channel(ChannelError),
    /// The call state machine refused an action.
    Call(CallError),
    /// An SMS PDU could not be decoded or encoded.
    Pdu(PduError),
    /// Configuration is invalid or could not be loaded.
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(e) => write!(f, "channel: {e}"),
            Self::Call(e) => write!(f, "call: {e}"),
            Self::Pdu(e) => write!(f, "pdu: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Channel errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// No terminal response within the configured duration.
    Timeout { secs: u64 },
    /// The transport went away underneath an in-flight command.
    Hangup,
    /// The transport reported an I/O failure while writing.
    Io(String),
    /// A response line could not be interpreted.
    Malformed(String),
    /// A terminal line arrived where a different one was required
    /// (e.g. `OK` instead of the `"> "` continuation prompt).
    UnexpectedTerminal(String),
    /// The modem answered with an error-class terminal line.
    Modem(ModemError),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { secs } => {
                write!(f, "device did not answer within {secs} seconds")
            }
            Self::Hangup => write!(f, "transport hung up"),
            Self::Io(msg) => write!(f, "transport I/O: {msg}"),
            Self::Malformed(line) => write!(f, "malformed response '{line}'"),
            Self::UnexpectedTerminal(line) => write!(f, "unexpected terminal '{line}'"),
            Self::Modem(e) => write!(f, "{e}"),
        }
    }
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}

impl From<ModemError> for ChannelError {
    fn from(e: ModemError) -> Self {
        Self::Modem(e)
    }
}

// ---------------------------------------------------------------------------
// Modem-reported errors
// ---------------------------------------------------------------------------

/// Which family of result code the modem used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Bare `ERROR` or a call-progress terminal (`NO CARRIER`, `BUSY`, ...).
    Plain,
    /// `+CME ERROR: <n>` (mobile equipment, GSM 07.07).
    Cme,
    /// `+CMS ERROR: <n>` (message service, GSM 07.05).
    Cms,
    /// `+EXT ERROR: <n>` (vendor extension).
    Ext,
}

/// The small fixed set of domain conditions modem errors map onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    SimNotPresent,
    SimAuthFailed,
    SimNotFound,
    SimBlocked,
    SimMemoryFull,
    SimInvalidIndex,
    NetworkNotPresent,
    NetworkUnauthorized,
    /// Anything without a more specific mapping.
    DeviceFailed,
}

/// A structured modem error: enough for the caller to decide on a retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemError {
    pub class: ErrorClass,
    /// Numeric code when the modem reported one (`+CMEE=1`).
    pub code: Option<u16>,
    /// Human-readable text: the code table entry, or the raw line.
    pub text: String,
    pub condition: Condition,
}

impl ModemError {
    /// Interpret an error-class terminal line.
    ///
    /// Returns `None` for success terminals (`OK`, `CONNECT...`).
    pub fn from_terminal(line: &str) -> Option<Self> {
        let line = line.trim();
        if line == "OK" || line.starts_with("CONNECT") {
            return None;
        }

        let coded = [
            ("+CME ERROR:", ErrorClass::Cme),
            ("+CMS ERROR:", ErrorClass::Cms),
            ("+EXT ERROR:", ErrorClass::Ext),
        ];
        for (prefix, class) in coded {
            if let Some(rest) = line.strip_prefix(prefix) {
                let rest = rest.trim();
                return Some(match rest.parse::<u16>() {
                    Ok(code) => Self::coded(class, code),
                    // Verbose mode (`+CMEE=2`) reports text instead of a number.
                    Err(_) => Self {
                        class,
                        code: None,
                        text: rest.to_string(),
                        condition: Condition::DeviceFailed,
                    },
                });
            }
        }

        Some(Self {
            class: ErrorClass::Plain,
            code: None,
            text: line.to_string(),
            condition: Condition::DeviceFailed,
        })
    }

    /// Build an error from a numeric code, mapping it to a [`Condition`].
    pub fn coded(class: ErrorClass, code: u16) -> Self {
        let table_text = match class {
            ErrorClass::Cme => codes::cme_text(code),
            ErrorClass::Cms => codes::cms_text(code),
            ErrorClass::Ext => codes::ext_text(code),
            ErrorClass::Plain => None,
        };
        let condition = map_condition(class, code);
        let text = match (table_text, condition) {
            (Some(t), Condition::DeviceFailed) => format!("Unhandled {class} ERROR: {t}"),
            (Some(t), _) => t.to_string(),
            (None, _) => format!("Unhandled {class} ERROR: {code}"),
        };
        Self {
            class,
            code: Some(code),
            text,
            condition,
        }
    }
}

fn map_condition(class: ErrorClass, code: u16) -> Condition {
    match (class, code) {
        (ErrorClass::Cme, 3) => Condition::NetworkUnauthorized,
        (ErrorClass::Cme, 10) => Condition::SimNotPresent,
        (ErrorClass::Cme, 16) => Condition::SimAuthFailed,
        (ErrorClass::Cme, 21 | 22) => Condition::SimNotFound,
        (ErrorClass::Cme, 30) => Condition::NetworkNotPresent,
        (ErrorClass::Cme, 32 | 262) => Condition::SimBlocked,
        (ErrorClass::Cme, 5 | 6 | 7 | 11 | 12 | 15 | 17 | 18 | 48) => Condition::SimAuthFailed,
        (ErrorClass::Cms, 310) => Condition::SimNotPresent,
        (ErrorClass::Cms, 311 | 312 | 316 | 317 | 318) => Condition::SimAuthFailed,
        (ErrorClass::Cms, 321) => Condition::SimNotFound,
        (ErrorClass::Cms, 322) => Condition::SimMemoryFull,
        (ErrorClass::Ext, 0) => Condition::SimInvalidIndex,
        _ => Condition::DeviceFailed,
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "AT"),
            Self::Cme => write!(f, "CME"),
            Self::Cms => write!(f, "CMS"),
            Self::Ext => write!(f, "EXT"),
        }
    }
}

impl fmt::Display for ModemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{:?} ({} {}): {}", self.condition, self.class, code, self.text),
            None => write!(f, "{:?}: {}", self.condition, self.text),
        }
    }
}

// ---------------------------------------------------------------------------
// Call-control errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The (slot 1, slot 2) pair has no row for this action.
    InvalidAction {
        pair: (CallStatus, CallStatus),
        action: Action,
    },
    /// A network update addressed a status held by zero or several slots.
    NonUniqueStatus(CallStatus),
    /// Call slot outside {1, 2}.
    BadIndex(u8),
    /// Dial string does not fit the bounded buffer.
    DialStringTooLong,
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAction { pair, action } => write!(
                f,
                "no action {:?} in state ({}, {})",
                action, pair.0, pair.1
            ),
            Self::NonUniqueStatus(s) => write!(f, "non-unique call state '{s}'"),
            Self::BadIndex(i) => write!(f, "invalid call index {i}"),
            Self::DialStringTooLong => write!(f, "dial string too long"),
        }
    }
}

impl From<CallError> for Error {
    fn from(e: CallError) -> Self {
        Self::Call(e)
    }
}

// ---------------------------------------------------------------------------
// PDU codec errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduError {
    /// Input ended before a field the header promised.
    Truncated,
    /// Odd length or non-hex character in the PDU string.
    BadHex,
    /// Address octet count inconsistent with its declared digit count.
    AddressLength,
    /// Address semi-octet outside the BCD translation table.
    BadAddressDigit(u8),
    /// DCS byte falls in a reserved coding group.
    ReservedCoding(u8),
    /// Timestamp semi-octet is not a decimal digit.
    BadTimestamp,
    /// UDH element overruns the declared header length.
    BadUserDataHeader,
    /// Message-type indicator the codec does not handle.
    UnsupportedType(u8),
    /// 16-bit payload is not valid UTF-16.
    BadUcs2,
    /// Text or field cannot be represented in the chosen encoding.
    Encoding,
}

impl fmt::Display for PduError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated PDU"),
            Self::BadHex => write!(f, "invalid hex string"),
            Self::AddressLength => write!(f, "address length inconsistent with digit count"),
            Self::BadAddressDigit(d) => write!(f, "invalid address semi-octet 0x{d:X}"),
            Self::ReservedCoding(dcs) => write!(f, "DCS 0x{dcs:02X} has no defined interpretation"),
            Self::BadTimestamp => write!(f, "invalid timestamp"),
            Self::BadUserDataHeader => write!(f, "malformed user data header"),
            Self::UnsupportedType(mti) => write!(f, "unsupported message type {mti}"),
            Self::BadUcs2 => write!(f, "invalid UCS-2 payload"),
            Self::Encoding => write!(f, "text not representable in selected alphabet"),
        }
    }
}

impl From<PduError> for Error {
    fn from(e: PduError) -> Self {
        Self::Pdu(e)
    }
}

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Error>;
