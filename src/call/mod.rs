//! Call control — two call slots driven by a static transition table.
//!
//! ```text
//!  release ──▶ incoming ──▶ active ◀──▶ held
//!     │                       ▲          │
//!     └──────▶ outgoing ──────┘          │
//!     ▲                                  │
//!     └──────────────────────────────────┘
//! ```
//!
//! User actions are looked up in [`table::TRANSITIONS`] by the current
//! `(slot 1, slot 2)` status pair; network notifications update a slot
//! directly through [`CallHandler`].

pub mod clcc;
pub mod handler;
pub mod table;

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use handler::CallHandler;

/// Number of call slots the handler tracks.
pub const SLOTS: usize = 2;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    #[default]
    Release,
    Incoming,
    Outgoing,
    Active,
    Held,
}

impl CallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
            Self::Active => "active",
            Self::Held => "held",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "release" => Self::Release,
            "incoming" => Self::Incoming,
            "outgoing" => Self::Outgoing,
            "active" => Self::Active,
            "held" => Self::Held,
            _ => return Err(()),
        })
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// User-level call-control action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Initiate,
    Activate,
    Conference,
    Release,
    DropAll,
    Hold,
    /// Explicit call transfer.
    Connect,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiate => "initiate",
            Self::Activate => "activate",
            Self::Conference => "conference",
            Self::Release => "release",
            Self::DropAll => "dropall",
            Self::Hold => "hold",
            Self::Connect => "connect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Bearer requested when dialing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    #[default]
    Voice,
    Data,
}

// ---------------------------------------------------------------------------
// Call slot
// ---------------------------------------------------------------------------

/// One call slot.  A released call carries nothing but its status.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Call {
    pub status: CallStatus,
    pub direction: Option<Direction>,
    pub peer: Option<String>,
    pub call_type: Option<CallType>,
    /// Network extras: line, reason, mode, port, ...
    pub properties: Map<String, Value>,
}

impl Call {
    pub fn is_released(&self) -> bool {
        self.status == CallStatus::Release
    }

    /// Flattened view sent with status notifications.
    pub fn announced_properties(&self) -> Map<String, Value> {
        let mut out = self.properties.clone();
        if let Some(d) = self.direction {
            out.insert("direction".into(), serde_json::to_value(d).unwrap_or(Value::Null));
        }
        if let Some(peer) = &self.peer {
            out.insert("peer".into(), Value::String(peer.clone()));
        }
        if let Some(t) = self.call_type {
            out.insert("type".into(), serde_json::to_value(t).unwrap_or(Value::Null));
        }
        out
    }
}

/// Partial update merged into a slot by network notifications.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallUpdate {
    pub status: Option<CallStatus>,
    pub direction: Option<Direction>,
    pub peer: Option<String>,
    pub call_type: Option<CallType>,
    pub properties: Map<String, Value>,
}

impl CallUpdate {
    pub fn status(status: CallStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_type(mut self, call_type: CallType) -> Self {
        self.call_type = Some(call_type);
        self
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Merge into `call`.  A resulting `release` wipes everything else.
    pub fn apply(self, call: &mut Call) {
        if let Some(s) = self.status {
            call.status = s;
        }
        if call.status == CallStatus::Release {
            *call = Call::default();
            return;
        }
        if self.direction.is_some() {
            call.direction = self.direction;
        }
        if self.peer.is_some() {
            call.peer = self.peer;
        }
        if self.call_type.is_some() {
            call.call_type = self.call_type;
        }
        call.properties.extend(self.properties);
    }
}
