//! Inbound commands to the modem service.
//!
//! The daemon reads one JSON object per line on stdin, e.g.
//! `{"id": 7, "command": "sms_send", "number": "+4912345", "text": "hi"}`,
//! and answers each with a [`Response`] line carrying the same `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::call::CallType;

/// Channel a command is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Call,
    #[default]
    Misc,
    Unsolicited,
}

/// Commands that callers can send into the modem service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ModemCommand {
    CallInitiate {
        number: String,
        #[serde(default, rename = "type")]
        call_type: CallType,
    },
    /// `call` is the slot; `id` is taken by the request envelope.
    CallActivate { call: u8 },
    CallRelease { call: u8 },
    CallReleaseAll,
    CallHold,
    CallConference,
    CallTransfer,
    /// Re-read both call slots from the modem.
    CallSync,

    SmsSend { number: String, text: String },
    SmsRetrieve { index: u32 },

    /// Debug passthrough; `text` is sent as `AT<text>`.
    Raw {
        text: String,
        #[serde(default)]
        channel: ChannelKind,
    },

    /// Abort the command currently in flight on `channel`.
    Cancel {
        #[serde(default)]
        channel: ChannelKind,
    },
}

/// One stdin line: an optional correlation id plus the command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub command: ModemCommand,
}

/// Answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub id: Option<u64>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(id: Option<u64>, value: Value) -> Self {
        Self {
            id,
            ok: true,
            value,
            error: None,
        }
    }

    pub fn err(id: Option<u64>, error: impl ToString) -> Self {
        Self {
            id,
            ok: false,
            value: Value::Null,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_requests() {
        let r: Request =
            serde_json::from_str(r#"{"id":3,"command":"call_initiate","number":"123","type":"data"}"#).unwrap();
        assert_eq!(r.id, Some(3));
        assert_eq!(
            r.command,
            ModemCommand::CallInitiate {
                number: "123".into(),
                call_type: CallType::Data
            }
        );

        let r: Request = serde_json::from_str(r#"{"command":"cancel"}"#).unwrap();
        assert_eq!(r.id, None);
        assert_eq!(r.command, ModemCommand::Cancel { channel: ChannelKind::Misc });
    }

    #[test]
    fn slot_does_not_clash_with_request_id() {
        let r: Request = serde_json::from_str(r#"{"id":9,"command":"call_release","call":2}"#).unwrap();
        assert_eq!(r.id, Some(9));
        assert_eq!(r.command, ModemCommand::CallRelease { call: 2 });
    }

    #[test]
    fn unknown_command_is_an_error() {
        assert!(serde_json::from_str::<Request>(r#"{"command":"reboot"}"#).is_err());
    }

    #[test]
    fn response_omits_empty_fields() {
        let json = serde_json::to_string(&Response::ok(Some(1), Value::Null)).unwrap();
        assert_eq!(json, r#"{"id":1,"ok":true}"#);
        let json = serde_json::to_string(&Response::err(None, "nope")).unwrap();
        assert_eq!(json, r#"{"id":null,"ok":false,"error":"nope"}"#);
    }
}
