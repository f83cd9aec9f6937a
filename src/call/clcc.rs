//! `+CLCC` call listing: parsing and the status-synchronisation sequence.

use log::{debug, warn};

use super::{CallHandler, CallStatus, CallType, Direction};
use crate::at::channel::{Channel, Command};
use crate::at::sequence::{Outcome, Sequence, Step, Task};

/// One `+CLCC:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClccEntry {
    pub id: u8,
    pub direction: Direction,
    pub status: CallStatus,
    pub call_type: CallType,
    pub multiparty: bool,
    pub number: Option<String>,
}

/// `<stat>` → status.  0 active, 1 held, 2/3 dialing/alerting,
/// 4/5 incoming/waiting.
pub fn stat_to_status(stat: u8) -> Option<CallStatus> {
    Some(match stat {
        0 => CallStatus::Active,
        1 => CallStatus::Held,
        2 | 3 => CallStatus::Outgoing,
        4 | 5 => CallStatus::Incoming,
        _ => return None,
    })
}

/// Parse `+CLCC: <id>,<dir>,<stat>,<mode>,<mpty>[,<number>,<type>]`.
pub fn parse_line(line: &str) -> Option<ClccEntry> {
    let values = line.strip_prefix("+CLCC:")?.trim();
    let fields: Vec<&str> = values.split(',').map(str::trim).collect();
    if fields.len() < 5 {
        return None;
    }
    let id: u8 = fields[0].parse().ok()?;
    let direction = match fields[1] {
        "0" => Direction::Outgoing,
        "1" => Direction::Incoming,
        _ => return None,
    };
    let status = stat_to_status(fields[2].parse().ok()?)?;
    let call_type = match fields[3] {
        "1" => CallType::Data,
        _ => CallType::Voice,
    };
    let multiparty = fields[4] == "1";
    let number = fields
        .get(5)
        .map(|n| n.trim_matches('"'))
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    Some(ClccEntry {
        id,
        direction,
        status,
        call_type,
        multiparty,
        number,
    })
}

/// Parse every listing line of a `+CLCC` response.
pub fn parse_listing(lines: &[String]) -> Vec<ClccEntry> {
    lines.iter().filter_map(|l| parse_line(l)).collect()
}

// ---------------------------------------------------------------------------
// Synchronisation sequence
// ---------------------------------------------------------------------------

/// Optionally send a lead command, then list calls and reconcile both slots.
pub struct ClccSync {
    handler: CallHandler,
    lead: Option<&'static str>,
}

impl ClccSync {
    pub fn new(handler: CallHandler, lead: Option<&'static str>) -> Self {
        Self { handler, lead }
    }

    /// Start the sequence on `channel`.
    pub fn spawn(self, channel: &Channel) -> Task {
        Task::spawn(channel, "clcc-sync", self)
    }
}

impl Sequence for ClccSync {
    fn resume(&mut self, outcome: Option<Outcome>) -> Step {
        match outcome {
            None => match self.lead {
                Some(lead) => Step::Send(Command::new(lead)),
                None => Step::Send(Command::new("+CLCC")),
            },
            Some(o) if o.request != "+CLCC" => {
                if let Some(e) = &o.error {
                    warn!("call sync: '{}' failed: {}", o.request, e);
                }
                Step::Send(Command::new("+CLCC"))
            }
            Some(o) => {
                match o.into_result() {
                    Ok(lines) => {
                        let entries = parse_listing(&lines);
                        debug!("call sync: {} listed", entries.len());
                        self.handler.reconcile(&entries);
                    }
                    Err(e) => warn!("call sync: listing failed: {}", e),
                }
                Step::Done
            }
        }
    }
}
