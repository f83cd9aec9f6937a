//! Static call-control transition table.
//!
//! One row per `(slot 1, slot 2)` status pair, action and optional call
//! index.  `+CHLD=<n>` semantics:
//!
//! ```text
//!   0   release held calls / busy the waiting call
//!   1   release active calls
//!   1x  release call x
//!   2   hold active calls, accept the waiting or held one
//!   2x  hold active calls except call x
//!   3   add held calls to the conversation
//!   4   connect the two calls, leave the conversation
//! ```

use super::{Action, CallStatus};

use CallStatus::{Active, Held, Incoming, Outgoing, Release};

/// What a matching row does on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Send a fixed command.
    Send(&'static str),
    /// Send `D<dialstring>`.
    Dial,
    /// Send the modem's cancel-outgoing command.
    CancelOutgoing,
    /// Send a fixed command, then resynchronise both slots via `+CLCC`.
    SendAndSync(&'static str),
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub pair: (CallStatus, CallStatus),
    pub action: Action,
    /// `None` matches any index.
    pub index: Option<u8>,
    pub effect: Effect,
}

const fn row(
    pair: (CallStatus, CallStatus),
    action: Action,
    index: Option<u8>,
    effect: Effect,
) -> Transition {
    Transition {
        pair,
        action,
        index,
        effect,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Table
// ═══════════════════════════════════════════════════════════════════════════

pub static TRANSITIONS: &[Transition] = &[
    // ── Single call in slot 1 ─────────────────────────────────
    row((Release, Release), Action::Initiate, None, Effect::Dial),
    row((Incoming, Release), Action::Release, Some(1), Effect::Send("H")),
    row((Incoming, Release), Action::Activate, Some(1), Effect::Send("A")),
    row((Outgoing, Release), Action::Release, Some(1), Effect::CancelOutgoing),
    row((Active, Release), Action::Release, Some(1), Effect::Send("H")),
    row((Active, Release), Action::Hold, None, Effect::SendAndSync("+CHLD=2")),
    row((Held, Release), Action::Release, Some(1), Effect::Send("H")),
    row((Held, Release), Action::Activate, Some(1), Effect::SendAndSync("+CHLD=2")),
    // ── Single call in slot 2 ─────────────────────────────────
    row((Release, Incoming), Action::Release, Some(2), Effect::Send("H")),
    row((Release, Incoming), Action::Activate, Some(2), Effect::Send("A")),
    row((Release, Outgoing), Action::Release, Some(2), Effect::CancelOutgoing),
    row((Release, Active), Action::Release, Some(2), Effect::Send("H")),
    row((Release, Active), Action::Hold, None, Effect::SendAndSync("+CHLD=2")),
    row((Release, Held), Action::Release, Some(2), Effect::Send("H")),
    row((Release, Held), Action::Activate, Some(2), Effect::SendAndSync("+CHLD=2")),
    // ── Active + waiting ──────────────────────────────────────
    row((Active, Incoming), Action::Release, Some(1), Effect::Send("+CHLD=1")),
    row((Active, Incoming), Action::Release, Some(2), Effect::Send("+CHLD=0")),
    row((Active, Incoming), Action::Activate, Some(2), Effect::Send("+CHLD=2")),
    row((Active, Incoming), Action::Conference, None, Effect::Send("+CHLD=2;+CHLD=3")),
    row((Incoming, Active), Action::Release, Some(2), Effect::Send("+CHLD=1")),
    row((Incoming, Active), Action::Release, Some(1), Effect::Send("+CHLD=0")),
    row((Incoming, Active), Action::Activate, Some(1), Effect::Send("+CHLD=2")),
    row((Incoming, Active), Action::Conference, None, Effect::Send("+CHLD=2;+CHLD=3")),
    // ── Active + held ─────────────────────────────────────────
    row((Active, Held), Action::Release, Some(1), Effect::Send("+CHLD=11")),
    row((Active, Held), Action::Release, Some(2), Effect::Send("+CHLD=12")),
    row((Active, Held), Action::Activate, Some(2), Effect::Send("+CHLD=2")),
    row((Active, Held), Action::Conference, None, Effect::Send("+CHLD=3")),
    row((Active, Held), Action::Connect, None, Effect::Send("+CHLD=4")),
    row((Held, Active), Action::Release, Some(1), Effect::Send("+CHLD=11")),
    row((Held, Active), Action::Release, Some(2), Effect::Send("+CHLD=12")),
    row((Held, Active), Action::Activate, Some(1), Effect::Send("+CHLD=2")),
    row((Held, Active), Action::Conference, None, Effect::Send("+CHLD=3")),
    row((Held, Active), Action::Connect, None, Effect::Send("+CHLD=4")),
    // ── Both active (conference leg split) ────────────────────
    row((Active, Active), Action::Release, Some(1), Effect::Send("+CHLD=11")),
    row((Active, Active), Action::Release, Some(2), Effect::Send("+CHLD=12")),
    row((Active, Active), Action::Activate, Some(1), Effect::Send("+CHLD=21")),
    row((Active, Active), Action::Activate, Some(2), Effect::Send("+CHLD=22")),
    row((Active, Active), Action::Connect, None, Effect::Send("+CHLD=4")),
];

/// Find the effect for `action` in state `pair`.  `DropAll` is valid in
/// every state and always hangs up everything.
pub fn lookup(pair: (CallStatus, CallStatus), action: Action, index: Option<u8>) -> Option<Effect> {
    if action == Action::DropAll {
        return Some(Effect::Send("H"));
    }
    TRANSITIONS
        .iter()
        .find(|t| {
            t.pair == pair && t.action == action && (t.index.is_none() || t.index == index)
        })
        .map(|t| t.effect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_held_release_second_sends_chld12() {
        assert_eq!(
            lookup((Active, Held), Action::Release, Some(2)),
            Some(Effect::Send("+CHLD=12"))
        );
    }

    #[test]
    fn waiting_call_handling() {
        assert_eq!(lookup((Active, Incoming), Action::Release, Some(2)), Some(Effect::Send("+CHLD=0")));
        assert_eq!(lookup((Active, Incoming), Action::Activate, Some(2)), Some(Effect::Send("+CHLD=2")));
        assert_eq!(
            lookup((Active, Incoming), Action::Conference, None),
            Some(Effect::Send("+CHLD=2;+CHLD=3"))
        );
        assert_eq!(lookup((Active, Incoming), Action::Activate, Some(1)), None);
    }

    #[test]
    fn mirrored_pairs_agree() {
        assert_eq!(lookup((Release, Incoming), Action::Activate, Some(2)), Some(Effect::Send("A")));
        assert_eq!(lookup((Incoming, Active), Action::Release, Some(1)), Some(Effect::Send("+CHLD=0")));
        assert_eq!(lookup((Held, Active), Action::Activate, Some(1)), Some(Effect::Send("+CHLD=2")));
    }

    #[test]
    fn hold_and_unhold_resync() {
        assert_eq!(lookup((Active, Release), Action::Hold, None), Some(Effect::SendAndSync("+CHLD=2")));
        assert_eq!(
            lookup((Held, Release), Action::Activate, Some(1)),
            Some(Effect::SendAndSync("+CHLD=2"))
        );
    }

    #[test]
    fn dropall_is_valid_everywhere() {
        for pair in [(Release, Release), (Active, Held), (Outgoing, Release)] {
            assert_eq!(lookup(pair, Action::DropAll, None), Some(Effect::Send("H")));
        }
    }

    #[test]
    fn unknown_combinations_are_rejected() {
        assert_eq!(lookup((Release, Release), Action::Release, Some(1)), None);
        assert_eq!(lookup((Outgoing, Release), Action::Activate, Some(1)), None);
        assert_eq!(lookup((Held, Held), Action::Conference, None), None);
    }

    #[test]
    fn table_is_deterministic() {
        for (i, a) in TRANSITIONS.iter().enumerate() {
            for b in &TRANSITIONS[i + 1..] {
                let overlap = a.pair == b.pair
                    && a.action == b.action
                    && (a.index.is_none() || b.index.is_none() || a.index == b.index);
                assert!(!overlap, "ambiguous rows {a:?} / {b:?}");
            }
        }
    }
}
