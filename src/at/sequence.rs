//! Command sequencing — linear multi-step exchanges over one channel.
//!
//! A [`Sequence`] is resumed once per exchange with that exchange's
//! [`Outcome`] and answers with the next [`Step`].  The [`Task`] driving it
//! stores exactly one resume point: the continuation of the command
//! currently queued on the channel.
//!
//! ```text
//!   spawn ─▶ resume(None) ─▶ Send(A) ─▶ channel ─▶ resume(Some(A's outcome))
//!                                                       │
//!                              Done ◀── … ◀── Send(B) ◀─┘
//! ```
//!
//! Cancelling a task drops its sequence; a late resolution of the queued
//! command then finds nothing to resume and is a no-op.

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;

use super::channel::{Channel, Command, Reply};
use crate::error::ChannelError;

/// Result of one exchange, as seen by the sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub request: String,
    pub lines: Option<Vec<String>>,
    pub error: Option<ChannelError>,
}

impl Outcome {
    fn new(request: &str, reply: Reply) -> Self {
        match reply {
            Ok(lines) => Self {
                request: request.to_string(),
                lines: Some(lines),
                error: None,
            },
            Err(e) => Self {
                request: request.to_string(),
                lines: None,
                error: Some(e),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Values of the first line starting with `prefix`, after the colon.
    pub fn values(&self, prefix: &str) -> Option<&str> {
        self.lines
            .as_ref()?
            .iter()
            .find_map(|l| l.strip_prefix(prefix))
            .map(|rest| rest.trim_start_matches(':').trim())
    }

    /// Turn the outcome back into a `Result`.
    pub fn into_result(self) -> Result<Vec<String>, ChannelError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.lines.unwrap_or_default()),
        }
    }
}

/// What the sequence wants next.
#[derive(Debug, Clone)]
pub enum Step {
    Send(Command),
    Done,
}

/// A step-producing procedure.
pub trait Sequence {
    /// `None` on start; afterwards the previous exchange's outcome.
    fn resume(&mut self, outcome: Option<Outcome>) -> Step;
}

impl<F> Sequence for F
where
    F: FnMut(Option<Outcome>) -> Step,
{
    fn resume(&mut self, outcome: Option<Outcome>) -> Step {
        self(outcome)
    }
}

struct TaskState {
    name: String,
    sequence: Option<Box<dyn Sequence>>,
    exchanges: usize,
}

/// Handle to a running sequence.
#[derive(Clone)]
pub struct Task {
    state: Rc<RefCell<TaskState>>,
}

impl Task {
    /// Start `sequence` on `channel`; the first exchange is enqueued now.
    pub fn spawn(channel: &Channel, name: &str, sequence: impl Sequence + 'static) -> Self {
        let state = Rc::new(RefCell::new(TaskState {
            name: name.to_string(),
            sequence: Some(Box::new(sequence)),
            exchanges: 0,
        }));
        advance(&state, channel, None);
        Self { state }
    }

    /// Clear the resume point.  The queued command still runs to completion
    /// on the wire, but its outcome is discarded.
    pub fn cancel(&self) {
        let mut st = self.state.borrow_mut();
        if st.sequence.take().is_some() {
            debug!("task {}: cancelled after {} exchanges", st.name, st.exchanges);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.borrow().sequence.is_none()
    }

    pub fn exchanges(&self) -> usize {
        self.state.borrow().exchanges
    }
}

fn advance(state: &Rc<RefCell<TaskState>>, channel: &Channel, outcome: Option<Outcome>) {
    let step = {
        let mut st = state.borrow_mut();
        let Some(sequence) = st.sequence.as_mut() else {
            return;
        };
        sequence.resume(outcome)
    };

    match step {
        Step::Send(cmd) => {
            state.borrow_mut().exchanges += 1;
            let resume_state = Rc::clone(state);
            let resume_channel = channel.clone();
            channel.enqueue(cmd, move |request, reply| {
                advance(&resume_state, &resume_channel, Some(Outcome::new(request, reply)));
            });
        }
        Step::Done => {
            let mut st = state.borrow_mut();
            debug!("task {}: done after {} exchanges", st.name, st.exchanges);
            st.sequence = None;
        }
    }
}
