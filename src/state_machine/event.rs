//! Events that can occur during a call

use crate::services::{TimerId, TimerState};

/// One asynchronous signal for a session.
///
/// Events never name a step; the runtime routes them to whichever step is
/// focused when the event is dequeued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Begin executing the main flow
    Start,

    // Telephony events
    DigitReceived(char),
    PromptPlayed,
    TransferFailed,
    CallResultReceived(bool),
    CallTerminated,

    // Timer events
    TimedOut { timer: TimerId, state: TimerState },
}

impl Event {
    /// Short name used in log fields
    pub fn name(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::DigitReceived(_) => "digit_received",
            Event::PromptPlayed => "prompt_played",
            Event::TransferFailed => "transfer_failed",
            Event::CallResultReceived(_) => "call_result_received",
            Event::CallTerminated => "call_terminated",
            Event::TimedOut { .. } => "timed_out",
        }
    }
}
