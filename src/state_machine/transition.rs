//! Pure state transition functions
//!
//! Every function here takes the current session state plus whatever the
//! runtime observed (a step outcome, flow lengths) and returns the next
//! state together with the effects to run. Nothing in this module touches
//! steps, timers or the call.

use super::{Effect, FlowKind, Outcome, SessionState};

/// Result of a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub new_state: SessionState,
    /// What the caller should do next: keep driving (`Continue`), return to
    /// the event loop (`Wait`), or stop (`Exit`)
    pub verdict: Outcome,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState, verdict: Outcome) -> Self {
        Self {
            new_state: state,
            verdict,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    /// Whether the runtime must drive the focused flow after applying this
    pub fn drives_flow(&self) -> bool {
        self.effects.contains(&Effect::DriveFlow)
    }
}

/// Disconnect-and-exit: the call is only terminated when it can still be
/// up. The disconnect handler flow means the caller is already gone.
///
/// A pending disconnect also skips termination, so an `Exit` from a step
/// that was still flushing after hang-up never terminates a call the
/// platform has already torn down.
pub fn disconnect_and_exit(state: &SessionState) -> Effect {
    Effect::EndCallflow {
        terminate_call: !state.in_disconnect_flow() && !state.disconnect_pending,
    }
}

fn finish(state: &SessionState) -> TransitionResult {
    let mut next = state.clone();
    next.finished = true;
    TransitionResult::new(next, Outcome::Exit)
        .with_effect(Effect::CancelTimers)
        .with_effect(disconnect_and_exit(state))
}

/// Start event: begin the main flow exactly once
pub fn on_start(state: &SessionState) -> TransitionResult {
    if state.started {
        return TransitionResult::new(state.clone(), Outcome::Wait);
    }
    let mut next = state.clone();
    next.started = true;
    TransitionResult::new(next, Outcome::Continue).with_effect(Effect::DriveFlow)
}

/// Apply a step outcome to the position pointer.
///
/// `Continue` past the last step of the active flow completes the flow and
/// is reported as `Exit`.
pub fn check_outcome(state: &SessionState, flow_len: usize, outcome: Outcome) -> TransitionResult {
    match outcome {
        Outcome::Continue => {
            let mut next = state.clone();
            next.position += 1;
            if next.position >= flow_len {
                finish(&next)
            } else {
                TransitionResult::new(next, Outcome::Continue).with_effect(Effect::CancelTimers)
            }
        }
        Outcome::Exit => finish(state),
        Outcome::Wait => TransitionResult::new(state.clone(), Outcome::Wait),
    }
}

/// Outcome of an asynchronous signal (digit, prompt played, transfer
/// failed, call result, timeout) delivered to the focused step.
///
/// A pending disconnect takes precedence: the interrupted call is gone, so
/// the next `Continue` switches to the disconnect handler instead of
/// advancing the old flow.
pub fn after_signal(
    state: &SessionState,
    flow_len: usize,
    disconnect_len: usize,
    outcome: Outcome,
) -> TransitionResult {
    if state.disconnect_pending {
        return match outcome {
            Outcome::Continue => enter_disconnect_flow(state, disconnect_len),
            Outcome::Exit => finish(state),
            Outcome::Wait => TransitionResult::new(state.clone(), Outcome::Wait),
        };
    }

    let result = check_outcome(state, flow_len, outcome);
    if result.verdict == Outcome::Continue {
        result.with_effect(Effect::DriveFlow)
    } else {
        result
    }
}

/// Outcome of the focused step being told the call hung up.
///
/// Deliberately bypasses [`check_outcome`]: resuming the original flow is
/// meaningless once the call is down.
pub fn on_call_terminated(
    state: &SessionState,
    disconnect_len: usize,
    outcome: Outcome,
) -> TransitionResult {
    match outcome {
        Outcome::Continue => enter_disconnect_flow(state, disconnect_len),
        Outcome::Wait => {
            let mut next = state.clone();
            next.disconnect_pending = true;
            TransitionResult::new(next, Outcome::Wait)
        }
        Outcome::Exit => {
            let mut next = state.clone();
            next.disconnect_pending = true;
            finish(&next)
        }
    }
}

/// A step lifecycle operation failed
pub fn enter_error_flow(state: &SessionState, error_len: usize) -> TransitionResult {
    match state.flow {
        // No nested recovery
        FlowKind::ErrorHandler | FlowKind::DisconnectHandler => finish(state),
        FlowKind::Main => {
            let mut next = state.clone();
            next.flow = FlowKind::ErrorHandler;
            next.position = 0;
            if error_len == 0 {
                let mut result = finish(&next);
                result.effects.insert(
                    0,
                    Effect::EnterFlow {
                        flow: FlowKind::ErrorHandler,
                    },
                );
                return result;
            }
            TransitionResult::new(next, Outcome::Continue).with_effects([
                Effect::CancelTimers,
                Effect::EnterFlow {
                    flow: FlowKind::ErrorHandler,
                },
                Effect::DriveFlow,
            ])
        }
    }
}

/// The call is down; run the disconnect handler flow from the top
pub fn enter_disconnect_flow(state: &SessionState, disconnect_len: usize) -> TransitionResult {
    let mut next = state.clone();
    next.flow = FlowKind::DisconnectHandler;
    next.position = 0;
    next.disconnect_pending = false;
    next.started = true;

    if disconnect_len == 0 {
        let mut result = finish(&next);
        result.effects.insert(
            0,
            Effect::EnterFlow {
                flow: FlowKind::DisconnectHandler,
            },
        );
        return result;
    }

    TransitionResult::new(next, Outcome::Continue).with_effects([
        Effect::CancelTimers,
        Effect::EnterFlow {
            flow: FlowKind::DisconnectHandler,
        },
        Effect::DriveFlow,
    ])
}
