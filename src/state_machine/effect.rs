//! Effects produced by state transitions

use super::FlowKind;

/// Effects to be executed by the runtime after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Cancel every armed timer; the focused step changed
    CancelTimers,

    /// Start the focused step and keep going while steps complete synchronously
    DriveFlow,

    /// Log the flow switch
    EnterFlow { flow: FlowKind },

    /// The callflow is over. Terminate the call unless it is already down.
    EndCallflow { terminate_call: bool },
}
