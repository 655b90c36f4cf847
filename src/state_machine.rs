//! Core callflow state machine
//!
//! Pure session transitions in the Elm Architecture style: the runtime
//! feeds in what a step reported and executes the effects that come back.

mod effect;
pub mod event;
pub mod state;
pub mod transition;


pub use effect::Effect;
pub use event::Event;
pub use state::{FlowKind, Outcome, SessionState};
pub use transition::{
    after_signal, check_outcome, disconnect_and_exit, enter_disconnect_flow, enter_error_flow,
    on_call_terminated, on_start, TransitionResult,
};
