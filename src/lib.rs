//! Callflow engine
//!
//! Executes telephony callflows: a main flow, an error-handler flow and a
//! disconnect-handler flow of steps, driven by events from the telephony
//! platform. One runtime task per call.

pub mod config;
pub mod flow;
pub mod runtime;
pub mod services;
pub mod state_machine;
pub mod steps;

pub use config::EngineConfig;
pub use flow::{CallflowDefinition, FlowError};
pub use runtime::{spawn_callflow, CallControl, CallInfo, CallflowHandle, SessionSummary};
