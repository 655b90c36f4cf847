//! Session state types

use serde::{Deserialize, Serialize};
use std::fmt;

/// A step's verdict after handling a lifecycle operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The step is done, advance to the next one
    Continue,
    /// The step needs more input before it is done
    Wait,
    /// Stop the whole flow immediately
    Exit,
}

/// The three step lists every session carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Main,
    ErrorHandler,
    DisconnectHandler,
}

impl FlowKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FlowKind::Main => "main",
            FlowKind::ErrorHandler => "error_handler",
            FlowKind::DisconnectHandler => "disconnect_handler",
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable execution state of one call.
///
/// Only the transition functions produce new values of this type; steps
/// never see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Flow currently in focus
    pub flow: FlowKind,
    /// Zero-based index of the focused step within `flow`
    pub position: usize,
    /// Call hung up while the focused step still had work to flush
    pub disconnect_pending: bool,
    /// The `Start` event has been processed
    pub started: bool,
    /// No further step dispatch happens once set
    pub finished: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            flow: FlowKind::Main,
            position: 0,
            disconnect_pending: false,
            started: false,
            finished: false,
        }
    }

    /// Whether the disconnect handler flow is the one in focus
    pub fn in_disconnect_flow(&self) -> bool {
        self.flow == FlowKind::DisconnectHandler
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
