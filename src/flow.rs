//! Flows and flow definitions
//!
//! A session carries three immutable step lists (main, error handler,
//! disconnect handler) built once from a JSON definition.

mod builder;
mod definition;
mod expr;

pub use builder::FlowBuilder;
pub use definition::{BranchDefinition, CallflowDefinition, StepDefinition};
pub use expr::{Expr, ExprError};

use crate::state_machine::FlowKind;
use crate::steps::Step;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("failed to read definition: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid definition JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("step names must not be empty")]
    EmptyStepName,

    #[error("duplicate step name '{0}'")]
    DuplicateStepName(String),

    #[error("failed to create HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// An ordered step list. Never changes shape once built.
pub struct Flow {
    steps: Vec<Box<dyn Step>>,
}

impl Flow {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_mut(&mut self, position: usize) -> Option<&mut Box<dyn Step>> {
        self.steps.get_mut(position)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

/// The three flows of one session
pub struct Flows {
    pub main: Flow,
    pub error_handler: Flow,
    pub disconnect_handler: Flow,
}

impl Flows {
    pub fn new(
        main: Vec<Box<dyn Step>>,
        error_handler: Vec<Box<dyn Step>>,
        disconnect_handler: Vec<Box<dyn Step>>,
    ) -> Self {
        Self {
            main: Flow::new(main),
            error_handler: Flow::new(error_handler),
            disconnect_handler: Flow::new(disconnect_handler),
        }
    }

    pub fn get(&self, kind: FlowKind) -> &Flow {
        match kind {
            FlowKind::Main => &self.main,
            FlowKind::ErrorHandler => &self.error_handler,
            FlowKind::DisconnectHandler => &self.disconnect_handler,
        }
    }

    pub fn get_mut(&mut self, kind: FlowKind) -> &mut Flow {
        match kind {
            FlowKind::Main => &mut self.main,
            FlowKind::ErrorHandler => &mut self.error_handler,
            FlowKind::DisconnectHandler => &mut self.disconnect_handler,
        }
    }
}
