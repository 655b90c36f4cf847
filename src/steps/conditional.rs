//! Branching container step

use super::{Sequence, Signal, Step, StepContext, StepResult};
use crate::flow::Expr;
use crate::state_machine::Outcome;
use async_trait::async_trait;

pub struct Branch {
    pub condition: Expr,
    pub body: Sequence,
}

/// Runs the body of the first branch whose condition holds.
///
/// Conditions are evaluated once, on start. No matching branch completes the
/// step.
pub struct Conditional {
    name: String,
    branches: Vec<Branch>,
    active: Option<usize>,
}

impl Conditional {
    pub fn new(name: impl Into<String>, branches: Vec<Branch>) -> Self {
        Self {
            name: name.into(),
            branches,
            active: None,
        }
    }
}

#[async_trait]
impl Step for Conditional {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        self.active = None;
        for (index, branch) in self.branches.iter().enumerate() {
            if branch.condition.is_true(ctx.variables)? {
                self.active = Some(index);
                break;
            }
        }

        let Some(index) = self.active else {
            tracing::debug!(step = %self.name, "No branch matched");
            return Ok(Outcome::Continue);
        };
        let body = &mut self.branches[index].body;
        tracing::debug!(step = %self.name, branch = %body.name(), "Branch selected");
        body.start(ctx).await
    }

    async fn deliver(&mut self, ctx: &mut StepContext<'_>, signal: Signal) -> StepResult {
        match self.active.and_then(|i| self.branches.get_mut(i)) {
            Some(branch) => branch.body.deliver(ctx, signal).await,
            None => Ok(signal.idle_outcome()),
        }
    }
}
