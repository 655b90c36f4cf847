//! Looping container step

use super::{Sequence, Signal, Step, StepContext, StepError, StepResult};
use crate::flow::Expr;
use crate::state_machine::Outcome;
use async_trait::async_trait;

/// Upper bound on body iterations that complete without waiting for input
const MAX_SYNC_ITERATIONS: u32 = 10_000;

/// Runs its body while the condition holds.
///
/// The condition is checked before every iteration, including the first.
pub struct Loop {
    name: String,
    condition: Expr,
    body: Sequence,
    hung_up: bool,
}

impl Loop {
    pub fn new(name: impl Into<String>, condition: Expr, body: Sequence) -> Self {
        Self {
            name: name.into(),
            condition,
            body,
            hung_up: false,
        }
    }

    async fn iterate(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        let mut iterations = 0;
        loop {
            if !self.condition.is_true(ctx.variables)? {
                tracing::debug!(step = %self.name, "Loop condition false");
                return Ok(Outcome::Continue);
            }
            iterations += 1;
            if iterations > MAX_SYNC_ITERATIONS {
                return Err(StepError::invalid_state(format!(
                    "loop '{}' ran {MAX_SYNC_ITERATIONS} iterations without waiting",
                    self.name
                )));
            }

            ctx.timers.cancel_all();
            match self.body.start(ctx).await? {
                Outcome::Continue => {}
                other => return Ok(other),
            }
        }
    }
}

#[async_trait]
impl Step for Loop {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        self.hung_up = false;
        self.iterate(ctx).await
    }

    async fn deliver(&mut self, ctx: &mut StepContext<'_>, signal: Signal) -> StepResult {
        if signal == Signal::CallTerminated {
            self.hung_up = true;
        }
        match self.body.deliver(ctx, signal).await? {
            Outcome::Continue if self.hung_up => Ok(Outcome::Continue),
            Outcome::Continue => self.iterate(ctx).await,
            other => Ok(other),
        }
    }
}
