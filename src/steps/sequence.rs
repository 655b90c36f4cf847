//! Ordered container step
//!
//! A sequence runs its children the way the runtime runs a flow: start the
//! focused child, advance on `Continue`, return on `Wait` or `Exit`, and
//! forward every signal to the focused child. Conditional branches and loop
//! bodies are sequences.

use super::{Signal, Step, StepContext, StepResult};
use crate::state_machine::Outcome;
use async_trait::async_trait;

pub struct Sequence {
    name: String,
    steps: Vec<Box<dyn Step>>,
    position: usize,
    /// The call hung up while a child was running; never start another one
    hung_up: bool,
}

impl Sequence {
    pub fn new(name: impl Into<String>, steps: Vec<Box<dyn Step>>) -> Self {
        Self {
            name: name.into(),
            steps,
            position: 0,
            hung_up: false,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Start children from the current position until one has to wait
    async fn drive(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        while let Some(step) = self.steps.get_mut(self.position) {
            tracing::trace!(container = %self.name, step = %step.name(), "Start executing step");
            match step.start(ctx).await? {
                Outcome::Continue => self.advance(ctx),
                other => return Ok(other),
            }
        }
        Ok(Outcome::Continue)
    }

    fn advance(&mut self, ctx: &mut StepContext<'_>) {
        self.position += 1;
        ctx.timers.cancel_all();
    }
}

#[async_trait]
impl Step for Sequence {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        self.position = 0;
        self.hung_up = false;
        self.drive(ctx).await
    }

    async fn deliver(&mut self, ctx: &mut StepContext<'_>, signal: Signal) -> StepResult {
        if signal == Signal::CallTerminated {
            self.hung_up = true;
        }
        let Some(step) = self.steps.get_mut(self.position) else {
            return Ok(signal.idle_outcome());
        };

        match step.deliver(ctx, signal).await? {
            Outcome::Continue if self.hung_up => Ok(Outcome::Continue),
            Outcome::Continue => {
                self.advance(ctx);
                self.drive(ctx).await
            }
            other => Ok(other),
        }
    }
}
