//! Flow control steps

use super::{Step, StepContext, StepResult};
use crate::state_machine::Outcome;
use async_trait::async_trait;

/// Ends the callflow immediately
pub struct Exit {
    name: String,
}

impl Exit {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Step for Exit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self, _ctx: &mut StepContext<'_>) -> StepResult {
        tracing::debug!(step = %self.name, "Exit requested");
        Ok(Outcome::Exit)
    }
}

/// Ends the callflow once queued prompts have finished playing.
///
/// Appended to the main and error-handler flows so the last prompts are
/// heard before the call drops. The runtime performs the actual hang-up.
pub struct DisconnectCall {
    name: String,
}

impl DisconnectCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn ready(ctx: &StepContext<'_>) -> Outcome {
        if ctx.prompts.is_idle() {
            Outcome::Exit
        } else {
            Outcome::Wait
        }
    }
}

#[async_trait]
impl Step for DisconnectCall {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        Ok(Self::ready(ctx))
    }

    async fn on_prompt_played(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        Ok(Self::ready(ctx))
    }
}
