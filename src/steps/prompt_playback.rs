//! Prompt playback step

use super::{Prompt, Step, StepContext, StepResult};
use crate::state_machine::Outcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptPlaybackSettings {
    pub name: String,
    pub prompts: Vec<Prompt>,
    /// A digit stops playback and completes the step
    pub allow_dtmf_input: bool,
}

/// Plays its prompts and completes once the prompt queue drains
pub struct PromptPlayback {
    settings: PromptPlaybackSettings,
}

impl PromptPlayback {
    pub fn new(settings: PromptPlaybackSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Step for PromptPlayback {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn start(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        if self.settings.prompts.is_empty() {
            return Ok(Outcome::Continue);
        }
        ctx.play(&self.settings.prompts).await?;
        Ok(Outcome::Wait)
    }

    async fn on_digit(&mut self, ctx: &mut StepContext<'_>, digit: char) -> StepResult {
        if !self.settings.allow_dtmf_input {
            return Ok(Outcome::Wait);
        }
        tracing::debug!(step = %self.settings.name, %digit, "Playback interrupted by digit");
        ctx.stop_prompts().await?;
        Ok(Outcome::Continue)
    }

    async fn on_prompt_played(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        if ctx.prompts.is_idle() {
            Ok(Outcome::Continue)
        } else {
            Ok(Outcome::Wait)
        }
    }
}
