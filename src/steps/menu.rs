//! Single-digit menu step

use super::{result_key, Prompt, Step, StepContext, StepResult};
use crate::services::{TimerId, TimerState};
use crate::state_machine::Outcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Value published in `<step>.result`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuResult {
    Timeout,
    InvalidOption,
    ValidOption,
}

impl MenuResult {
    pub const ALL: [MenuResult; 3] = [
        MenuResult::Timeout,
        MenuResult::InvalidOption,
        MenuResult::ValidOption,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MenuResult::Timeout => "Timeout",
            MenuResult::InvalidOption => "InvalidOption",
            MenuResult::ValidOption => "ValidOption",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuSettings {
    pub name: String,
    pub initial_prompts: Vec<Prompt>,
    pub subsequent_prompts: Vec<Prompt>,
    pub invalid_digit_prompts: Vec<Prompt>,
    pub timeout_prompts: Vec<Prompt>,
    /// Digits that select an option
    pub valid_options: String,
    /// Wait for a selection after the prompts finish
    pub timeout_ms: u64,
    pub max_retry_count: u32,
    pub allow_dtmf_input: bool,
}

impl Default for MenuSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            initial_prompts: Vec::new(),
            subsequent_prompts: Vec::new(),
            invalid_digit_prompts: Vec::new(),
            timeout_prompts: Vec::new(),
            valid_options: String::new(),
            timeout_ms: 5000,
            max_retry_count: 0,
            allow_dtmf_input: true,
        }
    }
}

pub struct Menu {
    settings: MenuSettings,
    retries: u32,
    awaiting_prompts: bool,
    timer: Option<TimerId>,
    generation: u32,
}

impl Menu {
    pub fn new(settings: MenuSettings) -> Self {
        Self {
            settings,
            retries: 0,
            awaiting_prompts: false,
            timer: None,
            generation: 0,
        }
    }

    fn arm(&mut self, ctx: &mut StepContext<'_>) {
        self.disarm(ctx);
        self.generation = self.generation.wrapping_add(1);
        self.timer = Some(ctx.timers.schedule(
            Duration::from_millis(self.settings.timeout_ms),
            TimerState(self.generation),
        ));
    }

    fn disarm(&mut self, ctx: &mut StepContext<'_>) {
        if let Some(id) = self.timer.take() {
            ctx.timers.cancel(id);
        }
    }

    fn listen(&mut self, ctx: &mut StepContext<'_>) {
        self.awaiting_prompts = !ctx.prompts.is_idle();
        if !self.awaiting_prompts {
            self.arm(ctx);
        }
    }

    async fn retry_or_finish(&mut self, ctx: &mut StepContext<'_>, result: MenuResult) -> StepResult {
        if self.retries >= self.settings.max_retry_count {
            return Ok(self.finish(ctx, result, None));
        }
        self.retries += 1;

        let error_prompts = if result == MenuResult::Timeout {
            &self.settings.timeout_prompts
        } else {
            &self.settings.invalid_digit_prompts
        };
        ctx.play(error_prompts).await?;
        ctx.play(&self.settings.subsequent_prompts).await?;
        self.listen(ctx);
        Ok(Outcome::Wait)
    }

    fn finish(&mut self, ctx: &mut StepContext<'_>, result: MenuResult, option: Option<char>) -> Outcome {
        self.disarm(ctx);
        self.awaiting_prompts = false;
        let name = &self.settings.name;
        ctx.variables.set(result_key(name, "result"), result.as_str());
        ctx.variables.set(
            result_key(name, "selectedOption"),
            option.map(String::from).unwrap_or_default(),
        );
        tracing::debug!(step = %name, result = result.as_str(), ?option, "Menu finished");
        Outcome::Continue
    }
}

#[async_trait]
impl Step for Menu {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn start(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        self.retries = 0;
        self.timer = None;
        ctx.play(&self.settings.initial_prompts).await?;
        self.listen(ctx);
        Ok(Outcome::Wait)
    }

    async fn on_digit(&mut self, ctx: &mut StepContext<'_>, digit: char) -> StepResult {
        if !ctx.prompts.is_idle() {
            if !self.settings.allow_dtmf_input {
                return Ok(Outcome::Wait);
            }
            ctx.stop_prompts().await?;
        }
        self.awaiting_prompts = false;
        self.disarm(ctx);

        if self.settings.valid_options.contains(digit) {
            Ok(self.finish(ctx, MenuResult::ValidOption, Some(digit)))
        } else {
            self.retry_or_finish(ctx, MenuResult::InvalidOption).await
        }
    }

    async fn on_prompt_played(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        if self.awaiting_prompts && ctx.prompts.is_idle() {
            self.awaiting_prompts = false;
            self.arm(ctx);
        }
        Ok(Outcome::Wait)
    }

    async fn on_timeout(&mut self, ctx: &mut StepContext<'_>, state: TimerState) -> StepResult {
        if self.timer.is_none() || state != TimerState(self.generation) {
            return Ok(Outcome::Wait);
        }
        self.timer = None;
        self.retry_or_finish(ctx, MenuResult::Timeout).await
    }
}
