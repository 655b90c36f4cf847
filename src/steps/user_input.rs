//! Digit collection step
//!
//! Plays the initial prompts, then collects DTMF digits until a stop digit,
//! the maximum length, or a digit timeout ends the input. Invalid input and
//! timeouts are retried up to `max_retry_count` times, replaying the
//! matching error prompt followed by the subsequent prompts.

use super::{result_key, Prompt, Step, StepContext, StepResult};
use crate::services::{TimerId, TimerState};
use crate::state_machine::Outcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Value published in `<step>.result`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserInputResult {
    Timeout,
    InvalidDigits,
    ValidDigits,
}

impl UserInputResult {
    pub const ALL: [UserInputResult; 3] = [
        UserInputResult::Timeout,
        UserInputResult::InvalidDigits,
        UserInputResult::ValidDigits,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UserInputResult::Timeout => "Timeout",
            UserInputResult::InvalidDigits => "InvalidDigits",
            UserInputResult::ValidDigits => "ValidDigits",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInputSettings {
    pub name: String,
    pub initial_prompts: Vec<Prompt>,
    pub subsequent_prompts: Vec<Prompt>,
    pub invalid_digit_prompts: Vec<Prompt>,
    pub timeout_prompts: Vec<Prompt>,
    pub min_digits: usize,
    pub max_digits: usize,
    /// Accepted digits; empty accepts anything
    pub valid_digits: String,
    /// Digits that end input without being collected
    pub stop_digits: String,
    pub first_digit_timeout_ms: u64,
    pub inter_digit_timeout_ms: u64,
    /// Used instead of the inter-digit timeout once `min_digits` is reached
    pub final_digit_timeout_ms: u64,
    pub max_retry_count: u32,
    /// Digits interrupt prompt playback
    pub allow_dtmf_input: bool,
}

impl Default for UserInputSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            initial_prompts: Vec::new(),
            subsequent_prompts: Vec::new(),
            invalid_digit_prompts: Vec::new(),
            timeout_prompts: Vec::new(),
            min_digits: 1,
            max_digits: 20,
            valid_digits: "0123456789".to_string(),
            stop_digits: "#".to_string(),
            first_digit_timeout_ms: 5000,
            inter_digit_timeout_ms: 3000,
            final_digit_timeout_ms: 2000,
            max_retry_count: 0,
            allow_dtmf_input: true,
        }
    }
}

pub struct UserInput {
    settings: UserInputSettings,
    buffer: String,
    retries: u32,
    /// First-digit timer starts once the queued prompts finish
    awaiting_prompts: bool,
    timer: Option<TimerId>,
    /// Tag of the armed timer; older tags are stale
    generation: u32,
}

impl UserInput {
    pub fn new(settings: UserInputSettings) -> Self {
        Self {
            settings,
            buffer: String::new(),
            retries: 0,
            awaiting_prompts: false,
            timer: None,
            generation: 0,
        }
    }

    fn digit_count(&self) -> usize {
        self.buffer.chars().count()
    }

    fn arm(&mut self, ctx: &mut StepContext<'_>, timeout_ms: u64) {
        self.disarm(ctx);
        self.generation = self.generation.wrapping_add(1);
        let id = ctx.timers.schedule(
            Duration::from_millis(timeout_ms),
            TimerState(self.generation),
        );
        self.timer = Some(id);
    }

    fn disarm(&mut self, ctx: &mut StepContext<'_>) {
        if let Some(id) = self.timer.take() {
            ctx.timers.cancel(id);
        }
    }

    fn listen(&mut self, ctx: &mut StepContext<'_>) {
        if ctx.prompts.is_idle() {
            self.awaiting_prompts = false;
            self.arm(ctx, self.settings.first_digit_timeout_ms);
        } else {
            self.awaiting_prompts = true;
        }
    }

    async fn evaluate(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        self.disarm(ctx);
        let count = self.digit_count();
        let length_ok = count >= self.settings.min_digits && count <= self.settings.max_digits;
        let digits_ok = self.settings.valid_digits.is_empty()
            || self
                .buffer
                .chars()
                .all(|c| self.settings.valid_digits.contains(c));

        if length_ok && digits_ok {
            Ok(self.finish(ctx, UserInputResult::ValidDigits))
        } else {
            self.retry_or_finish(ctx, UserInputResult::InvalidDigits)
                .await
        }
    }

    async fn retry_or_finish(
        &mut self,
        ctx: &mut StepContext<'_>,
        result: UserInputResult,
    ) -> StepResult {
        if self.retries >= self.settings.max_retry_count {
            return Ok(self.finish(ctx, result));
        }

        self.retries += 1;
        self.buffer.clear();
        tracing::debug!(step = %self.settings.name, retry = self.retries, result = result.as_str(), "Retrying user input");

        let error_prompts = if result == UserInputResult::Timeout {
            &self.settings.timeout_prompts
        } else {
            &self.settings.invalid_digit_prompts
        };
        ctx.play(error_prompts).await?;
        ctx.play(&self.settings.subsequent_prompts).await?;
        self.listen(ctx);
        Ok(Outcome::Wait)
    }

    fn finish(&mut self, ctx: &mut StepContext<'_>, result: UserInputResult) -> Outcome {
        self.disarm(ctx);
        self.awaiting_prompts = false;
        let name = &self.settings.name;
        ctx.variables
            .set(result_key(name, "result"), result.as_str());
        ctx.variables
            .set(result_key(name, "buffer"), self.buffer.clone());
        tracing::debug!(step = %name, result = result.as_str(), digits = self.digit_count(), "User input finished");
        Outcome::Continue
    }
}

#[async_trait]
impl Step for UserInput {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn start(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        self.buffer.clear();
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

        if self.settings.stop_digits.contains(digit) {
            return self.evaluate(ctx).await;
        }

        self.buffer.push(digit);
        let count = self.digit_count();
        if count >= self.settings.max_digits {
            return self.evaluate(ctx).await;
        }

        let timeout = if count >= self.settings.min_digits {
            self.settings.final_digit_timeout_ms
        } else {
            self.settings.inter_digit_timeout_ms
        };
        self.arm(ctx, timeout);
        Ok(Outcome::Wait)
    }

    async fn on_prompt_played(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        if self.awaiting_prompts && ctx.prompts.is_idle() {
            self.awaiting_prompts = false;
            self.arm(ctx, self.settings.first_digit_timeout_ms);
        }
        Ok(Outcome::Wait)
    }

    async fn on_timeout(&mut self, ctx: &mut StepContext<'_>, state: TimerState) -> StepResult {
        if self.timer.is_none() || state != TimerState(self.generation) {
            return Ok(Outcome::Wait);
        }
        self.timer = None;

        if self.buffer.is_empty() {
            self.retry_or_finish(ctx, UserInputResult::Timeout).await
        } else {
            self.evaluate(ctx).await
        }
    }
}
