//! Step implementations
//!
//! A step is one unit of call-handling work. Steps never see the session
//! state or their neighbours; everything they need arrives in a
//! [`StepContext`] on every lifecycle call.

mod assign;
mod conditional;
mod control;
mod error;
mod logger;
mod loop_step;
mod menu;
mod prompt_playback;
mod sequence;
mod transfer;
mod user_input;
mod web_interaction;

pub use assign::{
    AssignVariable, AssignVariableSettings, IncrementVariable, IncrementVariableSettings,
};
pub use conditional::{Branch, Conditional};
pub use control::{DisconnectCall, Exit};
pub use error::StepError;
pub use logger::{LogLevel, Logger, LoggerSettings};
pub use loop_step::Loop;
pub use menu::{Menu, MenuResult, MenuSettings};
pub use prompt_playback::{PromptPlayback, PromptPlaybackSettings};
pub use sequence::Sequence;
pub use transfer::{MakeCall, MakeCallSettings, Transfer, TransferSettings};
pub use user_input::{UserInput, UserInputResult, UserInputSettings};
pub use web_interaction::{HeaderSetting, HttpMethod, WebInteraction, WebInteractionSettings};

use crate::flow::{Expr, ExprError};
use crate::runtime::{CallControl, TelephonyError};
use crate::services::{PromptQueue, TempFileManager, TimerManager, TimerState, VariableStore};
use crate::state_machine::Outcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub type StepResult = Result<Outcome, StepError>;

/// Services a step may use during one lifecycle call
pub struct StepContext<'a> {
    pub timers: &'a mut TimerManager,
    pub variables: &'a mut VariableStore,
    pub temp_files: &'a mut TempFileManager,
    pub prompts: &'a mut PromptQueue,
    pub call: &'a dyn CallControl,
}

impl StepContext<'_> {
    /// Resolve and queue prompts for playback
    pub async fn play(&mut self, prompts: &[Prompt]) -> Result<(), StepError> {
        let mut files = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            files.push(prompt.resolve(self.variables)?);
        }
        if files.is_empty() {
            return Ok(());
        }
        self.prompts.enqueue(self.call, files).await?;
        Ok(())
    }

    /// Barge-in: drop queued prompts and stop the one playing
    pub async fn stop_prompts(&mut self) -> Result<(), TelephonyError> {
        self.prompts.stop(self.call).await
    }
}

/// One audio prompt: a file name, or an expression that yields one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    File(String),
    Computed(Expr),
}

impl Prompt {
    pub fn resolve(&self, vars: &VariableStore) -> Result<String, ExprError> {
        match self {
            Prompt::File(file) => Ok(file.clone()),
            Prompt::Computed(expr) => expr.evaluate_text(vars),
        }
    }
}

impl From<&str> for Prompt {
    fn from(file: &str) -> Self {
        Prompt::File(file.to_string())
    }
}

/// An asynchronous signal routed to the focused step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Digit(char),
    PromptPlayed,
    TransferFailed,
    CallResult(bool),
    CallTerminated,
    Timeout(TimerState),
}

impl Signal {
    /// What a step with nothing in focus answers
    pub fn idle_outcome(self) -> Outcome {
        match self {
            Signal::CallTerminated => Outcome::Continue,
            _ => Outcome::Wait,
        }
    }
}

/// Lifecycle contract every step implements.
///
/// Only `start` is required. The event handlers default to "not interested"
/// (`Wait`), except call termination which defaults to "nothing to flush"
/// (`Continue`).
#[async_trait]
pub trait Step: Send {
    fn name(&self) -> &str;

    async fn start(&mut self, ctx: &mut StepContext<'_>) -> StepResult;

    async fn on_digit(&mut self, _ctx: &mut StepContext<'_>, _digit: char) -> StepResult {
        Ok(Outcome::Wait)
    }

    async fn on_prompt_played(&mut self, _ctx: &mut StepContext<'_>) -> StepResult {
        Ok(Outcome::Wait)
    }

    async fn on_transfer_failed(&mut self, _ctx: &mut StepContext<'_>) -> StepResult {
        Ok(Outcome::Wait)
    }

    async fn on_call_result(&mut self, _ctx: &mut StepContext<'_>, _success: bool) -> StepResult {
        Ok(Outcome::Wait)
    }

    async fn on_call_terminated(&mut self, _ctx: &mut StepContext<'_>) -> StepResult {
        Ok(Outcome::Continue)
    }

    async fn on_timeout(&mut self, _ctx: &mut StepContext<'_>, _state: TimerState) -> StepResult {
        Ok(Outcome::Wait)
    }

    /// Route a signal to the matching lifecycle operation
    async fn deliver(&mut self, ctx: &mut StepContext<'_>, signal: Signal) -> StepResult {
        match signal {
            Signal::Digit(digit) => self.on_digit(ctx, digit).await,
            Signal::PromptPlayed => self.on_prompt_played(ctx).await,
            Signal::TransferFailed => self.on_transfer_failed(ctx).await,
            Signal::CallResult(success) => self.on_call_result(ctx, success).await,
            Signal::CallTerminated => self.on_call_terminated(ctx).await,
            Signal::Timeout(state) => self.on_timeout(ctx, state).await,
        }
    }
}

/// Variable key a step publishes a result under
pub(crate) fn result_key(step: &str, field: &str) -> String {
    format!("{step}.{field}")
}
