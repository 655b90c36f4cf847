//! Call routing steps: blind transfer and outbound call

use super::{result_key, Step, StepContext, StepResult};
use crate::flow::Expr;
use crate::services::{TimerId, TimerState};
use crate::state_machine::Outcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DELAY_TAG: TimerState = TimerState(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSettings {
    pub name: String,
    pub destination: Expr,
    /// Wait this long before transferring (lets a prompt finish)
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

/// Blind transfer.
///
/// A successful transfer takes the call away from this session and shows up
/// as call termination. A failed one continues the flow with
/// `<name>.result = "failed"`.
pub struct Transfer {
    settings: TransferSettings,
    delay: Option<TimerId>,
}

impl Transfer {
    pub fn new(settings: TransferSettings) -> Self {
        Self {
            settings,
            delay: None,
        }
    }

    async fn transfer(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        let destination = self.settings.destination.evaluate_text(ctx.variables)?;
        tracing::info!(step = %self.settings.name, %destination, "Transferring call");
        ctx.variables
            .set(result_key(&self.settings.name, "result"), "transferring");
        ctx.stop_prompts().await?;
        ctx.call.transfer(&destination).await?;
        Ok(Outcome::Wait)
    }
}

#[async_trait]
impl Step for Transfer {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn start(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        match self.settings.delay_ms {
            Some(ms) if ms > 0 => {
                self.delay = Some(ctx.timers.schedule(Duration::from_millis(ms), DELAY_TAG));
                Ok(Outcome::Wait)
            }
            _ => self.transfer(ctx).await,
        }
    }

    async fn on_timeout(&mut self, ctx: &mut StepContext<'_>, state: TimerState) -> StepResult {
        if state != DELAY_TAG || self.delay.take().is_none() {
            return Ok(Outcome::Wait);
        }
        self.transfer(ctx).await
    }

    async fn on_transfer_failed(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        tracing::warn!(step = %self.settings.name, "Transfer failed");
        ctx.variables
            .set(result_key(&self.settings.name, "result"), "failed");
        Ok(Outcome::Continue)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakeCallSettings {
    pub name: String,
    pub destination: Expr,
}

/// Places an outbound call and waits for its result (`<name>.result`)
pub struct MakeCall {
    settings: MakeCallSettings,
}

impl MakeCall {
    pub fn new(settings: MakeCallSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Step for MakeCall {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn start(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        let destination = self.settings.destination.evaluate_text(ctx.variables)?;
        tracing::info!(step = %self.settings.name, %destination, "Making call");
        ctx.call.make_call(&destination).await?;
        Ok(Outcome::Wait)
    }

    async fn on_call_result(&mut self, ctx: &mut StepContext<'_>, success: bool) -> StepResult {
        ctx.variables
            .set(result_key(&self.settings.name, "result"), success);
        Ok(Outcome::Continue)
    }
}
