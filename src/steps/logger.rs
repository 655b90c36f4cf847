//! Logging step

use super::{Step, StepContext, StepResult};
use crate::flow::Expr;
use crate::state_machine::Outcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerSettings {
    pub name: String,
    #[serde(default)]
    pub level: LogLevel,
    pub text: Expr,
}

/// Writes a message to the session log
pub struct Logger {
    settings: LoggerSettings,
}

impl Logger {
    pub fn new(settings: LoggerSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Step for Logger {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn start(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        let text = self.settings.text.evaluate_text(ctx.variables)?;
        let step = self.settings.name.as_str();
        match self.settings.level {
            LogLevel::Trace => tracing::trace!(step, "{text}"),
            LogLevel::Debug => tracing::debug!(step, "{text}"),
            LogLevel::Info => tracing::info!(step, "{text}"),
            LogLevel::Warn => tracing::warn!(step, "{text}"),
            LogLevel::Error => tracing::error!(step, "{text}"),
        }
        Ok(Outcome::Continue)
    }
}
