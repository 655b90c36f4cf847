//! Variable assignment steps

use super::{Step, StepContext, StepResult};
use crate::flow::{Expr, ExprError};
use crate::services::value_to_text;
use crate::state_machine::Outcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignVariableSettings {
    pub name: String,
    pub variable: String,
    pub value: Expr,
}

/// Evaluates an expression and stores the result
pub struct AssignVariable {
    settings: AssignVariableSettings,
}

impl AssignVariable {
    pub fn new(settings: AssignVariableSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Step for AssignVariable {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn start(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        let value = self.settings.value.evaluate(ctx.variables)?;
        tracing::trace!(step = %self.settings.name, variable = %self.settings.variable, %value, "Assigning variable");
        ctx.variables.set(self.settings.variable.clone(), value);
        Ok(Outcome::Continue)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementVariableSettings {
    pub name: String,
    pub variable: String,
}

/// Adds one to a numeric variable
pub struct IncrementVariable {
    settings: IncrementVariableSettings,
}

impl IncrementVariable {
    pub fn new(settings: IncrementVariableSettings) -> Self {
        Self { settings }
    }
}

fn increment(name: &str, current: &Value) -> Result<Value, ExprError> {
    let not_numeric = || ExprError::NotNumeric {
        name: name.to_string(),
        value: value_to_text(current),
    };

    match current {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::from(i.checked_add(1).ok_or_else(not_numeric)?))
            } else {
                n.as_f64().map(|f| Value::from(f + 1.0)).ok_or_else(not_numeric)
            }
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Ok(Value::from(i.checked_add(1).ok_or_else(not_numeric)?))
            } else {
                trimmed
                    .parse::<f64>()
                    .map(|f| Value::from(f + 1.0))
                    .map_err(|_| not_numeric())
            }
        }
        _ => Err(not_numeric()),
    }
}

#[async_trait]
impl Step for IncrementVariable {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn start(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        let variable = &self.settings.variable;
        let current = ctx
            .variables
            .get(variable)
            .ok_or_else(|| ExprError::UnknownVariable(variable.clone()))?;
        let next = increment(variable, current)?;
        ctx.variables.set(variable.clone(), next);
        Ok(Outcome::Continue)
    }
}
