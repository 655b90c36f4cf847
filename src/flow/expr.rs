//! Expressions used by step parameters and branch conditions
//!
//! Definitions carry small expression trees instead of code. Evaluation
//! only ever reads the variable store.

use crate::services::{value_is_truthy, value_to_number, value_to_text, VariableStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("variable '{name}' is not numeric: {value}")]
    NotNumeric { name: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    Literal { value: Value },
    Var { name: String },
    Concat { args: Vec<Expr> },
    Eq { left: Box<Expr>, right: Box<Expr> },
    Ne { left: Box<Expr>, right: Box<Expr> },
    Lt { left: Box<Expr>, right: Box<Expr> },
    Le { left: Box<Expr>, right: Box<Expr> },
    Gt { left: Box<Expr>, right: Box<Expr> },
    Ge { left: Box<Expr>, right: Box<Expr> },
    And { args: Vec<Expr> },
    Or { args: Vec<Expr> },
    Not { arg: Box<Expr> },
}

impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal {
            value: value.into(),
        }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var { name: name.into() }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Expr::Eq {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn lt(left: Expr, right: Expr) -> Self {
        Expr::Lt {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn evaluate(&self, vars: &VariableStore) -> Result<Value, ExprError> {
        let value = match self {
            Expr::Literal { value } => value.clone(),
            Expr::Var { name } => vars
                .get(name)
                .cloned()
                .ok_or_else(|| ExprError::UnknownVariable(name.clone()))?,
            Expr::Concat { args } => {
                let mut text = String::new();
                for arg in args {
                    text.push_str(&arg.evaluate_text(vars)?);
                }
                Value::String(text)
            }
            Expr::Eq { left, right } => {
                Value::Bool(compare(left, right, vars)? == Ordering::Equal)
            }
            Expr::Ne { left, right } => {
                Value::Bool(compare(left, right, vars)? != Ordering::Equal)
            }
            Expr::Lt { left, right } => Value::Bool(compare(left, right, vars)? == Ordering::Less),
            Expr::Le { left, right } => {
                Value::Bool(compare(left, right, vars)? != Ordering::Greater)
            }
            Expr::Gt { left, right } => {
                Value::Bool(compare(left, right, vars)? == Ordering::Greater)
            }
            Expr::Ge { left, right } => Value::Bool(compare(left, right, vars)? != Ordering::Less),
            Expr::And { args } => {
                for arg in args {
                    if !arg.is_true(vars)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Value::Bool(true)
            }
            Expr::Or { args } => {
                for arg in args {
                    if arg.is_true(vars)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Value::Bool(false)
            }
            Expr::Not { arg } => Value::Bool(!arg.is_true(vars)?),
        };
        Ok(value)
    }

    pub fn evaluate_text(&self, vars: &VariableStore) -> Result<String, ExprError> {
        self.evaluate(vars).map(|v| value_to_text(&v))
    }

    pub fn is_true(&self, vars: &VariableStore) -> Result<bool, ExprError> {
        self.evaluate(vars).map(|v| value_is_truthy(&v))
    }
}

/// Numeric when both sides coerce to numbers, textual otherwise
fn compare(left: &Expr, right: &Expr, vars: &VariableStore) -> Result<Ordering, ExprError> {
    let left = left.evaluate(vars)?;
    let right = right.evaluate(vars)?;

    if let (Some(l), Some(r)) = (value_to_number(&left), value_to_number(&right)) {
        // NaN ("nan".parse) compares as unequal
        return Ok(l.partial_cmp(&r).unwrap_or(Ordering::Less));
    }
    Ok(value_to_text(&left).cmp(&value_to_text(&right)))
}
