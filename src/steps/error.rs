//! Step failure type

use crate::flow::ExprError;
use crate::runtime::TelephonyError;
use thiserror::Error;

/// A step lifecycle operation failed.
///
/// Never crosses the runtime's dispatch boundary: the runtime logs it with
/// the step name and switches to the error-handler flow.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("telephony error: {0}")]
    Telephony(#[from] TelephonyError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("expression error: {0}")]
    Expr(#[from] ExprError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    InvalidState(String),
}

impl StepError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        StepError::InvalidState(message.into())
    }
}
