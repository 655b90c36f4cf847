//! Trait abstractions for runtime I/O
//!
//! The telephony platform is reached only through [`CallControl`], which
//! lets the runtime and every step run against a mock call in tests.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Identity of the call a session is driving
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallInfo {
    pub call_id: String,
    /// Caller id (ANI)
    pub caller_id: String,
    /// Number of the extension/queue that received the call (DNIS)
    pub dialed_number: String,
    /// Number the caller dialed (DID)
    pub called_number: String,
    /// Extension that transferred the call here, if any
    pub transferring_extension: Option<String>,
}

/// Telephony failure with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TelephonyError {
    pub kind: TelephonyErrorKind,
    pub message: String,
}

impl TelephonyError {
    pub fn new(kind: TelephonyErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn call_gone(message: impl Into<String>) -> Self {
        Self::new(TelephonyErrorKind::CallGone, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(TelephonyErrorKind::Rejected, message)
    }

    pub fn media(message: impl Into<String>) -> Self {
        Self::new(TelephonyErrorKind::Media, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelephonyErrorKind {
    /// The call is no longer connected
    CallGone,
    /// The platform refused the request (bad destination, not allowed)
    Rejected,
    /// Audio could not be played or stopped
    Media,
}

/// Operations the runtime and steps need from the telephony platform.
///
/// Completion of these requests is reported back asynchronously as events
/// (`PromptPlayed`, `TransferFailed`, `CallResultReceived`,
/// `CallTerminated`) through the session's handle.
#[async_trait]
pub trait CallControl: Send + Sync {
    fn info(&self) -> CallInfo;

    /// Drop the call
    async fn terminate(&self) -> Result<(), TelephonyError>;

    /// Start playing one audio file
    async fn play_audio(&self, path: &Path) -> Result<(), TelephonyError>;

    /// Stop whatever is playing. The platform must not report
    /// `PromptPlayed` for a file stopped this way.
    async fn stop_audio(&self) -> Result<(), TelephonyError>;

    /// Blind-transfer the call
    async fn transfer(&self, destination: &str) -> Result<(), TelephonyError>;

    /// Place an outbound call; the result arrives as `CallResultReceived`
    async fn make_call(&self, destination: &str) -> Result<(), TelephonyError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: CallControl + ?Sized> CallControl for Arc<T> {
    fn info(&self) -> CallInfo {
        (**self).info()
    }

    async fn terminate(&self) -> Result<(), TelephonyError> {
        (**self).terminate().await
    }

    async fn play_audio(&self, path: &Path) -> Result<(), TelephonyError> {
        (**self).play_audio(path).await
    }

    async fn stop_audio(&self) -> Result<(), TelephonyError> {
        (**self).stop_audio().await
    }

    async fn transfer(&self, destination: &str) -> Result<(), TelephonyError> {
        (**self).transfer(destination).await
    }

    async fn make_call(&self, destination: &str) -> Result<(), TelephonyError> {
        (**self).make_call(destination).await
    }
}
