//! Runtime for executing callflows
//!
//! One runtime per call. The host gets a [`CallflowHandle`] to post events
//! and a join handle that resolves to the [`SessionSummary`].

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{CallflowRuntime, SessionSummary};
pub use traits::*;

use crate::config::EngineConfig;
use crate::flow::{CallflowDefinition, FlowBuilder, FlowError, Flows};
use crate::services::{PromptQueue, TempFileManager, TimerId, TimerManager, TimerState, VariableStore};
use crate::state_machine::Event;
use crate::steps::{MenuResult, UserInputResult};
use executor::CallServices;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
#[error("callflow session has ended")]
pub struct SessionEnded;

/// Handle to post events into a running callflow.
///
/// Cheap to clone and safe to use from any task or thread; posting never
/// blocks.
#[derive(Debug, Clone)]
pub struct CallflowHandle {
    event_tx: mpsc::UnboundedSender<Event>,
}

impl CallflowHandle {
    fn post(&self, event: Event) -> Result<(), SessionEnded> {
        self.event_tx.send(event).map_err(|_| SessionEnded)
    }

    pub fn post_start(&self) -> Result<(), SessionEnded> {
        self.post(Event::Start)
    }

    pub fn post_digit(&self, digit: char) -> Result<(), SessionEnded> {
        self.post(Event::DigitReceived(digit))
    }

    pub fn post_prompt_played(&self) -> Result<(), SessionEnded> {
        self.post(Event::PromptPlayed)
    }

    pub fn post_transfer_failed(&self) -> Result<(), SessionEnded> {
        self.post(Event::TransferFailed)
    }

    pub fn post_call_result(&self, success: bool) -> Result<(), SessionEnded> {
        self.post(Event::CallResultReceived(success))
    }

    pub fn post_call_terminated(&self) -> Result<(), SessionEnded> {
        self.post(Event::CallTerminated)
    }

    pub fn post_timeout(&self, timer: TimerId, state: TimerState) -> Result<(), SessionEnded> {
        self.post(Event::TimedOut { timer, state })
    }

    pub fn is_closed(&self) -> bool {
        self.event_tx.is_closed()
    }
}

/// Build the flows for `definition` and start a session for `call`.
///
/// Must be called within a tokio runtime. The session starts immediately;
/// the returned join handle resolves once it has finished.
pub fn spawn_callflow<C: CallControl + 'static>(
    definition: &CallflowDefinition,
    config: &EngineConfig,
    call: C,
) -> Result<(CallflowHandle, JoinHandle<SessionSummary>), FlowError> {
    definition.validate()?;
    let flows = FlowBuilder::new(config.http_timeout)?.build(definition);
    let audio_folder = config.audio_folder(&definition.name);
    let variables = seed_variables(&call.info(), &audio_folder, definition);

    Ok(launch(call, flows, variables, audio_folder, config.temp_root()))
}

/// Start a session from already built flows
pub fn launch<C: CallControl + 'static>(
    call: C,
    flows: Flows,
    variables: VariableStore,
    audio_folder: PathBuf,
    temp_root: &Path,
) -> (CallflowHandle, JoinHandle<SessionSummary>) {
    let call_id = call.info().call_id;
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let services = CallServices {
        timers: TimerManager::new(&event_tx),
        variables,
        temp_files: TempFileManager::new(temp_root, &call_id),
        prompts: PromptQueue::new(audio_folder),
        call,
    };
    let runtime = CallflowRuntime::new(call_id, flows, services, event_rx);

    let handle = CallflowHandle { event_tx };
    // Queued before the consumer exists, so it is always the first event
    let _ = handle.post_start();
    let join = tokio::spawn(runtime.run());
    (handle, join)
}

const RECORD_RESULTS: [&str; 3] = ["NothingRecorded", "StopDigit", "Completed"];
const VOICE_INPUT_RESULTS: [&str; 4] = ["Timeout", "InvalidInput", "ValidInput", "ValidDtmfInput"];

/// Variables every session starts with: call data, result constants, then
/// the definition's user variables
pub fn seed_variables(
    info: &CallInfo,
    audio_folder: &Path,
    definition: &CallflowDefinition,
) -> VariableStore {
    let mut vars = VariableStore::new();

    vars.set("session.ani", info.caller_id.clone());
    vars.set("session.callid", info.call_id.clone());
    vars.set("session.dnis", info.dialed_number.clone());
    vars.set("session.did", info.called_number.clone());
    vars.set("session.audioFolder", audio_folder.display().to_string());
    vars.set(
        "session.transferingExtension",
        info.transferring_extension.clone().unwrap_or_default(),
    );
    vars.set("session.startTime", chrono::Utc::now().to_rfc3339());

    for result in MenuResult::ALL {
        vars.set(format!("MenuResult.{}", result.as_str()), result.as_str());
    }
    for result in UserInputResult::ALL {
        vars.set(format!("UserInputResult.{}", result.as_str()), result.as_str());
    }
    // Result constants of the record and voice-input components, kept so
    // flows exported with them still evaluate
    for result in RECORD_RESULTS {
        vars.set(format!("RecordResult.{result}"), result);
    }
    for result in VOICE_INPUT_RESULTS {
        vars.set(format!("VoiceInputResult.{result}"), result);
    }

    for (name, value) in &definition.variables {
        vars.set(name.clone(), value.clone());
    }
    vars
}
