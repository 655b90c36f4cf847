//! Mock implementations for testing
//!
//! These mocks enable step and runtime tests without a telephony platform.

use super::traits::*;
use crate::services::{PromptQueue, TempFileManager, TimerManager, TimerState, VariableStore};
use crate::state_machine::{Event, Outcome};
use crate::steps::{Step, StepContext, StepError, StepResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Mock Call
// ============================================================================

#[derive(Debug, Default)]
struct CallRecord {
    played: Vec<PathBuf>,
    stops: usize,
    terminates: usize,
    transfers: Vec<String>,
    outbound: Vec<String>,
    fail_transfers: bool,
}

/// Call that records every command it receives.
///
/// Clones share the same record, so a test can keep one clone while the
/// runtime owns another.
#[derive(Debug, Clone)]
pub struct MockCall {
    info: CallInfo,
    record: Arc<Mutex<CallRecord>>,
}

#[allow(dead_code)]
impl MockCall {
    pub fn new() -> Self {
        Self::with_call_id("call-1")
    }

    pub fn with_call_id(call_id: &str) -> Self {
        Self {
            info: CallInfo {
                call_id: call_id.to_string(),
                caller_id: "0501234567".to_string(),
                dialed_number: "800".to_string(),
                called_number: "920000000".to_string(),
                transferring_extension: None,
            },
            record: Arc::new(Mutex::new(CallRecord::default())),
        }
    }

    /// Make every later transfer request fail
    pub fn fail_transfers(&self) {
        self.record.lock().unwrap().fail_transfers = true;
    }

    pub fn played(&self) -> Vec<PathBuf> {
        self.record.lock().unwrap().played.clone()
    }

    pub fn stop_count(&self) -> usize {
        self.record.lock().unwrap().stops
    }

    pub fn terminate_count(&self) -> usize {
        self.record.lock().unwrap().terminates
    }

    pub fn transfers(&self) -> Vec<String> {
        self.record.lock().unwrap().transfers.clone()
    }

    pub fn outbound_calls(&self) -> Vec<String> {
        self.record.lock().unwrap().outbound.clone()
    }
}

impl Default for MockCall {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallControl for MockCall {
    fn info(&self) -> CallInfo {
        self.info.clone()
    }

    async fn terminate(&self) -> Result<(), TelephonyError> {
        self.record.lock().unwrap().terminates += 1;
        Ok(())
    }

    async fn play_audio(&self, file: &Path) -> Result<(), TelephonyError> {
        self.record.lock().unwrap().played.push(file.to_path_buf());
        Ok(())
    }

    async fn stop_audio(&self) -> Result<(), TelephonyError> {
        self.record.lock().unwrap().stops += 1;
        Ok(())
    }

    async fn transfer(&self, destination: &str) -> Result<(), TelephonyError> {
        let mut record = self.record.lock().unwrap();
        if record.fail_transfers {
            return Err(TelephonyError::rejected(format!(
                "transfer to {destination} refused"
            )));
        }
        record.transfers.push(destination.to_string());
        Ok(())
    }

    async fn make_call(&self, destination: &str) -> Result<(), TelephonyError> {
        self.record
            .lock()
            .unwrap()
            .outbound
            .push(destination.to_string());
        Ok(())
    }
}

// ============================================================================
// Scripted Step
// ============================================================================

/// Shared log of `"<step>.<operation>"` entries
pub type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone, Copy)]
enum Reply {
    Answer(Outcome),
    Fail,
}

/// Step whose answer to each lifecycle operation is scripted up front.
///
/// Defaults mirror a step with nothing to do: `start` continues, signals
/// wait, call termination continues.
pub struct ScriptedStep {
    name: String,
    journal: Journal,
    start: Reply,
    digit: Reply,
    prompt_played: Reply,
    transfer_failed: Reply,
    call_result: Reply,
    call_terminated: Reply,
    timeout: Reply,
    temp_file: bool,
    timer: Option<Duration>,
}

#[allow(dead_code)]
impl ScriptedStep {
    pub fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: Arc::clone(journal),
            start: Reply::Answer(Outcome::Continue),
            digit: Reply::Answer(Outcome::Wait),
            prompt_played: Reply::Answer(Outcome::Wait),
            transfer_failed: Reply::Answer(Outcome::Wait),
            call_result: Reply::Answer(Outcome::Wait),
            call_terminated: Reply::Answer(Outcome::Continue),
            timeout: Reply::Answer(Outcome::Wait),
            temp_file: false,
            timer: None,
        }
    }

    pub fn on_start(mut self, outcome: Outcome) -> Self {
        self.start = Reply::Answer(outcome);
        self
    }

    pub fn on_digit(mut self, outcome: Outcome) -> Self {
        self.digit = Reply::Answer(outcome);
        self
    }

    pub fn on_prompt_played(mut self, outcome: Outcome) -> Self {
        self.prompt_played = Reply::Answer(outcome);
        self
    }

    pub fn on_transfer_failed(mut self, outcome: Outcome) -> Self {
        self.transfer_failed = Reply::Answer(outcome);
        self
    }

    pub fn on_call_result(mut self, outcome: Outcome) -> Self {
        self.call_result = Reply::Answer(outcome);
        self
    }

    pub fn on_call_terminated(mut self, outcome: Outcome) -> Self {
        self.call_terminated = Reply::Answer(outcome);
        self
    }

    pub fn on_timeout(mut self, outcome: Outcome) -> Self {
        self.timeout = Reply::Answer(outcome);
        self
    }

    pub fn fail_on_start(mut self) -> Self {
        self.start = Reply::Fail;
        self
    }

    pub fn fail_on_digit(mut self) -> Self {
        self.digit = Reply::Fail;
        self
    }

    pub fn fail_on_call_terminated(mut self) -> Self {
        self.call_terminated = Reply::Fail;
        self
    }

    /// Create a temporary file when started
    pub fn with_temp_file(mut self) -> Self {
        self.temp_file = true;
        self
    }

    /// Arm a timer of `delay` when started
    pub fn with_timer(mut self, delay: Duration) -> Self {
        self.timer = Some(delay);
        self
    }

    pub fn boxed(self) -> Box<dyn Step> {
        Box::new(self)
    }

    fn record(&self, operation: &str, reply: Reply) -> StepResult {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}.{operation}", self.name));
        match reply {
            Reply::Answer(outcome) => Ok(outcome),
            Reply::Fail => Err(StepError::invalid_state(format!(
                "{} failed on {operation}",
                self.name
            ))),
        }
    }
}

#[async_trait]
impl Step for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self, ctx: &mut StepContext<'_>) -> StepResult {
        if self.temp_file {
            ctx.temp_files.create_file("wav")?;
        }
        if let Some(delay) = self.timer {
            ctx.timers.schedule(delay, TimerState(0));
        }
        self.record("start", self.start)
    }

    async fn on_digit(&mut self, _ctx: &mut StepContext<'_>, digit: char) -> StepResult {
        self.record(&format!("digit:{digit}"), self.digit)
    }

    async fn on_prompt_played(&mut self, _ctx: &mut StepContext<'_>) -> StepResult {
        self.record("prompt_played", self.prompt_played)
    }

    async fn on_transfer_failed(&mut self, _ctx: &mut StepContext<'_>) -> StepResult {
        self.record("transfer_failed", self.transfer_failed)
    }

    async fn on_call_result(&mut self, _ctx: &mut StepContext<'_>, success: bool) -> StepResult {
        self.record(&format!("call_result:{success}"), self.call_result)
    }

    async fn on_call_terminated(&mut self, _ctx: &mut StepContext<'_>) -> StepResult {
        self.record("call_terminated", self.call_terminated)
    }

    async fn on_timeout(&mut self, _ctx: &mut StepContext<'_>, _state: TimerState) -> StepResult {
        self.record("timeout", self.timeout)
    }
}

// ============================================================================
// Test Services
// ============================================================================

/// Per-call services for driving a step directly, without a runtime
#[allow(dead_code)]
pub struct TestServices {
    pub call: MockCall,
    pub timers: TimerManager,
    pub variables: VariableStore,
    pub temp_files: TempFileManager,
    pub prompts: PromptQueue,
    /// Receives timer events; kept open so armed timers can fire
    pub event_rx: mpsc::UnboundedReceiver<Event>,
    event_tx: mpsc::UnboundedSender<Event>,
    // Declared last so tracked files are removed before the folder
    _temp_root: tempfile::TempDir,
}

#[allow(dead_code)]
impl TestServices {
    pub fn new() -> Self {
        let temp_root = tempfile::tempdir().unwrap();
        let call = MockCall::new();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            timers: TimerManager::new(&event_tx),
            variables: VariableStore::new(),
            temp_files: TempFileManager::new(temp_root.path(), &call.info().call_id),
            prompts: PromptQueue::new("/audio/demo"),
            call,
            event_rx,
            event_tx,
            _temp_root: temp_root,
        }
    }

    pub fn context(&mut self) -> StepContext<'_> {
        StepContext {
            timers: &mut self.timers,
            variables: &mut self.variables,
            temp_files: &mut self.temp_files,
            prompts: &mut self.prompts,
            call: &self.call,
        }
    }

    /// Report the current prompt as played, as the runtime would
    pub async fn prompt_finished(&mut self) {
        self.prompts.notify_play_finished(&self.call).await.unwrap();
    }

    /// Start playing a prompt outside of any step
    pub async fn queue_prompt(&mut self, file: &str) {
        self.prompts
            .enqueue(&self.call, vec![file.to_string()])
            .await
            .unwrap();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::flow::{CallflowDefinition, Flows};
    use crate::runtime::{launch, spawn_callflow, CallflowHandle, SessionSummary};
    use crate::state_machine::FlowKind;
    use serde_json::json;
    use tokio::task::JoinHandle;

    /// A launched session plus everything a test inspects afterwards
    struct Session {
        call: MockCall,
        handle: CallflowHandle,
        join: JoinHandle<SessionSummary>,
        temp_root: tempfile::TempDir,
    }

    impl Session {
        fn launch(flows: Flows) -> Self {
            let call = MockCall::new();
            let temp_root = tempfile::tempdir().unwrap();
            let (handle, join) = launch(
                call.clone(),
                flows,
                VariableStore::new(),
                PathBuf::from("/audio/demo"),
                temp_root.path(),
            );
            Self {
                call,
                handle,
                join,
                temp_root,
            }
        }

        async fn finished(self) -> (SessionSummary, MockCall, tempfile::TempDir) {
            let summary = tokio::time::timeout(Duration::from_secs(2), self.join)
                .await
                .expect("session did not finish")
                .unwrap();
            (summary, self.call, self.temp_root)
        }
    }

    fn flows(
        main: Vec<ScriptedStep>,
        error_handler: Vec<ScriptedStep>,
        disconnect_handler: Vec<ScriptedStep>,
    ) -> Flows {
        let boxed = |steps: Vec<ScriptedStep>| steps.into_iter().map(ScriptedStep::boxed).collect();
        Flows::new(boxed(main), boxed(error_handler), boxed(disconnect_handler))
    }

    #[tokio::test]
    async fn test_mock_call_records_commands() {
        let call = MockCall::new();
        call.play_audio(Path::new("/audio/a.wav")).await.unwrap();
        call.stop_audio().await.unwrap();
        call.transfer("1001").await.unwrap();
        call.make_call("0500000000").await.unwrap();

        call.fail_transfers();
        let err = call.transfer("1002").await.unwrap_err();
        assert_eq!(err.kind, TelephonyErrorKind::Rejected);

        assert_eq!(call.played(), vec![PathBuf::from("/audio/a.wav")]);
        assert_eq!(call.stop_count(), 1);
        assert_eq!(call.transfers(), vec!["1001"]);
        assert_eq!(call.outbound_calls(), vec!["0500000000"]);
        assert_eq!(call.terminate_count(), 0);
    }

    /// Main flow runs to its end, then the call is terminated
    #[tokio::test]
    async fn test_main_flow_runs_to_completion() {
        let journal = ScriptedStep::journal();
        let session = Session::launch(flows(
            vec![
                ScriptedStep::new("A", &journal),
                ScriptedStep::new("B", &journal),
            ],
            vec![],
            vec![],
        ));

        let (summary, call, _) = session.finished().await;

        assert_eq!(*journal.lock().unwrap(), vec!["A.start", "B.start"]);
        assert_eq!(call.terminate_count(), 1);
        assert!(summary.state.finished);
        assert_eq!(summary.state.flow, FlowKind::Main);
        assert_eq!(summary.call_id, "call-1");
        assert_eq!(summary.cleanup_count, 1);
    }

    /// A failing main step hands over to the error handler flow
    #[tokio::test]
    async fn test_failure_enters_error_flow() {
        let journal = ScriptedStep::journal();
        let session = Session::launch(flows(
            vec![
                ScriptedStep::new("A", &journal).fail_on_start(),
                ScriptedStep::new("B", &journal),
            ],
            vec![ScriptedStep::new("E", &journal)],
            vec![],
        ));

        let (summary, call, _) = session.finished().await;

        assert_eq!(*journal.lock().unwrap(), vec!["A.start", "E.start"]);
        assert_eq!(summary.state.flow, FlowKind::ErrorHandler);
        assert_eq!(call.terminate_count(), 1);
        assert_eq!(summary.cleanup_count, 1);
    }

    #[tokio::test]
    async fn test_failure_with_empty_error_flow_terminates() {
        let journal = ScriptedStep::journal();
        let session = Session::launch(flows(
            vec![ScriptedStep::new("A", &journal).fail_on_start()],
            vec![],
            vec![ScriptedStep::new("D", &journal)],
        ));

        let (summary, call, _) = session.finished().await;

        assert_eq!(*journal.lock().unwrap(), vec!["A.start"]);
        assert!(summary.state.finished);
        assert_eq!(summary.state.flow, FlowKind::ErrorHandler);
        assert_eq!(call.terminate_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_inside_error_flow_terminates() {
        let journal = ScriptedStep::journal();
        let session = Session::launch(flows(
            vec![ScriptedStep::new("A", &journal).fail_on_start()],
            vec![
                ScriptedStep::new("E1", &journal).fail_on_start(),
                ScriptedStep::new("E2", &journal),
            ],
            vec![],
        ));

        let (summary, call, _) = session.finished().await;

        assert_eq!(*journal.lock().unwrap(), vec!["A.start", "E1.start"]);
        assert_eq!(call.terminate_count(), 1);
        assert_eq!(summary.cleanup_count, 1);
    }

    /// A failure while handling a signal also enters the error flow
    #[tokio::test]
    async fn test_signal_failure_enters_error_flow() {
        let journal = ScriptedStep::journal();
        let session = Session::launch(flows(
            vec![ScriptedStep::new("A", &journal)
                .on_start(Outcome::Wait)
                .fail_on_digit()],
            vec![ScriptedStep::new("E", &journal)],
            vec![],
        ));

        session.handle.post_digit('3').unwrap();
        let (summary, call, _) = session.finished().await;

        assert_eq!(*journal.lock().unwrap(), vec!["A.start", "A.digit:3", "E.start"]);
        assert_eq!(summary.state.flow, FlowKind::ErrorHandler);
        assert_eq!(call.terminate_count(), 1);
    }

    /// Hang-up while the focused step is still busy: the disconnect flow
    /// only runs once that step continues
    #[tokio::test]
    async fn test_pending_disconnect_waits_for_step() {
        let journal = ScriptedStep::journal();
        let session = Session::launch(flows(
            vec![
                ScriptedStep::new("A", &journal)
                    .on_start(Outcome::Wait)
                    .on_call_terminated(Outcome::Wait)
                    .on_digit(Outcome::Continue),
                ScriptedStep::new("B", &journal),
            ],
            vec![],
            vec![ScriptedStep::new("D", &journal)],
        ));

        session.handle.post_call_terminated().unwrap();
        session.handle.post_digit('1').unwrap();
        let (summary, call, _) = session.finished().await;

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["A.start", "A.call_terminated", "A.digit:1", "D.start"]
        );
        assert_eq!(summary.state.flow, FlowKind::DisconnectHandler);
        // The call is already gone
        assert_eq!(call.terminate_count(), 0);
        assert_eq!(summary.cleanup_count, 1);
    }

    #[tokio::test]
    async fn test_pending_disconnect_then_exit() {
        let journal = ScriptedStep::journal();
        let session = Session::launch(flows(
            vec![ScriptedStep::new("A", &journal)
                .on_start(Outcome::Wait)
                .on_call_terminated(Outcome::Wait)
                .on_digit(Outcome::Exit)],
            vec![],
            vec![ScriptedStep::new("D", &journal)],
        ));

        session.handle.post_call_terminated().unwrap();
        session.handle.post_digit('9').unwrap();
        let (summary, call, _) = session.finished().await;

        assert!(!journal.lock().unwrap().contains(&"D.start".to_string()));
        assert!(summary.state.finished);
        assert_eq!(call.terminate_count(), 0);
    }

    #[tokio::test]
    async fn test_hang_up_runs_disconnect_flow() {
        let journal = ScriptedStep::journal();
        let session = Session::launch(flows(
            vec![ScriptedStep::new("A", &journal).on_start(Outcome::Wait)],
            vec![],
            vec![
                ScriptedStep::new("D1", &journal),
                ScriptedStep::new("D2", &journal),
            ],
        ));

        session.handle.post_call_terminated().unwrap();
        let (summary, call, _) = session.finished().await;

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["A.start", "A.call_terminated", "D1.start", "D2.start"]
        );
        assert_eq!(summary.state.flow, FlowKind::DisconnectHandler);
        assert_eq!(call.terminate_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_hang_up_ignored() {
        let journal = ScriptedStep::journal();
        let session = Session::launch(flows(
            vec![ScriptedStep::new("A", &journal).on_start(Outcome::Wait)],
            vec![],
            vec![ScriptedStep::new("D", &journal)
                .on_start(Outcome::Wait)
                .on_prompt_played(Outcome::Continue)],
        ));

        session.handle.post_call_terminated().unwrap();
        session.handle.post_call_terminated().unwrap();
        session.handle.post_prompt_played().unwrap();
        let (summary, _, _) = session.finished().await;

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["A.start", "A.call_terminated", "D.start", "D.prompt_played"]
        );
        assert_eq!(summary.cleanup_count, 1);
    }

    #[tokio::test]
    async fn test_failure_inside_disconnect_flow_ends_quietly() {
        let journal = ScriptedStep::journal();
        let session = Session::launch(flows(
            vec![ScriptedStep::new("A", &journal).on_start(Outcome::Wait)],
            vec![ScriptedStep::new("E", &journal)],
            vec![
                ScriptedStep::new("D1", &journal).fail_on_start(),
                ScriptedStep::new("D2", &journal),
            ],
        ));

        session.handle.post_call_terminated().unwrap();
        let (summary, call, _) = session.finished().await;

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["A.start", "A.call_terminated", "D1.start"]
        );
        assert_eq!(summary.state.flow, FlowKind::DisconnectHandler);
        assert_eq!(call.terminate_count(), 0);
    }

    /// A step failing while the call hangs up is recovered through the
    /// error handler flow; resources are still released once
    #[tokio::test]
    async fn test_hang_up_failure_enters_error_flow() {
        let journal = ScriptedStep::journal();
        let session = Session::launch(flows(
            vec![ScriptedStep::new("A", &journal)
                .with_temp_file()
                .on_start(Outcome::Wait)
                .fail_on_call_terminated()],
            vec![ScriptedStep::new("E", &journal)],
            vec![ScriptedStep::new("D", &journal)],
        ));

        session.handle.post_call_terminated().unwrap();
        let (summary, _, temp_root) = session.finished().await;

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["A.start", "A.call_terminated", "E.start"]
        );
        assert_eq!(summary.state.flow, FlowKind::ErrorHandler);
        assert!(summary.state.finished);
        assert_eq!(summary.cleanup_count, 1);
        assert!(!temp_root.path().join("call-1").exists());
    }

    /// A timer armed by a step that has since moved on never reaches the
    /// step now in focus
    #[tokio::test]
    async fn test_stale_timeout_not_dispatched() {
        let journal = ScriptedStep::journal();
        let session = Session::launch(flows(
            vec![
                ScriptedStep::new("A", &journal)
                    .with_timer(Duration::ZERO)
                    .on_start(Outcome::Wait)
                    .on_digit(Outcome::Continue),
                ScriptedStep::new("B", &journal)
                    .on_start(Outcome::Wait)
                    .on_timeout(Outcome::Continue),
            ],
            vec![],
            vec![],
        ));

        // Queued right behind Start, ahead of the timer's expiry
        session.handle.post_digit('1').unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.handle.post_call_terminated().unwrap();
        let (summary, _, _) = session.finished().await;

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["A.start", "A.digit:1", "B.start", "B.call_terminated"]
        );
        assert_eq!(summary.state.flow, FlowKind::DisconnectHandler);
    }

    #[tokio::test]
    async fn test_events_after_finish_are_dropped() {
        let journal = ScriptedStep::journal();
        let session = Session::launch(flows(
            vec![ScriptedStep::new("A", &journal)
                .on_start(Outcome::Wait)
                .on_digit(Outcome::Exit)],
            vec![],
            vec![ScriptedStep::new("D", &journal)],
        ));

        for digit in ['1', '2', '3'] {
            session.handle.post_digit(digit).unwrap();
        }
        session.handle.post_call_terminated().unwrap();
        let (summary, call, _) = session.finished().await;

        assert_eq!(*journal.lock().unwrap(), vec!["A.start", "A.digit:1"]);
        assert_eq!(summary.state.flow, FlowKind::Main);
        assert_eq!(call.terminate_count(), 1);
        assert_eq!(summary.cleanup_count, 1);
    }

    #[tokio::test]
    async fn test_exit_skips_remaining_steps() {
        let journal = ScriptedStep::journal();
        let session = Session::launch(flows(
            vec![
                ScriptedStep::new("A", &journal).on_start(Outcome::Exit),
                ScriptedStep::new("B", &journal),
            ],
            vec![],
            vec![],
        ));

        // Queued behind Start, so they reach a finished session
        session.handle.post_digit('1').unwrap();
        session.handle.post_prompt_played().unwrap();
        let (summary, call, _) = session.finished().await;

        assert_eq!(*journal.lock().unwrap(), vec!["A.start"]);
        assert_eq!(summary.state.position, 0);
        assert_eq!(call.terminate_count(), 1);
    }

    #[tokio::test]
    async fn test_signals_route_to_focused_step() {
        let journal = ScriptedStep::journal();
        let session = Session::launch(flows(
            vec![
                ScriptedStep::new("A", &journal)
                    .on_start(Outcome::Wait)
                    .on_transfer_failed(Outcome::Continue),
                ScriptedStep::new("B", &journal)
                    .on_start(Outcome::Wait)
                    .on_call_result(Outcome::Continue),
            ],
            vec![],
            vec![],
        ));

        session.handle.post_transfer_failed().unwrap();
        session.handle.post_call_result(true).unwrap();
        let (_, call, _) = session.finished().await;

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["A.start", "A.transfer_failed", "B.start", "B.call_result:true"]
        );
        assert_eq!(call.terminate_count(), 1);
    }

    #[tokio::test]
    async fn test_temp_files_removed_after_hang_up() {
        let journal = ScriptedStep::journal();
        let session = Session::launch(flows(
            vec![ScriptedStep::new("A", &journal)
                .with_temp_file()
                .on_start(Outcome::Wait)],
            vec![],
            vec![ScriptedStep::new("D", &journal).on_start(Outcome::Wait)],
        ));

        session.handle.post_call_terminated().unwrap();
        // Lets the disconnect flow settle, then ends the session by
        // dropping the last handle
        tokio::time::sleep(Duration::from_millis(50)).await;
        let Session {
            call,
            handle,
            join,
            temp_root,
        } = session;
        drop(handle);
        let summary = tokio::time::timeout(Duration::from_secs(2), join)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.cleanup_count, 1);
        assert!(!summary.state.finished);
        assert_eq!(call.terminate_count(), 0);
        assert!(!temp_root.path().join("call-1").exists());
    }

    #[tokio::test]
    async fn test_handle_reports_closed_session() {
        let journal = ScriptedStep::journal();
        let session = Session::launch(flows(vec![ScriptedStep::new("A", &journal)], vec![], vec![]));
        let handle = session.handle.clone();

        session.finished().await;

        assert!(handle.is_closed());
        assert!(handle.post_digit('1').is_err());
    }

    fn definition() -> CallflowDefinition {
        serde_json::from_value(json!({
            "name": "demo",
            "variables": { "callflow$.pin": "" },
            "main": [
                { "type": "prompt_playback", "name": "welcome", "prompts": ["welcome.wav"] },
                {
                    "type": "user_input",
                    "name": "getpin",
                    "min_digits": 4,
                    "max_digits": 4,
                    "first_digit_timeout_ms": 5000
                },
                {
                    "type": "conditional",
                    "name": "checkpin",
                    "branches": [{
                        "condition": {
                            "op": "eq",
                            "left": { "op": "var", "name": "getpin.result" },
                            "right": { "op": "var", "name": "UserInputResult.ValidDigits" }
                        },
                        "steps": [{
                            "type": "assign_variable",
                            "name": "savepin",
                            "variable": "callflow$.pin",
                            "value": { "op": "var", "name": "getpin.buffer" }
                        }]
                    }]
                }
            ],
            "disconnect_handler": [
                { "type": "logger", "name": "bye", "text": { "op": "literal", "value": "caller left" } }
            ]
        }))
        .unwrap()
    }

    /// Full session from a definition: prompt, digit collection, branch
    #[tokio::test]
    async fn test_spawn_callflow_from_definition() {
        let temp_root = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            audio_root: PathBuf::from("/audio"),
            temp_root: temp_root.path().to_path_buf(),
            http_timeout: Duration::from_secs(5),
        };
        let call = MockCall::new();

        let (handle, join) = spawn_callflow(&definition(), &config, call.clone()).unwrap();
        handle.post_prompt_played().unwrap();
        for digit in ['1', '2', '3', '4'] {
            handle.post_digit(digit).unwrap();
        }
        let summary = tokio::time::timeout(Duration::from_secs(2), join)
            .await
            .unwrap()
            .unwrap();

        assert!(summary.state.finished);
        assert_eq!(summary.state.flow, FlowKind::Main);
        assert_eq!(summary.variables.get_text("callflow$.pin"), "1234");
        assert_eq!(summary.variables.get_text("session.callid"), "call-1");
        assert_eq!(call.played(), vec![PathBuf::from("/audio/demo/welcome.wav")]);
        assert_eq!(call.terminate_count(), 1);
    }

    /// An unanswered digit prompt times out through a real timer
    #[tokio::test]
    async fn test_user_input_timeout_through_runtime() {
        let mut definition = definition();
        definition.main.remove(0);
        if let crate::flow::StepDefinition::UserInput(settings) = &mut definition.main[0] {
            settings.first_digit_timeout_ms = 20;
        }

        let temp_root = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            audio_root: PathBuf::from("/audio"),
            temp_root: temp_root.path().to_path_buf(),
            http_timeout: Duration::from_secs(5),
        };
        let call = MockCall::new();

        let (_handle, join) = spawn_callflow(&definition, &config, call.clone()).unwrap();
        let summary = tokio::time::timeout(Duration::from_secs(2), join)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.variables.get_text("getpin.result"), "Timeout");
        assert_eq!(summary.variables.get_text("callflow$.pin"), "");
        assert_eq!(call.terminate_count(), 1);
    }

    #[tokio::test]
    async fn test_hang_up_during_definition_runs_disconnect_handler() {
        let temp_root = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            audio_root: PathBuf::from("/audio"),
            temp_root: temp_root.path().to_path_buf(),
            http_timeout: Duration::from_secs(5),
        };
        let call = MockCall::new();

        let (handle, join) = spawn_callflow(&definition(), &config, call.clone()).unwrap();
        handle.post_call_terminated().unwrap();
        // Stale by the time it arrives: the session has moved on
        handle.post_digit('5').unwrap();
        let summary = tokio::time::timeout(Duration::from_secs(2), join)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.state.flow, FlowKind::DisconnectHandler);
        assert!(summary.state.finished);
        assert!(summary.variables.get("getpin.result").is_none());
        assert_eq!(call.terminate_count(), 0);
    }
}
