//! Callflow runtime executor
//!
//! Owns one session: its state, its three flows and its services. A single
//! consumer loop pulls events off the session queue, routes each to the
//! focused step, feeds the outcome through the pure transitions and
//! executes the resulting effects.

use super::traits::CallControl;
use crate::flow::Flows;
use crate::services::{PromptQueue, TempFileManager, TimerManager, VariableStore};
use crate::state_machine::{
    after_signal, check_outcome, enter_disconnect_flow, enter_error_flow, on_call_terminated,
    on_start, Effect, Event, FlowKind, Outcome, SessionState, TransitionResult,
};
use crate::steps::{Signal, StepContext, StepError};
use tokio::sync::mpsc;
use tracing::Instrument;

/// Final report of a session, returned when the runtime stops
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub call_id: String,
    pub state: SessionState,
    /// Variable store as the session left it
    pub variables: VariableStore,
    /// How many times per-call resources were released (always 1)
    pub cleanup_count: u32,
}

/// Per-call services lent to steps
pub(crate) struct CallServices<C> {
    pub call: C,
    pub timers: TimerManager,
    pub variables: VariableStore,
    pub temp_files: TempFileManager,
    pub prompts: PromptQueue,
}

impl<C: CallControl> CallServices<C> {
    pub fn context(&mut self) -> StepContext<'_> {
        StepContext {
            timers: &mut self.timers,
            variables: &mut self.variables,
            temp_files: &mut self.temp_files,
            prompts: &mut self.prompts,
            call: &self.call,
        }
    }
}

pub struct CallflowRuntime<C: CallControl + 'static> {
    call_id: String,
    state: SessionState,
    flows: Flows,
    services: CallServices<C>,
    event_rx: mpsc::UnboundedReceiver<Event>,
    cleanup_count: u32,
}

impl<C: CallControl + 'static> CallflowRuntime<C> {
    pub(crate) fn new(
        call_id: String,
        flows: Flows,
        services: CallServices<C>,
        event_rx: mpsc::UnboundedReceiver<Event>,
    ) -> Self {
        Self {
            call_id,
            state: SessionState::new(),
            flows,
            services,
            event_rx,
            cleanup_count: 0,
        }
    }

    pub async fn run(self) -> SessionSummary {
        let span = tracing::info_span!("callflow", call_id = %self.call_id);
        self.run_loop().instrument(span).await
    }

    async fn run_loop(mut self) -> SessionSummary {
        tracing::info!("Starting callflow runtime");

        // One event at a time, in arrival order
        while !self.state.finished {
            let Some(event) = self.event_rx.recv().await else {
                tracing::warn!("Event queue closed before the callflow finished");
                break;
            };
            self.process_event(event).await;
        }

        let mut dropped = 0;
        while self.event_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(dropped, "Dropped events queued after finish");
        }

        self.services.timers.cancel_all();
        if self.cleanup_count == 0 {
            self.release_resources();
        }

        tracing::info!(flow = %self.state.flow, "Callflow runtime stopped");
        SessionSummary {
            call_id: self.call_id,
            state: self.state,
            variables: std::mem::take(&mut self.services.variables),
            cleanup_count: self.cleanup_count,
        }
    }

    async fn process_event(&mut self, event: Event) {
        if self.state.finished {
            tracing::trace!(event = event.name(), "Dropping event after finish");
            return;
        }
        tracing::trace!(event = event.name(), "Processing event");

        match event {
            Event::Start => {
                let result = on_start(&self.state);
                self.apply_and_drive(result).await;
            }
            Event::DigitReceived(digit) => self.handle_signal(Signal::Digit(digit)).await,
            Event::PromptPlayed => {
                let next = self
                    .services
                    .prompts
                    .notify_play_finished(&self.services.call)
                    .await;
                if let Err(e) = next {
                    self.fail("prompt_queue", &StepError::from(e)).await;
                    return;
                }
                self.handle_signal(Signal::PromptPlayed).await;
            }
            Event::TransferFailed => self.handle_signal(Signal::TransferFailed).await,
            Event::CallResultReceived(success) => {
                self.handle_signal(Signal::CallResult(success)).await;
            }
            Event::TimedOut { timer, state } => {
                if !self.services.timers.take_fired(timer) {
                    tracing::debug!(%timer, "Dropping stale timeout");
                    return;
                }
                self.handle_signal(Signal::Timeout(state)).await;
            }
            Event::CallTerminated => self.handle_call_terminated().await,
        }
    }

    /// Route an asynchronous signal to the focused step
    async fn handle_signal(&mut self, signal: Signal) {
        if !self.state.started {
            tracing::debug!(?signal, "Dropping signal received before start");
            return;
        }

        let flow = self.state.flow;
        let flow_len = self.flows.get(flow).len();
        let disconnect_len = self.flows.disconnect_handler.len();
        let Some(step) = self.flows.get_mut(flow).step_mut(self.state.position) else {
            tracing::warn!(%flow, position = self.state.position, "No step in focus");
            return;
        };

        let name = step.name().to_string();
        tracing::debug!(step = %name, ?signal, "Signal for step");
        let mut ctx = self.services.context();
        let outcome = step.deliver(&mut ctx, signal).await;
        match outcome {
            Ok(outcome) => {
                let result = after_signal(&self.state, flow_len, disconnect_len, outcome);
                self.apply_and_drive(result).await;
            }
            Err(e) => self.fail(&name, &e).await,
        }
    }

    async fn handle_call_terminated(&mut self) {
        if self.state.in_disconnect_flow() || self.state.disconnect_pending {
            tracing::debug!("Ignoring duplicate call termination");
            return;
        }
        tracing::info!(flow = %self.state.flow, "Call terminated");

        let disconnect_len = self.flows.disconnect_handler.len();
        let error_len = self.flows.error_handler.len();
        let result = if self.state.started {
            let flow = self.state.flow;
            match self.flows.get_mut(flow).step_mut(self.state.position) {
                Some(step) => {
                    let name = step.name().to_string();
                    let mut ctx = self.services.context();
                    let outcome = step.deliver(&mut ctx, Signal::CallTerminated).await;
                    match outcome {
                        Ok(outcome) => on_call_terminated(&self.state, disconnect_len, outcome),
                        Err(e) => {
                            log_failure(&name, flow, &e);
                            enter_error_flow(&self.state, error_len)
                        }
                    }
                }
                None => enter_disconnect_flow(&self.state, disconnect_len),
            }
        } else {
            enter_disconnect_flow(&self.state, disconnect_len)
        };

        self.apply_and_drive(result).await;

        // Guaranteed release of per-call resources, whatever the outcome
        if self.cleanup_count == 0 {
            self.release_resources();
        }
    }

    /// Drive from the top: start focused steps until one waits or the
    /// session ends
    async fn drive_flow(&mut self) {
        loop {
            if self.state.finished {
                return;
            }

            let flow = self.state.flow;
            let flow_len = self.flows.get(flow).len();
            let error_len = self.flows.error_handler.len();
            let position = self.state.position;
            let Some(step) = self.flows.get_mut(flow).step_mut(position) else {
                tracing::warn!(%flow, position, "No step to start");
                return;
            };

            let name = step.name().to_string();
            tracing::debug!(step = %name, %flow, position, "Start executing step");
            let mut ctx = self.services.context();
            let outcome = step.start(&mut ctx).await;
            let result = match outcome {
                Ok(outcome) => check_outcome(&self.state, flow_len, outcome),
                Err(e) => {
                    log_failure(&name, flow, &e);
                    enter_error_flow(&self.state, error_len)
                }
            };

            let keep_driving = result.verdict == Outcome::Continue || result.drives_flow();
            self.apply(result).await;
            if !keep_driving {
                return;
            }
        }
    }

    async fn fail(&mut self, step: &str, error: &StepError) {
        log_failure(step, self.state.flow, error);
        let result = enter_error_flow(&self.state, self.flows.error_handler.len());
        self.apply_and_drive(result).await;
    }

    async fn apply_and_drive(&mut self, result: TransitionResult) {
        if self.apply(result).await {
            self.drive_flow().await;
        }
    }

    /// Commit a transition and execute its effects. Returns whether the
    /// focused flow must be driven.
    async fn apply(&mut self, result: TransitionResult) -> bool {
        self.state = result.new_state;
        let mut drive = false;

        for effect in result.effects {
            match effect {
                Effect::CancelTimers => self.services.timers.cancel_all(),
                Effect::DriveFlow => drive = true,
                Effect::EnterFlow { flow } => {
                    tracing::info!(%flow, "Entering flow");
                }
                Effect::EndCallflow { terminate_call } => {
                    self.end_callflow(terminate_call).await;
                }
            }
        }
        drive
    }

    async fn end_callflow(&mut self, terminate_call: bool) {
        if terminate_call {
            tracing::info!("Terminating call");
            if let Err(e) = self.services.call.terminate().await {
                tracing::warn!(error = %e, "Failed to terminate call");
            }
        }
        tracing::info!(flow = %self.state.flow, "Callflow finished");
    }

    fn release_resources(&mut self) {
        self.cleanup_count += 1;
        self.services.prompts.clear();
        let removed = self.services.temp_files.delete_files_and_folders();
        tracing::debug!(removed, "Per-call resources released");
    }
}

fn log_failure(step: &str, flow: FlowKind, error: &StepError) {
    match flow {
        FlowKind::Main => {
            tracing::error!(step, %flow, error = %error, "Step failed, entering error handler flow");
        }
        FlowKind::ErrorHandler => {
            tracing::error!(step, %flow, error = %error, "Step failed inside error handler flow");
        }
        FlowKind::DisconnectHandler => {
            tracing::error!(step, %flow, error = %error, "Step failed inside disconnect handler flow");
        }
    }
}
