//! Turns a definition into runnable flows

use super::{CallflowDefinition, FlowError, Flows, StepDefinition};
use crate::steps::{
    AssignVariable, Branch, Conditional, DisconnectCall, Exit, IncrementVariable, Logger, Loop,
    MakeCall, Menu, PromptPlayback, Sequence, Step, Transfer, UserInput, WebInteraction,
};
use std::time::Duration;

pub const MAIN_FINAL_DISCONNECT: &str = "mainAutoAddedFinalDisconnectCall";
pub const ERROR_FINAL_DISCONNECT: &str = "errorHandlerAutoAddedFinalDisconnectCall";

pub struct FlowBuilder {
    client: reqwest::Client,
    http_timeout: Duration,
}

impl FlowBuilder {
    pub fn new(http_timeout: Duration) -> Result<Self, FlowError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            http_timeout,
        })
    }

    /// Build all three flows.
    ///
    /// Main and error-handler flows get a final `DisconnectCall` step so
    /// pending prompt playback finishes before the call drops.
    pub fn build(&self, definition: &CallflowDefinition) -> Flows {
        let mut main = self.build_steps(&definition.main);
        main.push(Box::new(DisconnectCall::new(MAIN_FINAL_DISCONNECT)));

        let mut error_handler = self.build_steps(&definition.error_handler);
        error_handler.push(Box::new(DisconnectCall::new(ERROR_FINAL_DISCONNECT)));

        let disconnect_handler = self.build_steps(&definition.disconnect_handler);

        tracing::debug!(
            callflow = %definition.name,
            main = main.len(),
            error_handler = error_handler.len(),
            disconnect_handler = disconnect_handler.len(),
            "Flows built"
        );
        Flows::new(main, error_handler, disconnect_handler)
    }

    fn build_steps(&self, definitions: &[StepDefinition]) -> Vec<Box<dyn Step>> {
        definitions.iter().map(|d| self.build_step(d)).collect()
    }

    fn build_step(&self, definition: &StepDefinition) -> Box<dyn Step> {
        match definition {
            StepDefinition::PromptPlayback(s) => Box::new(PromptPlayback::new(s.clone())),
            StepDefinition::UserInput(s) => Box::new(UserInput::new(s.clone())),
            StepDefinition::Menu(s) => Box::new(Menu::new(s.clone())),
            StepDefinition::AssignVariable(s) => Box::new(AssignVariable::new(s.clone())),
            StepDefinition::IncrementVariable(s) => Box::new(IncrementVariable::new(s.clone())),
            StepDefinition::Logger(s) => Box::new(Logger::new(s.clone())),
            StepDefinition::WebInteraction(s) => Box::new(WebInteraction::new(
                s.clone(),
                self.client.clone(),
                self.http_timeout,
            )),
            StepDefinition::Transfer(s) => Box::new(Transfer::new(s.clone())),
            StepDefinition::MakeCall(s) => Box::new(MakeCall::new(s.clone())),
            StepDefinition::Exit { name } => Box::new(Exit::new(name.clone())),
            StepDefinition::DisconnectCall { name } => Box::new(DisconnectCall::new(name.clone())),
            StepDefinition::Sequence { name, steps } => {
                Box::new(Sequence::new(name.clone(), self.build_steps(steps)))
            }
            StepDefinition::Conditional { name, branches } => {
                let branches = branches
                    .iter()
                    .enumerate()
                    .map(|(index, branch)| Branch {
                        condition: branch.condition.clone(),
                        body: Sequence::new(
                            format!("{name}_branch{index}"),
                            self.build_steps(&branch.steps),
                        ),
                    })
                    .collect();
                Box::new(Conditional::new(name.clone(), branches))
            }
            StepDefinition::Loop {
                name,
                condition,
                steps,
            } => Box::new(Loop::new(
                name.clone(),
                condition.clone(),
                Sequence::new(format!("{name}_Container"), self.build_steps(steps)),
            )),
        }
    }
}
