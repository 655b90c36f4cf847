//! Callflow definition format
//!
//! Definitions are produced by the external flow designer as JSON:
//!
//! ```json
//! {
//!   "name": "sudigovt",
//!   "variables": { "callflow$.nloop": 0 },
//!   "main": [ { "type": "prompt_playback", "name": "welcome", "prompts": ["welcome.wav"] } ],
//!   "error_handler": [],
//!   "disconnect_handler": []
//! }
//! ```

use super::{Expr, FlowError};
use crate::steps::{
    AssignVariableSettings, IncrementVariableSettings, LoggerSettings, MakeCallSettings,
    MenuSettings, PromptPlaybackSettings, TransferSettings, UserInputSettings,
    WebInteractionSettings,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallflowDefinition {
    /// Project name; also names the audio folder
    pub name: String,
    /// User variables and their initial values
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub main: Vec<StepDefinition>,
    #[serde(default)]
    pub error_handler: Vec<StepDefinition>,
    #[serde(default)]
    pub disconnect_handler: Vec<StepDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepDefinition {
    PromptPlayback(PromptPlaybackSettings),
    UserInput(UserInputSettings),
    Menu(MenuSettings),
    AssignVariable(AssignVariableSettings),
    IncrementVariable(IncrementVariableSettings),
    Logger(LoggerSettings),
    WebInteraction(WebInteractionSettings),
    Transfer(TransferSettings),
    MakeCall(MakeCallSettings),
    Exit {
        name: String,
    },
    DisconnectCall {
        name: String,
    },
    Sequence {
        name: String,
        #[serde(default)]
        steps: Vec<StepDefinition>,
    },
    Conditional {
        name: String,
        branches: Vec<BranchDefinition>,
    },
    Loop {
        name: String,
        condition: Expr,
        #[serde(default)]
        steps: Vec<StepDefinition>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchDefinition {
    pub condition: Expr,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl StepDefinition {
    pub fn name(&self) -> &str {
        match self {
            StepDefinition::PromptPlayback(s) => &s.name,
            StepDefinition::UserInput(s) => &s.name,
            StepDefinition::Menu(s) => &s.name,
            StepDefinition::AssignVariable(s) => &s.name,
            StepDefinition::IncrementVariable(s) => &s.name,
            StepDefinition::Logger(s) => &s.name,
            StepDefinition::WebInteraction(s) => &s.name,
            StepDefinition::Transfer(s) => &s.name,
            StepDefinition::MakeCall(s) => &s.name,
            StepDefinition::Exit { name }
            | StepDefinition::DisconnectCall { name }
            | StepDefinition::Sequence { name, .. }
            | StepDefinition::Conditional { name, .. }
            | StepDefinition::Loop { name, .. } => name,
        }
    }

    /// Nested step lists of container steps
    fn children(&self) -> Vec<&[StepDefinition]> {
        match self {
            StepDefinition::Sequence { steps, .. } | StepDefinition::Loop { steps, .. } => {
                vec![steps.as_slice()]
            }
            StepDefinition::Conditional { branches, .. } => {
                branches.iter().map(|b| b.steps.as_slice()).collect()
            }
            _ => vec![],
        }
    }
}

impl CallflowDefinition {
    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        let definition: Self = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn load(path: &Path) -> Result<Self, FlowError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Step names publish results into the variable store, so they must be
    /// unique across all three flows
    pub fn validate(&self) -> Result<(), FlowError> {
        let mut seen = HashSet::new();
        let mut pending: Vec<&StepDefinition> = self
            .main
            .iter()
            .chain(&self.error_handler)
            .chain(&self.disconnect_handler)
            .collect();

        while let Some(step) = pending.pop() {
            let name = step.name();
            if name.trim().is_empty() {
                return Err(FlowError::EmptyStepName);
            }
            if !seen.insert(name) {
                return Err(FlowError::DuplicateStepName(name.to_string()));
            }
            for children in step.children() {
                pending.extend(children);
            }
        }
        Ok(())
    }
}
