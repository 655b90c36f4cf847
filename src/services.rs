//! Per-call services handed to steps
//!
//! Each session owns one instance of every service; nothing here is shared
//! between calls.

mod prompts;
mod temp_files;
mod timers;
mod variables;

pub use prompts::PromptQueue;
pub use temp_files::TempFileManager;
pub use timers::{TimerId, TimerManager, TimerState};
pub use variables::{value_is_truthy, value_to_number, value_to_text, VariableStore};
