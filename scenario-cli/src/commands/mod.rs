mod config_cmd;
mod delete;
mod edit;
mod list;
mod new;
mod show;
mod simulate;

pub use config_cmd::ConfigCommand;
pub use delete::DeleteCommand;
pub use edit::EditCommand;
pub use list::ListCommand;
pub use new::NewCommand;
pub use show::ShowCommand;
pub use simulate::SimulateCommand;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use scenario_core::{ScenarioError, ValidationError};

use crate::edits::EditError;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn format_timestamp(timestamp: Option<DateTime<Utc>>) -> String {
    match timestamp {
        Some(t) => t.format("%Y-%m-%d %H:%M").to_string(),
        None => "-".to_string(),
    }
}

/// Errors from scenario commands
#[derive(Debug)]
pub enum CommandError {
    Scenario(ScenarioError),
    Edit(EditError),
    Validation(ValidationError),
    Io(std::io::Error),
    Json(serde_json::Error),
    RuntimeError(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Scenario(e) => write!(f, "{}", e),
            CommandError::Edit(e) => write!(f, "{}", e),
            CommandError::Validation(e) => write!(f, "Invalid value: {}", e),
            CommandError::Io(e) => write!(f, "IO error: {}", e),
            CommandError::Json(e) => write!(f, "JSON error: {}", e),
            CommandError::RuntimeError(e) => write!(f, "Runtime error: {}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Scenario(e) => Some(e),
            CommandError::Edit(e) => Some(e),
            CommandError::Validation(e) => Some(e),
            CommandError::Io(e) => Some(e),
            CommandError::Json(e) => Some(e),
            CommandError::RuntimeError(_) => None,
        }
    }
}

impl From<ScenarioError> for CommandError {
    fn from(e: ScenarioError) -> Self {
        CommandError::Scenario(e)
    }
}

impl From<EditError> for CommandError {
    fn from(e: EditError) -> Self {
        CommandError::Edit(e)
    }
}

impl From<ValidationError> for CommandError {
    fn from(e: ValidationError) -> Self {
        CommandError::Validation(e)
    }
}

impl From<std::io::Error> for CommandError {
    fn from(e: std::io::Error) -> Self {
        CommandError::Io(e)
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(e: serde_json::Error) -> Self {
        CommandError::Json(e)
    }
}
