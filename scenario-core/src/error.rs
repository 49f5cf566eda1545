//! Error types for the scenario core.

use thiserror::Error;

/// Errors returned by every public store and session operation.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// No scenario has been initialized or loaded yet.
    #[error("No active scenario. Initialize or load one first.")]
    NoActiveDocument,

    /// `update` was called on a scenario that was never persisted.
    #[error("Scenario has never been saved, there is nothing to update")]
    NoIdentity,

    /// A view's commit handler failed during a commit pass.
    #[error("View '{view_id}' failed to commit: {source}")]
    CommitFailure {
        view_id: String,
        /// Views that committed before the failure, in commit order.
        committed: Vec<String>,
        #[source]
        source: CommitError,
    },

    /// The remote adapter answered with `success: false`.
    #[error("Remote request failed: {message}")]
    RemoteFailure {
        status: Option<u16>,
        message: String,
    },

    /// A save or update is already waiting on the remote.
    #[error("A save is already in progress")]
    SaveInProgress,

    /// A commit pass is already draining dirty views.
    #[error("A commit pass is already running")]
    CommitInProgress,

    /// The view id collides with the dirty tracker's sentinel.
    #[error("View id '{0}' is reserved")]
    ReservedViewId(String),

    /// `run_simulation` was called without a simulation service.
    #[error("No simulation service configured")]
    SimulationUnavailable,

    #[error(transparent)]
    Path(#[from] PathError),
}

impl ScenarioError {
    /// HTTP-ish status attached to a remote failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ScenarioError::RemoteFailure { status, .. } => *status,
            _ => None,
        }
    }
}

/// Misuse of a path against the shape of the document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Malformed path '{0}'")]
    Malformed(String),

    #[error("Cannot descend into a scalar value at '{at}'")]
    NotAContainer { at: String },

    #[error("Index {index} is out of bounds at '{at}' (length {len})")]
    IndexOutOfBounds { at: String, index: usize, len: usize },

    #[error("Key '{key}' cannot address the array at '{at}'")]
    KeyOnArray { at: String, key: String },
}

/// Failure raised by a single view while committing its buffered edits.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommitError {
    /// The document was replaced after the view opened its buffer.
    #[error("View '{view_id}' holds edits for a scenario that is no longer active")]
    StaleView { view_id: String },

    #[error("No active scenario")]
    NoActiveDocument,

    #[error(transparent)]
    Path(#[from] PathError),

    /// Any other refusal reported by a custom commit handler.
    #[error("{0}")]
    Rejected(String),
}

impl From<ScenarioError> for CommitError {
    fn from(e: ScenarioError) -> Self {
        match e {
            ScenarioError::NoActiveDocument => CommitError::NoActiveDocument,
            ScenarioError::Path(e) => CommitError::Path(e),
            other => CommitError::Rejected(other.to_string()),
        }
    }
}

/// Field-level validation failure, kept on the view that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{path}: {message}")]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}
