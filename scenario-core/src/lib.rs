//! Scenario Studio Core Library
//!
//! State synchronization for scenario editing: a path-addressable document
//! store, array sections, buffered views with dirty tracking, an ordered
//! commit pass and the save/load protocol against a remote adapter.

pub mod array;
pub mod commit;
pub mod defaults;
pub mod dirty;
pub mod document;
pub mod error;
pub mod form;
pub mod node;
pub mod path;
pub mod remote;
pub mod session;
pub mod simulation;
pub mod store;
pub mod views;

pub use array::{ArrayOp, ArrayOutcome, ArraySection, BatchOp, BatchReport};
pub use commit::{commit_fn, CommitCoordinator, CommitHandler, CommitReport};
pub use defaults::{BuiltinDefaults, DefaultsProvider, DEFAULT_VARIANT};
pub use dirty::{DirtyTracker, ALL_VIEWS};
pub use document::{Document, DocumentMeta, MetadataOverride, SimulationKind};
pub use error::{CommitError, PathError, ScenarioError, ValidationError};
pub use form::{ArrayFormView, FormView};
pub use node::{Node, Object};
pub use path::{Path, PathSegment};
pub use remote::{
    Envelope, FileRemote, HttpRemote, MemoryRemote, PersistedScenario, RemoteSyncAdapter,
    ScenarioList, ScenarioSummary,
};
pub use session::{DeleteOutcome, SaveReceipt, ScenarioSession};
pub use simulation::{
    DistributionSpec, PercentileSeries, RunConfig, SimulationRequest, SimulationResponse,
    SimulationService,
};
pub use store::DocumentStore;
pub use views::{Registration, ViewRegistry};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
