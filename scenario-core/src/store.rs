//! The document store: owner of the single active scenario.
//!
//! # Snapshots
//!
//! The active document is held as an `Arc<Document>`. Every mutation builds
//! a new document from the previous one (see [`Node::set_path`]) and swaps
//! the `Arc`, so any snapshot handed out earlier stays a frozen,
//! consistent view.
//!
//! # Counters
//!
//! - `revision` grows by one for each mutation, install or clear. Observers
//!   can follow it through [`DocumentStore::subscribe`].
//! - `epoch` grows by one each time a whole document is installed. Buffered
//!   views compare it to detect that their edits target a replaced document.
//!
//! The store is a cheap handle over single-threaded shared state. No borrow
//! is ever held across an `.await`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tokio::sync::watch;

use crate::array::{self, ArrayOp, ArrayOutcome};
use crate::document::{Document, DocumentMeta, SimulationKind};
use crate::error::ScenarioError;
use crate::node::Node;
use crate::path::Path;

/// Shared handle to the active scenario document.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Rc<StoreInner>,
}

struct StoreInner {
    state: RefCell<StoreState>,
    revisions: watch::Sender<u64>,
}

#[derive(Default)]
struct StoreState {
    active: Option<Arc<Document>>,
    revision: u64,
    epoch: u64,
}

impl DocumentStore {
    /// Creates an empty store with no active document.
    pub fn new() -> Self {
        let (revisions, _) = watch::channel(0);
        Self {
            inner: Rc::new(StoreInner {
                state: RefCell::new(StoreState::default()),
                revisions,
            }),
        }
    }

    /// Returns true if a document is active.
    pub fn is_active(&self) -> bool {
        self.inner.state.borrow().active.is_some()
    }

    /// Returns the current snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<Document>> {
        self.inner.state.borrow().active.clone()
    }

    /// Returns the current snapshot or `NoActiveDocument`.
    pub fn require(&self) -> Result<Arc<Document>, ScenarioError> {
        self.snapshot().ok_or(ScenarioError::NoActiveDocument)
    }

    pub fn revision(&self) -> u64 {
        self.inner.state.borrow().revision
    }

    pub fn epoch(&self) -> u64 {
        self.inner.state.borrow().epoch
    }

    /// Receiver that observes the revision after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revisions.subscribe()
    }

    /// Replaces the active document wholesale.
    pub fn install(&self, document: Document) -> Arc<Document> {
        let document = Arc::new(document);
        let revision = {
            let mut state = self.inner.state.borrow_mut();
            state.active = Some(Arc::clone(&document));
            state.epoch += 1;
            state.revision += 1;
            state.revision
        };
        tracing::debug!(revision, id = ?document.id(), "installed scenario document");
        self.inner.revisions.send_replace(revision);
        document
    }

    /// Drops the active document.
    pub fn clear(&self) {
        let revision = {
            let mut state = self.inner.state.borrow_mut();
            if state.active.take().is_none() {
                return;
            }
            state.epoch += 1;
            state.revision += 1;
            state.revision
        };
        tracing::debug!(revision, "cleared scenario document");
        self.inner.revisions.send_replace(revision);
    }

    /// Reads the node at `path` under `settings`.
    ///
    /// Never fails: returns `default` when any segment is absent or when no
    /// document is active.
    pub fn get_by_path(&self, path: &Path, default: Node) -> Node {
        self.get(path).unwrap_or(default)
    }

    /// Reads the node at `path` under `settings`, if present.
    pub fn get(&self, path: &Path) -> Option<Node> {
        let state = self.inner.state.borrow();
        state
            .active
            .as_ref()
            .and_then(|doc| doc.settings.get_path(path).cloned())
    }

    /// Stores `value` at `path` under `settings`.
    ///
    /// Ancestors are copied and siblings shared. Missing intermediate
    /// containers are created as empty objects so that a view can write into
    /// a section the defaults did not provide.
    pub fn set_by_path(
        &self,
        path: &Path,
        value: impl Into<Node>,
    ) -> Result<Arc<Document>, ScenarioError> {
        let current = self.require()?;
        let settings = current.settings.set_path(path, value.into())?;
        tracing::debug!(%path, "set_by_path");
        Ok(self.replace(Document {
            meta: current.meta.clone(),
            settings,
            simulation: current.simulation.clone(),
        }))
    }

    /// Applies one array operation at `path` under `settings`.
    ///
    /// A missing match or a non-array target is reported in the outcome and
    /// leaves the document untouched.
    pub fn array_op(&self, path: &Path, op: ArrayOp) -> Result<ArrayOutcome, ScenarioError> {
        let current = self.require()?;
        let array = match array::apply(current.settings.get_path(path), op) {
            Ok(array) => array,
            Err(rejected) => {
                tracing::debug!(%path, ?rejected, "array_op left document unchanged");
                return Ok(rejected);
            }
        };
        let settings = current.settings.set_path(path, array)?;
        tracing::debug!(%path, "array_op applied");
        self.replace(Document {
            meta: current.meta.clone(),
            settings,
            simulation: current.simulation.clone(),
        });
        Ok(ArrayOutcome::Applied)
    }

    /// Edits the metadata envelope in one mutation.
    pub fn merge_meta<F>(&self, edit: F) -> Result<Arc<Document>, ScenarioError>
    where
        F: FnOnce(&mut DocumentMeta),
    {
        let current = self.require()?;
        let mut meta = current.meta.clone();
        edit(&mut meta);
        Ok(self.replace(Document {
            meta,
            settings: current.settings.clone(),
            simulation: current.simulation.clone(),
        }))
    }

    /// Routes keyed simulation results into the simulation section as a
    /// single mutation.
    pub fn set_simulation<I>(
        &self,
        kind: SimulationKind,
        results: I,
    ) -> Result<Arc<Document>, ScenarioError>
    where
        I: IntoIterator<Item = (String, Node)>,
    {
        let current = self.require()?;
        let mut simulation = current.simulation.clone();
        for (distribution_id, result) in results {
            simulation = simulation.set_path(&kind.result_path(&distribution_id), result)?;
        }
        Ok(self.replace(Document {
            meta: current.meta.clone(),
            settings: current.settings.clone(),
            simulation,
        }))
    }

    /// Swaps in `next` as the active document within the same epoch.
    fn replace(&self, next: Document) -> Arc<Document> {
        let next = Arc::new(next);
        let revision = {
            let mut state = self.inner.state.borrow_mut();
            state.active = Some(Arc::clone(&next));
            state.revision += 1;
            state.revision
        };
        self.inner.revisions.send_replace(revision);
        next
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("DocumentStore")
            .field("active", &state.active.as_ref().map(|d| d.id().map(str::to_string)))
            .field("revision", &state.revision)
            .field("epoch", &state.epoch)
            .finish()
    }
}
