//! Commit handlers and the pass that drains every dirty view into the store.

use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture};

use crate::dirty::{DirtyMark, DirtyTracker};
use crate::document::Document;
use crate::error::{CommitError, ScenarioError};
use crate::store::DocumentStore;
use crate::views::ViewRegistry;

/// Flushes one view's buffered edits into the store.
///
/// Implementations receive their own store handle so the returned future
/// borrows nothing from the caller.
pub trait CommitHandler {
    fn commit(&self, store: DocumentStore) -> LocalBoxFuture<'static, Result<(), CommitError>>;
}

/// Adapter turning an async closure into a [`CommitHandler`].
pub struct FnHandler<F>(F);

/// Wraps `f` as a commit handler.
pub fn commit_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(DocumentStore) -> Fut,
    Fut: Future<Output = Result<(), CommitError>> + 'static,
{
    FnHandler(f)
}

impl<F, Fut> CommitHandler for FnHandler<F>
where
    F: Fn(DocumentStore) -> Fut,
    Fut: Future<Output = Result<(), CommitError>> + 'static,
{
    fn commit(&self, store: DocumentStore) -> LocalBoxFuture<'static, Result<(), CommitError>> {
        (self.0)(store).boxed_local()
    }
}

/// Summary of a successful commit pass.
#[derive(Debug, Clone)]
pub struct CommitReport {
    /// Snapshot after the last handler ran. `None` if nothing is active.
    pub document: Option<Arc<Document>>,
    /// Views whose handler ran, in order.
    pub committed: Vec<String>,
    /// Dirty views that had no handler.
    pub skipped: Vec<String>,
}

impl CommitReport {
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.skipped.is_empty()
    }
}

/// Runs the commit handlers of dirty views in a fixed order.
#[derive(Clone)]
pub struct CommitCoordinator {
    store: DocumentStore,
    views: ViewRegistry,
    dirty: DirtyTracker,
    running: Rc<Cell<bool>>,
}

struct RunningGuard(Rc<Cell<bool>>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl CommitCoordinator {
    pub fn new(store: DocumentStore, views: ViewRegistry, dirty: DirtyTracker) -> Self {
        Self {
            store,
            views,
            dirty,
            running: Rc::new(Cell::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// The views the next pass would visit, in visiting order.
    pub fn pending(&self) -> Vec<String> {
        self.capture().into_iter().map(|m| m.view_id).collect()
    }

    /// Commits every dirty view.
    ///
    /// Registered views run in registration order, followed by dirty ids
    /// with no handler, which are skipped. The first failing handler aborts
    /// the pass: views committed before it are clean, it and the rest stay
    /// dirty. A view marked dirty again while the pass runs stays dirty.
    pub async fn submit_all_forms(&self) -> Result<CommitReport, ScenarioError> {
        if self.running.replace(true) {
            return Err(ScenarioError::CommitInProgress);
        }
        let _guard = RunningGuard(Rc::clone(&self.running));

        let pass = self.capture();
        let mut report = CommitReport {
            document: None,
            committed: Vec::new(),
            skipped: Vec::new(),
        };
        if pass.is_empty() {
            report.document = self.store.snapshot();
            return Ok(report);
        }

        tracing::info!(views = pass.len(), "starting commit pass");
        let mut skipped_marks = Vec::new();

        for mark in pass {
            let Some(handler) = self.views.get(&mark.view_id) else {
                tracing::warn!(view_id = %mark.view_id, "dirty view has no commit handler, skipping");
                report.skipped.push(mark.view_id.clone());
                skipped_marks.push(mark);
                continue;
            };

            tracing::debug!(view_id = %mark.view_id, "committing view");
            if let Err(source) = handler.commit(self.store.clone()).await {
                tracing::error!(view_id = %mark.view_id, error = %source, "view commit failed");
                return Err(ScenarioError::CommitFailure {
                    view_id: mark.view_id,
                    committed: report.committed,
                    source,
                });
            }
            self.dirty.clear_if_unchanged(&mark);
            report.committed.push(mark.view_id);
        }

        for mark in &skipped_marks {
            self.dirty.clear_if_unchanged(mark);
        }

        tracing::info!(
            committed = report.committed.len(),
            skipped = report.skipped.len(),
            "commit pass finished"
        );
        report.document = self.store.snapshot();
        Ok(report)
    }

    fn capture(&self) -> Vec<DirtyMark> {
        let mut marks = self.dirty.marks();
        let mut ordered = Vec::with_capacity(marks.len());
        for id in self.views.ids() {
            if let Some(i) = marks.iter().position(|m| m.view_id == id) {
                ordered.push(marks.remove(i));
            }
        }
        ordered.extend(marks);
        ordered
    }
}
