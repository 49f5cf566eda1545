//! Buffered editors bound to a part of the document.
//!
//! A view collects edits locally and only writes them to the store when the
//! commit coordinator runs its handler. Every view remembers the store epoch
//! at the moment its buffer was opened; if a different document has been
//! loaded since, the commit fails with [`CommitError::StaleView`] instead of
//! writing old edits over the new document.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use futures::future::{self, FutureExt, LocalBoxFuture};
use indexmap::IndexMap;

use crate::array::{self, ArrayOutcome, ArraySection, BatchOp, BatchReport};
use crate::commit::CommitHandler;
use crate::dirty::DirtyTracker;
use crate::error::{CommitError, ScenarioError, ValidationError};
use crate::node::{Node, Object};
use crate::path::Path;
use crate::store::DocumentStore;
use crate::views::{Registration, ViewRegistry};

/// Field rule: `Err(message)` rejects the value.
pub type Validator = Rc<dyn Fn(&Node) -> Result<(), String>>;

/// A mounted view's handle on the registry and tracker.
struct Mount {
    registration: Registration,
    dirty: DirtyTracker,
}

/// Something whose buffer can be flushed into the store.
trait Flush {
    fn flush(&self) -> Result<(), CommitError>;
}

/// Commit handler that holds its view weakly so a dropped view commits
/// nothing.
struct FlushHandler<T>(Weak<T>);

impl<T: Flush + 'static> CommitHandler for FlushHandler<T> {
    fn commit(&self, _store: DocumentStore) -> LocalBoxFuture<'static, Result<(), CommitError>> {
        let result = match self.0.upgrade() {
            Some(view) => view.flush(),
            None => Ok(()),
        };
        future::ready(result).boxed_local()
    }
}

fn mount<T: Flush + 'static>(
    view_id: &str,
    inner: &Rc<T>,
    mounted: &RefCell<Option<Mount>>,
    has_buffer: bool,
    registry: &ViewRegistry,
    tracker: &DirtyTracker,
) -> Result<(), ScenarioError> {
    if mounted.borrow().is_some() {
        return Ok(());
    }
    let handler: Rc<dyn CommitHandler> = Rc::new(FlushHandler(Rc::downgrade(inner)));
    let registration = registry.register(view_id, handler)?;
    if has_buffer {
        tracker.mark_dirty(view_id);
    }
    *mounted.borrow_mut() = Some(Mount {
        registration,
        dirty: tracker.clone(),
    });
    Ok(())
}

fn unmount(view_id: &str, mounted: &RefCell<Option<Mount>>) {
    let Some(m) = mounted.borrow_mut().take() else {
        return;
    };
    // A stale mount must not drop the flag of whoever remounted the id.
    if m.registration.unregister() {
        m.dirty.forget(view_id);
    }
}

fn set_dirty(view_id: &str, mounted: &RefCell<Option<Mount>>, dirty: bool) {
    if let Some(m) = mounted.borrow().as_ref() {
        m.dirty.set_dirty(view_id, dirty);
    }
}

#[derive(Default)]
struct FormState {
    fields: IndexMap<Path, Node>,
    validators: HashMap<Path, Validator>,
    errors: IndexMap<Path, ValidationError>,
    epoch: u64,
}

struct FormInner {
    view_id: String,
    base: Path,
    store: DocumentStore,
    state: RefCell<FormState>,
    mounted: RefCell<Option<Mount>>,
}

/// Buffered editor for the fields under one base path.
#[derive(Clone)]
pub struct FormView {
    inner: Rc<FormInner>,
}

impl FormView {
    pub fn new(view_id: impl Into<String>, base: Path, store: DocumentStore) -> Self {
        Self {
            inner: Rc::new(FormInner {
                view_id: view_id.into(),
                base,
                store,
                state: RefCell::new(FormState::default()),
                mounted: RefCell::new(None),
            }),
        }
    }

    pub fn view_id(&self) -> &str {
        &self.inner.view_id
    }

    pub fn base(&self) -> &Path {
        &self.inner.base
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.borrow().is_some()
    }

    /// Registers the commit handler. Repeated calls are no-ops.
    pub fn on_mount(
        &self,
        registry: &ViewRegistry,
        tracker: &DirtyTracker,
    ) -> Result<(), ScenarioError> {
        let has_buffer = !self.inner.state.borrow().fields.is_empty();
        mount(
            &self.inner.view_id,
            &self.inner,
            &self.inner.mounted,
            has_buffer,
            registry,
            tracker,
        )
    }

    /// Unregisters the handler and clears the view's dirty flag. Buffered
    /// edits are kept until [`resync`](Self::resync).
    pub fn on_unmount(&self) {
        unmount(&self.inner.view_id, &self.inner.mounted);
    }

    /// Attaches a validation rule to the field at `field`.
    pub fn validate_with<F>(&self, field: Path, rule: F)
    where
        F: Fn(&Node) -> Result<(), String> + 'static,
    {
        self.inner
            .state
            .borrow_mut()
            .validators
            .insert(field, Rc::new(rule));
    }

    /// Buffers `value` for `field` and marks the view dirty.
    ///
    /// A value rejected by the field's validator is still buffered but held
    /// back at commit time until it is corrected.
    pub fn set_field(&self, field: Path, value: impl Into<Node>) -> Result<(), ValidationError> {
        let value = value.into();
        let result = {
            let mut state = self.inner.state.borrow_mut();
            if state.fields.is_empty() {
                state.epoch = self.inner.store.epoch();
            }

            let verdict = match state.validators.get(&field) {
                Some(rule) => rule(&value),
                None => Ok(()),
            };
            let result = match verdict {
                Ok(()) => {
                    state.errors.shift_remove(&field);
                    Ok(())
                }
                Err(message) => {
                    let error = ValidationError {
                        path: self.inner.base.join(&field).to_string(),
                        message,
                    };
                    tracing::debug!(view_id = %self.inner.view_id, %error, "field rejected");
                    state.errors.insert(field.clone(), error.clone());
                    Err(error)
                }
            };
            state.fields.insert(field, value);
            result
        };
        set_dirty(&self.inner.view_id, &self.inner.mounted, true);
        result
    }

    /// The buffered value for `field`, else the stored one.
    pub fn value(&self, field: &Path) -> Option<Node> {
        if let Some(v) = self.inner.state.borrow().fields.get(field) {
            return Some(v.clone());
        }
        self.inner.store.get(&self.inner.base.join(field))
    }

    /// Fields waiting to be committed, in edit order.
    pub fn pending_fields(&self) -> Vec<Path> {
        self.inner.state.borrow().fields.keys().cloned().collect()
    }

    pub fn errors(&self) -> Vec<ValidationError> {
        self.inner.state.borrow().errors.values().cloned().collect()
    }

    /// Drops every buffered edit and error and clears the dirty flag.
    pub fn resync(&self) {
        {
            let mut state = self.inner.state.borrow_mut();
            state.fields.clear();
            state.errors.clear();
            state.epoch = self.inner.store.epoch();
        }
        set_dirty(&self.inner.view_id, &self.inner.mounted, false);
    }
}

impl Flush for FormInner {
    fn flush(&self) -> Result<(), CommitError> {
        let held_back = {
            let mut state = self.state.borrow_mut();
            if state.fields.is_empty() {
                return Ok(());
            }
            if state.epoch != self.store.epoch() {
                return Err(CommitError::StaleView {
                    view_id: self.view_id.clone(),
                });
            }

            let ready: Vec<(Path, Node)> = state
                .fields
                .iter()
                .filter(|(field, _)| !state.errors.contains_key(*field))
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect();
            for (field, value) in ready {
                self.store.set_by_path(&self.base.join(&field), value)?;
                state.fields.shift_remove(&field);
            }
            state.fields.len()
        };

        if held_back > 0 {
            tracing::debug!(view_id = %self.view_id, held_back, "invalid fields held back");
            set_dirty(&self.view_id, &self.mounted, true);
        }
        Ok(())
    }
}

#[derive(Default)]
struct ArrayFormState {
    ops: Vec<BatchOp>,
    epoch: u64,
    last_report: Option<BatchReport>,
}

struct ArrayFormInner {
    view_id: String,
    section: ArraySection,
    store: DocumentStore,
    state: RefCell<ArrayFormState>,
    mounted: RefCell<Option<Mount>>,
}

/// Buffered editor for one array section.
#[derive(Clone)]
pub struct ArrayFormView {
    inner: Rc<ArrayFormInner>,
}

impl ArrayFormView {
    pub fn new(view_id: impl Into<String>, path: Path, store: DocumentStore) -> Self {
        Self {
            inner: Rc::new(ArrayFormInner {
                view_id: view_id.into(),
                section: ArraySection::new(store.clone(), path),
                store,
                state: RefCell::new(ArrayFormState::default()),
                mounted: RefCell::new(None),
            }),
        }
    }

    pub fn view_id(&self) -> &str {
        &self.inner.view_id
    }

    pub fn section(&self) -> &ArraySection {
        &self.inner.section
    }

    pub fn on_mount(
        &self,
        registry: &ViewRegistry,
        tracker: &DirtyTracker,
    ) -> Result<(), ScenarioError> {
        let has_buffer = !self.inner.state.borrow().ops.is_empty();
        mount(
            &self.inner.view_id,
            &self.inner,
            &self.inner.mounted,
            has_buffer,
            registry,
            tracker,
        )
    }

    pub fn on_unmount(&self) {
        unmount(&self.inner.view_id, &self.inner.mounted);
    }

    pub fn add(&self, item: impl Into<Node>) {
        self.push(BatchOp::Add(item.into()));
    }

    pub fn update(&self, id: impl Into<String>, patch: Object) {
        self.push(BatchOp::Update {
            id: id.into(),
            patch,
        });
    }

    pub fn remove(&self, id: impl Into<String>) {
        self.push(BatchOp::Remove { id: id.into() });
    }

    pub fn pending(&self) -> usize {
        self.inner.state.borrow().ops.len()
    }

    /// Stored items with the buffered operations applied.
    pub fn preview(&self) -> Vec<Node> {
        let state = self.inner.state.borrow();
        let mut working = Node::from(self.inner.section.items());
        for op in &state.ops {
            if let Ok(next) = array::apply(Some(&working), op.clone().into()) {
                working = next;
            }
        }
        working.as_array().map(<[Node]>::to_vec).unwrap_or_default()
    }

    /// Report of the last committed batch.
    pub fn last_report(&self) -> Option<BatchReport> {
        self.inner.state.borrow().last_report.clone()
    }

    pub fn resync(&self) {
        {
            let mut state = self.inner.state.borrow_mut();
            state.ops.clear();
            state.epoch = self.inner.store.epoch();
        }
        set_dirty(&self.inner.view_id, &self.inner.mounted, false);
    }

    fn push(&self, op: BatchOp) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.ops.is_empty() {
                state.epoch = self.inner.store.epoch();
            }
            state.ops.push(op);
        }
        set_dirty(&self.inner.view_id, &self.inner.mounted, true);
    }
}

impl Flush for ArrayFormInner {
    fn flush(&self) -> Result<(), CommitError> {
        let ops = {
            let mut state = self.state.borrow_mut();
            if state.ops.is_empty() {
                return Ok(());
            }
            if state.epoch != self.store.epoch() {
                return Err(CommitError::StaleView {
                    view_id: self.view_id.clone(),
                });
            }
            std::mem::take(&mut state.ops)
        };

        let report = self.section.batch(ops.clone()).map_err(|e| {
            self.state.borrow_mut().ops = ops.clone();
            CommitError::from(e)
        })?;
        if report.outcome == ArrayOutcome::NotAnArray {
            self.state.borrow_mut().ops = ops;
            return Err(CommitError::Rejected(format!(
                "'{}' is not an array",
                self.section.path()
            )));
        }
        if !report.unmatched.is_empty() {
            tracing::warn!(
                view_id = %self.view_id,
                unmatched = ?report.unmatched,
                "batch steps matched no element"
            );
        }
        self.state.borrow_mut().last_report = Some(report);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::CommitCoordinator;
    use crate::document::Document;
    use crate::path;
    use serde_json::{json, Value};

    struct Harness {
        store: DocumentStore,
        views: ViewRegistry,
        dirty: DirtyTracker,
        coordinator: CommitCoordinator,
    }

    fn harness(settings: Value) -> Harness {
        let store = DocumentStore::new();
        store.install(Document::new(Node::from(settings)));
        let views = ViewRegistry::new();
        let dirty = DirtyTracker::new();
        let coordinator = CommitCoordinator::new(store.clone(), views.clone(), dirty.clone());
        Harness {
            store,
            views,
            dirty,
            coordinator,
        }
    }

    fn positive(node: &Node) -> Result<(), String> {
        match node.as_f64() {
            Some(n) if n > 0.0 => Ok(()),
            _ => Err("must be a positive number".to_string()),
        }
    }

    #[tokio::test]
    async fn test_form_commits_buffered_fields() {
        let h = harness(json!({"general": {"currency": "USD"}}));
        let form = FormView::new("general", path!["general"], h.store.clone());
        form.on_mount(&h.views, &h.dirty).unwrap();

        form.set_field(path!["currency"], "EUR").unwrap();
        form.set_field(path!["horizonYears"], 15i64).unwrap();
        assert!(h.dirty.is_dirty("general"));
        assert_eq!(form.value(&path!["currency"]), Some(Node::from("EUR")));
        assert_eq!(
            h.store.get(&path!["general", "currency"]),
            Some(Node::from("USD"))
        );

        h.coordinator.submit_all_forms().await.unwrap();

        assert!(!h.dirty.is_dirty("general"));
        assert!(form.pending_fields().is_empty());
        assert_eq!(
            Value::from(h.store.get(&path!["general"]).unwrap()),
            json!({"currency": "EUR", "horizonYears": 15})
        );
    }

    #[test]
    fn test_mount_is_idempotent_and_unmount_clears() {
        let h = harness(json!({}));
        let form = FormView::new("general", path!["general"], h.store.clone());
        form.on_mount(&h.views, &h.dirty).unwrap();
        form.on_mount(&h.views, &h.dirty).unwrap();
        assert_eq!(h.views.len(), 1);

        form.set_field(path!["x"], 1i64).unwrap();
        form.on_unmount();
        assert!(!h.views.contains("general"));
        assert!(!h.dirty.has_unsaved_changes());
        assert!(h.dirty.is_empty());
    }

    #[test]
    fn test_remount_cycles_leave_no_tracker_entries() {
        let h = harness(json!({}));
        for i in 0..5 {
            let form = FormView::new(format!("row-{}", i), path!["rows"], h.store.clone());
            form.on_mount(&h.views, &h.dirty).unwrap();
            form.set_field(path!["x"], i as i64).unwrap();
            form.on_unmount();
        }
        assert!(h.dirty.is_empty());
        assert!(h.views.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_field_is_held_back() {
        let h = harness(json!({"general": {}}));
        let form = FormView::new("general", path!["general"], h.store.clone());
        form.validate_with(path!["discountRate"], positive);
        form.on_mount(&h.views, &h.dirty).unwrap();

        form.set_field(path!["currency"], "GBP").unwrap();
        let err = form.set_field(path!["discountRate"], -1i64).unwrap_err();
        assert_eq!(err.path, "general.discountRate");
        assert_eq!(form.errors().len(), 1);

        let report = h.coordinator.submit_all_forms().await.unwrap();
        assert_eq!(report.committed, vec!["general"]);
        assert_eq!(
            h.store.get(&path!["general", "currency"]),
            Some(Node::from("GBP"))
        );
        assert!(h.store.get(&path!["general", "discountRate"]).is_none());
        assert!(h.dirty.is_dirty("general"));

        form.set_field(path!["discountRate"], 0.07).unwrap();
        assert!(form.errors().is_empty());
        h.coordinator.submit_all_forms().await.unwrap();
        assert_eq!(
            h.store.get(&path!["general", "discountRate"]),
            Some(Node::from(0.07))
        );
        assert!(!h.dirty.has_unsaved_changes());
    }

    #[tokio::test]
    async fn test_stale_view_refuses_to_commit() {
        let h = harness(json!({"general": {"currency": "USD"}}));
        let form = FormView::new("general", path!["general"], h.store.clone());
        form.on_mount(&h.views, &h.dirty).unwrap();
        form.set_field(path!["currency"], "EUR").unwrap();

        // Another scenario is loaded while the edit is buffered.
        h.store
            .install(Document::new(Node::from(json!({"general": {"currency": "JPY"}}))));

        let err = h.coordinator.submit_all_forms().await.unwrap_err();
        assert!(matches!(
            err,
            ScenarioError::CommitFailure {
                source: CommitError::StaleView { .. },
                ..
            }
        ));
        assert_eq!(
            h.store.get(&path!["general", "currency"]),
            Some(Node::from("JPY"))
        );

        form.resync();
        assert!(!h.dirty.has_unsaved_changes());
        assert_eq!(form.value(&path!["currency"]), Some(Node::from("JPY")));
    }

    #[tokio::test]
    async fn test_array_form_commits_one_batch() {
        let h = harness(json!({"contracts": [{"id": "c1", "price": 5}]}));
        let contracts = ArrayFormView::new("contracts", path!["contracts"], h.store.clone());
        contracts.on_mount(&h.views, &h.dirty).unwrap();

        contracts.add(Node::from(json!({"id": "c2", "price": 9})));
        let patch = Node::from(json!({"price": 6}));
        contracts.update("c1", patch.as_object().cloned().unwrap());
        contracts.remove("missing");
        assert_eq!(contracts.pending(), 3);
        assert_eq!(contracts.preview().len(), 2);

        let revision = h.store.revision();
        h.coordinator.submit_all_forms().await.unwrap();

        assert_eq!(h.store.revision(), revision + 1);
        assert_eq!(
            Value::from(h.store.get(&path!["contracts"]).unwrap()),
            json!([{"id": "c1", "price": 6}, {"id": "c2", "price": 9}])
        );
        let report = contracts.last_report().unwrap();
        assert_eq!(report.unmatched, vec!["missing".to_string()]);
        assert_eq!(contracts.pending(), 0);
        assert!(!h.dirty.has_unsaved_changes());
    }

    #[tokio::test]
    async fn test_array_form_on_scalar_fails_and_keeps_buffer() {
        let h = harness(json!({"contracts": "oops"}));
        let contracts = ArrayFormView::new("contracts", path!["contracts"], h.store.clone());
        contracts.on_mount(&h.views, &h.dirty).unwrap();
        contracts.add(Node::from(json!({"id": "c1"})));

        let err = h.coordinator.submit_all_forms().await.unwrap_err();
        assert!(matches!(err, ScenarioError::CommitFailure { .. }));
        assert_eq!(contracts.pending(), 1);
        assert!(h.dirty.is_dirty("contracts"));
    }

    #[tokio::test]
    async fn test_dropped_view_commits_nothing() {
        let h = harness(json!({}));
        let form = FormView::new("general", path!["general"], h.store.clone());
        form.on_mount(&h.views, &h.dirty).unwrap();
        form.set_field(path!["x"], 1i64).unwrap();
        drop(form);

        let report = h.coordinator.submit_all_forms().await.unwrap();
        assert_eq!(report.committed, vec!["general"]);
        assert!(h.store.get(&path!["general"]).is_none());
    }
}
