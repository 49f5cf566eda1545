//! Save/load protocol around the active scenario.
//!
//! A [`ScenarioSession`] owns the store, the view registry, the dirty
//! tracker and the commit coordinator, and drives the remote adapter.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::array::ArraySection;
use crate::commit::{CommitCoordinator, CommitReport};
use crate::defaults::{DefaultsProvider, DEFAULT_VARIANT};
use crate::dirty::DirtyTracker;
use crate::document::{Document, MetadataOverride, SimulationKind};
use crate::error::ScenarioError;
use crate::form::{ArrayFormView, FormView};
use crate::node::Node;
use crate::path::Path;
use crate::remote::{RemoteSyncAdapter, ScenarioList};
use crate::simulation::{SimulationRequest, SimulationResponse, SimulationService};
use crate::store::DocumentStore;
use crate::views::ViewRegistry;

/// What a successful save or update did.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReceipt {
    pub id: String,
    /// True when the scenario was created by this save.
    pub created: bool,
    pub updated_at: DateTime<Utc>,
}

/// Result of [`ScenarioSession::delete_scenario`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// True when the deleted scenario was active and a fresh one replaced it.
    pub reinitialized: bool,
}

struct SaveGuard<'a>(&'a Cell<bool>);

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// The editing session of one scenario at a time.
pub struct ScenarioSession {
    store: DocumentStore,
    views: ViewRegistry,
    dirty: DirtyTracker,
    coordinator: CommitCoordinator,
    remote: Rc<dyn RemoteSyncAdapter>,
    defaults: Rc<dyn DefaultsProvider>,
    simulation: Option<Rc<dyn SimulationService>>,
    default_variant: String,
    saving: Cell<bool>,
    saved_revision: Cell<Option<u64>>,
}

impl ScenarioSession {
    pub fn new(remote: Rc<dyn RemoteSyncAdapter>, defaults: Rc<dyn DefaultsProvider>) -> Self {
        let store = DocumentStore::new();
        let views = ViewRegistry::new();
        let dirty = DirtyTracker::new();
        let coordinator = CommitCoordinator::new(store.clone(), views.clone(), dirty.clone());
        Self {
            store,
            views,
            dirty,
            coordinator,
            remote,
            defaults,
            simulation: None,
            default_variant: DEFAULT_VARIANT.to_string(),
            saving: Cell::new(false),
            saved_revision: Cell::new(None),
        }
    }

    pub fn with_simulation(mut self, service: Rc<dyn SimulationService>) -> Self {
        self.simulation = Some(service);
        self
    }

    pub fn with_default_variant(mut self, variant: impl Into<String>) -> Self {
        self.default_variant = variant.into();
        self
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    pub fn dirty(&self) -> &DirtyTracker {
        &self.dirty
    }

    pub fn coordinator(&self) -> &CommitCoordinator {
        &self.coordinator
    }

    pub fn default_variant(&self) -> &str {
        &self.default_variant
    }

    /// Current snapshot, if a scenario is active.
    pub fn document(&self) -> Option<Arc<Document>> {
        self.store.snapshot()
    }

    /// Creates a form view over `base` and mounts it.
    pub fn mount_form(
        &self,
        view_id: impl Into<String>,
        base: Path,
    ) -> Result<FormView, ScenarioError> {
        let form = FormView::new(view_id, base, self.store.clone());
        form.on_mount(&self.views, &self.dirty)?;
        Ok(form)
    }

    /// Creates an array view over `path` and mounts it.
    pub fn mount_array(
        &self,
        view_id: impl Into<String>,
        path: Path,
    ) -> Result<ArrayFormView, ScenarioError> {
        let view = ArrayFormView::new(view_id, path, self.store.clone());
        view.on_mount(&self.views, &self.dirty)?;
        Ok(view)
    }

    /// Direct CRUD over the array at `path`.
    pub fn array_section(&self, path: Path) -> ArraySection {
        ArraySection::new(self.store.clone(), path)
    }

    /// Installs a fresh scenario from the default variant.
    pub async fn initialize(&self) -> Result<Arc<Document>, ScenarioError> {
        let variant = self.default_variant.clone();
        self.initialize_variant(&variant).await
    }

    /// Installs a fresh, never-persisted scenario from `variant`.
    pub async fn initialize_variant(&self, variant: &str) -> Result<Arc<Document>, ScenarioError> {
        let settings = self.defaults.get_defaults(variant).await.into_data()?;
        let settings = if settings.is_null() {
            Node::object()
        } else {
            settings
        };
        let document = self.store.install(Document::new(settings));
        self.saved_revision.set(Some(self.store.revision()));
        tracing::info!(variant, "initialized scenario");
        Ok(document)
    }

    /// Replaces the active scenario with the stored one.
    ///
    /// Dirty flags are left alone; views buffering edits for the previous
    /// scenario will refuse to commit until they resync.
    pub async fn load(&self, id: &str) -> Result<Arc<Document>, ScenarioError> {
        let scenario = self.remote.get(id).await.into_data().inspect_err(|e| {
            tracing::warn!(id, error = %e, "failed to load scenario");
        })?;
        let document = self.store.install(Document::from(scenario));
        self.saved_revision.set(Some(self.store.revision()));
        tracing::info!(id, "loaded scenario");
        Ok(document)
    }

    /// Commits every dirty view, then creates or updates the scenario.
    pub async fn save(
        &self,
        overrides: Option<MetadataOverride>,
    ) -> Result<SaveReceipt, ScenarioError> {
        self.store.require()?;
        let _guard = self.begin_save()?;

        self.coordinator.submit_all_forms().await?;
        self.persist(overrides, false).await
    }

    /// Like [`save`](Self::save) but only for a scenario that already has
    /// an identity. Never touches the network otherwise.
    pub async fn update(
        &self,
        overrides: Option<MetadataOverride>,
    ) -> Result<SaveReceipt, ScenarioError> {
        if !self.store.require()?.is_persisted() {
            return Err(ScenarioError::NoIdentity);
        }
        let _guard = self.begin_save()?;

        self.coordinator.submit_all_forms().await?;
        self.persist(overrides, true).await
    }

    /// Runs a commit pass without persisting.
    pub async fn submit_all_forms(&self) -> Result<CommitReport, ScenarioError> {
        self.coordinator.submit_all_forms().await
    }

    /// Deletes a stored scenario. Deleting the active one starts a fresh
    /// scenario in its place.
    pub async fn delete_scenario(&self, id: &str) -> Result<DeleteOutcome, ScenarioError> {
        self.remote.delete(id).await.into_ack()?;
        tracing::info!(id, "deleted scenario");

        let active = self
            .store
            .snapshot()
            .is_some_and(|doc| doc.id() == Some(id));
        if !active {
            return Ok(DeleteOutcome {
                reinitialized: false,
            });
        }

        self.store.clear();
        self.initialize().await?;
        Ok(DeleteOutcome {
            reinitialized: true,
        })
    }

    pub async fn list(
        &self,
        page: u32,
        page_size: u32,
        filter: Option<&str>,
    ) -> Result<ScenarioList, ScenarioError> {
        self.remote.list(page, page_size, filter).await.into_data()
    }

    /// Runs a simulation and routes every result into the simulation
    /// section of the active scenario in one mutation.
    pub async fn run_simulation(
        &self,
        kind: SimulationKind,
        request: &SimulationRequest,
    ) -> Result<SimulationResponse, ScenarioError> {
        let service = self
            .simulation
            .as_ref()
            .ok_or(ScenarioError::SimulationUnavailable)?;
        self.store.require()?;

        let response = service.simulate(request).await.into_data()?;
        self.store.set_simulation(
            kind,
            response
                .results
                .iter()
                .map(|(id, series)| (id.clone(), Node::from(series))),
        )?;
        tracing::info!(
            kind = kind.key(),
            results = response.results.len(),
            "routed simulation results"
        );
        Ok(response)
    }

    /// True when the active scenario differs from what was last saved,
    /// loaded or initialized, or any view is dirty.
    pub fn has_unpersisted_changes(&self) -> bool {
        if self.dirty.has_unsaved_changes() {
            return true;
        }
        self.store.is_active() && self.saved_revision.get() != Some(self.store.revision())
    }

    /// Drops the scenario, every view registration and every dirty flag.
    pub fn teardown(&self) {
        self.store.clear();
        self.views.clear();
        self.dirty.clear_all();
        self.saved_revision.set(None);
        tracing::debug!("session torn down");
    }

    fn begin_save(&self) -> Result<SaveGuard<'_>, ScenarioError> {
        if self.saving.replace(true) {
            return Err(ScenarioError::SaveInProgress);
        }
        Ok(SaveGuard(&self.saving))
    }

    async fn persist(
        &self,
        overrides: Option<MetadataOverride>,
        require_identity: bool,
    ) -> Result<SaveReceipt, ScenarioError> {
        let document = self.store.require()?;
        let epoch = self.store.epoch();
        let revision = self.store.revision();
        let marks = self.dirty.marks();
        let payload = document.to_payload(overrides.as_ref());

        let (receipt, created_at) = match document.id() {
            Some(id) => {
                let receipt = self.remote.update(id, &payload).await.into_data()?;
                let receipt = SaveReceipt {
                    id: id.to_string(),
                    created: false,
                    updated_at: receipt.updated_at,
                };
                (receipt, None)
            }
            None if require_identity => return Err(ScenarioError::NoIdentity),
            None => {
                let receipt = self.remote.create(&payload).await.into_data()?;
                let created_at = receipt.created_at;
                let receipt = SaveReceipt {
                    id: receipt.id,
                    created: true,
                    updated_at: receipt.updated_at,
                };
                (receipt, Some(created_at))
            }
        };

        if self.store.epoch() != epoch {
            tracing::warn!(
                id = %receipt.id,
                "scenario replaced while saving; saved metadata not applied"
            );
            return Ok(receipt);
        }

        let edited_meanwhile = self.store.revision() != revision;
        self.store.merge_meta(|meta| {
            if let Some(overrides) = &overrides {
                overrides.apply(meta);
            }
            meta.id = Some(receipt.id.clone());
            if let Some(created_at) = created_at {
                meta.created_at = Some(created_at);
            }
            meta.updated_at = Some(receipt.updated_at);
        })?;
        // Views re-marked during the remote call stay dirty.
        self.dirty.clear_marks(&marks);
        self.saved_revision.set(Some(if edited_meanwhile {
            revision
        } else {
            self.store.revision()
        }));

        tracing::info!(id = %receipt.id, created = receipt.created, "saved scenario");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::commit::commit_fn;
    use crate::defaults::BuiltinDefaults;
    use crate::error::CommitError;
    use crate::path;
    use crate::remote::{Envelope, MemoryRemote, PersistedScenario, RemoteCall};
    use crate::simulation::{DistributionSpec, PercentileSeries, RunConfig};

    fn session() -> (ScenarioSession, Rc<MemoryRemote>) {
        let remote = Rc::new(MemoryRemote::new());
        let session = ScenarioSession::new(remote.clone(), Rc::new(BuiltinDefaults::new()));
        (session, remote)
    }

    fn persisted(id: &str, currency: &str) -> PersistedScenario {
        PersistedScenario {
            id: id.to_string(),
            name: format!("Scenario {}", id),
            description: String::new(),
            settings: Node::from(json!({"general": {"currency": currency}})),
            simulation: Node::Null,
            created_at: Some(Utc::now()),
            updated_at: Some(Utc::now()),
        }
    }

    struct StubSimulation;

    #[async_trait(?Send)]
    impl SimulationService for StubSimulation {
        async fn simulate(&self, request: &SimulationRequest) -> Envelope<SimulationResponse> {
            let results = request
                .distributions
                .iter()
                .map(|d| {
                    let mut series = BTreeMap::new();
                    series.insert("p50".to_string(), vec![1.0, 2.0]);
                    (d.id.clone(), PercentileSeries(series))
                })
                .collect();
            Envelope::ok(SimulationResponse { results })
        }
    }

    #[tokio::test]
    async fn test_save_creates_then_updates() {
        let (session, remote) = session();
        session.initialize().await.unwrap();
        let general = session.mount_form("general", path!["general"]).unwrap();
        general.set_field(path!["currency"], "EUR").unwrap();

        let receipt = session
            .save(Some(MetadataOverride::new().with_name("S1")))
            .await
            .unwrap();
        assert!(receipt.created);
        assert_eq!(receipt.id, "mem-1");

        let doc = session.document().unwrap();
        assert_eq!(doc.id(), Some("mem-1"));
        assert_eq!(doc.meta.name, "S1");
        assert!(doc.meta.created_at.is_some());
        assert!(!session.dirty().has_unsaved_changes());
        assert!(!session.has_unpersisted_changes());

        let stored = remote.stored("mem-1").unwrap();
        assert_eq!(stored.name, "S1");
        assert_eq!(
            stored.settings.get_path(&path!["general", "currency"]),
            Some(&Node::from("EUR"))
        );

        general.set_field(path!["currency"], "GBP").unwrap();
        let receipt = session.save(None).await.unwrap();
        assert!(!receipt.created);
        assert_eq!(receipt.id, "mem-1");

        let calls = remote.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], RemoteCall::Create(_)));
        assert!(matches!(&calls[1], RemoteCall::Update { id, payload } if id == "mem-1" && payload.name == "S1"));
    }

    #[tokio::test]
    async fn test_save_requires_active_document() {
        let (session, remote) = session();
        assert!(matches!(
            session.save(None).await,
            Err(ScenarioError::NoActiveDocument)
        ));
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_without_identity_makes_no_calls() {
        let (session, remote) = session();
        session.initialize().await.unwrap();
        let form = session.mount_form("general", path!["general"]).unwrap();
        form.set_field(path!["currency"], "EUR").unwrap();

        assert!(matches!(
            session.update(None).await,
            Err(ScenarioError::NoIdentity)
        ));
        assert!(remote.calls().is_empty());
        assert!(session.dirty().is_dirty("general"));
    }

    #[tokio::test]
    async fn test_failed_remote_call_keeps_document() {
        let (session, remote) = session();
        session.initialize().await.unwrap();
        session.store().set_by_path(&path!["general", "currency"], "CHF").unwrap();
        let before = session.document().unwrap();

        remote.fail_with(Some(503), "service unavailable");
        let err = session
            .save(Some(MetadataOverride::new().with_name("Never")))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(503));
        let after = session.document().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert!(!after.is_persisted());
        assert!(session.has_unpersisted_changes());

        remote.recover();
        assert!(session.save(None).await.unwrap().created);
    }

    #[tokio::test]
    async fn test_commit_failure_skips_remote() {
        let (session, remote) = session();
        session.initialize().await.unwrap();
        let handler = commit_fn(|_store: DocumentStore| async {
            Err::<(), _>(CommitError::Rejected("invalid".to_string()))
        });
        let _registration = session.views().register("broken", Rc::new(handler)).unwrap();
        session.dirty().mark_dirty("broken");

        let err = session.save(None).await.unwrap_err();
        assert!(matches!(err, ScenarioError::CommitFailure { ref view_id, .. } if view_id == "broken"));
        assert!(remote.calls().is_empty());
        assert!(session.dirty().is_dirty("broken"));
    }

    #[tokio::test]
    async fn test_overlapping_save_is_rejected() {
        let (session, remote) = session();
        session.initialize().await.unwrap();

        let (first, second) = futures::join!(session.save(None), session.save(None));

        assert!(first.is_ok());
        assert!(matches!(second, Err(ScenarioError::SaveInProgress)));
        assert_eq!(remote.len(), 1);

        // The guard is released once the first save completes.
        assert!(session.save(None).await.is_ok());
    }

    #[tokio::test]
    async fn test_edit_during_save_stays_unpersisted() {
        let (session, _remote) = session();
        session.initialize().await.unwrap();

        // Runs while the create call is outstanding.
        let edit = async {
            session
                .store()
                .set_by_path(&path!["general", "horizonYears"], 20i64)
                .unwrap();
        };
        let (saved, ()) = futures::join!(session.save(None), edit);

        saved.unwrap();
        assert!(session.has_unpersisted_changes());
        assert_eq!(
            session.store().get(&path!["general", "horizonYears"]),
            Some(Node::from(20i64))
        );
    }

    #[tokio::test]
    async fn test_field_buffered_during_save_is_kept_for_next_save() {
        let (session, remote) = session();
        session.initialize().await.unwrap();
        let form = session.mount_form("general", path!["general"]).unwrap();

        let edit = async {
            form.set_field(path!["horizonYears"], 42i64).unwrap();
        };
        let (saved, ()) = futures::join!(session.save(None), edit);
        let id = saved.unwrap().id;

        assert_eq!(form.pending_fields(), vec![path!["horizonYears"]]);
        assert!(session.dirty().is_dirty("general"));
        assert!(session.has_unpersisted_changes());

        session.save(None).await.unwrap();
        let stored = remote.stored(&id).unwrap();
        assert_eq!(
            stored.settings.get_path(&path!["general", "horizonYears"]),
            Some(&Node::from(42i64))
        );
        assert!(!session.has_unpersisted_changes());
    }

    #[tokio::test]
    async fn test_load_replaces_document_and_keeps_dirty_flags() {
        let (session, remote) = session();
        remote.insert(persisted("s1", "JPY"));
        session.initialize().await.unwrap();
        let epoch = session.store().epoch();
        session.dirty().mark_dirty("general");

        let doc = session.load("s1").await.unwrap();

        assert_eq!(doc.id(), Some("s1"));
        assert_eq!(session.store().epoch(), epoch + 1);
        assert!(session.dirty().is_dirty("general"));
        assert_eq!(
            Value::from(&doc.simulation),
            json!({"inputSim": {}, "outputSim": {}})
        );
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_document() {
        let (session, _remote) = session();
        session.initialize().await.unwrap();
        let before = session.document().unwrap();

        let err = session.load("missing").await.unwrap_err();

        assert_eq!(err.status(), Some(404));
        assert!(Arc::ptr_eq(&before, &session.document().unwrap()));
    }

    #[tokio::test]
    async fn test_load_during_save_does_not_stamp_new_document() {
        let (session, remote) = session();
        remote.insert(persisted("other", "JPY"));
        session.initialize().await.unwrap();

        // The load lands while the create call is outstanding.
        let (loaded, saved) = futures::join!(session.load("other"), session.save(None));

        let receipt = saved.unwrap();
        loaded.unwrap();
        assert!(receipt.created);
        let doc = session.document().unwrap();
        assert_eq!(doc.id(), Some("other"));
        assert_eq!(doc.meta.name, "Scenario other");
    }

    #[tokio::test]
    async fn test_delete_active_reinitializes() {
        let (session, remote) = session();
        session.initialize().await.unwrap();
        let receipt = session.save(None).await.unwrap();

        let outcome = session.delete_scenario(&receipt.id).await.unwrap();

        assert!(outcome.reinitialized);
        assert!(remote.is_empty());
        let doc = session.document().unwrap();
        assert!(!doc.is_persisted());
        assert!(doc.settings.get_path(&path!["general"]).is_some());
    }

    #[tokio::test]
    async fn test_delete_other_scenario_keeps_active() {
        let (session, remote) = session();
        remote.insert(persisted("s2", "USD"));
        session.initialize().await.unwrap();
        let before = session.document().unwrap();

        let outcome = session.delete_scenario("s2").await.unwrap();

        assert!(!outcome.reinitialized);
        assert!(Arc::ptr_eq(&before, &session.document().unwrap()));
        assert!(session.delete_scenario("s2").await.is_err());
    }

    #[tokio::test]
    async fn test_initialize_variant() {
        let (session, _remote) = session();
        let doc = session.initialize_variant("blank").await.unwrap();
        assert_eq!(doc.settings, Node::object());
        assert!(!session.has_unpersisted_changes());

        let err = session.initialize_variant("nope").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_list_passes_through() {
        let (session, remote) = session();
        remote.insert(persisted("a", "USD"));
        remote.insert(persisted("b", "USD"));

        let list = session.list(1, 1, None).await.unwrap();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.pagination.total_pages, 2);
        assert!(matches!(
            &remote.calls()[0],
            RemoteCall::List { page: 1, page_size: 1, filter: None }
        ));
    }

    #[tokio::test]
    async fn test_run_simulation_routes_results_in_one_mutation() {
        let (session, _remote) = session();
        let session = session.with_simulation(Rc::new(StubSimulation));
        session.initialize().await.unwrap();
        let revision = session.store().revision();

        let request = SimulationRequest {
            distributions: vec![
                DistributionSpec {
                    id: "capex".to_string(),
                    distribution: "triangular".to_string(),
                    params: Node::from(json!({"min": 1, "mode": 2, "max": 4})),
                },
                DistributionSpec {
                    id: "price".to_string(),
                    distribution: "normal".to_string(),
                    params: Node::from(json!({"mean": 50, "sd": 5})),
                },
            ],
            config: RunConfig::default(),
        };
        session
            .run_simulation(SimulationKind::Input, &request)
            .await
            .unwrap();

        assert_eq!(session.store().revision(), revision + 1);
        let doc = session.document().unwrap();
        assert_eq!(
            Value::from(&doc.simulation),
            json!({
                "inputSim": {
                    "capex": {"p50": [1.0, 2.0]},
                    "price": {"p50": [1.0, 2.0]}
                },
                "outputSim": {}
            })
        );
        assert!(session.has_unpersisted_changes());
    }

    #[tokio::test]
    async fn test_run_simulation_without_service() {
        let (session, _remote) = session();
        session.initialize().await.unwrap();
        let request = SimulationRequest {
            distributions: Vec::new(),
            config: RunConfig::default(),
        };
        assert!(matches!(
            session.run_simulation(SimulationKind::Output, &request).await,
            Err(ScenarioError::SimulationUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_teardown_clears_everything() {
        let (session, _remote) = session();
        session.initialize().await.unwrap();
        let form = session.mount_form("general", path!["general"]).unwrap();
        form.set_field(path!["currency"], "EUR").unwrap();

        session.teardown();

        assert!(session.document().is_none());
        assert!(session.views().is_empty());
        assert!(!session.has_unpersisted_changes());
    }
}
