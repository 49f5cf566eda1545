//! In-process adapter that records every call.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;

use super::{
    paginate, CreateReceipt, DeleteAck, Envelope, PersistedScenario, RemoteSyncAdapter,
    ScenarioList, ScenarioPayload, ScenarioSummary, UpdateReceipt,
};

/// A call received by [`MemoryRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    List {
        page: u32,
        page_size: u32,
        filter: Option<String>,
    },
    Get(String),
    Create(ScenarioPayload),
    Update {
        id: String,
        payload: ScenarioPayload,
    },
    Delete(String),
}

/// Scenario storage held in memory.
///
/// Every call yields to the runtime once before answering, so tests can
/// interleave other work with an outstanding remote call.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    scenarios: RefCell<BTreeMap<String, PersistedScenario>>,
    calls: RefCell<Vec<RemoteCall>>,
    failure: RefCell<Option<(Option<u16>, String)>>,
    next_id: Cell<u64>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a stored scenario.
    pub fn insert(&self, scenario: PersistedScenario) {
        self.scenarios
            .borrow_mut()
            .insert(scenario.id.clone(), scenario);
    }

    pub fn stored(&self, id: &str) -> Option<PersistedScenario> {
        self.scenarios.borrow().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.scenarios.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls received so far, oldest first.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.borrow().clone()
    }

    /// Makes every following call fail with `message`.
    pub fn fail_with(&self, status: Option<u16>, message: impl Into<String>) {
        *self.failure.borrow_mut() = Some((status, message.into()));
    }

    /// Stops injecting failures.
    pub fn recover(&self) {
        *self.failure.borrow_mut() = None;
    }

    async fn enter<T>(&self, call: RemoteCall) -> Result<(), Envelope<T>> {
        self.calls.borrow_mut().push(call);
        tokio::task::yield_now().await;
        match self.failure.borrow().as_ref() {
            Some((status, message)) => Err(Envelope::failure(*status, message.clone())),
            None => Ok(()),
        }
    }

    fn not_found<T>(id: &str) -> Envelope<T> {
        Envelope::failure(Some(404), format!("Scenario '{}' not found", id))
    }
}

#[async_trait(?Send)]
impl RemoteSyncAdapter for MemoryRemote {
    async fn list(
        &self,
        page: u32,
        page_size: u32,
        filter: Option<&str>,
    ) -> Envelope<ScenarioList> {
        let call = RemoteCall::List {
            page,
            page_size,
            filter: filter.map(str::to_string),
        };
        if let Err(failure) = self.enter(call).await {
            return failure;
        }

        let summaries: Vec<ScenarioSummary> = self
            .scenarios
            .borrow()
            .values()
            .filter(|s| filter.map_or(true, |f| s.matches(f)))
            .map(PersistedScenario::summary)
            .collect();
        let (items, pagination) = paginate(&summaries, page, page_size);
        Envelope::ok(ScenarioList { items, pagination })
    }

    async fn get(&self, id: &str) -> Envelope<PersistedScenario> {
        if let Err(failure) = self.enter(RemoteCall::Get(id.to_string())).await {
            return failure;
        }
        match self.stored(id) {
            Some(scenario) => Envelope::ok(scenario),
            None => Self::not_found(id),
        }
    }

    async fn create(&self, payload: &ScenarioPayload) -> Envelope<CreateReceipt> {
        if let Err(failure) = self.enter(RemoteCall::Create(payload.clone())).await {
            return failure;
        }

        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let id = format!("mem-{}", id);
        let now = Utc::now();
        self.insert(PersistedScenario {
            id: id.clone(),
            name: payload.name.clone(),
            description: payload.description.clone(),
            settings: payload.settings.clone(),
            simulation: payload.simulation.clone(),
            created_at: Some(now),
            updated_at: Some(now),
        });
        Envelope::ok(CreateReceipt {
            id,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update(&self, id: &str, payload: &ScenarioPayload) -> Envelope<UpdateReceipt> {
        let call = RemoteCall::Update {
            id: id.to_string(),
            payload: payload.clone(),
        };
        if let Err(failure) = self.enter(call).await {
            return failure;
        }

        let mut scenarios = self.scenarios.borrow_mut();
        let Some(stored) = scenarios.get_mut(id) else {
            return Self::not_found(id);
        };
        let now = Utc::now();
        stored.name = payload.name.clone();
        stored.description = payload.description.clone();
        stored.settings = payload.settings.clone();
        stored.simulation = payload.simulation.clone();
        stored.updated_at = Some(now);
        Envelope::ok(UpdateReceipt { updated_at: now })
    }

    async fn delete(&self, id: &str) -> Envelope<DeleteAck> {
        if let Err(failure) = self.enter(RemoteCall::Delete(id.to_string())).await {
            return failure;
        }
        match self.scenarios.borrow_mut().remove(id) {
            Some(_) => Envelope::ok(DeleteAck {
                id: Some(id.to_string()),
            }),
            None => Self::not_found(id),
        }
    }
}
