//! Remote persistence of scenarios.
//!
//! Every adapter call answers with an [`Envelope`]. Transport problems are
//! folded into `success: false` envelopes so the session only has one
//! failure shape to handle.

mod file;
mod http;
mod memory;

pub use file::{FileRemote, StorageError};
pub use http::HttpRemote;
pub use memory::{MemoryRemote, RemoteCall};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScenarioError;
use crate::node::Node;

/// Uniform response wrapper returned by every remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            status_code: None,
        }
    }

    pub fn failure(status_code: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            status_code,
        }
    }

    /// The payload of a successful envelope.
    ///
    /// A successful envelope without data is treated as a failure.
    pub fn into_data(self) -> Result<T, ScenarioError> {
        if !self.success {
            return Err(self.error_into());
        }
        match self.data {
            Some(data) => Ok(data),
            None => Err(ScenarioError::RemoteFailure {
                status: self.status_code,
                message: "Response carried no data".to_string(),
            }),
        }
    }

    /// Checks only the success flag.
    pub fn into_ack(self) -> Result<(), ScenarioError> {
        if self.success {
            Ok(())
        } else {
            Err(self.error_into())
        }
    }

    fn error_into(self) -> ScenarioError {
        ScenarioError::RemoteFailure {
            status: self.status_code,
            message: self.error.unwrap_or_else(|| "Unknown error".to_string()),
        }
    }
}

/// Page position of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32, total: u64) -> Self {
        let page_size = page_size.max(1);
        let total_pages = total.div_ceil(page_size as u64) as u32;
        Self {
            page: page.max(1),
            page_size,
            total,
            total_pages,
        }
    }
}

/// Cuts one 1-based page out of `items`.
pub fn paginate<T: Clone>(items: &[T], page: u32, page_size: u32) -> (Vec<T>, Pagination) {
    let pagination = Pagination::new(page, page_size, items.len() as u64);
    let start = (pagination.page as usize - 1).saturating_mul(pagination.page_size as usize);
    let slice = items
        .iter()
        .skip(start)
        .take(pagination.page_size as usize)
        .cloned()
        .collect();
    (slice, pagination)
}

/// One row of a scenario listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioList {
    pub items: Vec<ScenarioSummary>,
    pub pagination: Pagination,
}

/// A scenario as stored remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedScenario {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub settings: Node,
    #[serde(default)]
    pub simulation: Node,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PersistedScenario {
    /// Case-insensitive match of `filter` against name or description.
    pub fn matches(&self, filter: &str) -> bool {
        let needle = filter.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
    }

    pub fn summary(&self) -> ScenarioSummary {
        ScenarioSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Body of a create or update call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioPayload {
    pub name: String,
    pub description: String,
    pub settings: Node,
    pub simulation: Node,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReceipt {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReceipt {
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteAck {
    #[serde(default)]
    pub id: Option<String>,
}

/// Remote CRUD over persisted scenarios.
#[async_trait(?Send)]
pub trait RemoteSyncAdapter {
    async fn list(
        &self,
        page: u32,
        page_size: u32,
        filter: Option<&str>,
    ) -> Envelope<ScenarioList>;

    async fn get(&self, id: &str) -> Envelope<PersistedScenario>;

    async fn create(&self, payload: &ScenarioPayload) -> Envelope<CreateReceipt>;

    async fn update(&self, id: &str, payload: &ScenarioPayload) -> Envelope<UpdateReceipt>;

    async fn delete(&self, id: &str) -> Envelope<DeleteAck>;
}
