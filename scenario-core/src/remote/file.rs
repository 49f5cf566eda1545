//! Offline adapter storing one JSON file per scenario.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{
    paginate, CreateReceipt, DeleteAck, Envelope, PersistedScenario, RemoteSyncAdapter,
    ScenarioList, ScenarioPayload, ScenarioSummary, UpdateReceipt,
};

const SCENARIOS_DIR: &str = "scenarios";

/// Persists scenarios as `<data_dir>/scenarios/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileRemote {
    data_dir: PathBuf,
}

impl FileRemote {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    fn dir(&self) -> PathBuf {
        self.data_dir.join(SCENARIOS_DIR)
    }

    /// Returns the file path for a scenario id.
    pub fn path(&self, id: &str) -> PathBuf {
        self.dir().join(format!("{}.json", id))
    }

    /// Loads a scenario from disk.
    ///
    /// Returns `Ok(None)` if the file doesn't exist.
    pub fn load(&self, id: &str) -> Result<Option<PersistedScenario>, StorageError> {
        if !valid_id(id) {
            return Ok(None);
        }
        read_scenario(&self.path(id))
    }

    /// Writes a scenario, creating the directory if needed.
    pub fn store(&self, scenario: &PersistedScenario) -> Result<(), StorageError> {
        let dir = self.dir();
        fs::create_dir_all(&dir).map_err(|e| StorageError::IoError(dir, e))?;

        let path = self.path(&scenario.id);
        let json = serde_json::to_string_pretty(scenario)
            .map_err(|e| StorageError::ParseError(path.clone(), e.to_string()))?;
        fs::write(&path, json).map_err(|e| StorageError::IoError(path, e))
    }

    /// Deletes a scenario file. Returns false if it did not exist.
    pub fn remove(&self, id: &str) -> Result<bool, StorageError> {
        if !valid_id(id) {
            return Ok(false);
        }
        let path = self.path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::IoError(path, e)),
        }
    }

    /// Every stored scenario, unordered. Unreadable files are skipped.
    pub fn load_all(&self) -> Result<Vec<PersistedScenario>, StorageError> {
        let dir = self.dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::IoError(dir, e)),
        };

        let mut scenarios = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StorageError::IoError(dir.clone(), e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_scenario(&path) {
                Ok(Some(scenario)) => scenarios.push(scenario),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "skipping unreadable scenario file"),
            }
        }
        Ok(scenarios)
    }
}

fn read_scenario(path: &Path) -> Result<Option<PersistedScenario>, StorageError> {
    match fs::read_to_string(path) {
        Ok(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| StorageError::ParseError(path.to_path_buf(), e.to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::IoError(path.to_path_buf(), e)),
    }
}

// Ids become file names, so anything that could leave the directory is
// rejected.
fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn not_found<T>(id: &str) -> Envelope<T> {
    Envelope::failure(Some(404), format!("Scenario '{}' not found", id))
}

fn storage_failure<T>(e: StorageError) -> Envelope<T> {
    tracing::warn!(error = %e, "scenario storage failed");
    Envelope::failure(Some(500), e.to_string())
}

#[async_trait(?Send)]
impl RemoteSyncAdapter for FileRemote {
    async fn list(
        &self,
        page: u32,
        page_size: u32,
        filter: Option<&str>,
    ) -> Envelope<ScenarioList> {
        let mut scenarios = match self.load_all() {
            Ok(s) => s,
            Err(e) => return storage_failure(e),
        };
        if let Some(filter) = filter {
            scenarios.retain(|s| s.matches(filter));
        }
        scenarios.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.name.cmp(&b.name)));

        let summaries: Vec<ScenarioSummary> =
            scenarios.iter().map(PersistedScenario::summary).collect();
        let (items, pagination) = paginate(&summaries, page, page_size);
        Envelope::ok(ScenarioList { items, pagination })
    }

    async fn get(&self, id: &str) -> Envelope<PersistedScenario> {
        match self.load(id) {
            Ok(Some(scenario)) => Envelope::ok(scenario),
            Ok(None) => not_found(id),
            Err(e) => storage_failure(e),
        }
    }

    async fn create(&self, payload: &ScenarioPayload) -> Envelope<CreateReceipt> {
        let now = Utc::now();
        let scenario = PersistedScenario {
            id: Uuid::new_v4().to_string(),
            name: payload.name.clone(),
            description: payload.description.clone(),
            settings: payload.settings.clone(),
            simulation: payload.simulation.clone(),
            created_at: Some(now),
            updated_at: Some(now),
        };
        if let Err(e) = self.store(&scenario) {
            return storage_failure(e);
        }
        Envelope::ok(CreateReceipt {
            id: scenario.id,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update(&self, id: &str, payload: &ScenarioPayload) -> Envelope<UpdateReceipt> {
        let mut scenario = match self.load(id) {
            Ok(Some(s)) => s,
            Ok(None) => return not_found(id),
            Err(e) => return storage_failure(e),
        };
        let now = Utc::now();
        scenario.name = payload.name.clone();
        scenario.description = payload.description.clone();
        scenario.settings = payload.settings.clone();
        scenario.simulation = payload.simulation.clone();
        scenario.updated_at = Some(now);

        match self.store(&scenario) {
            Ok(()) => Envelope::ok(UpdateReceipt { updated_at: now }),
            Err(e) => storage_failure(e),
        }
    }

    async fn delete(&self, id: &str) -> Envelope<DeleteAck> {
        match self.remove(id) {
            Ok(true) => Envelope::ok(DeleteAck {
                id: Some(id.to_string()),
            }),
            Ok(false) => not_found(id),
            Err(e) => storage_failure(e),
        }
    }
}

/// Errors that can occur while reading or writing scenario files.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error reading or writing a file.
    IoError(PathBuf, io::Error),
    /// A scenario file could not be encoded or decoded.
    ParseError(PathBuf, String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            StorageError::ParseError(path, e) => {
                write!(f, "Invalid scenario file {}: {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::IoError(_, e) => Some(e),
            StorageError::ParseError(_, _) => None,
        }
    }
}
