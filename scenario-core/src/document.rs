//! The scenario document: metadata envelope plus settings and simulation
//! sections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node::{Node, Object};
use crate::path::Path;
use crate::remote::{PersistedScenario, ScenarioPayload};

/// Name given to scenarios that were never named.
pub const UNTITLED: &str = "Untitled scenario";

/// Metadata envelope of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    /// Persisted identity; `None` until the first successful save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for DocumentMeta {
    fn default() -> Self {
        Self {
            id: None,
            name: UNTITLED.to_string(),
            description: String::new(),
            created_at: None,
            updated_at: None,
        }
    }
}

/// Name/description supplied by the caller of `save`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataOverride {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl MetadataOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }

    /// Writes the overridden fields into `meta`.
    pub fn apply(&self, meta: &mut DocumentMeta) {
        if let Some(name) = &self.name {
            meta.name = name.clone();
        }
        if let Some(description) = &self.description {
            meta.description = description.clone();
        }
    }
}

/// Which half of the simulation section a result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulationKind {
    Input,
    Output,
}

impl SimulationKind {
    /// Key of this half inside the simulation section.
    pub fn key(&self) -> &'static str {
        match self {
            SimulationKind::Input => "inputSim",
            SimulationKind::Output => "outputSim",
        }
    }

    /// Where the result for `distribution_id` lives inside the simulation
    /// section.
    pub fn result_path(&self, distribution_id: &str) -> Path {
        Path::root().child(self.key()).child(distribution_id)
    }
}

/// One scenario held in memory.
///
/// All store paths are rooted at `settings`. The `simulation` section is
/// only written by simulation routing.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub meta: DocumentMeta,
    pub settings: Node,
    pub simulation: Node,
}

impl Document {
    /// A fresh, never-persisted document around `settings`.
    pub fn new(settings: Node) -> Self {
        Self {
            meta: DocumentMeta::default(),
            settings,
            simulation: empty_simulation(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.meta.id.as_deref()
    }

    pub fn is_persisted(&self) -> bool {
        self.meta.id.is_some()
    }

    /// Builds the body sent to the remote on create/update, with
    /// `overrides` applied on top of the current metadata.
    pub fn to_payload(&self, overrides: Option<&MetadataOverride>) -> ScenarioPayload {
        let mut meta = self.meta.clone();
        if let Some(overrides) = overrides {
            overrides.apply(&mut meta);
        }
        ScenarioPayload {
            name: meta.name,
            description: meta.description,
            settings: self.settings.clone(),
            simulation: self.simulation.clone(),
        }
    }
}

impl From<PersistedScenario> for Document {
    fn from(p: PersistedScenario) -> Self {
        let simulation = if p.simulation.is_null() {
            empty_simulation()
        } else {
            p.simulation
        };
        Self {
            meta: DocumentMeta {
                id: Some(p.id),
                name: p.name,
                description: p.description,
                created_at: p.created_at,
                updated_at: p.updated_at,
            },
            settings: if p.settings.is_null() {
                Node::object()
            } else {
                p.settings
            },
            simulation,
        }
    }
}

fn empty_simulation() -> Node {
    let mut sections = Object::new();
    sections.insert(SimulationKind::Input.key().to_string(), Node::object());
    sections.insert(SimulationKind::Output.key().to_string(), Node::object());
    Node::from(sections)
}
