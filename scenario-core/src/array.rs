//! Array sections: identity-keyed collections embedded in the document.
//!
//! Elements are matched by their identity field, which is the first of
//! `value`, `id`, `_id` holding a string, number or boolean. Numbers and
//! booleans compare by their JSON text, so `{"id": 7}` matches `"7"`.

use std::sync::Arc;

use crate::error::ScenarioError;
use crate::node::{Node, Object};
use crate::path::Path;
use crate::store::DocumentStore;

/// Fields checked, in order, for an element's identity.
pub const IDENTITY_FIELDS: [&str; 3] = ["value", "id", "_id"];

/// A single mutation of an array section.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayOp {
    /// Append an element, creating the array if absent.
    Add(Node),
    /// Shallow-merge `patch` into the first element matching `match_id`.
    Update { match_id: String, patch: Object },
    /// Delete the first element matching `match_id`.
    Remove { match_id: String },
    /// Set the whole array, creating it if absent.
    Replace(Vec<Node>),
}

/// Result of an array operation. Only `Applied` mutates the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOutcome {
    Applied,
    NoMatch,
    NotAnArray,
}

impl ArrayOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ArrayOutcome::Applied)
    }
}

/// Returns the identity of `element`, if it carries one.
pub fn identity_of(element: &Node) -> Option<String> {
    let object = element.as_object()?;
    IDENTITY_FIELDS.iter().find_map(|field| match object.get(*field)? {
        Node::String(s) => Some(s.to_string()),
        Node::Number(n) => Some(number_key(n)),
        Node::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Integral floats render without a fraction, so `1.0` and `1` are the
/// same identity.
fn number_key(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

fn position_of(items: &[Node], match_id: &str) -> Option<usize> {
    items
        .iter()
        .position(|item| identity_of(item).as_deref() == Some(match_id))
}

/// Computes the array that results from applying `op` to `current`.
///
/// `current` is the node found at the target path, `None` when absent.
/// The error side carries the non-applied outcome.
pub(crate) fn apply(current: Option<&Node>, op: ArrayOp) -> Result<Node, ArrayOutcome> {
    let items: Option<&[Node]> = match current {
        None | Some(Node::Null) => None,
        Some(Node::Array(items)) => Some(items.as_slice()),
        Some(_) => return Err(ArrayOutcome::NotAnArray),
    };

    match op {
        ArrayOp::Add(item) => {
            let mut next = items.map(<[Node]>::to_vec).unwrap_or_default();
            next.push(item);
            Ok(Node::from(next))
        }
        ArrayOp::Replace(all) => Ok(Node::from(all)),
        ArrayOp::Update { match_id, patch } => {
            let items = items.ok_or(ArrayOutcome::NotAnArray)?;
            let index = position_of(items, &match_id).ok_or(ArrayOutcome::NoMatch)?;
            let mut next = items.to_vec();
            next[index] = next[index].merge_object(&patch);
            Ok(Node::from(next))
        }
        ArrayOp::Remove { match_id } => {
            let items = items.ok_or(ArrayOutcome::NotAnArray)?;
            let index = position_of(items, &match_id).ok_or(ArrayOutcome::NoMatch)?;
            let mut next = items.to_vec();
            next.remove(index);
            Ok(Node::from(next))
        }
    }
}

/// One step of an [`ArraySection::batch`].
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Add(Node),
    Update { id: String, patch: Object },
    Remove { id: String },
}

impl From<BatchOp> for ArrayOp {
    fn from(op: BatchOp) -> Self {
        match op {
            BatchOp::Add(item) => ArrayOp::Add(item),
            BatchOp::Update { id, patch } => ArrayOp::Update {
                match_id: id,
                patch,
            },
            BatchOp::Remove { id } => ArrayOp::Remove { match_id: id },
        }
    }
}

/// What a batch did to its section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub outcome: ArrayOutcome,
    /// Number of steps that changed the working copy.
    pub applied: usize,
    /// Ids of update/remove steps that matched nothing.
    pub unmatched: Vec<String>,
}

/// CRUD over the array at one path of the document.
#[derive(Debug, Clone)]
pub struct ArraySection {
    store: DocumentStore,
    path: Path,
}

impl ArraySection {
    pub fn new(store: DocumentStore, path: Path) -> Self {
        Self { store, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current elements. Empty when the array is absent.
    pub fn items(&self) -> Vec<Node> {
        self.store
            .get(&self.path)
            .and_then(|node| node.as_array().map(<[Node]>::to_vec))
            .unwrap_or_default()
    }

    /// First element whose identity equals `id`.
    pub fn find(&self, id: &str) -> Option<Node> {
        let items = self.items();
        position_of(&items, id).map(|i| items[i].clone())
    }

    pub fn add_item(&self, item: impl Into<Node>) -> Result<ArrayOutcome, ScenarioError> {
        self.store.array_op(&self.path, ArrayOp::Add(item.into()))
    }

    pub fn update_item(&self, id: &str, patch: Object) -> Result<ArrayOutcome, ScenarioError> {
        self.store.array_op(
            &self.path,
            ArrayOp::Update {
                match_id: id.to_string(),
                patch,
            },
        )
    }

    pub fn remove_item(&self, id: &str) -> Result<ArrayOutcome, ScenarioError> {
        self.store.array_op(
            &self.path,
            ArrayOp::Remove {
                match_id: id.to_string(),
            },
        )
    }

    pub fn replace_all(&self, items: Vec<Node>) -> Result<ArrayOutcome, ScenarioError> {
        self.store.array_op(&self.path, ArrayOp::Replace(items))
    }

    /// Applies `ops` in order to a private working copy, then writes the
    /// result back with a single replace.
    ///
    /// Steps that match nothing are listed in the report and skipped. When no
    /// step applies the document is left alone.
    pub fn batch(&self, ops: Vec<BatchOp>) -> Result<BatchReport, ScenarioError> {
        let snapshot = self.store.require()?;
        let mut working: Option<Node> = snapshot.settings.get_path(&self.path).cloned();
        let mut applied = 0;
        let mut unmatched = Vec::new();

        for op in ops {
            let id = match &op {
                BatchOp::Update { id, .. } | BatchOp::Remove { id } => Some(id.clone()),
                BatchOp::Add(_) => None,
            };
            match apply(working.as_ref(), op.into()) {
                Ok(next) => {
                    working = Some(next);
                    applied += 1;
                }
                Err(ArrayOutcome::NotAnArray) => {
                    return Ok(BatchReport {
                        outcome: ArrayOutcome::NotAnArray,
                        applied: 0,
                        unmatched,
                    });
                }
                Err(_) => unmatched.extend(id),
            }
        }

        let outcome = match working {
            Some(Node::Array(items)) if applied > 0 => {
                let items = Arc::try_unwrap(items).unwrap_or_else(|shared| (*shared).clone());
                self.replace_all(items)?
            }
            _ if unmatched.is_empty() => ArrayOutcome::Applied,
            _ => ArrayOutcome::NoMatch,
        };
        tracing::debug!(path = %self.path, applied, unmatched = unmatched.len(), "batch");

        Ok(BatchReport {
            outcome,
            applied,
            unmatched,
        })
    }
}
