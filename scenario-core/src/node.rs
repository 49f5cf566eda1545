//! Shared-structure value tree backing every scenario document.
//!
//! Containers hold their children behind an [`Arc`], so cloning a node is
//! O(1) and two trees can share any number of subtrees. Updates never edit
//! a container in place: [`Node::set_path`] rebuilds the containers along
//! the path and reuses every sibling as-is, which keeps older snapshots
//! frozen while new ones are produced.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::PathError;
use crate::path::{Path, PathSegment};

/// Ordered object payload.
pub type Object = BTreeMap<String, Node>;

/// A JSON-shaped value with shared containers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(Arc<str>),
    Array(Arc<Vec<Node>>),
    Object(Arc<Object>),
}

impl Node {
    /// An empty object.
    pub fn object() -> Self {
        Node::Object(Arc::new(Object::new()))
    }

    /// An empty array.
    pub fn array() -> Self {
        Node::Array(Arc::new(Vec::new()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Node::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Node::Object(map) => Some(&**map),
            _ => None,
        }
    }

    /// Looks up a direct child by segment.
    pub fn child(&self, segment: &PathSegment) -> Option<&Node> {
        match (self, segment) {
            (Node::Object(map), segment) => map.get(segment.as_key().as_str()),
            (Node::Array(items), PathSegment::Index(i)) => items.get(*i),
            _ => None,
        }
    }

    /// Resolves `path` below this node.
    pub fn get_path(&self, path: &Path) -> Option<&Node> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Returns a new tree with `value` stored at `path`.
    ///
    /// Every container on the path is copied (shallowly) and every sibling
    /// subtree is shared with `self`. Missing or null intermediates become
    /// empty objects. A scalar in the way is a [`PathError`], as is an
    /// index past the end of an array (`len` itself appends).
    pub fn set_path(&self, path: &Path, value: Node) -> Result<Node, PathError> {
        set_in(self, path, 0, value)
    }

    /// True when both nodes are containers backed by the same allocation.
    pub fn shares_with(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Array(a), Node::Array(b)) => Arc::ptr_eq(a, b),
            (Node::Object(a), Node::Object(b)) => Arc::ptr_eq(a, b),
            (Node::String(a), Node::String(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Shallow merge of `patch` into this object. Non-objects are replaced
    /// by the patch wrapped as an object.
    pub fn merge_object(&self, patch: &Object) -> Node {
        let mut merged = self.as_object().cloned().unwrap_or_default();
        for (key, value) in patch {
            merged.insert(key.clone(), value.clone());
        }
        Node::Object(Arc::new(merged))
    }
}

fn set_in(node: &Node, path: &Path, depth: usize, value: Node) -> Result<Node, PathError> {
    let Some(segment) = path.segments().get(depth) else {
        return Ok(value);
    };

    match node {
        Node::Object(map) => {
            let key = segment.as_key();
            let current = map.get(&key).cloned().unwrap_or(Node::Null);
            let updated = set_in(&current, path, depth + 1, value)?;
            let mut next = (**map).clone();
            next.insert(key, updated);
            Ok(Node::Object(Arc::new(next)))
        }
        Node::Array(items) => {
            let index = match segment {
                PathSegment::Index(i) => *i,
                PathSegment::Key(key) => {
                    return Err(PathError::KeyOnArray {
                        at: path.prefix_string(depth),
                        key: key.clone(),
                    })
                }
            };
            if index > items.len() {
                return Err(PathError::IndexOutOfBounds {
                    at: path.prefix_string(depth),
                    index,
                    len: items.len(),
                });
            }
            let current = items.get(index).cloned().unwrap_or(Node::Null);
            let updated = set_in(&current, path, depth + 1, value)?;
            let mut next = (**items).clone();
            if index == next.len() {
                next.push(updated);
            } else {
                next[index] = updated;
            }
            Ok(Node::Array(Arc::new(next)))
        }
        Node::Null => set_in(&Node::object(), path, depth, value),
        _ => Err(PathError::NotAContainer {
            at: path.prefix_string(depth),
        }),
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => Node::Number(n),
            Value::String(s) => Node::String(Arc::from(s)),
            Value::Array(items) => {
                Node::Array(Arc::new(items.into_iter().map(Node::from).collect()))
            }
            Value::Object(map) => Node::Object(Arc::new(
                map.into_iter().map(|(k, v)| (k, Node::from(v))).collect(),
            )),
        }
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::from(&node)
    }
}

impl From<&Node> for Value {
    fn from(node: &Node) -> Self {
        match node {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Number(n) => Value::Number(n.clone()),
            Node::String(s) => Value::String(s.to_string()),
            Node::Array(items) => Value::Array(items.iter().map(Value::from).collect()),
            Node::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Bool(b)
    }
}

impl From<i64> for Node {
    fn from(n: i64) -> Self {
        Node::Number(Number::from(n))
    }
}

impl From<f64> for Node {
    /// Non-finite floats have no JSON form and become null.
    fn from(n: f64) -> Self {
        Number::from_f64(n).map(Node::Number).unwrap_or(Node::Null)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::String(Arc::from(s))
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::String(Arc::from(s))
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::Array(Arc::new(items))
    }
}

impl From<Object> for Node {
    fn from(map: Object) -> Self {
        Node::Object(Arc::new(map))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::from(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    fn sample() -> Node {
        Node::from(json!({
            "general": {"currency": "USD", "horizonYears": 10},
            "contracts": [{"id": "c1", "price": 5}],
            "risks": {"items": []}
        }))
    }

    #[test]
    fn test_get_path() {
        let doc = sample();
        assert_eq!(
            doc.get_path(&path!["general", "currency"]),
            Some(&Node::from("USD"))
        );
        assert_eq!(
            doc.get_path(&path!["contracts", 0, "price"]),
            Some(&Node::from(5i64))
        );
        assert_eq!(doc.get_path(&path!["contracts", 3]), None);
        assert_eq!(doc.get_path(&path!["general", "currency", "x"]), None);
        assert_eq!(doc.get_path(&Path::root()), Some(&doc));
    }

    #[test]
    fn test_set_then_get_roundtrip() {
        let doc = sample();
        let p = path!["general", "discountRate"];
        let updated = doc.set_path(&p, Node::from(0.08)).unwrap();
        assert_eq!(updated.get_path(&p), Some(&Node::from(0.08)));
    }

    #[test]
    fn test_set_shares_siblings() {
        let doc = sample();
        let updated = doc
            .set_path(&path!["general", "currency"], Node::from("EUR"))
            .unwrap();

        let old_contracts = doc.get_path(&path!["contracts"]).unwrap();
        let new_contracts = updated.get_path(&path!["contracts"]).unwrap();
        assert!(old_contracts.shares_with(new_contracts));

        let old_risks = doc.get_path(&path!["risks"]).unwrap();
        let new_risks = updated.get_path(&path!["risks"]).unwrap();
        assert!(old_risks.shares_with(new_risks));

        // Ancestors are fresh copies and the original is untouched.
        assert!(!doc.shares_with(&updated));
        assert_eq!(
            doc.get_path(&path!["general", "currency"]),
            Some(&Node::from("USD"))
        );
    }

    #[test]
    fn test_set_creates_missing_intermediates_as_objects() {
        let doc = Node::object();
        let updated = doc
            .set_path(&path!["costs", "opex", "rent"], Node::from(100i64))
            .unwrap();
        assert_eq!(
            Value::from(updated),
            json!({"costs": {"opex": {"rent": 100}}})
        );
    }

    #[test]
    fn test_set_index_on_missing_creates_object_key() {
        let updated = Node::Null
            .set_path(&path!["slots", 0], Node::from(true))
            .unwrap();
        assert_eq!(Value::from(updated), json!({"slots": {"0": true}}));
    }

    #[test]
    fn test_set_array_append_and_bounds() {
        let doc = sample();
        let appended = doc
            .set_path(&path!["contracts", 1], Node::from(json!({"id": "c2"})))
            .unwrap();
        let contracts = appended.get_path(&path!["contracts"]).unwrap();
        assert_eq!(contracts.as_array().unwrap().len(), 2);

        let err = doc
            .set_path(&path!["contracts", 5], Node::Null)
            .unwrap_err();
        assert_eq!(
            err,
            PathError::IndexOutOfBounds {
                at: "contracts".to_string(),
                index: 5,
                len: 1
            }
        );
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let doc = sample();
        let err = doc
            .set_path(&path!["general", "currency", "code"], Node::from("x"))
            .unwrap_err();
        assert_eq!(
            err,
            PathError::NotAContainer {
                at: "general.currency".to_string()
            }
        );
    }

    #[test]
    fn test_set_key_on_array_fails() {
        let doc = sample();
        let err = doc
            .set_path(&path!["contracts", "first"], Node::Null)
            .unwrap_err();
        assert!(matches!(err, PathError::KeyOnArray { .. }));
    }

    #[test]
    fn test_json_roundtrip_through_serde() {
        let value = json!({"a": [1, 2.5, "x", null, {"b": false}]});
        let node: Node = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(serde_json::to_value(&node).unwrap(), value);
    }

    #[test]
    fn test_merge_object() {
        let element = Node::from(json!({"id": "c1", "price": 5, "qty": 1}));
        let patch = Node::from(json!({"price": 7}));
        let merged = element.merge_object(patch.as_object().unwrap());
        assert_eq!(Value::from(merged), json!({"id": "c1", "price": 7, "qty": 1}));
    }
}
