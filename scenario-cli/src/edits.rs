//! Parsing of the `path=json` style edit arguments.

use scenario_core::{Node, Object, Path, PathError};

/// `path=value`
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub path: Path,
    pub value: Node,
}

/// `path:id`, optionally followed by `=value`
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedEdit {
    pub path: Path,
    pub id: String,
    pub value: Option<Node>,
}

impl KeyedEdit {
    /// The value as an object patch.
    pub fn patch(&self) -> Result<Object, EditError> {
        match self.value.as_ref().and_then(Node::as_object) {
            Some(object) => Ok(object.clone()),
            None => Err(EditError::NotAnObject(format!("{}:{}", self.path, self.id))),
        }
    }
}

/// Parses `path=value`. A value that is not valid JSON is taken as a
/// plain string, so `--set name=North` works without quoting.
pub fn parse_assignment(text: &str) -> Result<Assignment, EditError> {
    let (path, value) = text
        .split_once('=')
        .ok_or_else(|| EditError::Malformed(text.to_string(), "expected path=value"))?;
    Ok(Assignment {
        path: parse_path(path)?,
        value: parse_value(value),
    })
}

/// Parses `path:id=value`.
pub fn parse_keyed_assignment(text: &str) -> Result<KeyedEdit, EditError> {
    let (target, value) = text
        .split_once('=')
        .ok_or_else(|| EditError::Malformed(text.to_string(), "expected path:id=value"))?;
    let mut edit = parse_keyed(target)?;
    edit.value = Some(parse_value(value));
    Ok(edit)
}

/// Parses `path:id`.
pub fn parse_keyed(text: &str) -> Result<KeyedEdit, EditError> {
    let (path, id) = text
        .rsplit_once(':')
        .ok_or_else(|| EditError::Malformed(text.to_string(), "expected path:id"))?;
    if id.is_empty() {
        return Err(EditError::Malformed(text.to_string(), "missing id"));
    }
    Ok(KeyedEdit {
        path: parse_path(path)?,
        id: id.to_string(),
        value: None,
    })
}

fn parse_path(text: &str) -> Result<Path, EditError> {
    if text.is_empty() {
        return Err(EditError::Path(PathError::Malformed(text.to_string())));
    }
    Path::parse(text).map_err(EditError::Path)
}

fn parse_value(text: &str) -> Node {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => Node::from(value),
        Err(_) => Node::from(text),
    }
}

/// Errors from parsing edit arguments
#[derive(Debug)]
pub enum EditError {
    Malformed(String, &'static str),
    NotAnObject(String),
    Path(PathError),
}

impl std::fmt::Display for EditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditError::Malformed(text, hint) => write!(f, "Invalid edit '{}': {}", text, hint),
            EditError::NotAnObject(target) => {
                write!(f, "Update for '{}' must be a JSON object", target)
            }
            EditError::Path(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EditError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EditError::Path(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PathError> for EditError {
    fn from(e: PathError) -> Self {
        EditError::Path(e)
    }
}
