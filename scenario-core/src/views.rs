//! Registry of mounted views and their commit handlers.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::commit::CommitHandler;
use crate::dirty::ALL_VIEWS;
use crate::error::ScenarioError;

struct Entry {
    handler: Rc<dyn CommitHandler>,
    token: u64,
}

#[derive(Default)]
struct RegistryState {
    entries: IndexMap<String, Entry>,
    next_token: u64,
}

/// Maps view ids to the handler that flushes their buffered edits.
///
/// Ids keep the position of their first registration, which is the order
/// the commit coordinator runs them in.
#[derive(Clone, Default)]
pub struct ViewRegistry {
    state: Rc<RefCell<RegistryState>>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handler` for `view_id`, replacing any previous one.
    ///
    /// The returned [`Registration`] only removes the entry it created, so a
    /// view that was re-registered is not dropped by a stale handle.
    pub fn register(
        &self,
        view_id: impl Into<String>,
        handler: Rc<dyn CommitHandler>,
    ) -> Result<Registration, ScenarioError> {
        let view_id = view_id.into();
        if view_id == ALL_VIEWS {
            return Err(ScenarioError::ReservedViewId(view_id));
        }

        let token = {
            let mut state = self.state.borrow_mut();
            state.next_token += 1;
            let token = state.next_token;
            let replaced = state
                .entries
                .insert(view_id.clone(), Entry { handler, token })
                .is_some();
            if replaced {
                tracing::debug!(view_id = %view_id, "replaced commit handler");
            } else {
                tracing::debug!(view_id = %view_id, "registered commit handler");
            }
            token
        };

        Ok(Registration {
            registry: Rc::downgrade(&self.state),
            view_id,
            token,
        })
    }

    /// Removes the handler for `view_id`. Unknown ids are a no-op.
    pub fn unregister(&self, view_id: &str) -> bool {
        let removed = self.state.borrow_mut().entries.shift_remove(view_id).is_some();
        if removed {
            tracing::debug!(view_id, "unregistered commit handler");
        }
        removed
    }

    pub fn get(&self, view_id: &str) -> Option<Rc<dyn CommitHandler>> {
        self.state
            .borrow()
            .entries
            .get(view_id)
            .map(|e| Rc::clone(&e.handler))
    }

    pub fn contains(&self, view_id: &str) -> bool {
        self.state.borrow().entries.contains_key(view_id)
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.state.borrow().entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.state.borrow_mut().entries.clear();
    }
}

/// Handle returned by [`ViewRegistry::register`].
#[must_use = "dropping a Registration leaves the handler installed; call unregister() on unmount"]
pub struct Registration {
    registry: Weak<RefCell<RegistryState>>,
    view_id: String,
    token: u64,
}

impl Registration {
    pub fn view_id(&self) -> &str {
        &self.view_id
    }

    /// Removes the handler if it is still the one this handle installed.
    pub fn unregister(self) -> bool {
        let Some(state) = self.registry.upgrade() else {
            return false;
        };
        let mut state = state.borrow_mut();
        let owned = matches!(
            state.entries.get(&self.view_id),
            Some(entry) if entry.token == self.token
        );
        if owned {
            state.entries.shift_remove(&self.view_id);
            tracing::debug!(view_id = %self.view_id, "unregistered commit handler");
        }
        owned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::commit_fn;
    use crate::error::CommitError;
    use crate::store::DocumentStore;

    fn noop() -> Rc<dyn CommitHandler> {
        Rc::new(commit_fn(|_store: DocumentStore| async { Ok::<_, CommitError>(()) }))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ViewRegistry::new();
        let _a = registry.register("general", noop()).unwrap();
        let _b = registry.register("contracts", noop()).unwrap();

        assert!(registry.contains("general"));
        assert!(registry.get("contracts").is_some());
        assert!(registry.get("risks").is_none());
        assert_eq!(registry.ids(), vec!["general".to_string(), "contracts".to_string()]);
    }

    #[test]
    fn test_reregister_overwrites_in_place() {
        let registry = ViewRegistry::new();
        let _a = registry.register("a", noop()).unwrap();
        let _b = registry.register("b", noop()).unwrap();
        let _a2 = registry.register("a", noop()).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_stale_registration_does_not_remove_newer_handler() {
        let registry = ViewRegistry::new();
        let first = registry.register("a", noop()).unwrap();
        let second = registry.register("a", noop()).unwrap();

        assert!(!first.unregister());
        assert!(registry.contains("a"));
        assert!(second.unregister());
        assert!(!registry.contains("a"));
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let registry = ViewRegistry::new();
        assert!(!registry.unregister("ghost"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reserved_id_rejected() {
        let registry = ViewRegistry::new();
        assert!(matches!(
            registry.register(ALL_VIEWS, noop()),
            Err(ScenarioError::ReservedViewId(_))
        ));
    }
}
