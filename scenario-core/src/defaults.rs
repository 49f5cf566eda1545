//! Default settings used to initialize a fresh scenario.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::json;

use crate::node::Node;
use crate::remote::Envelope;

/// Variant used when none is requested.
pub const DEFAULT_VARIANT: &str = "standard";

/// Source of default settings, consulted only when initializing.
#[async_trait(?Send)]
pub trait DefaultsProvider {
    async fn get_defaults(&self, variant: &str) -> Envelope<Node>;
}

/// Defaults compiled into the binary.
#[derive(Debug, Clone)]
pub struct BuiltinDefaults {
    variants: BTreeMap<String, Node>,
}

impl BuiltinDefaults {
    /// The `blank` and `standard` variants.
    pub fn new() -> Self {
        Self::empty()
            .with_variant("blank", Node::object())
            .with_variant(DEFAULT_VARIANT, standard())
    }

    /// A provider that knows no variants.
    pub fn empty() -> Self {
        Self {
            variants: BTreeMap::new(),
        }
    }

    pub fn with_variant(mut self, name: impl Into<String>, settings: Node) -> Self {
        self.variants.insert(name.into(), settings);
        self
    }

    pub fn variants(&self) -> Vec<&str> {
        self.variants.keys().map(String::as_str).collect()
    }
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self::new()
    }
}

fn standard() -> Node {
    Node::from(json!({
        "general": {
            "currency": "USD",
            "horizonYears": 10,
            "discountRate": 0.08
        },
        "contracts": [],
        "costs": {
            "capex": [],
            "opex": []
        },
        "revenue": {
            "streams": []
        },
        "risks": []
    }))
}

#[async_trait(?Send)]
impl DefaultsProvider for BuiltinDefaults {
    async fn get_defaults(&self, variant: &str) -> Envelope<Node> {
        match self.variants.get(variant) {
            Some(settings) => Envelope::ok(settings.clone()),
            None => Envelope::failure(Some(404), format!("Unknown defaults variant '{}'", variant)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;

    #[tokio::test]
    async fn test_builtin_variants() {
        let defaults = BuiltinDefaults::new();
        assert_eq!(defaults.variants(), vec!["blank", "standard"]);

        let blank = defaults.get_defaults("blank").await.into_data().unwrap();
        assert_eq!(blank, Node::object());

        let standard = defaults.get_defaults(DEFAULT_VARIANT).await.into_data().unwrap();
        assert_eq!(
            standard.get_path(&path!["general", "currency"]),
            Some(&Node::from("USD"))
        );
        assert!(standard.get_path(&path!["costs", "opex"]).unwrap().as_array().is_some());
    }

    #[tokio::test]
    async fn test_unknown_variant_is_404() {
        let envelope = BuiltinDefaults::new().get_defaults("exotic").await;
        assert!(!envelope.success);
        assert_eq!(envelope.status_code, Some(404));
    }

    #[tokio::test]
    async fn test_custom_variant() {
        let defaults = BuiltinDefaults::empty().with_variant("solar", Node::from(json!({"x": 1})));
        assert!(defaults.get_defaults("solar").await.success);
        assert!(!defaults.get_defaults("standard").await.success);
    }
}
