//! Types exchanged with the external simulation service.
//!
//! The numbers themselves are computed elsewhere; the session only routes
//! each keyed result back into the document.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::node::Node;
use crate::remote::Envelope;

pub const DEFAULT_ITERATIONS: u32 = 10_000;

/// One distribution to sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSpec {
    pub id: String,
    /// Distribution family, e.g. `normal` or `triangular`.
    pub distribution: String,
    #[serde(default)]
    pub params: Node,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub percentiles: Vec<f64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            seed: None,
            percentiles: vec![5.0, 50.0, 95.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub distributions: Vec<DistributionSpec>,
    pub config: RunConfig,
}

/// Result series keyed by percentile label (`p5`, `p50`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PercentileSeries(pub BTreeMap<String, Vec<f64>>);

impl PercentileSeries {
    pub fn get(&self, percentile: f64) -> Option<&[f64]> {
        self.0.get(&percentile_label(percentile)).map(Vec::as_slice)
    }
}

impl From<&PercentileSeries> for Node {
    fn from(series: &PercentileSeries) -> Self {
        let object = series
            .0
            .iter()
            .map(|(label, values)| {
                let values: Vec<Node> = values.iter().copied().map(Node::from).collect();
                (label.clone(), Node::from(values))
            })
            .collect::<crate::node::Object>();
        Node::from(object)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationResponse {
    pub results: BTreeMap<String, PercentileSeries>,
}

/// Label of a percentile: `5.0` is `p5`, `97.5` is `p97.5`.
pub fn percentile_label(percentile: f64) -> String {
    if percentile.fract() == 0.0 {
        format!("p{}", percentile as i64)
    } else {
        format!("p{}", percentile)
    }
}

/// Runs Monte Carlo batches on behalf of the session.
#[async_trait(?Send)]
pub trait SimulationService {
    async fn simulate(&self, request: &SimulationRequest) -> Envelope<SimulationResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_percentile_label() {
        assert_eq!(percentile_label(5.0), "p5");
        assert_eq!(percentile_label(50.0), "p50");
        assert_eq!(percentile_label(97.5), "p97.5");
    }

    #[test]
    fn test_run_config_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.iterations, 10_000);
        assert_eq!(config.percentiles, vec![5.0, 50.0, 95.0]);
        let value = serde_json::to_value(&config).unwrap();
        assert!(value.get("seed").is_none());
    }

    #[test]
    fn test_response_wire_format_and_node() {
        let response: SimulationResponse = serde_json::from_value(json!({
            "results": {"capex": {"p5": [1.0, 2.0], "p95": [3.0, 4.0]}}
        }))
        .unwrap();
        let series = &response.results["capex"];
        assert_eq!(series.get(95.0), Some(&[3.0, 4.0][..]));

        assert_eq!(
            Value::from(Node::from(series)),
            json!({"p5": [1.0, 2.0], "p95": [3.0, 4.0]})
        );
    }
}
