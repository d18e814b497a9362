//! Dataset topology: the shape of a scenario's result data.
//!
//! A scenario's results are either a single period, several periods (with
//! period labels and years), or several result files. Consumers use the
//! topology to decide which sub-resource to request. It is resolved once per
//! `(project, scenario)` scope and kept in a [`TopologyMemo`].

use crate::error::FetchError;
use crate::request::{BackendRequest, FetchOptions, RequestParams, SubResource};
use crate::transport::Transport;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Endpoint answering topology lookups.
pub const DEFAULT_TOPOLOGY_ENDPOINT: &str = "topology";

/// How a scenario's results are organised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetShape {
    SinglePeriod,
    MultiPeriod,
    MultiFile,
}

/// Descriptor returned by the topology endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetTopology {
    pub shape: DatasetShape,
    #[serde(default)]
    pub periods: Vec<String>,
    #[serde(default)]
    pub years: Vec<i32>,
    #[serde(default)]
    pub files: Vec<String>,
}

impl DatasetTopology {
    pub fn single_period() -> Self {
        Self {
            shape: DatasetShape::SinglePeriod,
            periods: Vec::new(),
            years: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Decodes a topology payload.
    pub fn from_payload(payload: &Value) -> Result<Self, FetchError> {
        Self::deserialize(payload)
            .map_err(|e| FetchError::InvalidResponse(format!("invalid topology payload: {}", e)))
    }

    pub fn is_multi_period(&self) -> bool {
        self.shape == DatasetShape::MultiPeriod
    }

    /// The sub-resource a consumer should request when it has no preference:
    /// the latest year of a multi-period dataset, otherwise none.
    pub fn default_sub_resource(&self) -> Option<SubResource> {
        match self.shape {
            DatasetShape::MultiPeriod => self.years.iter().max().map(|y| SubResource::Year(*y)),
            _ => None,
        }
    }
}

/// Simple `(project, scenario) → topology` memo.
#[derive(Debug, Default)]
pub struct TopologyMemo {
    entries: Mutex<HashMap<(String, String), DatasetTopology>>,
}

impl TopologyMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, project_id: &str, scenario_id: &str) -> Option<DatasetTopology> {
        self.entries
            .lock()
            .get(&(project_id.to_string(), scenario_id.to_string()))
            .cloned()
    }

    pub fn insert(&self, project_id: &str, scenario_id: &str, topology: DatasetTopology) {
        self.entries
            .lock()
            .insert((project_id.to_string(), scenario_id.to_string()), topology);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves and memoizes dataset topology through a transport.
#[derive(Debug)]
pub struct TopologyResolver {
    endpoint: String,
    memo: TopologyMemo,
}

impl Default for TopologyResolver {
    fn default() -> Self {
        Self::new(DEFAULT_TOPOLOGY_ENDPOINT)
    }
}

impl TopologyResolver {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            memo: TopologyMemo::new(),
        }
    }

    pub fn memo(&self) -> &TopologyMemo {
        &self.memo
    }

    /// Returns the topology for the scope of `params`, fetching it on the
    /// first call for that scope.
    pub async fn resolve<T: Transport>(
        &self,
        transport: &T,
        params: &RequestParams,
        cancel: &CancellationToken,
    ) -> Result<DatasetTopology, FetchError> {
        let (project, scenario) = params.scope();
        if let Some(topology) = self.memo.get(project, scenario) {
            debug!(project = project, scenario = scenario, "Topology memo hit");
            return Ok(topology);
        }

        let request = BackendRequest::build(
            &self.endpoint,
            &RequestParams::new(project, scenario),
            &FetchOptions::default(),
        );
        let response = transport.get(&request, cancel).await?;
        let topology = DatasetTopology::from_payload(&response.payload)?;

        info!(
            project = project,
            scenario = scenario,
            shape = ?topology.shape,
            periods = topology.periods.len(),
            files = topology.files.len(),
            "Resolved dataset topology"
        );
        self.memo.insert(project, scenario, topology.clone());
        Ok(topology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use crate::transport::BackendResponse;
    use serde_json::json;

    #[test]
    fn test_parse_multi_period() {
        let topology = DatasetTopology::from_payload(&json!({
            "shape": "multi_period",
            "periods": ["summer", "winter"],
            "years": [2030, 2040, 2035]
        }))
        .unwrap();

        assert!(topology.is_multi_period());
        assert_eq!(topology.periods, vec!["summer", "winter"]);
        assert_eq!(topology.default_sub_resource(), Some(SubResource::Year(2040)));
    }

    #[test]
    fn test_parse_single_period_defaults_lists() {
        let topology = DatasetTopology::from_payload(&json!({"shape": "single_period"})).unwrap();
        assert_eq!(topology, DatasetTopology::single_period());
        assert_eq!(topology.default_sub_resource(), None);
    }

    #[test]
    fn test_parse_rejects_unknown_shape() {
        let err = DatasetTopology::from_payload(&json!({"shape": "hexagonal"})).unwrap_err();
        assert!(matches!(err, FetchError::InvalidResponse(_)));
    }

    #[test]
    fn test_memo_keyed_by_scope() {
        let memo = TopologyMemo::new();
        memo.insert("p", "s1", DatasetTopology::single_period());

        assert!(memo.get("p", "s1").is_some());
        assert!(memo.get("p", "s2").is_none());
        assert_eq!(memo.len(), 1);

        memo.clear();
        assert!(memo.is_empty());
    }

    #[tokio::test]
    async fn test_resolver_memoizes_per_scope() {
        let transport = MockTransport::with(|request, _| {
            assert_eq!(request.endpoint, "topology");
            Ok(BackendResponse::new(json!({
                "shape": "multi_file",
                "files": ["a.h5", "b.h5"]
            })))
        });
        let resolver = TopologyResolver::default();
        let cancel = CancellationToken::new();
        let params = RequestParams::new("p", "s").with_filter("region", "north");

        let first = resolver.resolve(&transport, &params, &cancel).await.unwrap();
        let second = resolver.resolve(&transport, &params, &cancel).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.files.len(), 2);
        assert_eq!(transport.calls(), 1);
        assert!(!transport.requests()[0].query.contains_key("region"));
    }
}
