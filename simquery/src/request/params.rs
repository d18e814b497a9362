//! Parameters shared by every backend endpoint.

use std::collections::BTreeMap;

/// Query parameter names for the scope identifiers.
const PROJECT_PARAM: &str = "project_id";
const SCENARIO_PARAM: &str = "scenario_id";
const FILE_PARAM: &str = "file_id";

/// The consistent parameter set sent with every request.
///
/// Identifies the project, scenario and (optionally) result file, plus any
/// endpoint-specific filters. Filters are kept sorted so that equal parameter
/// sets always serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RequestParams {
    /// Project identifier
    pub project_id: String,
    /// Scenario identifier
    pub scenario_id: String,
    /// Result file identifier, when the scenario has several
    pub file_id: Option<String>,
    /// Endpoint-specific filters
    pub filters: BTreeMap<String, String>,
}

impl RequestParams {
    /// Creates parameters for a project and scenario.
    pub fn new(project_id: impl Into<String>, scenario_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            scenario_id: scenario_id.into(),
            file_id: None,
            filters: BTreeMap::new(),
        }
    }

    /// Sets the result file identifier.
    pub fn with_file(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }

    /// Adds or replaces an endpoint-specific filter.
    pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    /// Returns the `(project, scenario)` scope used for topology lookups.
    pub fn scope(&self) -> (&str, &str) {
        (&self.project_id, &self.scenario_id)
    }

    /// Flattens the parameters into sorted query pairs.
    ///
    /// Scope identifiers take precedence over filters with the same name.
    pub(crate) fn query_pairs(&self) -> BTreeMap<String, String> {
        let mut query = self.filters.clone();
        query.insert(PROJECT_PARAM.to_string(), self.project_id.clone());
        query.insert(SCENARIO_PARAM.to_string(), self.scenario_id.clone());
        if let Some(file) = &self.file_id {
            query.insert(FILE_PARAM.to_string(), file.clone());
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_pairs_without_file() {
        let params = RequestParams::new("p1", "s1");
        let query = params.query_pairs();
        assert_eq!(query.len(), 2);
        assert_eq!(query.get("project_id").map(String::as_str), Some("p1"));
        assert!(!query.contains_key("file_id"));
    }

    #[test]
    fn test_identifiers_override_filters() {
        let params = RequestParams::new("p1", "s1").with_filter("project_id", "spoofed");
        assert_eq!(
            params.query_pairs().get("project_id").map(String::as_str),
            Some("p1")
        );
    }

    #[test]
    fn test_with_filter_replaces() {
        let params = RequestParams::new("p", "s")
            .with_filter("carrier", "wind")
            .with_filter("carrier", "solar");
        assert_eq!(params.filters.len(), 1);
        assert_eq!(params.filters["carrier"], "solar");
    }
}
