//! Request model: endpoint parameters, consumer options and canonical keys.
//!
//! A [`BackendRequest`] is the fully resolved form of one logical data need.
//! Its [`canonical_key`](BackendRequest::canonical_key) identifies the request
//! for deduplication and in-flight tracking: two requests with the same key
//! are guaranteed to produce the same backend call.

mod options;
mod params;

pub use options::{
    ClassificationCallback, FetchOptions, HeavyPayload, Priority, ProgressCallback, SubResource,
    HEAVY_ENDPOINT_MARKERS,
};
pub use params::RequestParams;

use std::collections::BTreeMap;
use url::form_urlencoded;

/// Query parameter carrying the heavy-payload flag.
pub const INCLUDE_HEAVY_PARAM: &str = "include_heavy";

/// A request ready to be handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRequest {
    /// Endpoint path relative to the API prefix, without surrounding slashes.
    pub endpoint: String,
    /// Query parameters, sorted by name.
    pub query: BTreeMap<String, String>,
    /// Whether the backend may serve a cached response.
    pub use_cache: bool,
}

impl BackendRequest {
    /// Resolves endpoint, parameters and options into a backend request.
    pub fn build(endpoint: &str, params: &RequestParams, options: &FetchOptions) -> Self {
        let endpoint = normalize_endpoint(endpoint);
        let mut query = params.query_pairs();

        if options.include_heavy_payload.resolve(&endpoint) {
            query.insert(INCLUDE_HEAVY_PARAM.to_string(), "true".to_string());
        }
        if let Some(sub) = &options.sub_resource {
            let (name, value) = sub.query_pair();
            query.insert(name.to_string(), value);
        }

        Self {
            endpoint,
            query,
            use_cache: options.use_cache,
        }
    }

    /// Returns the canonical key: endpoint plus sorted, form-encoded
    /// `name=value` pairs.
    ///
    /// Names and values are percent-encoded, so distinct queries never share
    /// a key. `use_cache` is not part of the key; it only changes the
    /// cache-control header, not the requested data.
    pub fn canonical_key(&self) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        if query.is_empty() {
            self.endpoint.clone()
        } else {
            format!("{}?{}", self.endpoint, query)
        }
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    endpoint.trim().trim_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RequestParams {
        RequestParams::new("proj-1", "base")
            .with_file("results.h5")
            .with_filter("region", "north")
    }

    #[test]
    fn test_canonical_key_is_sorted() {
        let request = BackendRequest::build("capacity", &params(), &FetchOptions::default());
        assert_eq!(
            request.canonical_key(),
            "capacity?file_id=results.h5&project_id=proj-1&region=north&scenario_id=base"
        );
    }

    #[test]
    fn test_canonical_key_separates_reserved_characters() {
        let options = FetchOptions::default();
        let joined = RequestParams::new("p", "s").with_filter("a", "1&b=2");
        let split = RequestParams::new("p", "s")
            .with_filter("a", "1")
            .with_filter("b", "2");

        let joined_key = BackendRequest::build("costs", &joined, &options).canonical_key();
        let split_key = BackendRequest::build("costs", &split, &options).canonical_key();
        assert_ne!(joined_key, split_key);
        assert_eq!(joined_key, "costs?a=1%26b%3D2&project_id=p&scenario_id=s");

        let question = RequestParams::new("p", "s").with_filter("q", "x?y=z");
        let plain = RequestParams::new("p", "s")
            .with_filter("q", "x")
            .with_filter("y", "z");
        assert_ne!(
            BackendRequest::build("costs", &question, &options).canonical_key(),
            BackendRequest::build("costs", &plain, &options).canonical_key()
        );

        let odd_name = RequestParams::new("p", "s").with_filter("a=1&b", "2");
        assert_ne!(
            BackendRequest::build("costs", &odd_name, &options).canonical_key(),
            split_key
        );
    }

    #[test]
    fn test_canonical_key_independent_of_filter_order() {
        let a = RequestParams::new("p", "s")
            .with_filter("b", "2")
            .with_filter("a", "1");
        let b = RequestParams::new("p", "s")
            .with_filter("a", "1")
            .with_filter("b", "2");
        let options = FetchOptions::default();

        assert_eq!(
            BackendRequest::build("costs", &a, &options).canonical_key(),
            BackendRequest::build("costs", &b, &options).canonical_key()
        );
    }

    #[test]
    fn test_endpoint_slashes_are_trimmed() {
        let options = FetchOptions::default();
        let a = BackendRequest::build("/costs/", &params(), &options);
        let b = BackendRequest::build("costs", &params(), &options);
        assert_eq!(a.canonical_key(), b.canonical_key());
        assert_eq!(a.endpoint, "costs");
    }

    #[test]
    fn test_heavy_payload_auto_detect() {
        let options = FetchOptions::default();
        let heavy = BackendRequest::build("generation/timeseries", &params(), &options);
        assert_eq!(
            heavy.query.get(INCLUDE_HEAVY_PARAM).map(String::as_str),
            Some("true")
        );

        let light = BackendRequest::build("capacity", &params(), &options);
        assert!(!light.query.contains_key(INCLUDE_HEAVY_PARAM));
    }

    #[test]
    fn test_heavy_payload_explicit_override() {
        let options = FetchOptions::default().with_heavy_payload(HeavyPayload::Exclude);
        let request = BackendRequest::build("generation/timeseries", &params(), &options);
        assert!(!request.query.contains_key(INCLUDE_HEAVY_PARAM));

        let options = FetchOptions::default().with_heavy_payload(HeavyPayload::Include);
        let request = BackendRequest::build("capacity", &params(), &options);
        assert!(request.query.contains_key(INCLUDE_HEAVY_PARAM));
    }

    #[test]
    fn test_sub_resource_changes_key() {
        let all = BackendRequest::build("costs", &params(), &FetchOptions::default());
        let year = BackendRequest::build(
            "costs",
            &params(),
            &FetchOptions::default().with_sub_resource(SubResource::Year(2030)),
        );
        assert_ne!(all.canonical_key(), year.canonical_key());
        assert_eq!(year.query.get("year").map(String::as_str), Some("2030"));
    }

    #[test]
    fn test_use_cache_not_in_key() {
        let cached = BackendRequest::build("costs", &params(), &FetchOptions::default());
        let uncached = BackendRequest::build(
            "costs",
            &params(),
            &FetchOptions::default().with_use_cache(false),
        );
        assert_eq!(cached.canonical_key(), uncached.canonical_key());
        assert!(!uncached.use_cache);
    }
}
