//! Per-consumer request options.

use crate::metrics::RequestMetrics;
use crate::topology::DatasetTopology;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Endpoint name fragments that imply a heavy (time-series) payload.
pub const HEAVY_ENDPOINT_MARKERS: &[&str] = &["timeseries", "hourly", "dispatch", "profile"];

/// Callback invoked with the metrics of every completed request.
pub type ProgressCallback = Arc<dyn Fn(&RequestMetrics) + Send + Sync>;

/// Callback invoked once the dataset topology for a scope is known.
pub type ClassificationCallback = Arc<dyn Fn(&DatasetTopology) + Send + Sync>;

/// Scheduling priority. Lower rank runs first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Data the user is actively looking at.
    High,
    /// Default priority.
    #[default]
    Normal,
    /// Background or speculative loads.
    Low,
}

impl Priority {
    /// Numeric rank used for queue ordering (HIGH=0, NORMAL=1, LOW=2).
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(format!(
                "unknown priority '{}', expected high, normal or low",
                other
            )),
        }
    }
}

/// Whether to ask the backend for the heavy part of a payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeavyPayload {
    /// Decide from the endpoint name (see [`HEAVY_ENDPOINT_MARKERS`]).
    #[default]
    Auto,
    /// Always include.
    Include,
    /// Never include.
    Exclude,
}

impl HeavyPayload {
    /// Resolves the setting for a concrete endpoint.
    pub fn resolve(self, endpoint: &str) -> bool {
        match self {
            HeavyPayload::Include => true,
            HeavyPayload::Exclude => false,
            HeavyPayload::Auto => {
                let endpoint = endpoint.to_ascii_lowercase();
                HEAVY_ENDPOINT_MARKERS
                    .iter()
                    .any(|marker| endpoint.contains(marker))
            }
        }
    }
}

/// Qualifier selecting one slice of a multi-period dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubResource {
    /// A single investment year.
    Year(i32),
    /// A named period.
    Period(String),
}

impl SubResource {
    pub(crate) fn query_pair(&self) -> (&'static str, String) {
        match self {
            SubResource::Year(year) => ("year", year.to_string()),
            SubResource::Period(period) => ("period", period.clone()),
        }
    }
}

/// Options recognised by a fetch consumer.
#[derive(Clone)]
pub struct FetchOptions {
    /// Heavy payload selection
    pub include_heavy_payload: HeavyPayload,
    /// Allow cached responses (dedup cache and backend cache-control)
    pub use_cache: bool,
    /// Scheduling priority
    pub priority: Priority,
    /// Period/year qualifier
    pub sub_resource: Option<SubResource>,
    /// Retry budget for this consumer; `None` uses the context default
    pub max_retries: Option<u32>,
    /// Metrics callback
    pub on_progress: Option<ProgressCallback>,
    /// Topology callback
    pub on_classification_detected: Option<ClassificationCallback>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            include_heavy_payload: HeavyPayload::Auto,
            use_cache: true,
            priority: Priority::Normal,
            sub_resource: None,
            max_retries: None,
            on_progress: None,
            on_classification_detected: None,
        }
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("include_heavy_payload", &self.include_heavy_payload)
            .field("use_cache", &self.use_cache)
            .field("priority", &self.priority)
            .field("sub_resource", &self.sub_resource)
            .field("max_retries", &self.max_retries)
            .field("on_progress", &self.on_progress.is_some())
            .field(
                "on_classification_detected",
                &self.on_classification_detected.is_some(),
            )
            .finish()
    }
}

impl FetchOptions {
    pub fn with_heavy_payload(mut self, heavy: HeavyPayload) -> Self {
        self.include_heavy_payload = heavy;
        self
    }

    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_sub_resource(mut self, sub_resource: SubResource) -> Self {
        self.sub_resource = Some(sub_resource);
        self
    }

    /// Opts this consumer into retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(&RequestMetrics) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn on_classification_detected(
        mut self,
        callback: impl Fn(&DatasetTopology) + Send + Sync + 'static,
    ) -> Self {
        self.on_classification_detected = Some(Arc::new(callback));
        self
    }
}
