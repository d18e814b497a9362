//! Fetch command: runs one orchestrator against the configured backend.

use clap::Args;
use simquery::config::ConfigFile;
use simquery::metrics::RequestMetrics;
use simquery::orchestrator::{FetchContext, FetchOrchestrator, FetchStatus};
use simquery::request::{FetchOptions, HeavyPayload, Priority, RequestParams, SubResource};
use simquery::topology::{DatasetTopology, TopologyResolver};
use simquery::transport::Transport;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::CliError;

/// Arguments for `simquery fetch`.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Endpoint path relative to the API prefix (e.g. "kpis")
    pub endpoint: String,

    /// Project identifier
    #[arg(long)]
    pub project: String,

    /// Scenario identifier
    #[arg(long)]
    pub scenario: String,

    /// Result file identifier
    #[arg(long)]
    pub file: Option<String>,

    /// Extra filter as key=value (repeatable)
    #[arg(long = "filter", value_parser = parse_filter)]
    pub filters: Vec<(String, String)>,

    /// Restrict a multi-period dataset to one year
    #[arg(long, conflicts_with = "period")]
    pub year: Option<i32>,

    /// Restrict a multi-period dataset to one named period
    #[arg(long)]
    pub period: Option<String>,

    /// Scheduling priority: high, normal or low
    #[arg(long, default_value = "normal")]
    pub priority: Priority,

    /// Ask the backend to bypass its own result cache
    #[arg(long)]
    pub no_cache: bool,

    /// Always request the heavy time-series payload
    #[arg(long)]
    pub heavy: bool,

    /// Retry transient failures this many times
    #[arg(long)]
    pub retries: Option<u32>,

    /// Re-trigger the request this many times after the first result
    #[arg(long, default_value_t = 0)]
    pub repeat: u32,

    /// Resolve and print the dataset topology before fetching; a
    /// multi-period dataset without --year or --period defaults to its
    /// latest year
    #[arg(long)]
    pub topology: bool,
}

impl FetchArgs {
    fn params(&self) -> RequestParams {
        let mut params = RequestParams::new(&self.project, &self.scenario);
        if let Some(file) = &self.file {
            params = params.with_file(file);
        }
        for (name, value) in &self.filters {
            params = params.with_filter(name, value);
        }
        params
    }

    fn options(&self) -> FetchOptions {
        let mut options = FetchOptions::default()
            .with_priority(self.priority)
            .with_use_cache(!self.no_cache);
        if self.heavy {
            options = options.with_heavy_payload(HeavyPayload::Include);
        }
        if let Some(retries) = self.retries {
            options = options.with_max_retries(retries);
        }
        if let Some(year) = self.year {
            options = options.with_sub_resource(SubResource::Year(year));
        } else if let Some(period) = &self.period {
            options = options.with_sub_resource(SubResource::Period(period.clone()));
        }
        options
    }
}

/// Parses a `key=value` filter argument.
pub fn parse_filter(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("filter '{}' has an empty key", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Run the fetch command.
pub async fn run(args: FetchArgs, config: &ConfigFile) -> Result<(), CliError> {
    let settings = config.to_context_settings();
    let mut ctx = FetchContext::from_settings(&settings)?;
    if args.topology {
        ctx = ctx.with_topology(TopologyResolver::default());
    }

    info!(
        endpoint = %args.endpoint,
        project = %args.project,
        scenario = %args.scenario,
        base_url = %settings.backend.base_url,
        "Fetching"
    );

    let params = args.params();
    let mut options = args.options();
    if args.topology {
        options = apply_topology(&ctx, &params, options).await?;
    }

    let orchestrator =
        FetchOrchestrator::new(ctx.clone(), args.endpoint.clone(), params, true, options);

    let mut snapshot = orchestrator.settled().await;
    for round in 0..args.repeat {
        if snapshot.status != FetchStatus::Success {
            break;
        }
        if let Some(metrics) = &snapshot.metrics {
            print_metrics(round, metrics);
        }
        orchestrator.refetch();
        snapshot = orchestrator.settled().await;
    }

    match snapshot.status {
        FetchStatus::Success => {
            if let Some(metrics) = &snapshot.metrics {
                print_metrics(args.repeat, metrics);
            }
            if let Some(data) = &snapshot.data {
                println!("{}", serde_json::to_string_pretty(data.as_ref())?);
            }

            let stats = ctx.cache().stats();
            eprintln!(
                "cache: {} hits, {} misses, {} coalesced",
                stats.hits, stats.misses, stats.coalesced
            );
            Ok(())
        }
        _ => Err(CliError::Fetch(
            snapshot
                .error
                .unwrap_or_else(|| format!("request ended in state {}", snapshot.status)),
        )),
    }
}

/// Resolves the topology for the scope of `params`, prints it, and fills in
/// the default sub-resource when none was requested.
async fn apply_topology<T: Transport>(
    ctx: &FetchContext<T>,
    params: &RequestParams,
    options: FetchOptions,
) -> Result<FetchOptions, CliError> {
    let topology = ctx
        .resolve_topology(params, &CancellationToken::new())
        .await
        .map_err(|e| CliError::Fetch(e.user_message()))?;
    let Some(topology) = topology else {
        return Ok(options);
    };

    print_topology(&topology);
    match topology.default_sub_resource() {
        Some(sub) if options.sub_resource.is_none() => {
            info!(sub_resource = ?sub, "Using latest period of multi-period dataset");
            Ok(options.with_sub_resource(sub))
        }
        _ => Ok(options),
    }
}

fn print_metrics(round: u32, metrics: &RequestMetrics) {
    let server = metrics
        .server_elapsed
        .map(|d| format!("{}ms", d.as_millis()))
        .unwrap_or_else(|| "-".to_string());
    let bytes = metrics
        .payload_bytes
        .map(|b| b.to_string())
        .unwrap_or_else(|| "-".to_string());
    eprintln!(
        "[{}] client {}ms, server {}, {} bytes, cache hit: {}",
        round,
        metrics.client_elapsed.as_millis(),
        server,
        bytes,
        metrics.cache_hit
    );
}

fn print_topology(topology: &DatasetTopology) {
    eprintln!(
        "topology: {:?}, {} period(s), {} year(s), {} file(s)",
        topology.shape,
        topology.periods.len(),
        topology.years.len(),
        topology.files.len()
    );
}
