//! The scrape loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

use super::plan::{CollectorPlan, PlanOptions};
use super::report::{IterationReport, SkipStage, SkippedCollector, StatusHandle};
use crate::catalog::CollectorStore;
use crate::exposition::{ExpositionSink, RowExporter, ServiceGauges};
use crate::fetch::{FetchError, ReportFetcher};
use crate::query::{Macros, MaterializedQuery, Materializer, Overrides};
use crate::registry::RegistryIndex;
use crate::selector::{Resolver, Selection};

/// Default delay between iterations (15 minutes).
pub const DEFAULT_DELAY: Duration = Duration::from_secs(15 * 60);
/// Default per-report fetch timeout.
pub const DEFAULT_FETCHING_TIMEOUT: Duration = Duration::from_secs(120);
/// Default number of concurrent report fetches.
pub const DEFAULT_MAX_PARALLEL: usize = 4;
/// Default export namespace.
pub const DEFAULT_NAMESPACE: &str = "googleads";

/// Account label used when no accounts are configured.
const DEFAULT_ACCOUNT_LABEL: &str = "default";

/// Scrape loop settings.
#[derive(Debug, Clone)]
pub struct ExporterOptions {
    pub namespace: String,
    /// Sleep between the end of one iteration and the start of the next.
    pub delay: Duration,
    /// Stop after this many iterations; run forever when `None`.
    pub iterations: Option<u64>,
    pub max_parallel: usize,
    pub fetching_timeout: Duration,
    pub expose_zero_values: bool,
    /// Accounts every collector is fetched for; empty means the fetcher default.
    pub accounts: Vec<String>,
    /// Add a `mapping` service collector when the resolved set has none.
    pub service_collectors: bool,
    /// Drop collectors similar to a more granular one.
    pub deduplicate: bool,
}

impl ExporterOptions {
    fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            service_collectors: self.service_collectors,
            deduplicate: self.deduplicate,
        }
    }
}

impl Default for ExporterOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            delay: DEFAULT_DELAY,
            iterations: None,
            max_parallel: DEFAULT_MAX_PARALLEL,
            fetching_timeout: DEFAULT_FETCHING_TIMEOUT,
            expose_zero_values: false,
            accounts: Vec::new(),
            service_collectors: true,
            deduplicate: true,
        }
    }
}

/// Resolves, materializes, fetches and exposes collectors on a fixed delay.
pub struct Exporter {
    store: Arc<CollectorStore>,
    index: Arc<RegistryIndex>,
    selection: Selection,
    macros: Macros,
    overrides: HashMap<String, Overrides>,
    materializer: Materializer,
    fetcher: Arc<dyn ReportFetcher>,
    sink: Arc<dyn ExpositionSink>,
    options: ExporterOptions,
    status: StatusHandle,
    iteration: AtomicU64,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("selection", &self.selection.to_string())
            .field("collectors", &self.store.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Outcome of one (collector, account) fetch task.
struct FetchOutcome {
    collector: String,
    account: Option<String>,
    result: Result<usize, String>,
}

impl Exporter {
    pub fn new(
        store: Arc<CollectorStore>,
        index: Arc<RegistryIndex>,
        fetcher: Arc<dyn ReportFetcher>,
        sink: Arc<dyn ExpositionSink>,
        options: ExporterOptions,
    ) -> Self {
        Self {
            store,
            index,
            selection: Selection::empty(),
            macros: Macros::new(),
            overrides: HashMap::new(),
            materializer: Materializer::new(&options.namespace),
            fetcher,
            sink,
            options,
            status: StatusHandle::new(),
            iteration: AtomicU64::new(0),
        }
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_macros(mut self, macros: Macros) -> Self {
        self.macros = macros;
        self
    }

    /// Per-collector overrides, keyed by collector name.
    pub fn with_overrides(mut self, overrides: HashMap<String, Overrides>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Share an existing status handle, e.g. with the HTTP server.
    pub fn with_status(mut self, status: StatusHandle) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn options(&self) -> &ExporterOptions {
        &self.options
    }

    /// Run one iteration and publish its report.
    ///
    /// Never fails: a resolution error skips the whole iteration, while
    /// materialization and fetch errors only skip the affected collector.
    pub async fn run_iteration(&self) -> IterationReport {
        let iteration = self.iteration.fetch_add(1, Ordering::Relaxed) + 1;
        let started_at = Utc::now();
        let clock = Instant::now();

        let mut report = IterationReport {
            iteration,
            started_at: Some(started_at),
            selection: self.selection.to_string(),
            ..Default::default()
        };

        let gauges = ServiceGauges::new(self.sink.as_ref());
        if let Err(e) = gauges.export_started(started_at, self.options.delay) {
            tracing::warn!(error = %e, "Failed to record export start");
        }

        let resolved = match Resolver::new(&self.store, &self.index).resolve(&self.selection) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::error!(
                    iteration,
                    selection = %self.selection,
                    error = %e,
                    "Failed to resolve collectors, skipping iteration"
                );
                report.error = Some(e.to_string());
                return self.finish(report, clock).await;
            }
        };
        let plan = CollectorPlan::build(&resolved, self.options.plan_options());
        if let Some(level) = plan.generated_mapping {
            tracing::info!(iteration, %level, "Added mapping service collector");
        }
        report.collectors = plan.names().into_iter().map(str::to_string).collect();
        report.deduplicated = plan.dropped;
        tracing::info!(iteration, collectors = ?report.collectors, "Starting export");

        let no_overrides = Overrides::new();
        let mut queries = Vec::with_capacity(plan.collectors.len());
        for definition in &plan.collectors {
            let overrides = self.overrides.get(&definition.name).unwrap_or(&no_overrides);
            match self
                .materializer
                .materialize(definition, &self.macros, overrides)
            {
                Ok(query) => {
                    tracing::debug!(collector = %definition.name, query = %query.query_text, "Materialized query");
                    queries.push(Arc::new(query));
                }
                Err(e) => {
                    tracing::error!(collector = %definition.name, error = %e, "Failed to materialize collector, skipping");
                    report.skipped.push(SkippedCollector {
                        collector: definition.name.clone(),
                        account: None,
                        stage: SkipStage::Materialize,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let mut tasks = self.spawn_fetches(&queries);
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "Fetch task failed");
                    continue;
                }
            };
            match outcome.result {
                Ok(samples) => report.samples += samples,
                Err(reason) => {
                    tracing::error!(
                        collector = %outcome.collector,
                        account = outcome.account.as_deref().unwrap_or(DEFAULT_ACCOUNT_LABEL),
                        error = %reason,
                        "Failed to fetch report"
                    );
                    report.skipped.push(SkippedCollector {
                        collector: outcome.collector,
                        account: outcome.account,
                        stage: SkipStage::Fetch,
                        reason,
                    });
                }
            }
        }

        self.finish(report, clock).await
    }

    fn spawn_fetches(&self, queries: &[Arc<MaterializedQuery>]) -> JoinSet<FetchOutcome> {
        let accounts: Vec<Option<String>> = if self.options.accounts.is_empty() {
            vec![None]
        } else {
            self.options.accounts.iter().cloned().map(Some).collect()
        };
        let semaphore = Arc::new(Semaphore::new(self.options.max_parallel.max(1)));
        let rows = RowExporter::new(self.options.expose_zero_values);
        let timeout = self.options.fetching_timeout;

        let mut tasks = JoinSet::new();
        for query in queries {
            for account in &accounts {
                let query = Arc::clone(query);
                let account = account.clone();
                let semaphore = Arc::clone(&semaphore);
                let fetcher = Arc::clone(&self.fetcher);
                let sink = Arc::clone(&self.sink);

                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    let result =
                        fetch_and_expose(&query, account.as_deref(), fetcher, sink, rows, timeout)
                            .await;
                    FetchOutcome {
                        collector: query.collector.clone(),
                        account,
                        result,
                    }
                });
            }
        }
        tasks
    }

    async fn finish(&self, mut report: IterationReport, clock: Instant) -> IterationReport {
        let completed_at = Utc::now();
        report.completed_at = Some(completed_at);
        if let Err(e) =
            ServiceGauges::new(self.sink.as_ref()).export_completed(completed_at, clock.elapsed())
        {
            tracing::warn!(error = %e, "Failed to record export completion");
        }
        tracing::info!(
            iteration = report.iteration,
            collectors = report.collectors.len(),
            skipped = report.skipped.len(),
            samples = report.samples,
            elapsed = ?clock.elapsed(),
            "Export finished"
        );
        self.status.publish(report.clone()).await;
        report
    }

    /// Repeat iterations until the iteration limit or a shutdown signal.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut completed = 0u64;
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.run_iteration().await;
            completed += 1;

            if self.options.iterations.is_some_and(|limit| completed >= limit) {
                tracing::info!(iterations = completed, "Iteration limit reached, stopping exporter");
                break;
            }

            tracing::debug!(delay = ?self.options.delay, "Sleeping until next export");
            tokio::select! {
                _ = tokio::time::sleep(self.options.delay) => {}
                _ = shutdown.changed() => {
                    tracing::info!("Shutdown requested, stopping exporter");
                    break;
                }
            }
        }
    }
}

async fn fetch_and_expose(
    query: &MaterializedQuery,
    account: Option<&str>,
    fetcher: Arc<dyn ReportFetcher>,
    sink: Arc<dyn ExpositionSink>,
    rows: RowExporter,
    timeout: Duration,
) -> Result<usize, String> {
    let account_label = account.unwrap_or(DEFAULT_ACCOUNT_LABEL);
    let gauges = ServiceGauges::new(sink.as_ref());

    let fetch_clock = Instant::now();
    let fetched = match tokio::time::timeout(timeout, fetcher.fetch(query, account)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(timeout)),
    }
    .map_err(|e| e.to_string())?;
    if let Err(e) = gauges.report_fetched(&query.collector, account_label, fetch_clock.elapsed()) {
        tracing::warn!(collector = %query.collector, error = %e, "Failed to record fetch time");
    }

    let export_clock = Instant::now();
    let samples = rows.samples(query, &fetched);
    let mut exposed = 0;
    for sample in &samples {
        match sink.set_gauge(sample) {
            Ok(()) => exposed += 1,
            Err(e) => {
                tracing::warn!(collector = %query.collector, metric = %sample.name, error = %e, "Failed to expose sample");
            }
        }
    }
    if let Err(e) = gauges.report_exported(&query.collector, account_label, export_clock.elapsed())
    {
        tracing::warn!(collector = %query.collector, error = %e, "Failed to record export time");
    }

    tracing::debug!(
        collector = %query.collector,
        account = account_label,
        rows = fetched.len(),
        samples = exposed,
        "Report exported"
    );
    Ok(exposed)
}
