//! Probe orchestration.
//!
//! A scan for one handle goes through two phases:
//!
//! 1. **Admission** (serialized across the engine): cache fast path, history
//!    reset on refresh, single-flight admission in the [`TaskTracker`], search
//!    record creation, `Pending -> InProgress`.
//! 2. **Fan-out**: a fixed pool of workers pulls sites from a shared queue and
//!    probes them; outcomes come back over a channel and are applied in
//!    completion order by the coordinator, which is the only writer of
//!    found-sites, correlations and progress events for the scan.
//!
//! A fatal probe outcome raises the abort flag so no worker starts another
//! probe, fails the task and returns. Probes already in flight run to the end
//! on their own; their results go nowhere.

use crate::config::EngineConfig;
use crate::progress::{ProgressEvent, ProgressHub, ProgressSink, SinkError, Subscription};
use crate::store::{Correlation, ResultStore, StoreError};
use crate::tracker::{Admission, SearchTask, TaskState, TaskTracker};
use handlehunt_scanner::{
    CatalogSource, HttpProber, ProbeFailure, ProbeOutcome, ScanError, SiteDefinition, SiteProber,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Probe failed: {0}")]
    Probe(ProbeFailure),

    #[error("Probe worker failed: {0}")]
    Worker(String),

    #[error("No task tracked for '{0}'")]
    MissingTask(String),

    #[error(transparent)]
    Scanner(#[from] ScanError),
}

pub type Catalog = Arc<Vec<SiteDefinition>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Discard cached history for the handle and probe from scratch.
    pub force_refresh: bool,
}

impl ScanOptions {
    pub fn refresh() -> Self {
        Self { force_refresh: true }
    }
}

/// Result of [`ScanEngine::scan`], which runs the scan to the end.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    CacheHit(Vec<Correlation>),
    Completed(SearchTask),
    AlreadyInProgress(SearchTask),
}

/// Result of [`ScanEngine::request_scan`], which probes in the background.
#[derive(Debug, Clone)]
pub enum ScanRequest {
    CacheHit(Vec<Correlation>),
    Accepted(SearchTask),
    AlreadyInProgress(SearchTask),
}

enum Prepared {
    Cached(Vec<Correlation>),
    Running(SearchTask),
    Admitted(SearchTask),
}

pub struct ScanEngine {
    config: EngineConfig,
    store: Arc<dyn ResultStore>,
    prober: Arc<dyn SiteProber>,
    tracker: TaskTracker,
    hub: ProgressHub,
    sinks: Vec<Arc<dyn ProgressSink>>,
    catalog: RwLock<Catalog>,
    admission: Mutex<()>,
}

impl ScanEngine {
    /// Engine probing over HTTP with the timeout and user agent from `config`.
    pub fn new(store: Arc<dyn ResultStore>, config: EngineConfig) -> Result<Self, EngineError> {
        let prober = HttpProber::with_config(config.probe_timeout, &config.user_agent)?;
        Ok(Self::with_prober(store, Arc::new(prober), config))
    }

    pub fn with_prober(store: Arc<dyn ResultStore>, prober: Arc<dyn SiteProber>, config: EngineConfig) -> Self {
        Self {
            config,
            store,
            prober,
            tracker: TaskTracker::new(),
            hub: ProgressHub::default(),
            sinks: Vec::new(),
            catalog: RwLock::new(Arc::new(Vec::new())),
            admission: Mutex::new(()),
        }
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_catalog(mut self, sites: Vec<SiteDefinition>) -> Self {
        self.catalog = RwLock::new(Arc::new(sites));
        self
    }

    // Catalog management

    pub async fn catalog(&self) -> Catalog {
        self.catalog.read().await.clone()
    }

    pub async fn set_catalog(&self, sites: Vec<SiteDefinition>) {
        *self.catalog.write().await = Arc::new(sites);
    }

    /// Replace the catalog from `source`. On failure the last-known catalog
    /// (possibly empty) stays in place and scans keep working against it.
    pub async fn refresh_catalog(&self, source: &dyn CatalogSource) -> Result<usize, ScanError> {
        match source.fetch_catalog().await {
            Ok(sites) => {
                let count = sites.len();
                self.set_catalog(sites).await;
                info!("Catalog refreshed with {} sites", count);
                Ok(count)
            }
            Err(e) => {
                let current = self.catalog.read().await.len();
                warn!("{}; keeping last-known catalog of {} sites", e, current);
                Err(e)
            }
        }
    }

    // Caller surface

    pub async fn task_status(&self, handle: &str) -> Option<SearchTask> {
        self.tracker.get(handle).await
    }

    /// Progress for `handle`, ending after its next terminal event.
    pub fn subscribe(&self, handle: &str) -> Subscription {
        self.hub.subscribe(handle)
    }

    /// Admit a scan of the engine's current catalog and probe it on a
    /// background task. Storage failures during admission are returned here.
    pub async fn request_scan(self: &Arc<Self>, handle: &str, force_refresh: bool) -> Result<ScanRequest, EngineError> {
        let catalog = self.catalog().await;

        match self.prepare(handle, catalog.len(), force_refresh).await? {
            Prepared::Cached(correlations) => Ok(ScanRequest::CacheHit(correlations)),
            Prepared::Running(task) => Ok(ScanRequest::AlreadyInProgress(task)),
            Prepared::Admitted(task) => {
                let engine = Arc::clone(self);
                let owned_handle = handle.to_string();
                tokio::spawn(async move {
                    if let Err(e) = engine.fan_out(&owned_handle, catalog).await {
                        warn!("Background search for '{}' failed: {}", owned_handle, e);
                    }
                });
                Ok(ScanRequest::Accepted(task))
            }
        }
    }

    /// Run a scan of `catalog` for `handle` to completion.
    pub async fn scan(&self, handle: &str, catalog: Catalog, options: ScanOptions) -> Result<ScanOutcome, EngineError> {
        match self.prepare(handle, catalog.len(), options.force_refresh).await? {
            Prepared::Cached(correlations) => Ok(ScanOutcome::CacheHit(correlations)),
            Prepared::Running(task) => Ok(ScanOutcome::AlreadyInProgress(task)),
            Prepared::Admitted(_) => self.fan_out(handle, catalog).await.map(ScanOutcome::Completed),
        }
    }

    async fn prepare(&self, handle: &str, total_sites: usize, force_refresh: bool) -> Result<Prepared, EngineError> {
        let _admission = self.admission.lock().await;

        let previous = self.tracker.get(handle).await;
        if let Some(task) = previous.as_ref().filter(|t| t.state.is_active()) {
            info!("Search for '{}' already in progress", handle);
            return Ok(Prepared::Running(task.clone()));
        }

        // A failed scan leaves partial history behind; retrying re-derives it
        let retry = previous.is_some_and(|t| t.state == TaskState::Failed);

        if !force_refresh && !retry && self.store.has_search_record(handle)? {
            info!("Username '{}' has been previously searched", handle);
            return Ok(Prepared::Cached(self.store.get_correlations(handle)?));
        }

        if force_refresh || retry {
            self.store.delete_search_history(handle)?;
            debug!("Cleared search history for '{}'", handle);
        }

        let task = match self.tracker.admit(handle, total_sites).await {
            Admission::Admitted(task) => task,
            Admission::AlreadyRunning(task) => return Ok(Prepared::Running(task)),
        };

        if let Err(e) = self.store.create_search_record(handle) {
            return Err(self.abort(handle, e.into()).await);
        }

        self.tracker.begin(handle).await;
        let task = self.tracker.get(handle).await.unwrap_or(task);
        Ok(Prepared::Admitted(task))
    }

    async fn fan_out(&self, handle: &str, catalog: Catalog) -> Result<SearchTask, EngineError> {
        let started = Instant::now();
        let total_sites = catalog.len();

        let queue: VecDeque<SiteDefinition> = catalog.iter().filter(|site| site.is_enabled()).cloned().collect();
        info!(
            "Started searching for username '{}' on {} sites ({} excluded by the catalog)",
            handle,
            queue.len(),
            total_sites - queue.len()
        );

        let workers = self.config.concurrency.max(1).min(queue.len());
        let queue = Arc::new(Mutex::new(queue));
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::channel::<(SiteDefinition, ProbeOutcome)>(workers.max(1));

        let mut worker_handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let queue = queue.clone();
            let stop = stop.clone();
            let tx = tx.clone();
            let prober = self.prober.clone();
            let handle = handle.to_string();

            worker_handles.push(tokio::spawn(async move {
                debug!("Worker {} started", worker_id);
                while !stop.load(Ordering::Acquire) {
                    let Some(site) = queue.lock().await.pop_front() else {
                        break;
                    };
                    let outcome = prober.probe(&site, &handle).await;
                    if tx.send((site, outcome)).await.is_err() {
                        // coordinator is gone, the scan was aborted
                        break;
                    }
                }
                debug!("Worker {} finished", worker_id);
            }));
        }
        drop(tx);

        let mut fatal = None;
        while let Some((site, outcome)) = rx.recv().await {
            match outcome {
                ProbeOutcome::Found => self.record_found(handle, site, total_sites).await,
                ProbeOutcome::NotFound { status } => {
                    debug!("'{}' not on {} (status {})", handle, site.name, status);
                }
                ProbeOutcome::Skipped => debug!("Skipped {}", site.name),
                ProbeOutcome::Transient(failure) => debug!("Dropped {}", failure),
                ProbeOutcome::Fatal(failure) => {
                    stop.store(true, Ordering::Release);
                    fatal = Some(failure);
                    break;
                }
            }
        }
        drop(rx);

        if let Some(failure) = fatal {
            return Err(self.abort(handle, EngineError::Probe(failure)).await);
        }

        for worker in worker_handles {
            if let Err(e) = worker.await {
                return Err(self.abort(handle, EngineError::Worker(e.to_string())).await);
            }
        }

        let task = match self.tracker.complete(handle).await {
            Some(task) => task,
            None => self
                .tracker
                .get(handle)
                .await
                .ok_or_else(|| EngineError::MissingTask(handle.to_string()))?,
        };

        info!(
            "Finished searching for username '{}'. Found {} sites in {:.1}s.",
            handle,
            task.found_sites.len(),
            started.elapsed().as_secs_f64()
        );
        self.emit(&ProgressEvent::Complete {
            handle: handle.to_string(),
            final_found: task.found_sites.clone(),
        });

        Ok(task)
    }

    async fn record_found(&self, handle: &str, site: SiteDefinition, total_sites: usize) {
        let Some(found_so_far) = self.tracker.record_found(handle, site.clone()).await else {
            return;
        };

        // The match stays in the task and the event stream even if this fails
        if let Err(e) = self.store.record_correlation(handle, &site) {
            warn!("Could not persist match of '{}' on {}: {}", handle, site.name, e);
        }

        debug!("Username '{}' found on site: {}", handle, site.render(handle));
        self.emit(&ProgressEvent::Progress {
            handle: handle.to_string(),
            found_so_far,
            total_sites,
        });
    }

    async fn abort(&self, handle: &str, err: EngineError) -> EngineError {
        error!("Search for username '{}' failed: {}", handle, err);
        if self.tracker.fail(handle, err.to_string()).await.is_some() {
            self.emit(&ProgressEvent::Failed {
                handle: handle.to_string(),
                error: err.to_string(),
            });
        }
        err
    }

    fn emit(&self, event: &ProgressEvent) {
        match self.hub.emit(event) {
            Ok(()) | Err(SinkError::NoSubscribers(_)) => {}
            Err(e) => warn!("Progress hub: {}", e),
        }
        for sink in &self.sinks {
            if let Err(e) = sink.emit(event) {
                warn!("Progress delivery for '{}' failed: {}", event.handle(), e);
            }
        }
    }
}
