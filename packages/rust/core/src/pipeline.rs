//! Resumable enrichment run: checkpoint → resume set → dispatch → worker pool → finalize.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use reelfill_shared::{
    ErrorRecord, LinkRow, LocalId, MovieRecord, PipelineConfig, RatingStats, ReelfillError,
    Result, RunId, WorkItem,
};
use reelfill_storage::Storage;
use reelfill_tmdb::RemoteSource;

use crate::checkpoint::CheckpointStore;
use crate::enrich::enrich_record;
use crate::missing::MissingIdSink;
use crate::resume::build_resume_set;

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Lifecycle of one enrichment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    LoadingCheckpoint,
    Dispatching,
    Draining,
    Finalizing,
    Done,
    Failed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::LoadingCheckpoint => "loading checkpoint",
            Self::Dispatching => "dispatching",
            Self::Draining => "draining",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress callback for enrichment runs.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, phase: RunPhase);
    /// Called after every attempted item, successful or not.
    fn item_done(&self, current: u64, total: u64);
    /// Called when the run completes.
    fn done(&self, report: &EnrichReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _phase: RunPhase) {}
    fn item_done(&self, _current: u64, _total: u64) {}
    fn done(&self, _report: &EnrichReport) {}
}

// ---------------------------------------------------------------------------
// Dispatch planning
// ---------------------------------------------------------------------------

/// Outcome of walking the input rows once.
#[derive(Debug, Default)]
pub struct DispatchPlan {
    /// Items to hand to the worker pool, in input order.
    pub work: Vec<WorkItem>,
    /// Local ids whose remote id is empty.
    pub missing: Vec<LocalId>,
    /// Rows already present in the checkpoint.
    pub skipped: usize,
    /// Rows whose local id already appeared earlier in the same input.
    pub duplicate_inputs: usize,
}

/// Split input rows into work, missing ids and skips.
///
/// Any row error aborts the plan; nothing is dispatched from a partially
/// read input.
pub fn plan_dispatch<I>(
    rows: I,
    resume: &HashSet<LocalId>,
    stats: &HashMap<LocalId, RatingStats>,
) -> Result<DispatchPlan>
where
    I: IntoIterator<Item = Result<LinkRow>>,
{
    let mut plan = DispatchPlan::default();
    // Every local id is routed once, whichever branch takes it.
    let mut seen: HashSet<LocalId> = HashSet::new();

    for row in rows {
        let LinkRow {
            local_id,
            remote_id,
        } = row?;

        if !seen.insert(local_id.clone()) {
            warn!(%local_id, %remote_id, "local id repeated in input, keeping first");
            plan.duplicate_inputs += 1;
            continue;
        }
        if remote_id.is_empty() {
            plan.missing.push(local_id);
            continue;
        }
        if resume.contains(&local_id) {
            plan.skipped += 1;
            continue;
        }

        let rating = stats.get(&local_id).copied().unwrap_or_default();
        let record = MovieRecord::with_stats(local_id, rating);
        plan.work.push(WorkItem::new(remote_id, record));
    }

    Ok(plan)
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Result of one enrichment run.
#[derive(Debug)]
pub struct EnrichReport {
    pub run_id: RunId,
    /// Items enriched during this run.
    pub enriched: usize,
    /// Items skipped because the checkpoint already held them.
    pub skipped: usize,
    /// Local ids without a remote counterpart.
    pub missing: Vec<LocalId>,
    pub duplicate_inputs: usize,
    /// Full checkpoint contents after the final save.
    pub records: Vec<MovieRecord>,
    /// Per-item failures, sorted by local id.
    pub failures: Vec<ErrorRecord>,
    /// Non-fatal problems (periodic save failures, worker panics).
    pub warnings: Vec<String>,
    pub elapsed: Duration,
}

impl EnrichReport {
    /// Turn collected per-item failures into one combined error.
    pub fn ensure_complete(&self) -> Result<()> {
        if self.failures.is_empty() {
            return Ok(());
        }
        let report = self
            .failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        Err(ReelfillError::RemoteFailures {
            count: self.failures.len(),
            report,
        })
    }

    /// Summary stored alongside the run in the database.
    pub fn summary_json(&self) -> String {
        serde_json::json!({
            "run_id": self.run_id.to_string(),
            "enriched": self.enriched,
            "skipped": self.skipped,
            "missing": self.missing.len(),
            "duplicate_inputs": self.duplicate_inputs,
            "failed": self.failures.len(),
            "warnings": self.warnings.len(),
            "total_records": self.records.len(),
            "elapsed_ms": self.elapsed.as_millis() as u64,
            "finished_at": chrono::Utc::now().to_rfc3339(),
        })
        .to_string()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// State touched by every worker.
struct Shared {
    queue: Mutex<mpsc::Receiver<WorkItem>>,
    records: Mutex<Vec<MovieRecord>>,
    failures: Mutex<Vec<ErrorRecord>>,
    warnings: Mutex<Vec<String>>,
    completed: AtomicU64,
    checkpoint: CheckpointStore,
    save_interval: u64,
}

/// Run one resumable enrichment pass.
///
/// `connect` builds one remote source per worker before any worker starts.
/// Per-item remote failures never abort the run: they are collected in the
/// returned report. Use [`EnrichReport::ensure_complete`] to turn them into
/// an error after the results have been persisted.
#[instrument(skip_all, fields(workers = config.workers, save_interval = config.save_interval))]
pub async fn run_enrichment<S, F, I>(
    config: &PipelineConfig,
    rows: I,
    stats: &HashMap<LocalId, RatingStats>,
    connect: F,
    store: Option<&Storage>,
    progress: &dyn ProgressReporter,
) -> Result<EnrichReport>
where
    S: RemoteSource,
    F: Fn(usize) -> Result<S>,
    I: IntoIterator<Item = Result<LinkRow>>,
{
    match run_phases(config, rows, stats, connect, store, progress).await {
        Ok(report) => {
            progress.phase(RunPhase::Done);
            progress.done(&report);
            Ok(report)
        }
        Err(e) => {
            error!(error = %e, "enrichment run failed");
            progress.phase(RunPhase::Failed);
            Err(e)
        }
    }
}

async fn run_phases<S, F, I>(
    config: &PipelineConfig,
    rows: I,
    stats: &HashMap<LocalId, RatingStats>,
    connect: F,
    store: Option<&Storage>,
    progress: &dyn ProgressReporter,
) -> Result<EnrichReport>
where
    S: RemoteSource,
    F: Fn(usize) -> Result<S>,
    I: IntoIterator<Item = Result<LinkRow>>,
{
    let start = Instant::now();
    let started_at = chrono::Utc::now();
    let run_id = RunId::new();
    progress.phase(RunPhase::Init);
    info!(%run_id, checkpoint = %config.checkpoint_path.display(), "starting enrichment run");

    // --- Load checkpoint ---
    progress.phase(RunPhase::LoadingCheckpoint);
    let checkpoint = CheckpointStore::new(&config.checkpoint_path);
    let existing = checkpoint.load().await?;
    let resume = build_resume_set(&existing)?;

    // --- Dispatch ---
    progress.phase(RunPhase::Dispatching);
    let plan = plan_dispatch(rows, &resume, stats)?;
    let total = plan.work.len() as u64;
    info!(
        queued = total,
        skipped = plan.skipped,
        missing = plan.missing.len(),
        duplicate_inputs = plan.duplicate_inputs,
        "input dispatched"
    );

    let worker_count = config.workers.max(1);
    let sources = (0..worker_count).map(&connect).collect::<Result<Vec<S>>>()?;

    let (work_tx, work_rx) = mpsc::channel(plan.work.len().max(1));
    for item in plan.work {
        // Capacity covers every item and the receiver is alive.
        if work_tx.send(item).await.is_err() {
            return Err(ReelfillError::config("work queue closed before dispatch finished"));
        }
    }
    drop(work_tx);

    let shared = Arc::new(Shared {
        queue: Mutex::new(work_rx),
        records: Mutex::new(existing),
        failures: Mutex::new(Vec::new()),
        warnings: Mutex::new(Vec::new()),
        completed: AtomicU64::new(0),
        checkpoint,
        save_interval: config.save_interval,
    });

    let (tick_tx, mut tick_rx) = mpsc::unbounded_channel::<u64>();
    let mut workers = JoinSet::new();
    for (worker, source) in sources.into_iter().enumerate() {
        workers.spawn(worker_loop(worker, source, shared.clone(), tick_tx.clone()));
    }
    drop(tick_tx);

    // --- Drain ---
    progress.phase(RunPhase::Draining);
    while let Some(current) = tick_rx.recv().await {
        progress.item_done(current, total);
    }
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(attempted) => debug!(attempted, "worker finished"),
            Err(e) => {
                warn!(error = %e, "worker task aborted");
                shared.warnings.lock().await.push(format!("worker task aborted: {e}"));
            }
        }
    }

    // --- Finalize ---
    progress.phase(RunPhase::Finalizing);
    let records = std::mem::take(&mut *shared.records.lock().await);
    let mut failures = std::mem::take(&mut *shared.failures.lock().await);
    failures.sort_by(|a, b| a.local_id.cmp(&b.local_id));
    let warnings = std::mem::take(&mut *shared.warnings.lock().await);
    let enriched = records.len() - resume.len();

    let saved = shared.checkpoint.save(&records).await;
    let missing_sink = MissingIdSink::new(&config.missing_path);
    let missing_saved = missing_sink.save(&plan.missing).await;
    saved?;
    missing_saved?;

    let report = EnrichReport {
        run_id,
        enriched,
        skipped: plan.skipped,
        missing: plan.missing,
        duplicate_inputs: plan.duplicate_inputs,
        records,
        failures,
        warnings,
        elapsed: start.elapsed(),
    };

    if let Some(store) = store {
        let run_id = report.run_id.to_string();
        store.insert_run(&run_id, started_at).await?;
        let written = store.upsert_movies(&report.records).await?;
        store.finish_run(&run_id, &report.summary_json()).await?;
        info!(written, "records handed to store");
    }

    info!(
        enriched = report.enriched,
        skipped = report.skipped,
        failed = report.failures.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "enrichment run complete"
    );
    Ok(report)
}

/// Pull items until the queue is empty. Returns the number attempted.
async fn worker_loop<S: RemoteSource>(
    worker: usize,
    source: S,
    shared: Arc<Shared>,
    ticks: mpsc::UnboundedSender<u64>,
) -> u64 {
    let mut attempted = 0u64;

    loop {
        let next = shared.queue.lock().await.recv().await;
        let Some(WorkItem {
            local_id,
            remote_id,
            mut record,
        }) = next
        else {
            break;
        };
        attempted += 1;

        match enrich_record(&source, &remote_id, &mut record).await {
            Ok(()) => {
                debug!(worker, %local_id, %remote_id, "enriched");
                shared.records.lock().await.push(record);
            }
            Err(e) => {
                warn!(worker, %local_id, %remote_id, error = %e, "enrichment failed");
                shared.failures.lock().await.push(ErrorRecord {
                    local_id,
                    remote_id,
                    cause: e.to_string(),
                });
            }
        }

        let completed = shared.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if shared.save_interval > 0 && completed % shared.save_interval == 0 {
            periodic_save(worker, completed, &shared).await;
        }
        let _ = ticks.send(completed);
    }

    attempted
}

async fn periodic_save(worker: usize, completed: u64, shared: &Shared) {
    let snapshot = shared.records.lock().await.clone();
    match shared.checkpoint.save(&snapshot).await {
        Ok(()) => info!(worker, completed, records = snapshot.len(), "checkpoint saved"),
        Err(e) => {
            warn!(worker, completed, error = %e, "periodic checkpoint save failed");
            shared
                .warnings
                .lock()
                .await
                .push(format!("checkpoint save at {completed} completions failed: {e}"));
        }
    }
}
