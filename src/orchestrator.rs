//! Orchestrator — pool registry, routing, lifecycle, and stress testing.
//!
//! The [`Orchestrator`] owns every pool, routes work to the right one
//! (creating it on first use), aggregates system-wide latency statistics,
//! and exposes the operational surface: stress tests, teardown, and rebuild.
//!
//! It is explicitly constructed and passed by reference (typically inside an
//! `Arc`); there is no ambient global instance. Lifecycle mutation — pool
//! creation, teardown, rebuild — is serialized under a dedicated mutex;
//! the hot `process` path only touches per-pool state and the latency
//! windows.

use crate::config::{FoundationSection, OrchestratorConfig};
use crate::pool::{Pool, PoolStats};
use crate::window::RollingWindow;
use crate::{OrchestratorError, WorkUnit};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

// ── Reports ────────────────────────────────────────────────────────────────

/// Outcome of a single [`Orchestrator::process`] call.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    /// The fully processed output unit.
    pub unit: WorkUnit,
    /// Wall-clock time spent scheduling and executing, in milliseconds.
    pub elapsed_ms: f64,
    /// Name of the pool that served the request.
    pub pool: String,
}

/// Outcome of a stress run.
///
/// Partial failure is a first-class outcome: per-unit failures are tallied,
/// never propagated as a batch-level error.
#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    /// Requested iteration count.
    pub iterations: u64,
    /// Units processed successfully.
    pub successes: u64,
    /// Units whose processing failed.
    pub failures: u64,
    /// `successes / iterations` (0.0 for an empty run).
    pub success_rate: f64,
    /// Total wall-clock time for the batch, in milliseconds.
    pub elapsed_ms: f64,
    /// Observed iterations per second.
    pub throughput: f64,
}

/// Mean/p95 summary of a latency window.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LatencySummary {
    /// Arithmetic mean, milliseconds.
    pub mean_ms: f64,
    /// 95th-percentile (nearest-rank), milliseconds.
    pub p95_ms: f64,
    /// Number of samples currently in the window.
    pub samples: usize,
}

/// Per-pool slice of a [`StatusReport`].
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    /// Pool name as registered.
    pub name: String,
    /// Scheduler bookkeeping snapshot, stale ratio included.
    pub stats: PoolStats,
    /// Pool-local latency summary.
    pub latency: LatencySummary,
}

/// Aggregate system snapshot returned by [`Orchestrator::status`].
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Registered pool count.
    pub total_pools: usize,
    /// Live processors across all pools.
    pub total_processors: usize,
    /// Completed executions across all pools.
    pub total_executions: u64,
    /// System-wide latency summary.
    pub system_latency: LatencySummary,
    /// Per-pool snapshots, sorted by name.
    pub pools: Vec<PoolStatus>,
    /// Entries currently in the operational log.
    pub log_entries: usize,
}

/// One timestamped line in the in-memory operational log.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// When the event was recorded (UTC).
    pub at: DateTime<Utc>,
    /// Human-readable event description.
    pub message: String,
}

// ── Background jobs ────────────────────────────────────────────────────────

/// Lifecycle state of a background stress job.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, not yet started.
    Queued,
    /// Currently running.
    Running,
    /// Finished; the stress report is attached.
    Completed {
        /// Final stress report.
        result: StressReport,
    },
    /// Aborted with an error.
    Failed {
        /// Stringified failure cause.
        error: String,
    },
}

/// Tracking record for a background stress job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    /// Job id handed back by [`Orchestrator::submit_stress_job`].
    pub id: String,
    /// Current state.
    pub status: JobStatus,
    /// Submission time (UTC).
    pub created_at: DateTime<Utc>,
    /// Last state transition time (UTC).
    pub updated_at: DateTime<Utc>,
}

// ── Orchestrator ───────────────────────────────────────────────────────────

/// Top-level registry and router owning all pools and system-wide metrics.
pub struct Orchestrator {
    config: OrchestratorConfig,
    pools: DashMap<String, Arc<Pool>>,
    system_latency: Mutex<RollingWindow>,
    pool_latency: DashMap<String, Mutex<RollingWindow>>,
    log: Mutex<Vec<LogEntry>>,
    jobs: DashMap<String, JobRecord>,
    /// Serializes pool creation, teardown, and rebuild.
    lifecycle: Mutex<()>,
}

impl Orchestrator {
    /// Build an orchestrator from a validated configuration.
    pub fn new(config: OrchestratorConfig) -> Self {
        let system_window = config.orchestrator.system_window;
        Self {
            config,
            pools: DashMap::new(),
            system_latency: Mutex::new(RollingWindow::new(system_window)),
            pool_latency: DashMap::new(),
            log: Mutex::new(Vec::new()),
            jobs: DashMap::new(),
            lifecycle: Mutex::new(()),
        }
    }

    /// Build an orchestrator with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(OrchestratorConfig::default())
    }

    /// The active configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // ── Pool management ────────────────────────────────────────────────────

    /// Register a new pool with `initial_size` processors (clamped to ≥ 1).
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::AlreadyExists`] if the name is taken.
    pub fn create_pool(
        &self,
        name: &str,
        initial_size: usize,
    ) -> Result<Arc<Pool>, OrchestratorError> {
        let _guard = self.lifecycle.lock();
        self.create_pool_locked(name, initial_size)
    }

    fn create_pool_locked(
        &self,
        name: &str,
        initial_size: usize,
    ) -> Result<Arc<Pool>, OrchestratorError> {
        use dashmap::mapref::entry::Entry;

        match self.pools.entry(name.to_string()) {
            Entry::Occupied(_) => Err(OrchestratorError::AlreadyExists(format!(
                "pool {name} is already registered"
            ))),
            Entry::Vacant(vacant) => {
                let size = initial_size.max(1);
                let pool = Arc::new(Pool::new(name, size, self.config.pool.to_settings()));
                vacant.insert(pool.clone());
                self.pool_latency.insert(
                    name.to_string(),
                    Mutex::new(RollingWindow::new(self.config.orchestrator.pool_window)),
                );
                self.push_log(format!("pool {name} created with {size} processors"));
                info!(pool = name, size, "pool created");
                Ok(pool)
            }
        }
    }

    /// Fetch a pool, creating it with the configured initial size on first
    /// reference.
    fn pool_or_create(&self, name: &str) -> Arc<Pool> {
        loop {
            if let Some(pool) = self.pools.get(name) {
                return Arc::clone(pool.value());
            }
            match self.create_pool(name, self.config.pool.initial_size) {
                Ok(pool) => return pool,
                // Lost a creation race; the winner's pool is fetched on the
                // next pass.
                Err(_) => continue,
            }
        }
    }

    /// Fetch a registered pool by name.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotFound`] if no pool has that name —
    /// unlike [`Orchestrator::process`], this never auto-creates.
    pub fn pool(&self, name: &str) -> Result<Arc<Pool>, OrchestratorError> {
        self.pools
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| OrchestratorError::NotFound(format!("pool {name} is not registered")))
    }

    // ── Processing ─────────────────────────────────────────────────────────

    /// Wrap `payload` in a work unit, schedule it on `pool_name` (default
    /// pool when `None`, lazily created), and record the elapsed wall-clock
    /// time in both the system-wide and the pool-local latency window.
    ///
    /// When the system-wide p95 exceeds the configured threshold, a scale
    /// hint is fired at the pool that served the request.
    ///
    /// # Errors
    ///
    /// Propagates scheduling errors from the pool (see [`Pool::schedule`]).
    pub async fn process(
        &self,
        payload: Value,
        pool_name: Option<&str>,
    ) -> Result<ProcessReport, OrchestratorError> {
        let name = pool_name
            .unwrap_or(self.config.orchestrator.default_pool.as_str())
            .to_string();
        let pool = self.pool_or_create(&name);

        let unit = WorkUnit::new(payload);
        let started = Instant::now();
        let output = pool.schedule(unit).await?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let p95 = {
            let mut window = self.system_latency.lock();
            window.add(elapsed_ms);
            window.percentile(95.0)
        };
        if let Some(window) = self.pool_latency.get(&name) {
            window.lock().add(elapsed_ms);
        }

        if p95 > self.config.orchestrator.latency_threshold_ms && pool.scale_hint() {
            warn!(pool = %name, p95_ms = p95, "tail latency high, pool scaled");
            self.push_log(format!(
                "latency hint scaled pool {name} (p95 {p95:.1}ms)"
            ));
        }

        Ok(ProcessReport {
            unit: output,
            elapsed_ms,
            pool: name,
        })
    }

    // ── Stress testing ─────────────────────────────────────────────────────

    /// Run `iterations` process calls against the default pool and account
    /// successes and failures.
    ///
    /// Sequential mode loops in the calling task. Concurrent mode fans out
    /// one task per iteration, capped by a semaphore sized from
    /// `[stress] max_concurrency` — the cap is independent of the requested
    /// iteration count. Individual failures are tallied, never abort the
    /// batch.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidArgument`] if `iterations` is
    /// negative.
    pub async fn stress_test(
        self: Arc<Self>,
        iterations: i64,
        concurrent: bool,
    ) -> Result<StressReport, OrchestratorError> {
        if iterations < 0 {
            return Err(OrchestratorError::InvalidArgument(format!(
                "iterations must be non-negative, got {iterations}"
            )));
        }
        let iterations = iterations as u64;
        let started = Instant::now();
        let mut successes = 0u64;
        let mut failures = 0u64;

        if concurrent {
            let semaphore = Arc::new(Semaphore::new(self.config.stress.max_concurrency));
            let mut tasks = JoinSet::new();
            for i in 0..iterations {
                let orchestrator = self.clone();
                let semaphore = semaphore.clone();
                tasks.spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return false,
                    };
                    orchestrator
                        .process(json!({ "stress_iteration": i }), None)
                        .await
                        .is_ok()
                });
            }
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(true) => successes += 1,
                    // A panicked task counts as a failed iteration, not a
                    // failed batch.
                    Ok(false) | Err(_) => failures += 1,
                }
            }
        } else {
            for i in 0..iterations {
                match self.process(json!({ "stress_iteration": i }), None).await {
                    Ok(_) => successes += 1,
                    Err(_) => failures += 1,
                }
            }
        }

        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let report = StressReport {
            iterations,
            successes,
            failures,
            success_rate: if iterations == 0 {
                0.0
            } else {
                successes as f64 / iterations as f64
            },
            elapsed_ms,
            throughput: if elapsed.as_secs_f64() > 0.0 {
                iterations as f64 / elapsed.as_secs_f64()
            } else {
                0.0
            },
        };
        info!(
            iterations,
            successes,
            failures,
            concurrent,
            throughput = report.throughput,
            "stress test finished"
        );
        self.push_log(format!(
            "stress test: {successes}/{iterations} ok ({} mode)",
            if concurrent { "concurrent" } else { "sequential" }
        ));
        Ok(report)
    }

    /// Submit a stress run as a background job and return its id.
    ///
    /// The job transitions queued → running → completed/failed; poll with
    /// [`Orchestrator::job_status`]. Argument validation happens inside the
    /// job, surfacing as a failed job rather than a submit error.
    pub fn submit_stress_job(self: Arc<Self>, iterations: i64, concurrent: bool) -> String {
        let hex = Uuid::new_v4().simple().to_string();
        let job_id = format!("job_{}", &hex[..8]);
        let now = Utc::now();
        self.jobs.insert(
            job_id.clone(),
            JobRecord {
                id: job_id.clone(),
                status: JobStatus::Queued,
                created_at: now,
                updated_at: now,
            },
        );

        let id = job_id.clone();
        tokio::spawn(async move {
            self.update_job(&id, JobStatus::Running);
            let status = match self.clone().stress_test(iterations, concurrent).await {
                Ok(result) => JobStatus::Completed { result },
                Err(e) => JobStatus::Failed {
                    error: e.to_string(),
                },
            };
            self.update_job(&id, status);
        });
        job_id
    }

    /// Current record of a background job.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotFound`] for an unknown job id.
    pub fn job_status(&self, job_id: &str) -> Result<JobRecord, OrchestratorError> {
        self.jobs
            .get(job_id)
            .map(|record| record.value().clone())
            .ok_or_else(|| OrchestratorError::NotFound(format!("job {job_id} is not registered")))
    }

    fn update_job(&self, job_id: &str, status: JobStatus) {
        if let Some(mut record) = self.jobs.get_mut(job_id) {
            record.status = status;
            record.updated_at = Utc::now();
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────────────

    /// Tear down every pool and clear the registry, latency windows, job
    /// table, and operational log.
    ///
    /// Safe to call repeatedly and from any state.
    pub fn teardown(&self) {
        let _guard = self.lifecycle.lock();
        self.teardown_locked();
    }

    fn teardown_locked(&self) {
        for entry in self.pools.iter() {
            entry.value().teardown();
        }
        self.pools.clear();
        self.pool_latency.clear();
        self.system_latency.lock().clear();
        self.jobs.clear();
        self.log.lock().clear();
        info!("orchestrator torn down");
    }

    /// Full teardown followed by creation of `default_pools` pools of
    /// `pool_size` processors each, named `pool_0 .. pool_{n-1}`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::AlreadyExists`] only if a concurrent
    /// caller registers a clashing pool between the teardown and the
    /// rebuild — under the serialized lifecycle lock this cannot happen
    /// from within this method.
    pub fn rebuild_from_foundation(
        &self,
        foundation: &FoundationSection,
    ) -> Result<(), OrchestratorError> {
        let _guard = self.lifecycle.lock();
        self.teardown_locked();
        for i in 0..foundation.default_pools {
            self.create_pool_locked(&format!("pool_{i}"), foundation.pool_size)?;
        }
        self.push_log(format!(
            "rebuilt from foundation: {} pools x {} processors",
            foundation.default_pools, foundation.pool_size
        ));
        info!(
            pools = foundation.default_pools,
            pool_size = foundation.pool_size,
            "rebuilt from foundation"
        );
        Ok(())
    }

    // ── Diagnostics ────────────────────────────────────────────────────────

    /// Aggregate snapshot: totals, latency summaries, and per-pool stale
    /// ratios.
    ///
    /// Takes the lifecycle lock so the snapshot cannot interleave with a
    /// teardown or rebuild; this path is small and low-frequency.
    pub fn status(&self) -> StatusReport {
        let _guard = self.lifecycle.lock();

        let mut pools = Vec::with_capacity(self.pools.len());
        let mut total_processors = 0;
        let mut total_executions = 0;
        for entry in self.pools.iter() {
            let stats = entry.value().stats();
            total_processors += stats.processors;
            total_executions += stats.executions;
            let latency = self
                .pool_latency
                .get(entry.key())
                .map(|window| Self::summarize(&window.lock()))
                .unwrap_or_default();
            pools.push(PoolStatus {
                name: entry.key().clone(),
                stats,
                latency,
            });
        }
        pools.sort_by(|a, b| a.name.cmp(&b.name));

        StatusReport {
            total_pools: pools.len(),
            total_processors,
            total_executions,
            system_latency: Self::summarize(&self.system_latency.lock()),
            pools,
            log_entries: self.log.lock().len(),
        }
    }

    /// Copy of the operational log, oldest first.
    pub fn log_snapshot(&self) -> Vec<LogEntry> {
        self.log.lock().clone()
    }

    fn summarize(window: &RollingWindow) -> LatencySummary {
        LatencySummary {
            mean_ms: window.mean(),
            p95_ms: window.percentile(95.0),
            samples: window.len(),
        }
    }

    fn push_log(&self, message: String) {
        self.log.lock().push(LogEntry {
            at: Utc::now(),
            message,
        });
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("pools", &self.pools.len())
            .field("jobs", &self.jobs.len())
            .finish()
    }
}
