//! Pool scheduling and autoscaling
//!
//! A [`Pool`] owns a live set of processors and routes each incoming unit to
//! the processor with the lowest *effective load* (completed executions plus
//! in-flight reservations). Reservations keep bursts of concurrent calls
//! from piling onto the processor that merely has the lowest completed
//! count.
//!
//! ## Locking model
//!
//! One scheduling lock serializes processor-set mutation, inflight
//! bookkeeping, and the load-ordering heap. The lock is held only for
//! O(log n) pick-and-reserve work — execution happens outside it, so a slow
//! unit never blocks other schedule decisions. Read-only stats snapshots
//! take the same lock for a consistent view; the path is small and
//! low-frequency.
//!
//! ## Lazy heap
//!
//! The heap is keyed by `(load, seq, processor_id)` and is deliberately
//! allowed to go stale: entries are pushed with the load observed at push
//! time and verified on pop. A popped entry whose recorded load no longer
//! matches the processor's current effective load is discarded and replaced
//! with a fresh one. This amortizes the cost of load changes instead of
//! re-heapifying on every completion. The heap is rebuilt from scratch when
//! stale entries exceed a small multiple of the processor count, or after
//! any scaling event.

use crate::processor::Processor;
use crate::{metrics, OrchestratorError, WorkUnit};
use parking_lot::Mutex;
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Heap entries per processor beyond which the heap is compacted.
const COMPACT_HEAP_FACTOR: usize = 3;

/// Imbalance detector: does one straggler justify growing the pool?
///
/// The comparison is strictly greater-than — a ratio exactly equal to the
/// threshold does not scale. The `+ 1.0` in the denominator avoids division
/// by zero when every processor is idle.
fn imbalance_triggers(max_load: f64, avg_load: f64, threshold: f64) -> bool {
    max_load / (avg_load + 1.0) > threshold
}

// ── Settings ───────────────────────────────────────────────────────────────

/// Tunables for a pool's scheduler and autoscaler.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Imbalance ratio above which the pool grows. Must be in `[0, 1)`.
    pub load_threshold: f64,
    /// Multiplier applied to the processor count on scale-up. Must be ≥ 2.
    pub scale_factor: usize,
    /// Hard upper bound on the processor count.
    pub max_processors: usize,
    /// Minimum interval between accepted external scale hints.
    pub hint_cooldown: Duration,
    /// Simulated execution delay applied to every provisioned processor.
    /// Used by tests and the demo binary; `None` in production.
    pub processor_delay: Option<Duration>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            load_threshold: 0.8,
            scale_factor: 2,
            max_processors: 100,
            hint_cooldown: Duration::from_millis(500),
            processor_delay: None,
        }
    }
}

// ── Heap entries ───────────────────────────────────────────────────────────

/// One entry in the load-ordering heap.
///
/// `seq` is a push-order tie-break that keeps the ordering total; it carries
/// no scheduling significance.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LoadEntry {
    load: u64,
    seq: u64,
    processor_id: String,
}

impl Ord for LoadEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.load
            .cmp(&other.load)
            .then_with(|| self.seq.cmp(&other.seq))
            .then_with(|| self.processor_id.cmp(&other.processor_id))
    }
}

impl PartialOrd for LoadEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ── Pool state ─────────────────────────────────────────────────────────────

/// Everything guarded by the scheduling lock.
struct PoolInner {
    processors: HashMap<String, Arc<Processor>>,
    /// Reservation counts for processors currently mid-execution.
    inflight: HashMap<String, u64>,
    /// Min-heap over `(load, seq, processor_id)`.
    heap: BinaryHeap<Reverse<LoadEntry>>,
    seq: u64,
    last_hint: Option<Instant>,
    active: bool,
}

impl PoolInner {
    /// Effective load of a processor, or `None` if it is no longer owned.
    fn effective_load(&self, processor_id: &str) -> Option<u64> {
        let completed = self.processors.get(processor_id)?.executions();
        let reserved = self.inflight.get(processor_id).copied().unwrap_or(0);
        Some(completed + reserved)
    }

    fn push_entry(&mut self, processor_id: String, load: u64) {
        self.seq = self.seq.wrapping_add(1);
        self.heap.push(Reverse(LoadEntry {
            load,
            seq: self.seq,
            processor_id,
        }));
    }

    /// Rebuild the heap from current effective loads, dropping every stale
    /// entry at once. Bounds memory growth from repeated stale pushes.
    fn rebuild_heap(&mut self) {
        self.heap.clear();
        let loads: Vec<(String, u64)> = self
            .processors
            .iter()
            .map(|(id, p)| {
                let reserved = self.inflight.get(id).copied().unwrap_or(0);
                (id.clone(), p.executions() + reserved)
            })
            .collect();
        for (id, load) in loads {
            self.push_entry(id, load);
        }
    }

    fn effective_loads(&self) -> Vec<u64> {
        self.processors
            .iter()
            .map(|(id, p)| p.executions() + self.inflight.get(id).copied().unwrap_or(0))
            .collect()
    }
}

// ── Pool ───────────────────────────────────────────────────────────────────

/// A named, dynamically-sized set of processors with its own scheduler and
/// autoscaler.
pub struct Pool {
    id: String,
    settings: PoolSettings,
    inner: Mutex<PoolInner>,
}

/// Point-in-time snapshot of a pool's bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// Pool id.
    pub id: String,
    /// Live processor count.
    pub processors: usize,
    /// Sum of completed executions across all processors.
    pub executions: u64,
    /// Sum of in-flight reservations.
    pub inflight: u64,
    /// Current heap size, stale entries included.
    pub heap_entries: usize,
    /// Heap size relative to processor count. A value well above 1.0 means
    /// a compaction is overdue.
    pub stale_ratio: f64,
}

impl Pool {
    /// Build a pool with `initial_size` processors.
    ///
    /// `initial_size` is capped at `settings.max_processors`; a size of zero
    /// is allowed and leaves emergency provisioning to the first `schedule`.
    pub fn new(id: impl Into<String>, initial_size: usize, settings: PoolSettings) -> Self {
        let pool = Self {
            id: id.into(),
            settings,
            inner: Mutex::new(PoolInner {
                processors: HashMap::new(),
                inflight: HashMap::new(),
                heap: BinaryHeap::new(),
                seq: 0,
                last_hint: None,
                active: true,
            }),
        };
        {
            let mut inner = pool.inner.lock();
            pool.grow_locked(&mut inner, initial_size, "initial");
        }
        pool
    }

    /// Pool id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the pool has not been torn down.
    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    /// Schedule a unit onto the least-loaded processor and execute it.
    ///
    /// Pick-and-reserve happens under the scheduling lock; execution runs
    /// outside it. "Least-loaded" is a best-effort heuristic under
    /// concurrency — races between reservation and completion are tolerated
    /// and self-correct via the refresh-on-push step.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Inactive`] if the pool has been torn
    /// down.
    pub async fn schedule(&self, unit: WorkUnit) -> Result<WorkUnit, OrchestratorError> {
        let started = Instant::now();

        let processor = {
            let mut inner = self.inner.lock();
            if !inner.active {
                return Err(OrchestratorError::Inactive(format!(
                    "pool {} has been torn down",
                    self.id
                )));
            }

            // Never block indefinitely with zero capacity.
            if inner.processors.is_empty() {
                warn!(pool_id = %self.id, "pool empty, emergency-provisioning one processor");
                self.grow_locked(&mut inner, 1, "emergency");
            }

            if self.needs_scale_up(&inner) {
                let current = inner.processors.len();
                let target = (current * self.settings.scale_factor)
                    .min(self.settings.max_processors);
                self.grow_locked(&mut inner, target.saturating_sub(current), "imbalance");
            }

            let chosen = self.pop_least_loaded(&mut inner).ok_or_else(|| {
                OrchestratorError::NotFound(format!(
                    "no schedulable processor in pool {}",
                    self.id
                ))
            })?;

            *inner.inflight.entry(chosen.clone()).or_insert(0) += 1;
            // Push the post-reservation load so concurrent schedulers see it.
            if let Some(load) = inner.effective_load(&chosen) {
                inner.push_entry(chosen.clone(), load);
            }
            self.maybe_compact(&mut inner);

            debug!(
                pool_id = %self.id,
                processor_id = %chosen,
                unit_id = %unit.id,
                "unit scheduled"
            );
            inner.processors.get(&chosen).cloned()
        };

        let processor = processor.ok_or_else(|| {
            OrchestratorError::NotFound(format!("processor vanished in pool {}", self.id))
        })?;

        // Execution runs outside the scheduling lock.
        let output = processor.execute(&unit).await;

        {
            let mut inner = self.inner.lock();
            if let Some(count) = inner.inflight.get_mut(processor.id()) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    inner.inflight.remove(processor.id());
                }
            }
            // Refresh the entry so the completed execution is visible to the
            // next scheduling decision. Skipped if the pool was torn down or
            // rebuilt while we were executing.
            let id = processor.id().to_string();
            if let Some(load) = inner.effective_load(&id) {
                inner.push_entry(id, load);
            }
            self.maybe_compact(&mut inner);
        }

        metrics::observe_schedule(&self.id, started.elapsed());
        metrics::inc_unit(&self.id);
        Ok(output)
    }

    /// Externally requested growth for high tail latency.
    ///
    /// Grows by `max(1, scale_factor / 2)` processors, independently
    /// rate-limited by the hint cooldown so rapid repeated hints cannot
    /// thrash the pool. Returns whether the pool actually scaled (`false`
    /// on cooldown, at max capacity, or torn down).
    pub fn scale_hint(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.active || inner.processors.len() >= self.settings.max_processors {
            return false;
        }
        if let Some(last) = inner.last_hint {
            if last.elapsed() < self.settings.hint_cooldown {
                debug!(pool_id = %self.id, "scale hint suppressed by cooldown");
                return false;
            }
        }
        inner.last_hint = Some(Instant::now());
        let step = (self.settings.scale_factor / 2).max(1);
        self.grow_locked(&mut inner, step, "latency");
        true
    }

    /// Release all processors, reservations, and the scheduling heap.
    ///
    /// Idempotent; the pool rejects further scheduling with
    /// [`OrchestratorError::Inactive`].
    pub fn teardown(&self) {
        let mut inner = self.inner.lock();
        inner.processors.clear();
        inner.inflight.clear();
        inner.heap.clear();
        inner.active = false;
        metrics::set_processors(&self.id, 0);
        info!(pool_id = %self.id, "pool torn down");
    }

    /// Consistent snapshot of the pool's bookkeeping.
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        let processors = inner.processors.len();
        let executions = inner.processors.values().map(|p| p.executions()).sum();
        let inflight = inner.inflight.values().sum();
        let heap_entries = inner.heap.len();
        PoolStats {
            id: self.id.clone(),
            processors,
            executions,
            inflight,
            heap_entries,
            stale_ratio: if processors == 0 {
                0.0
            } else {
                heap_entries as f64 / processors as f64
            },
        }
    }

    /// Per-processor completed-execution counts. Diagnostic only; ordering
    /// is unspecified.
    pub fn processor_executions(&self) -> Vec<u64> {
        let inner = self.inner.lock();
        inner.processors.values().map(|p| p.executions()).collect()
    }

    // ── Internals (all called with the lock held) ──────────────────────────

    fn needs_scale_up(&self, inner: &PoolInner) -> bool {
        let loads = inner.effective_loads();
        if loads.is_empty() {
            return false;
        }
        let max = loads.iter().copied().max().unwrap_or(0) as f64;
        let avg = loads.iter().sum::<u64>() as f64 / loads.len() as f64;
        imbalance_triggers(max, avg, self.settings.load_threshold)
    }

    /// Pop until an entry's recorded load matches the processor's current
    /// effective load. Stale entries are discarded and replaced with fresh
    /// ones; entries for removed processors are dropped outright.
    fn pop_least_loaded(&self, inner: &mut PoolInner) -> Option<String> {
        while let Some(Reverse(entry)) = inner.heap.pop() {
            match inner.effective_load(&entry.processor_id) {
                None => continue,
                Some(current) if current == entry.load => return Some(entry.processor_id),
                Some(current) => inner.push_entry(entry.processor_id, current),
            }
        }
        None
    }

    fn grow_locked(&self, inner: &mut PoolInner, additional: usize, trigger: &str) {
        let mut added = 0;
        for _ in 0..additional {
            if inner.processors.len() >= self.settings.max_processors {
                break;
            }
            let mut processor = Processor::new();
            if let Some(delay) = self.settings.processor_delay {
                processor = processor.with_delay(delay);
            }
            inner
                .processors
                .insert(processor.id().to_string(), Arc::new(processor));
            added += 1;
        }
        if added > 0 {
            // Scaling events force a compaction.
            inner.rebuild_heap();
            metrics::inc_scale_event(&self.id, trigger);
            metrics::set_processors(&self.id, inner.processors.len());
            info!(
                pool_id = %self.id,
                added,
                total = inner.processors.len(),
                trigger,
                "pool scaled up"
            );
        }
    }

    fn maybe_compact(&self, inner: &mut PoolInner) {
        let limit = inner.processors.len().saturating_mul(COMPACT_HEAP_FACTOR).max(1);
        if inner.heap.len() > limit {
            inner.rebuild_heap();
            debug!(
                pool_id = %self.id,
                heap_len = inner.heap.len(),
                "scheduling heap compacted"
            );
        }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("Pool")
            .field("id", &self.id)
            .field("processors", &stats.processors)
            .field("executions", &stats.executions)
            .finish()
    }
}
