//! Processor execution unit
//!
//! A [`Processor`] is a stateless execution unit (aside from its completed
//! execution counter) that runs every incoming [`WorkUnit`] through a fixed
//! three-step pipeline: ingest → transform → emit. Each step derives a new
//! unit rather than mutating in place, so the final unit carries the full
//! chain of applied steps in its id.
//!
//! The step set is a closed tagged enum rather than an open trait: the
//! contract is exactly three steps, and nothing in the scheduler dispatches
//! on anything else. Input type mismatches are unrepresentable — `execute`
//! takes a `&WorkUnit`, so the fail-fast contract check lives in the type
//! system.

use crate::{Stage, WorkUnit};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Pipeline steps
// ============================================================================

/// The fixed pipeline steps applied by every processor, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    /// Intake: accept and annotate the raw unit.
    Ingest,
    /// Transformation: the synthetic "business rule" step.
    Transform,
    /// Emission: mark the unit ready to hand back.
    Emit,
}

impl PipelineStep {
    /// All steps in execution order.
    pub const ALL: [PipelineStep; 3] = [
        PipelineStep::Ingest,
        PipelineStep::Transform,
        PipelineStep::Emit,
    ];

    /// Tag appended to the derived unit id.
    pub fn tag(self) -> &'static str {
        match self {
            PipelineStep::Ingest => "ingest",
            PipelineStep::Transform => "transform",
            PipelineStep::Emit => "emit",
        }
    }

    /// Stage the derived unit is tagged with after this step.
    pub fn stage(self) -> Stage {
        match self {
            PipelineStep::Ingest => Stage::Input,
            PipelineStep::Transform => Stage::Process,
            PipelineStep::Emit => Stage::Output,
        }
    }

    /// Apply this step to a unit, producing the derived unit.
    ///
    /// The payload is wrapped to record the step applied; the exact shape is
    /// a placeholder business rule, not safety-critical.
    pub fn apply(self, unit: &WorkUnit) -> WorkUnit {
        unit.derive(
            self.stage(),
            self.tag(),
            json!({
                "applied": self.tag(),
                "value": unit.payload,
            }),
        )
    }
}

// ============================================================================
// Processor
// ============================================================================

/// Stateless execution unit owned by a single pool.
///
/// The completed-execution counter is the processor's sole load signal;
/// it is incremented exactly once per `execute` call. The counter is only
/// ever mutated by the processor's own uninterrupted execute call, so a
/// relaxed atomic is sufficient.
pub struct Processor {
    id: String,
    executions: AtomicU64,
    /// Simulated execution delay, used by tests and the demo binary to open
    /// real concurrency windows.
    delay: Option<Duration>,
}

impl Processor {
    /// Create a processor with a generated id.
    pub fn new() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self::with_id(format!("proc_{}", &hex[..8]))
    }

    /// Create a processor with an explicit id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            executions: AtomicU64::new(0),
            delay: None,
        }
    }

    /// Add a simulated per-call delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Unique processor id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Completed-execution count.
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    /// Run a unit through the full ingest → transform → emit pipeline.
    ///
    /// Returns the final derived unit and increments the completed-execution
    /// counter by exactly 1. Infallible for any well-formed unit.
    pub async fn execute(&self, unit: &WorkUnit) -> WorkUnit {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut current = unit.clone();
        for step in PipelineStep::ALL {
            current = step.apply(&current);
        }

        self.executions.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            processor_id = %self.id,
            unit_id = %current.id,
            executions = self.executions(),
            "unit executed"
        );
        current
    }
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("id", &self.id)
            .field("executions", &self.executions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_increments_counter_by_exactly_one() {
        let proc = Processor::new();
        let unit = WorkUnit::new(json!("payload"));

        assert_eq!(proc.executions(), 0);
        let _ = proc.execute(&unit).await;
        assert_eq!(proc.executions(), 1);
        let _ = proc.execute(&unit).await;
        assert_eq!(proc.executions(), 2);
    }

    #[tokio::test]
    async fn test_execute_applies_all_three_steps_in_order() {
        let proc = Processor::new();
        let unit = WorkUnit::new(json!("data"));

        let out = proc.execute(&unit).await;
        assert_eq!(
            out.id,
            format!("{}:ingest:transform:emit", unit.id),
            "derived id must record the full step chain"
        );
        assert_eq!(out.stage, Stage::Output);
    }

    #[tokio::test]
    async fn test_execute_wraps_payload_per_step() {
        let proc = Processor::new();
        let unit = WorkUnit::new(json!(42));

        let out = proc.execute(&unit).await;
        // Outermost wrapper is the emit step; the original payload sits
        // three levels down.
        assert_eq!(out.payload["applied"], "emit");
        assert_eq!(out.payload["value"]["applied"], "transform");
        assert_eq!(out.payload["value"]["value"]["applied"], "ingest");
        assert_eq!(out.payload["value"]["value"]["value"], json!(42));
    }

    #[tokio::test]
    async fn test_execute_does_not_consume_input_unit() {
        let proc = Processor::new();
        let unit = WorkUnit::new(json!("keep"));

        let _ = proc.execute(&unit).await;
        assert_eq!(unit.stage, Stage::Input);
        assert_eq!(unit.payload, json!("keep"));
    }

    #[tokio::test]
    async fn test_with_delay_sleeps_before_executing() {
        let proc = Processor::new().with_delay(Duration::from_millis(20));
        let unit = WorkUnit::new(json!("slow"));

        let start = std::time::Instant::now();
        let _ = proc.execute(&unit).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_processor_ids_are_unique() {
        let a = Processor::new();
        let b = Processor::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_step_stages_map_input_process_output() {
        assert_eq!(PipelineStep::Ingest.stage(), Stage::Input);
        assert_eq!(PipelineStep::Transform.stage(), Stage::Process);
        assert_eq!(PipelineStep::Emit.stage(), Stage::Output);
    }
}
