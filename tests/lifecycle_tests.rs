//! Integration tests for orchestrator lifecycle operations.
//!
//! These tests verify end-to-end behavior:
//! - Teardown idempotence from every reachable state
//! - Foundation rebuild round-trips
//! - Status snapshot consistency after lifecycle transitions
//! - Background stress jobs surviving registry churn

use std::sync::Arc;
use std::time::Duration;
use tokio_pool_orchestrator::config::{FoundationSection, OrchestratorConfig};
use tokio_pool_orchestrator::orchestrator::JobStatus;
use tokio_pool_orchestrator::{Orchestrator, OrchestratorError};

// ── Helper functions ──────────────────────────────────────────────

fn orchestrator() -> Arc<Orchestrator> {
    Arc::new(Orchestrator::with_defaults())
}

async fn await_job(orch: &Arc<Orchestrator>, job_id: &str) -> JobStatus {
    for _ in 0..200 {
        let record = orch.job_status(job_id).unwrap();
        match record.status {
            JobStatus::Completed { .. } | JobStatus::Failed { .. } => return record.status,
            _ => tokio::time::sleep(Duration::from_millis(5)).await,
        }
    }
    orch.job_status(job_id).unwrap().status
}

// ── Test: teardown twice yields identical observable state ────────

#[tokio::test]
async fn test_double_teardown_same_observable_state() {
    let orch = orchestrator();
    orch.process(serde_json::json!("warm-up"), None).await.unwrap();
    orch.create_pool("side", 4).unwrap();

    orch.teardown();
    let first = orch.status();

    orch.teardown();
    let second = orch.status();

    assert_eq!(first.total_pools, 0);
    assert_eq!(first.total_processors, 0);
    assert_eq!(first.total_executions, 0);
    assert_eq!(second.total_pools, 0);
    assert_eq!(second.total_processors, 0);
    assert_eq!(first.system_latency.samples, 0);
    assert_eq!(first.log_entries, 0);
}

// ── Test: teardown from a fresh orchestrator is safe ──────────────

#[tokio::test]
async fn test_teardown_before_any_use_is_safe() {
    let orch = orchestrator();
    orch.teardown();
    assert_eq!(orch.status().total_pools, 0);
}

// ── Test: foundation rebuild round-trip ───────────────────────────

#[tokio::test]
async fn test_rebuild_round_trip_two_pools_of_five() {
    let orch = orchestrator();
    orch.process(serde_json::json!("pre-rebuild"), None)
        .await
        .unwrap();

    orch.rebuild_from_foundation(&FoundationSection {
        default_pools: 2,
        pool_size: 5,
    })
    .unwrap();

    let status = orch.status();
    assert_eq!(status.total_pools, 2);
    assert_eq!(status.total_processors, 10);
    assert_eq!(status.total_executions, 0, "rebuild starts from zero");

    // Deterministic names, sorted.
    let names: Vec<_> = status.pools.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["pool_0", "pool_1"]);
}

// ── Test: rebuilt pools serve traffic immediately ─────────────────

#[tokio::test]
async fn test_rebuilt_pools_process_units() {
    let orch = orchestrator();
    orch.rebuild_from_foundation(&FoundationSection {
        default_pools: 3,
        pool_size: 2,
    })
    .unwrap();

    let report = orch
        .process(serde_json::json!("routed"), Some("pool_1"))
        .await
        .unwrap();
    assert_eq!(report.pool, "pool_1");

    let status = orch.status();
    assert_eq!(status.total_executions, 1);
}

// ── Test: status reflects latency windows and stale ratios ────────

#[tokio::test]
async fn test_status_reports_latency_and_stale_ratio() {
    let orch = orchestrator();
    for i in 0..20 {
        orch.process(serde_json::json!(i), Some("observed"))
            .await
            .unwrap();
    }

    let status = orch.status();
    assert_eq!(status.total_pools, 1);
    assert_eq!(status.system_latency.samples, 20);
    assert!(status.system_latency.mean_ms >= 0.0);
    assert!(status.system_latency.p95_ms >= 0.0);

    let pool = &status.pools[0];
    assert_eq!(pool.name, "observed");
    assert_eq!(pool.latency.samples, 20);
    assert!(
        pool.stats.stale_ratio >= 0.0,
        "stale ratio must be reported"
    );
    assert_eq!(status.log_entries, orch.log_snapshot().len());
}

// ── Test: duplicate create after teardown succeeds ────────────────

#[tokio::test]
async fn test_pool_name_is_reusable_after_teardown() {
    let orch = orchestrator();
    orch.create_pool("reborn", 2).unwrap();
    assert!(matches!(
        orch.create_pool("reborn", 2),
        Err(OrchestratorError::AlreadyExists(_))
    ));

    orch.teardown();
    let pool = orch.create_pool("reborn", 3).unwrap();
    assert_eq!(pool.stats().processors, 3);
}

// ── Test: background job completes and reports accounting ─────────

#[tokio::test]
async fn test_background_stress_job_full_accounting() {
    let orch = orchestrator();
    let job_id = orch.clone().submit_stress_job(30, true);

    match await_job(&orch, &job_id).await {
        JobStatus::Completed { result } => {
            assert_eq!(result.iterations, 30);
            assert_eq!(result.successes + result.failures, 30);
        }
        other => panic!("expected completed job, got {other:?}"),
    }
}

// ── Test: job ids are not found after teardown ────────────────────

#[tokio::test]
async fn test_teardown_clears_job_registry() {
    let orch = orchestrator();
    let job_id = orch.clone().submit_stress_job(5, false);
    let _ = await_job(&orch, &job_id).await;

    orch.teardown();
    assert!(matches!(
        orch.job_status(&job_id),
        Err(OrchestratorError::NotFound(_))
    ));
}

// ── Test: custom config drives pool sizing ────────────────────────

#[tokio::test]
async fn test_config_controls_lazy_pool_sizing() {
    let mut config = OrchestratorConfig::default();
    config.pool.initial_size = 7;
    config.orchestrator.default_pool = "primary".to_string();
    let orch = Arc::new(Orchestrator::new(config));

    let report = orch.process(serde_json::json!("sized"), None).await.unwrap();
    assert_eq!(report.pool, "primary");

    let status = orch.status();
    assert_eq!(status.pools[0].stats.processors, 7);
}
