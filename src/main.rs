//! Demo binary for tokio-pool-orchestrator
//!
//! Builds an orchestrator, routes demo payloads through named pools, runs a
//! short concurrent stress burst, and prints the resulting status snapshot.
//!
//! ## Usage
//!
//! ```text
//! cargo run [-- orchestrator.toml]
//! ```
//!
//! ## Environment Variables
//!
//! - `LOG_FORMAT=json` — structured JSON output (production)
//! - `RUST_LOG=info` — log level filter (default: info)

use std::path::Path;
use std::sync::Arc;
use tokio_pool_orchestrator::config::{loader, OrchestratorConfig};
use tokio_pool_orchestrator::{init_tracing, metrics, Orchestrator};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured tracing (JSON or pretty, based on LOG_FORMAT env)
    let _ = init_tracing();

    // Initialize Prometheus metrics registry before the first unit runs.
    metrics::init_metrics()?;

    // Optional config path as the first argument; defaults otherwise.
    let config = match std::env::args().nth(1) {
        Some(path) => loader::load_from_file(Path::new(&path))?,
        None => OrchestratorConfig::default(),
    };

    info!("Starting tokio-pool-orchestrator demo");
    let orchestrator = Arc::new(Orchestrator::new(config));

    // Route demo payloads through a few named pools plus the default.
    let demo_payloads = vec![
        (None, "analyze quarterly ingest backlog"),
        (Some("ingest"), "normalize incoming batch 17"),
        (Some("ingest"), "normalize incoming batch 18"),
        (Some("enrich"), "attach retrieval context to batch 17"),
        (None, "summarize processing lag"),
        (Some("enrich"), "attach retrieval context to batch 18"),
    ];

    info!(count = demo_payloads.len(), "Sending demo payloads");

    for (i, (pool, text)) in demo_payloads.iter().enumerate() {
        let report = orchestrator
            .process(serde_json::json!({ "seq": i, "text": text }), *pool)
            .await?;
        info!(
            pool = %report.pool,
            unit_id = %report.unit.id,
            elapsed_ms = report.elapsed_ms,
            "payload processed"
        );
    }

    // Short concurrent stress burst to exercise the autoscaler.
    let stress = orchestrator.clone().stress_test(200, true).await?;
    info!(
        successes = stress.successes,
        failures = stress.failures,
        throughput = stress.throughput,
        "stress burst complete"
    );

    // Final snapshot: totals, latency summaries, stale ratios.
    let status = orchestrator.status();
    println!("{}", serde_json::to_string_pretty(&status)?);

    let exposition = metrics::gather_metrics();
    info!(
        metric_bytes = exposition.len(),
        "Prometheus exposition ready"
    );

    info!("Demo complete - shutting down");
    orchestrator.teardown();

    Ok(())
}
