//! The `pixelgrade worker` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use pixelgrade_core::engine::Evaluator;
use pixelgrade_core::model::Submission;
use pixelgrade_core::results::EvaluationResult;
use pixelgrade_core::worker::{EvaluationWorker, WorkerObserver};
use pixelgrade_render::BrowserComparer;
use pixelgrade_store::config::{create_store, load_config_from};

use super::render_config;

/// Console progress reporter.
struct ConsoleReporter;

impl WorkerObserver for ConsoleReporter {
    fn on_claimed(&self, submission: &Submission) {
        eprintln!(
            "  Claimed: {} :: {}",
            submission.challenge_id, submission.id
        );
    }

    fn on_evaluated(&self, submission_id: &str, result: &EvaluationResult) {
        let verdict = if result.passed { "PASSED" } else { "FAILED" };
        eprintln!(
            "  Done: {submission_id} {verdict} final {} (content {}, structure {}, visual {})",
            result.final_score, result.content_score, result.structure_score, result.visual_score,
        );
    }

    fn on_failed(&self, submission_id: &str, error: &str) {
        eprintln!("  ERROR: {submission_id}: {error}");
    }
}

pub async fn execute(
    config_path: Option<PathBuf>,
    max_concurrent: Option<usize>,
    poll_interval_ms: Option<u64>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let mut worker_config = config.worker.to_worker_config();
    if let Some(n) = max_concurrent {
        worker_config.max_concurrent = n;
    }
    if let Some(ms) = poll_interval_ms {
        worker_config.poll_interval = Duration::from_millis(ms);
    }
    anyhow::ensure!(
        worker_config.max_concurrent >= 1,
        "max-concurrent must be at least 1"
    );

    let stores = create_store(&config.store)?;
    let (comparer, pool) = BrowserComparer::chrome(render_config(&config.render));
    let evaluator = Evaluator::new(Arc::new(comparer)).context("failed to build evaluator")?;

    eprintln!(
        "pixelgrade v{} worker: {} concurrent, polling every {}ms ({:?})",
        env!("CARGO_PKG_VERSION"),
        worker_config.max_concurrent,
        worker_config.poll_interval.as_millis(),
        config.store,
    );

    let worker = EvaluationWorker::new(
        Arc::new(evaluator),
        stores.challenges,
        stores.submissions,
        worker_config,
    )
    .with_observer(Arc::new(ConsoleReporter));

    worker.start();
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    eprintln!("\nStopping; waiting for in-flight evaluations...");
    worker.stop().await;
    pool.shutdown().await;
    eprintln!("Worker stopped.");
    Ok(())
}
