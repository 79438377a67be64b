use std::sync::Arc;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::aggregate::Aggregator;
use crate::cancel::CancellationController;
use crate::config::ReclaimConfig;
use crate::eraser::Eraser;
use crate::error::Result;
use crate::model::{RunReport, Target, REPORT_VERSION};
use crate::pool::WorkerPool;
use crate::probe::SizeProbe;
use crate::worker::ReclaimWorker;

/// Processes `targets` and returns the report, partial if the controller
/// interrupted the run. The controller ends in `Stopped`.
pub async fn run_reclaim(
    config: &ReclaimConfig,
    targets: Vec<Target>,
    probe: Arc<dyn SizeProbe>,
    eraser: Arc<dyn Eraser>,
    controller: &CancellationController,
) -> Result<RunReport> {
    config.validate()?;
    let started = Instant::now();
    let run_id = Uuid::new_v4().to_string();
    info!(
        run_id = %run_id,
        targets = targets.len(),
        parallel = config.parallel,
        attempts = config.attempts,
        dry_run = config.dry_run,
        "reclaim run started"
    );

    let worker = ReclaimWorker::new(config, probe, eraser);
    let pool = WorkerPool::new(worker, config.parallel);
    let (sender, receiver) = mpsc::channel(config.parallel.saturating_mul(4).max(1));

    let (stats, aggregator) = tokio::join!(
        pool.run(targets, controller, sender),
        Aggregator::consume(receiver)
    );
    controller.mark_stopped();

    let (summary, results) = aggregator.finish();
    let report = RunReport {
        report_version: REPORT_VERSION.to_string(),
        run_id,
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        dry_run: config.dry_run,
        interrupted: controller.interrupted(),
        forced: controller.forced(),
        elapsed_ms: started.elapsed().as_millis().try_into().unwrap_or(u64::MAX),
        results,
        summary,
    };

    info!(
        run_id = %report.run_id,
        results = report.results.len(),
        started = stats.started,
        not_started = stats.not_started,
        terminated = stats.terminated,
        peak_in_flight = stats.peak_in_flight,
        bytes = report.summary.total_bytes(),
        interrupted = report.interrupted,
        "reclaim run finished"
    );
    Ok(report)
}
