use std::collections::{BTreeMap, VecDeque};

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::cancel::CancellationController;
use crate::model::{Outcome, TaskResult, Target};
use crate::worker::ReclaimWorker;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Targets handed to the pool.
    pub admitted: u64,
    /// Targets that started on a worker.
    pub started: u64,
    /// Targets that never started because the run was interrupted.
    pub not_started: u64,
    /// Started targets whose worker was aborted or died before reporting.
    pub terminated: u64,
    pub peak_in_flight: usize,
}

/// Bounded-concurrency scheduler. Starts targets in the order given, keeps at
/// most `parallel` of them in flight, and forwards every result on the
/// results channel in completion order.
pub struct WorkerPool {
    worker: ReclaimWorker,
    parallel: usize,
}

impl WorkerPool {
    pub fn new(worker: ReclaimWorker, parallel: usize) -> Self {
        Self {
            worker,
            parallel: parallel.max(1),
        }
    }

    /// Every target yields exactly one result on `results`, including targets
    /// that were queued or in flight when the controller shut the run down.
    pub async fn run(
        &self,
        targets: Vec<Target>,
        controller: &CancellationController,
        results: mpsc::Sender<TaskResult>,
    ) -> PoolStats {
        let cancel = controller.token();
        let force = controller.force_token();
        let mut stats = PoolStats {
            admitted: targets.len() as u64,
            ..PoolStats::default()
        };
        let mut queue: VecDeque<Target> = targets.into();
        let mut in_flight: JoinSet<(u64, TaskResult)> = JoinSet::new();
        let mut pending: BTreeMap<u64, Target> = BTreeMap::new();
        let mut next_seq = 0_u64;
        let mut grace_deadline: Option<Instant> = None;

        loop {
            if cancel.is_cancelled() {
                stats.not_started += drain_queue(&mut queue, &results).await;
                if grace_deadline.is_none() {
                    grace_deadline = controller.grace().map(|grace| Instant::now() + grace);
                }
            } else {
                while in_flight.len() < self.parallel {
                    let Some(target) = queue.pop_front() else {
                        break;
                    };
                    let seq = next_seq;
                    next_seq += 1;
                    debug!(seq, "starting {}", target.path().display());
                    pending.insert(seq, target.clone());

                    let worker = self.worker.clone();
                    let token = cancel.clone();
                    in_flight.spawn(async move { (seq, worker.process(target, &token).await) });
                    stats.started += 1;
                }
                stats.peak_in_flight = stats.peak_in_flight.max(in_flight.len());
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                joined = in_flight.join_next() => {
                    if let Some(joined) = joined {
                        forward(joined, &mut pending, &results).await;
                    }
                }
                _ = cancel.cancelled(), if !cancel.is_cancelled() => {}
                _ = force.cancelled() => {
                    in_flight.abort_all();
                    while let Some(joined) = in_flight.join_next().await {
                        forward(joined, &mut pending, &results).await;
                    }
                    break;
                }
                _ = sleep_until(grace_deadline.unwrap_or_else(Instant::now)),
                    if grace_deadline.is_some() && !force.is_cancelled() => {
                    controller.force_stop("shutdown grace period elapsed");
                }
            }
        }

        stats.not_started += drain_queue(&mut queue, &results).await;
        for (_, target) in pending {
            stats.terminated += 1;
            warn!(
                partition = target.partition(),
                account = target.account(),
                "{} was terminated during shutdown",
                target.path().display()
            );
            send(
                &results,
                TaskResult::unfinished(&target, Outcome::Failed, "terminated during shutdown"),
            )
            .await;
        }
        stats
    }
}

async fn forward(
    joined: Result<(u64, TaskResult), JoinError>,
    pending: &mut BTreeMap<u64, Target>,
    results: &mpsc::Sender<TaskResult>,
) {
    match joined {
        Ok((seq, result)) => {
            pending.remove(&seq);
            send(results, result).await;
        }
        Err(err) if err.is_cancelled() => {}
        Err(err) => warn!("reclaim worker panicked: {err}"),
    }
}

async fn drain_queue(queue: &mut VecDeque<Target>, results: &mpsc::Sender<TaskResult>) -> u64 {
    let mut drained = 0;
    while let Some(target) = queue.pop_front() {
        drained += 1;
        info!(
            partition = target.partition(),
            account = target.account(),
            "run interrupted, not starting {}",
            target.path().display()
        );
        send(
            results,
            TaskResult::unfinished(&target, Outcome::Skipped, "run interrupted before start"),
        )
        .await;
    }
    drained
}

async fn send(results: &mpsc::Sender<TaskResult>, result: TaskResult) {
    if results.send(result).await.is_err() {
        warn!("result channel closed; a task result was dropped");
    }
}
