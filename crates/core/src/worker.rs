use std::path::PathBuf;
use std::sync::Arc;

use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ReclaimConfig;
use crate::eraser::Eraser;
use crate::model::{Outcome, TaskResult, Target};
use crate::probe::SizeProbe;
use crate::retry::{attempt_with_retry, RetryError, RetryPolicy};

/// Runs one target through probe, bounded erase retries and verification.
#[derive(Clone)]
pub struct ReclaimWorker {
    probe: Arc<dyn SizeProbe>,
    eraser: Arc<dyn Eraser>,
    dry_run: bool,
    policy: RetryPolicy,
}

impl ReclaimWorker {
    pub fn new(
        config: &ReclaimConfig,
        probe: Arc<dyn SizeProbe>,
        eraser: Arc<dyn Eraser>,
    ) -> Self {
        Self {
            probe,
            eraser,
            dry_run: config.dry_run,
            policy: RetryPolicy::new(config.attempts, config.backoff),
        }
    }

    /// Always yields exactly one result; failures are folded into it.
    pub async fn process(&self, target: Target, cancel: &CancellationToken) -> TaskResult {
        let partition = target.partition();
        let account = target.account();

        if cancel.is_cancelled() {
            info!(
                partition,
                account,
                "run interrupted, not starting {}",
                target.path().display()
            );
            return TaskResult::unfinished(
                &target,
                Outcome::Skipped,
                "run interrupted before start",
            );
        }

        if let Err(message) = self.check_reachable(&target).await {
            error!(
                partition,
                account,
                "skipping {}: {}",
                target.path().display(),
                message
            );
            return TaskResult::unfinished(&target, Outcome::Skipped, message);
        }

        let bytes = match self.measure(&target).await {
            Ok(bytes) => bytes,
            Err(message) => {
                error!(
                    partition,
                    account,
                    "size probe failed for {}: {}",
                    target.path().display(),
                    message
                );
                return TaskResult::unfinished(&target, Outcome::Failed, message);
            }
        };

        if self.dry_run {
            info!(
                partition,
                account,
                bytes,
                "dry run: {} would be cleared",
                target.path().display()
            );
            return TaskResult::new(&target, Outcome::DryRun, bytes);
        }

        let path = target.path().to_path_buf();
        let eraser = Arc::clone(&self.eraser);
        let attempts = attempt_with_retry(
            |_| erase_blocking(Arc::clone(&eraser), path.clone()),
            self.policy,
            cancel,
        )
        .await;

        match attempts {
            Ok(attempts) => {
                let leftover = self.verify(&target).await;
                info!(
                    partition,
                    account,
                    bytes,
                    attempts,
                    "cleared {}",
                    target.path().display()
                );
                TaskResult::new(&target, Outcome::Cleared, bytes)
                    .with_attempts(attempts)
                    .with_leftover_entries(leftover)
            }
            Err(err @ RetryError::Exhausted { .. }) => {
                error!(
                    partition,
                    account,
                    "could not clear {}: {}",
                    target.path().display(),
                    err
                );
                TaskResult::unfinished(&target, Outcome::Failed, err.to_string())
                    .with_attempts(err.attempts())
            }
            Err(err @ RetryError::Interrupted { .. }) => {
                warn!(
                    partition,
                    account,
                    "stopped clearing {}: {}",
                    target.path().display(),
                    err
                );
                TaskResult::unfinished(&target, Outcome::Failed, err.to_string())
                    .with_attempts(err.attempts())
            }
        }
    }

    async fn check_reachable(&self, target: &Target) -> Result<(), String> {
        let eraser = Arc::clone(&self.eraser);
        let path = target.path().to_path_buf();
        match task::spawn_blocking(move || eraser.list_entries(&path)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(format!("directory unreachable: {err}")),
            Err(err) => Err(format!("reachability check aborted: {err}")),
        }
    }

    async fn measure(&self, target: &Target) -> Result<u64, String> {
        let probe = Arc::clone(&self.probe);
        let path = target.path().to_path_buf();
        task::spawn_blocking(move || probe.measure(&path))
            .await
            .map_err(|err| format!("size probe aborted: {err}"))
    }

    /// Observational only: a non-empty directory after a successful erase is
    /// logged but never changes the outcome.
    async fn verify(&self, target: &Target) -> usize {
        let eraser = Arc::clone(&self.eraser);
        let path = target.path().to_path_buf();
        match task::spawn_blocking(move || eraser.list_entries(&path)).await {
            Ok(Ok(entries)) if entries.is_empty() => 0,
            Ok(Ok(entries)) => {
                warn!(
                    partition = target.partition(),
                    account = target.account(),
                    leftover = entries.len(),
                    "{} is not empty after clearing",
                    target.path().display()
                );
                entries.len()
            }
            Ok(Err(err)) => {
                warn!("could not verify {}: {}", target.path().display(), err);
                0
            }
            Err(err) => {
                warn!("verification of {} aborted: {}", target.path().display(), err);
                0
            }
        }
    }
}

async fn erase_blocking(eraser: Arc<dyn Eraser>, path: PathBuf) -> bool {
    task::spawn_blocking(move || eraser.erase(&path))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;
    use tracing::Level;

    use super::ReclaimWorker;
    use crate::config::ReclaimConfig;
    use crate::eraser::Eraser;
    use crate::model::{Outcome, Target};
    use crate::probe::SizeProbe;
    use crate::test_log::EventLog;

    struct FixedProbe(HashMap<PathBuf, u64>);

    impl SizeProbe for FixedProbe {
        fn measure(&self, path: &Path) -> u64 {
            self.0.get(path).copied().unwrap_or(0)
        }
    }

    #[derive(Default)]
    struct ScriptedEraser {
        failures_before_success: u32,
        calls: AtomicU32,
        unreachable: bool,
        leftovers: usize,
    }

    impl Eraser for ScriptedEraser {
        fn erase(&self, _path: &Path) -> bool {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            call >= self.failures_before_success
        }

        fn list_entries(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
            if self.unreachable {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            if self.calls.load(Ordering::SeqCst) == 0 {
                return Ok(vec![path.join("stale")]);
            }
            Ok((0..self.leftovers).map(|i| path.join(format!("left-{i}"))).collect())
        }
    }

    fn target() -> Target {
        Target::from_path("/home/alice/.cache").expect("target")
    }

    fn worker(config: ReclaimConfig, eraser: Arc<ScriptedEraser>) -> ReclaimWorker {
        let sizes = HashMap::from([(PathBuf::from("/home/alice/.cache"), 4096_u64)]);
        ReclaimWorker::new(&config, Arc::new(FixedProbe(sizes)), eraser)
    }

    fn live_config(attempts: u32) -> ReclaimConfig {
        ReclaimConfig {
            attempts,
            backoff: Duration::from_millis(1),
            ..ReclaimConfig::default()
        }
    }

    #[tokio::test]
    async fn dry_run_measures_without_erasing() {
        let eraser = Arc::new(ScriptedEraser::default());
        let config = ReclaimConfig {
            dry_run: true,
            ..live_config(2)
        };
        let result = worker(config, Arc::clone(&eraser))
            .process(target(), &CancellationToken::new())
            .await;

        assert_eq!(result.outcome, Outcome::DryRun);
        assert_eq!(result.bytes, 4096);
        assert_eq!(eraser.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_reports_pre_deletion_size() {
        let eraser = Arc::new(ScriptedEraser::default());
        let result = worker(live_config(2), Arc::clone(&eraser))
            .process(target(), &CancellationToken::new())
            .await;

        assert_eq!(result.outcome, Outcome::Cleared);
        assert_eq!(result.bytes, 4096);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.leftover_entries, 0);
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let eraser = Arc::new(ScriptedEraser {
            failures_before_success: 1,
            ..ScriptedEraser::default()
        });
        let result = worker(live_config(2), Arc::clone(&eraser))
            .process(target(), &CancellationToken::new())
            .await;

        assert_eq!(result.outcome, Outcome::Cleared);
        assert_eq!(result.attempts, 2);
        assert_eq!(eraser.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_attempts_fail_with_zero_bytes() {
        let log = EventLog::default();
        let _guard = log.install();
        let eraser = Arc::new(ScriptedEraser {
            failures_before_success: u32::MAX,
            ..ScriptedEraser::default()
        });
        let result = worker(live_config(2), Arc::clone(&eraser))
            .process(target(), &CancellationToken::new())
            .await;

        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.bytes, 0);
        assert_eq!(result.attempts, 2);
        assert_eq!(eraser.calls.load(Ordering::SeqCst), 2);
        assert!(result.message.is_some());
        assert_eq!(log.count_matching(Level::WARN, "failed"), 2);
        assert_eq!(log.count(Level::WARN), 2);
        assert_eq!(log.count(Level::ERROR), 1);
    }

    #[tokio::test]
    async fn leftovers_are_recorded_but_do_not_fail_the_task() {
        let eraser = Arc::new(ScriptedEraser {
            leftovers: 3,
            ..ScriptedEraser::default()
        });
        let result = worker(live_config(2), eraser)
            .process(target(), &CancellationToken::new())
            .await;

        assert_eq!(result.outcome, Outcome::Cleared);
        assert_eq!(result.bytes, 4096);
        assert_eq!(result.leftover_entries, 3);
    }

    #[tokio::test]
    async fn unreachable_target_is_skipped_before_erasing() {
        let eraser = Arc::new(ScriptedEraser {
            unreachable: true,
            ..ScriptedEraser::default()
        });
        let result = worker(live_config(2), Arc::clone(&eraser))
            .process(target(), &CancellationToken::new())
            .await;

        assert_eq!(result.outcome, Outcome::Skipped);
        assert_eq!(result.bytes, 0);
        assert_eq!(eraser.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_before_start_is_skipped() {
        let log = EventLog::default();
        let _guard = log.install();
        let eraser = Arc::new(ScriptedEraser::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = worker(live_config(2), Arc::clone(&eraser))
            .process(target(), &cancel)
            .await;

        assert_eq!(result.outcome, Outcome::Skipped);
        assert_eq!(eraser.calls.load(Ordering::SeqCst), 0);
        assert_eq!(log.count_matching(Level::INFO, "not starting"), 1);
    }
}
