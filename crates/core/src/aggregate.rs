use tokio::sync::mpsc;

use crate::model::{AccountEntry, Outcome, SummaryReport, TaskResult};

/// Sole owner of summary state. Results are folded in the order received.
#[derive(Debug, Default)]
pub struct Aggregator {
    summary: SummaryReport,
    results: Vec<TaskResult>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains the channel until every sender is gone.
    pub async fn consume(mut receiver: mpsc::Receiver<TaskResult>) -> Self {
        let mut aggregator = Self::new();
        while let Some(result) = receiver.recv().await {
            aggregator.ingest(result);
        }
        aggregator
    }

    pub fn ingest(&mut self, result: TaskResult) {
        let partition = self
            .summary
            .partitions
            .entry(result.partition.clone())
            .or_default();

        partition.entries.push(AccountEntry {
            account: result.account.clone(),
            bytes: result.bytes,
            outcome: result.outcome,
        });
        partition.total_bytes = partition.total_bytes.saturating_add(result.bytes);
        partition.accounts_processed += 1;
        match result.outcome {
            Outcome::Cleared => partition.cleared += 1,
            Outcome::DryRun => partition.dry_run += 1,
            Outcome::Failed => partition.failed += 1,
            Outcome::Skipped => partition.skipped += 1,
        }

        self.results.push(result);
    }

    pub fn summary(&self) -> &SummaryReport {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn finish(self) -> (SummaryReport, Vec<TaskResult>) {
        (self.summary, self.results)
    }
}

pub fn summarize<I>(results: I) -> SummaryReport
where
    I: IntoIterator<Item = TaskResult>,
{
    let mut aggregator = Aggregator::new();
    for result in results {
        aggregator.ingest(result);
    }
    aggregator.finish().0
}
