pub mod aggregate;
pub mod cancel;
pub mod config;
pub mod discover;
pub mod eraser;
pub mod error;
pub mod model;
pub mod pool;
pub mod privilege;
pub mod probe;
pub mod render;
pub mod retry;
pub mod run;
#[cfg(test)]
mod test_log;
pub mod worker;

pub use aggregate::{summarize, Aggregator};
pub use cancel::{CancellationController, ShutdownState};
pub use config::ReclaimConfig;
pub use discover::{discover_targets, Discovery, DiscoveryOptions, DEFAULT_CACHE_DIR_NAME};
pub use eraser::{Eraser, FsEraser};
pub use error::ReclaimError;
pub use model::{
    AccountEntry, Outcome, PartitionSummary, RunReport, SummaryReport, Target, TaskResult,
    REPORT_VERSION,
};
pub use pool::{PoolStats, WorkerPool};
pub use privilege::{effective_uid, ensure_privileged};
pub use probe::{probe_for, SizeBackendKind, SizeProbe, WalkDirProbe};
pub use render::{human_bytes, render_run_report, render_summary};
pub use retry::{attempt_with_retry, RetryError, RetryPolicy};
pub use run::run_reclaim;
pub use worker::ReclaimWorker;

#[cfg(feature = "pdu-backend")]
pub use probe::PduProbe;
