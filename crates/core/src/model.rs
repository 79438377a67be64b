use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const REPORT_VERSION: &str = "1.0.0";

/// One cache directory slated for content removal.
///
/// `partition` and `account` are derived from the path once, at discovery time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    path: PathBuf,
    partition: String,
    account: String,
}

impl Target {
    /// Builds a target from an absolute cache directory path such as
    /// `/home/alice/.cache`. Returns `None` when the path has no partition
    /// segment or no account segment above the cache directory.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let partition = path.components().find_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().to_string()),
            _ => None,
        })?;
        let account = path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().to_string())?;

        Some(Self {
            path,
            partition,
            account,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn account(&self) -> &str {
        &self.account
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Cleared,
    DryRun,
    Failed,
    Skipped,
}

/// Outcome record for one target. Exactly one is produced per admitted target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    pub partition: String,
    pub account: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub outcome: Outcome,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub leftover_entries: usize,
    #[serde(default)]
    pub message: Option<String>,
}

impl TaskResult {
    pub fn new(target: &Target, outcome: Outcome, bytes: u64) -> Self {
        Self {
            partition: target.partition().to_string(),
            account: target.account().to_string(),
            path: target.path().to_path_buf(),
            bytes,
            outcome,
            attempts: 0,
            leftover_entries: 0,
            message: None,
        }
    }

    /// A zero-byte result for a target that was not (fully) processed.
    pub fn unfinished(target: &Target, outcome: Outcome, message: impl Into<String>) -> Self {
        Self::new(target, outcome, 0).with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_leftover_entries(mut self, leftover_entries: usize) -> Self {
        self.leftover_entries = leftover_entries;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountEntry {
    pub account: String,
    pub bytes: u64,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PartitionSummary {
    pub entries: Vec<AccountEntry>,
    pub total_bytes: u64,
    pub accounts_processed: u64,
    #[serde(default)]
    pub cleared: u64,
    #[serde(default)]
    pub dry_run: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub skipped: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SummaryReport {
    pub partitions: BTreeMap<String, PartitionSummary>,
}

impl SummaryReport {
    pub fn total_bytes(&self) -> u64 {
        self.partitions
            .values()
            .map(|summary| summary.total_bytes)
            .fold(0_u64, u64::saturating_add)
    }

    pub fn accounts_processed(&self) -> u64 {
        self.partitions
            .values()
            .map(|summary| summary.accounts_processed)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub report_version: String,
    pub run_id: String,
    pub generated_at: String,
    pub dry_run: bool,
    pub interrupted: bool,
    #[serde(default)]
    pub forced: bool,
    pub elapsed_ms: u64,
    pub results: Vec<TaskResult>,
    pub summary: SummaryReport,
}

#[cfg(test)]
mod tests {
    use super::{Outcome, TaskResult, Target};
    use std::path::Path;

    #[test]
    fn target_derives_partition_and_account() {
        let target = Target::from_path("/home/alice/.cache").expect("target");
        assert_eq!(target.partition(), "home");
        assert_eq!(target.account(), "alice");
        assert_eq!(target.path(), Path::new("/home/alice/.cache"));

        let nested = Target::from_path("/srv/users/bob/.cache").expect("nested target");
        assert_eq!(nested.partition(), "srv");
        assert_eq!(nested.account(), "bob");
    }

    #[test]
    fn target_rejects_paths_without_account() {
        assert!(Target::from_path("/").is_none());
        assert!(Target::from_path("/.cache").is_none());
    }

    #[test]
    fn unfinished_result_carries_zero_bytes() {
        let target = Target::from_path("/home/carol/.cache").expect("target");
        let result = TaskResult::unfinished(&target, Outcome::Skipped, "not started");
        assert_eq!(result.bytes, 0);
        assert_eq!(result.outcome, Outcome::Skipped);
        assert_eq!(result.message.as_deref(), Some("not started"));
        assert_eq!(result.account, "carol");
    }
}
