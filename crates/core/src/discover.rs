use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ReclaimError, Result};
use crate::model::Target;

pub const DEFAULT_CACHE_DIR_NAME: &str = ".cache";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryOptions {
    /// Directories whose children are account roots, e.g. `/home`.
    pub roots: Vec<PathBuf>,
    #[serde(default = "default_cache_dir_name")]
    pub cache_dir_name: String,
    /// Account names (glob or plain substring) to leave alone.
    #[serde(default)]
    pub excludes: Vec<String>,
}

fn default_cache_dir_name() -> String {
    DEFAULT_CACHE_DIR_NAME.to_string()
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from("/home")],
            cache_dir_name: default_cache_dir_name(),
            excludes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub targets: Vec<Target>,
    pub warnings: Vec<String>,
}

/// Lists `<root>/<account>/<cache_dir_name>` directories in name order.
///
/// Symlinked account roots and symlinked cache directories are never
/// returned. Missing or unreadable roots become warnings.
pub fn discover_targets(options: &DiscoveryOptions) -> Result<Discovery> {
    validate_discovery_options(options)?;

    let mut discovery = Discovery::default();
    let excludes = AccountFilter::compile(&options.excludes, &mut discovery.warnings);
    let mut seen = HashSet::new();

    for root in &options.roots {
        let root = absolute_root(root)?;
        if !seen.insert(root.clone()) {
            continue;
        }

        let mut accounts = match fs::read_dir(&root) {
            Ok(entries) => entries
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(err) => {
                        discovery
                            .warnings
                            .push(format!("read error under {}: {}", root.display(), err));
                        None
                    }
                })
                .collect::<Vec<_>>(),
            Err(err) => {
                discovery
                    .warnings
                    .push(format!("cannot read root {}: {}", root.display(), err));
                continue;
            }
        };
        accounts.sort_by_key(|entry| entry.file_name());

        for account in accounts {
            let is_dir = account
                .file_type()
                .map(|file_type| file_type.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }

            let account_name = account.file_name().to_string_lossy().to_string();
            if excludes.skips(&account_name) {
                debug!("excluded account {account_name} under {}", root.display());
                continue;
            }

            let cache = account.path().join(&options.cache_dir_name);
            let is_cache_dir = fs::symlink_metadata(&cache)
                .map(|metadata| metadata.is_dir())
                .unwrap_or(false);
            if !is_cache_dir {
                continue;
            }

            match Target::from_path(&cache) {
                Some(target) => discovery.targets.push(target),
                None => discovery
                    .warnings
                    .push(format!("cannot derive partition/account for {}", cache.display())),
            }
        }
    }

    info!(
        targets = discovery.targets.len(),
        warnings = discovery.warnings.len(),
        "discovery finished"
    );
    Ok(discovery)
}

fn validate_discovery_options(options: &DiscoveryOptions) -> Result<()> {
    if options.roots.is_empty() {
        return Err(ReclaimError::NoRoots);
    }
    let mut components = Path::new(&options.cache_dir_name).components();
    let single_name = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single_name {
        return Err(ReclaimError::InvalidConfig(format!(
            "cache directory name must be a single path segment, got '{}'",
            options.cache_dir_name
        )));
    }
    Ok(())
}

fn absolute_root(root: &Path) -> Result<PathBuf> {
    if root.is_absolute() {
        return Ok(root.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(root))
        .map_err(|source| ReclaimError::Io {
            path: root.to_path_buf(),
            source,
        })
}

/// Account-name filter. Patterns with glob syntax go through `globset`;
/// anything else (or a glob that fails to parse) is a case-insensitive
/// fragment of the account name.
#[derive(Default)]
struct AccountFilter {
    globs: Option<GlobSet>,
    fragments: Vec<String>,
}

impl AccountFilter {
    fn compile(patterns: &[String], warnings: &mut Vec<String>) -> Self {
        let mut filter = Self::default();
        let mut builder = GlobSetBuilder::new();
        let mut glob_count = 0;

        for pattern in patterns.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            if !has_glob_syntax(pattern) {
                filter.fragments.push(pattern.to_lowercase());
                continue;
            }
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                    glob_count += 1;
                }
                Err(err) => {
                    warnings.push(format!(
                        "exclude '{pattern}' is not a valid glob ({err}); treating it as plain text"
                    ));
                    filter.fragments.push(pattern.to_lowercase());
                }
            }
        }

        if glob_count > 0 {
            match builder.build() {
                Ok(set) => filter.globs = Some(set),
                Err(err) => warnings.push(format!(
                    "account excludes given as globs are ignored: {err}"
                )),
            }
        }
        filter
    }

    fn skips(&self, account: &str) -> bool {
        if self.globs.as_ref().is_some_and(|set| set.is_match(account)) {
            return true;
        }
        let account = account.to_lowercase();
        self.fragments
            .iter()
            .any(|fragment| account.contains(fragment.as_str()))
    }
}

fn has_glob_syntax(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', ']', '{', '}'])
}
