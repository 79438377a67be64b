use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Removes the contents of a directory while keeping the directory itself.
pub trait Eraser: Send + Sync {
    /// Returns `false` if any entry could not be removed. Entries removed
    /// before the failure stay removed.
    fn erase(&self, path: &Path) -> bool;

    /// Direct children of `path`, hidden entries included. An error means the
    /// directory cannot be entered.
    fn list_entries(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        fs::read_dir(path)?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsEraser;

impl Eraser for FsEraser {
    fn erase(&self, path: &Path) -> bool {
        let entries = match self.list_entries(path) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("cannot list {}: {}", path.display(), err);
                return false;
            }
        };

        let mut all_removed = true;
        for entry in entries {
            if let Err(err) = remove_entry(&entry) {
                debug!("failed to remove {}: {}", entry.display(), err);
                all_removed = false;
            }
        }
        all_removed
    }
}

fn remove_entry(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
