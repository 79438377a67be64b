use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

#[cfg(feature = "pdu-backend")]
use std::fs::Metadata;

#[cfg(feature = "pdu-backend")]
use parallel_disk_usage::{
    fs_tree_builder::FsTreeBuilder,
    get_size::GetSize,
    hardlink::HardlinkIgnorant,
    os_string_display::OsStringDisplay,
    reporter::{ErrorOnlyReporter, ErrorReport},
    size::Bytes,
};

/// Measures the byte size of a directory's contents.
///
/// Must never fail: missing or unreadable paths measure as 0.
pub trait SizeProbe: Send + Sync {
    fn measure(&self, path: &Path) -> u64;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizeBackendKind {
    #[default]
    Native,
    #[serde(alias = "pdu")]
    PduLibrary,
}

/// Sums the lengths of regular files below `path` without following links.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalkDirProbe;

impl SizeProbe for WalkDirProbe {
    fn measure(&self, path: &Path) -> u64 {
        WalkDir::new(path)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|metadata| metadata.len())
            .fold(0_u64, u64::saturating_add)
    }
}

/// `parallel-disk-usage` tree walk over the same regular files
/// [`WalkDirProbe`] counts.
#[cfg(feature = "pdu-backend")]
#[derive(Debug, Default, Clone, Copy)]
pub struct PduProbe;

/// Apparent length of regular files. Directories and symlinks weigh nothing:
/// the cache directory itself survives an erase.
#[cfg(feature = "pdu-backend")]
#[derive(Debug, Clone, Copy)]
struct RegularFileSize;

#[cfg(feature = "pdu-backend")]
impl GetSize for RegularFileSize {
    type Size = Bytes;

    fn get_size(&self, metadata: &Metadata) -> Self::Size {
        if metadata.is_file() {
            metadata.len().into()
        } else {
            Bytes::default()
        }
    }
}

#[cfg(feature = "pdu-backend")]
impl SizeProbe for PduProbe {
    fn measure(&self, path: &Path) -> u64 {
        if !path.is_dir() {
            return 0;
        }
        let reporter = ErrorOnlyReporter::new(ErrorReport::SILENT);
        let tree: parallel_disk_usage::data_tree::DataTree<OsStringDisplay, Bytes> =
            FsTreeBuilder {
                root: path.to_path_buf(),
                size_getter: RegularFileSize,
                hardlinks_recorder: &HardlinkIgnorant,
                reporter: &reporter,
                max_depth: u64::MAX,
            }
            .into();
        tree.size().into()
    }
}

/// Picks the probe for `kind`, falling back to the native walker (with a
/// warning) when the pdu backend is not compiled in.
pub fn probe_for(kind: SizeBackendKind, warnings: &mut Vec<String>) -> Arc<dyn SizeProbe> {
    match kind {
        SizeBackendKind::Native => Arc::new(WalkDirProbe),
        SizeBackendKind::PduLibrary => pdu_probe(warnings),
    }
}

#[cfg(feature = "pdu-backend")]
fn pdu_probe(_warnings: &mut Vec<String>) -> Arc<dyn SizeProbe> {
    Arc::new(PduProbe)
}

#[cfg(not(feature = "pdu-backend"))]
fn pdu_probe(warnings: &mut Vec<String>) -> Arc<dyn SizeProbe> {
    warnings.push(
        "pdu_library backend unavailable in this build; falling back to native backend."
            .to_string(),
    );
    Arc::new(WalkDirProbe)
}
