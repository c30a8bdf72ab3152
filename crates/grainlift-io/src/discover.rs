//! Finding the images a run will process.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::BatchError;

/// Extensions picked up as inputs, compared case-insensitively.
pub const INPUT_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tiff", "webp"];

/// Whether `path` has one of the [`INPUT_EXTENSIONS`].
#[must_use]
pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| INPUT_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Where outputs go relative to the destination directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    /// Walk the source recursively and recreate its subdirectories.
    #[default]
    Mirror,
    /// Only the source's top level; outputs sit directly in the
    /// destination.
    Flat,
}

/// One source file and where its enhanced copy is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// List every supported image under `source`, sorted by path.
///
/// Symlinks are not followed. When `destination` lies inside `source`
/// it is not descended into, so earlier outputs are not picked up
/// again. The two are compared after canonicalization, so `.` as the
/// source still excludes `./enhanced`. Unreadable entries below the top
/// level are logged and skipped.
///
/// # Errors
///
/// Returns [`BatchError::Discovery`] if `source` itself cannot be read
/// as a directory.
pub fn discover(
    source: &Path,
    destination: &Path,
    layout: Layout,
) -> Result<Vec<WorkItem>, BatchError> {
    let discovery_err = |e| BatchError::Discovery {
        path: source.to_path_buf(),
        source: e,
    };
    fs::read_dir(source).map_err(discovery_err)?;
    let source_root = fs::canonicalize(source).map_err(discovery_err)?;
    // A destination that does not exist yet holds nothing to skip.
    let excluded = fs::canonicalize(destination).ok();
    let is_destination = |path: &Path| {
        excluded.as_deref().is_some_and(|dest| {
            path.strip_prefix(source).is_ok_and(|rel| source_root.join(rel) == dest)
        })
    };

    let walker = match layout {
        Layout::Mirror => WalkDir::new(source).follow_links(false),
        Layout::Flat => WalkDir::new(source).follow_links(false).max_depth(1),
    };

    let walk = walker
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && is_destination(e.path())));

    let mut items = Vec::new();
    for entry in walk {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(discovery_err(e.into())),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_supported_input(entry.path()) {
            continue;
        }

        let path = entry.path();
        let target = match layout {
            Layout::Mirror => path
                .strip_prefix(source)
                .map_or_else(|_| destination.join(entry.file_name()), |rel| destination.join(rel)),
            Layout::Flat => destination.join(entry.file_name()),
        };
        items.push(WorkItem {
            source: path.to_path_buf(),
            destination: target,
        });
    }

    items.sort_by(|a, b| a.source.cmp(&b.source));
    tracing::debug!(count = items.len(), source = %source.display(), "discovered images");
    Ok(items)
}
