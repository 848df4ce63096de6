//! Resolve a diagnosed file reference to a file under the target tree.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::core::diagnose::FileReference;

/// Map `reference` to an existing file under `target_dir`.
///
/// The verbatim path (joined onto `target_dir`) wins when it names a file.
/// Otherwise the tree is searched depth-first, in file-name order, for the
/// first file with the same base name. References that would escape the
/// target (absolute paths, `..`) only take part in the base-name search.
pub fn resolve_reference(target_dir: &Path, reference: &FileReference) -> Option<PathBuf> {
    let rel = Path::new(&reference.path);
    if is_contained(rel) {
        let direct = target_dir.join(rel);
        if direct.is_file() {
            debug!(path = %direct.display(), "reference resolved verbatim");
            return Some(direct);
        }
    }

    let base_name = rel.file_name()?;
    let found = WalkDir::new(target_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| entry.file_type().is_file() && entry.file_name() == base_name)
        .map(|entry| entry.into_path());

    if let Some(path) = &found {
        info!(path = %path.display(), reference = %reference.raw, "found file at new path");
    }
    found
}

fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
